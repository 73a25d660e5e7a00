//! Hora Widget: keeps the current planetary hour on screen
//!
//! Commands (stdin):
//!   r, refresh    Re-fetch today's horas now
//!   l, list       Show today's hora timings
//!   s, status     Show the current hora and last fetch
//!   q, quit       Exit

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hora_widget_lib::presenter::{current_label, day_listing, menu_title, APP_TITLE};
use hora_widget_lib::{build_scheduler, init_tracing, HoraConfig, RefreshScheduler, TerminalPresenter};

#[derive(Parser)]
#[command(
    name = "hora-widget",
    about = "Hora Widget - shows the active planetary hour and keeps it current",
    version
)]
struct Args {
    /// Config file (default: <config dir>/hora-widget/config.json)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuCommand {
    Refresh,
    List,
    Status,
    Quit,
}

impl MenuCommand {
    fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "r" | "refresh" => Some(Self::Refresh),
            "l" | "list" => Some(Self::List),
            "s" | "status" => Some(Self::Status),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

const MENU_HELP: &str = "Commands: [r]efresh  [l]ist  [s]tatus  [q]uit";

fn print_status(scheduler: &RefreshScheduler) {
    let snapshot = scheduler.snapshot();
    let state = scheduler.current();
    let label = if snapshot.fetched_at.is_none() && snapshot.windows.is_empty() {
        current_label(None)
    } else {
        current_label(Some(&state))
    };
    println!("{}  |  {}", menu_title(&state), label);
    match snapshot.fetched_at {
        Some(at) => println!("Last fetched: {}", at.format("%Y-%m-%d %I:%M %p")),
        None => println!("Last fetched: never"),
    }
    println!("Scheduler: {:?}", scheduler.state());
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = HoraConfig::load(args.config.as_deref()).context("Configuration error")?;
    info!("{} starting: {}", APP_TITLE, config.describe());

    let presenter = Arc::new(TerminalPresenter::stdout());
    let scheduler = build_scheduler(&config, presenter).context("Failed to start scheduler")?;

    scheduler.start().await;

    let cancel = CancellationToken::new();
    let worker = scheduler.spawn(cancel.clone());

    println!("{}", MENU_HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match MenuCommand::parse(&line) {
                    Some(MenuCommand::Refresh) => {
                        // Outcome is reported through the presenter
                        let _ = scheduler.request_refresh();
                    }
                    Some(MenuCommand::List) => {
                        let state = scheduler.current();
                        print!("{}", day_listing(&scheduler.snapshot().windows, state.as_of));
                    }
                    Some(MenuCommand::Status) => print_status(&scheduler),
                    Some(MenuCommand::Quit) => break,
                    None if line.trim().is_empty() => {}
                    None => println!("{}", MENU_HELP),
                },
                Ok(None) => {
                    // Detached from a terminal: keep running until interrupted
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read command: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    cancel.cancel();
    worker.await.context("Refresh scheduler panicked")?;
    info!("{} stopped", APP_TITLE);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_command_parse() {
        assert_eq!(MenuCommand::parse("r"), Some(MenuCommand::Refresh));
        assert_eq!(MenuCommand::parse(" Refresh \n"), Some(MenuCommand::Refresh));
        assert_eq!(MenuCommand::parse("l"), Some(MenuCommand::List));
        assert_eq!(MenuCommand::parse("status"), Some(MenuCommand::Status));
        assert_eq!(MenuCommand::parse("Q"), Some(MenuCommand::Quit));
        assert_eq!(MenuCommand::parse("x"), None);
    }
}
