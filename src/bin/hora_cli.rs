//! Hora CLI: one-shot access to hora timings
//!
//! Usage:
//!   hora-cli fetch [--date YYYY-MM-DD]   Fetch a day and store it in the cache
//!   hora-cli current [--at RFC3339]      Show the active hora from the cache
//!   hora-cli list [--at RFC3339]         Show the cached day's timings
//!   hora-cli config                      Show the effective configuration

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use hora_widget_lib::normalize::normalize_payload;
use hora_widget_lib::presenter::{current_label, day_listing, menu_title};
use hora_widget_lib::{
    init_tracing, resolve, Clock, HoraCache, HoraConfig, HoraSource, HttpHoraSource, ManualClock,
    SystemClock, TimeWindowSet,
};

#[derive(Parser)]
#[command(
    name = "hora-cli",
    about = "Hora CLI - fetch and inspect planetary hour timings",
    version
)]
struct Cli {
    /// Config file (default: <config dir>/hora-widget/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch hora timings from the API and store them in the cache
    Fetch {
        /// Day to fetch (default: today in the configured offset)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show the hora active at an instant
    Current {
        /// Instant to resolve, RFC 3339 (default: now)
        #[arg(long, value_parser = parse_instant)]
        at: Option<DateTime<FixedOffset>>,
    },
    /// List the cached day's hora timings
    List {
        /// Instant to mark as current, RFC 3339 (default: now)
        #[arg(long, value_parser = parse_instant)]
        at: Option<DateTime<FixedOffset>>,
    },
    /// Print the effective configuration (API key redacted)
    Config,
}

fn parse_instant(raw: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(raw).map_err(|e| format!("expected RFC 3339 timestamp: {}", e))
}

/// `--at` pins the clock; otherwise the system clock in the configured offset.
fn clock_for(config: &HoraConfig, at: Option<DateTime<FixedOffset>>) -> Result<Box<dyn Clock>> {
    Ok(match at {
        Some(instant) => Box::new(ManualClock::new(instant)),
        None => Box::new(SystemClock::new(config.utc_offset()?)),
    })
}

fn load_cached_set(config: &HoraConfig) -> Result<TimeWindowSet> {
    let cache = HoraCache::new(config.cache_path.clone());
    let cached = cache.load()?.ok_or_else(|| {
        anyhow!(
            "No cached hora timings at {}. Run `hora-cli fetch` first.",
            cache.path().display()
        )
    })?;
    let windows = normalize_payload(&cached.raw, config.utc_offset()?)
        .context("Cached hora timings are unusable")?;
    Ok(windows)
}

async fn fetch(config: &HoraConfig, date: Option<NaiveDate>) -> Result<()> {
    let basis = config.utc_offset()?;
    let clock = SystemClock::new(basis);
    let day = date.unwrap_or_else(|| clock.now().date_naive());

    let source = HttpHoraSource::new(config)?;
    let raw = source.fetch_day(day).await?;
    let windows = normalize_payload(&raw, basis)?;

    let cache = HoraCache::new(config.cache_path.clone());
    cache.store(&raw, clock.now())?;

    println!(
        "Fetched {} horas for {} → {}",
        windows.len(),
        day,
        cache.path().display()
    );
    print!("{}", day_listing(&windows, clock.now()));
    Ok(())
}

fn current(config: &HoraConfig, at: Option<DateTime<FixedOffset>>) -> Result<()> {
    let windows = load_cached_set(config)?;
    let now = clock_for(config, at)?.now();
    let state = resolve(&windows, now);

    println!("{}  |  {}", menu_title(&state), current_label(Some(&state)));
    if let Some(active) = &state.active {
        println!(
            "{} - {}",
            active.starts_at.format("%I:%M %p"),
            active.ends_at.format("%I:%M %p")
        );
    }
    Ok(())
}

fn list(config: &HoraConfig, at: Option<DateTime<FixedOffset>>) -> Result<()> {
    let windows = load_cached_set(config)?;
    let now = clock_for(config, at)?.now();
    print!("{}", day_listing(&windows, now));
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Fetch { date } => {
            let config = HoraConfig::load(config_path)?;
            fetch(&config, date).await
        }
        Commands::Current { at } => current(&HoraConfig::load_unvalidated(config_path)?, at),
        Commands::List { at } => list(&HoraConfig::load_unvalidated(config_path)?, at),
        Commands::Config => {
            let config = HoraConfig::load_unvalidated(config_path)?;
            println!("{}", config.describe());
            if let Err(e) = config.validate() {
                println!();
                println!("Warning: {}", e);
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
