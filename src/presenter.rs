// Hora Presenter
// Menu-bar style rendering of the resolved hora, the day listing and notices

use chrono::{DateTime, FixedOffset};
use std::io::Write;
use std::sync::Mutex;
use tracing::warn;

use crate::error::HoraError;
use crate::hora::{Lord, ResolvedState, TimeWindowSet};

pub const APP_TITLE: &str = "Hora Widget";
/// Title shown when no hora is active (or nothing has loaded yet).
pub const IDLE_GLYPH: &str = "🕉️";
const UNKNOWN_LORD_GLYPH: &str = "🌟";

/// Transient, non-blocking notification from the refresh path.
#[derive(Debug)]
pub enum Notice<'a> {
    Fetching,
    Updated { windows: usize },
    Failed(&'a HoraError),
    Coalesced,
}

/// Whatever renders hora state for the user.
///
/// Called from the background refresh loop, so implementations must be
/// cheap and must not block on user interaction.
pub trait Presenter: Send + Sync {
    fn show_state(&self, state: &ResolvedState);
    fn show_day(&self, windows: &TimeWindowSet);
    fn notify(&self, notice: Notice<'_>);
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

pub fn glyph(lord: &Lord) -> &'static str {
    match lord {
        Lord::Sun => "☀️",
        Lord::Moon => "🌙",
        Lord::Mars => "♂️",
        Lord::Mercury => "☿️",
        Lord::Jupiter => "♃",
        Lord::Venus => "♀️",
        Lord::Saturn => "♄",
        Lord::Other(_) => UNKNOWN_LORD_GLYPH,
    }
}

/// Menu bar title: `"☀️ Sun"`, or the idle glyph when nothing is active.
pub fn menu_title(state: &ResolvedState) -> String {
    match state.active_lord() {
        Some(lord) => format!("{} {}", glyph(lord), lord),
        None => IDLE_GLYPH.to_string(),
    }
}

/// First menu item. `None` means no data has been loaded yet.
pub fn current_label(state: Option<&ResolvedState>) -> String {
    match state {
        None => "Current Hora: Loading...".to_string(),
        Some(s) => match s.active_lord() {
            Some(lord) => format!("Current: {} Hora", lord),
            None => "Current Hora: Unknown".to_string(),
        },
    }
}

/// "Today's Horas" listing with the active window marked.
pub fn day_listing(windows: &TimeWindowSet, now: DateTime<FixedOffset>) -> String {
    if windows.is_empty() {
        return "No Data: Please refresh to fetch hora timings".to_string();
    }

    let mut out = String::from("Today's Hora Timings:\n\n");
    for entry in windows.iter() {
        let w = &entry.window;
        let marker = if w.contains(now) { "→ " } else { "   " };
        out.push_str(&format!(
            "{}{} - {}: {} {}\n",
            marker,
            w.starts_at.format("%I:%M %p"),
            w.ends_at.format("%I:%M %p"),
            glyph(&w.lord),
            w.lord
        ));
    }
    out
}

/// `(title, message)` for a notice, in the style of a desktop notification.
pub fn notice_text(notice: &Notice<'_>) -> (&'static str, String) {
    match notice {
        Notice::Fetching => ("Fetching", "Updating hora timings...".to_string()),
        Notice::Updated { .. } => ("Success", "Hora timings updated!".to_string()),
        Notice::Failed(e) => ("Error", format!("Failed to fetch: {}", e)),
        Notice::Coalesced => ("Busy", "A refresh is already in progress".to_string()),
    }
}

// ---------------------------------------------------------------------------
// TerminalPresenter
// ---------------------------------------------------------------------------

/// Renders to a text stream. Title changes are printed once, not every tick.
pub struct TerminalPresenter<W: Write + Send> {
    out: Mutex<W>,
    last_title: Mutex<Option<String>>,
}

impl TerminalPresenter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalPresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            last_title: Mutex::new(None),
        }
    }

    fn write_line(&self, line: &str) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            warn!("Failed to write to terminal: {}", e);
        }
    }

    /// Consume the presenter and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> Presenter for TerminalPresenter<W> {
    fn show_state(&self, state: &ResolvedState) {
        let title = menu_title(state);
        {
            let mut last = self.last_title.lock().unwrap_or_else(|e| e.into_inner());
            if last.as_deref() == Some(title.as_str()) {
                return;
            }
            *last = Some(title.clone());
        }
        self.write_line(&format!("{}  |  {}", title, current_label(Some(state))));
    }

    fn show_day(&self, windows: &TimeWindowSet) {
        if let Some(day) = windows.day() {
            self.write_line(&format!("Loaded {} horas for {}", windows.len(), day));
        }
    }

    fn notify(&self, notice: Notice<'_>) {
        let (title, message) = notice_text(&notice);
        self.write_line(&format!("[{}] {}: {}", APP_TITLE, title, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hora::tests::{at, window};
    use crate::hora::{resolve, WindowEntry};

    fn set() -> TimeWindowSet {
        TimeWindowSet::new(vec![
            WindowEntry {
                key: "1".into(),
                window: window(Lord::Sun, at(6, 0), at(7, 0)),
            },
            WindowEntry {
                key: "2".into(),
                window: window(Lord::Venus, at(7, 0), at(8, 0)),
            },
        ])
    }

    #[test]
    fn test_menu_title_and_label() {
        let state = resolve(&set(), at(7, 0));
        assert_eq!(menu_title(&state), "♀️ Venus");
        assert_eq!(current_label(Some(&state)), "Current: Venus Hora");

        let miss = resolve(&set(), at(9, 0));
        assert_eq!(menu_title(&miss), IDLE_GLYPH);
        assert_eq!(current_label(Some(&miss)), "Current Hora: Unknown");
        assert_eq!(current_label(None), "Current Hora: Loading...");
    }

    #[test]
    fn test_unknown_lord_glyph() {
        assert_eq!(glyph(&Lord::Other("Rahu".into())), "🌟");
        assert_eq!(glyph(&Lord::Saturn), "♄");
    }

    #[test]
    fn test_day_listing_marks_active() {
        let text = day_listing(&set(), at(6, 15));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Today's Hora Timings:");
        assert_eq!(lines[2], "→ 06:00 AM - 07:00 AM: ☀️ Sun");
        assert_eq!(lines[3], "   07:00 AM - 08:00 AM: ♀️ Venus");
    }

    #[test]
    fn test_day_listing_empty() {
        assert!(day_listing(&TimeWindowSet::empty(), at(6, 0)).starts_with("No Data"));
    }

    #[test]
    fn test_notice_text() {
        let err = HoraError::transport("timed out");
        let (title, msg) = notice_text(&Notice::Failed(&err));
        assert_eq!(title, "Error");
        assert_eq!(msg, "Failed to fetch: Transport error: timed out");
        assert_eq!(notice_text(&Notice::Updated { windows: 24 }).0, "Success");
    }

    #[test]
    fn test_terminal_presenter_prints_title_changes_once() {
        let presenter = TerminalPresenter::new(Vec::new());
        presenter.show_state(&resolve(&set(), at(6, 10)));
        presenter.show_state(&resolve(&set(), at(6, 20)));
        presenter.show_state(&resolve(&set(), at(7, 5)));
        presenter.notify(Notice::Fetching);

        let text = String::from_utf8(presenter.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "☀️ Sun  |  Current: Sun Hora",
                "♀️ Venus  |  Current: Venus Hora",
                "[Hora Widget] Fetching: Updating hora timings...",
            ]
        );
    }
}
