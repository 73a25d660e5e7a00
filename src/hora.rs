// Hora Model & Window Resolution
// One day's planetary-hour windows and the lookup of the active one

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Lord
// ---------------------------------------------------------------------------

/// Planet ruling a hora window.
///
/// Names outside the classical seven are kept verbatim in `Other` so an
/// upstream naming change degrades to a generic glyph instead of a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Lord {
    Sun,
    Moon,
    Mars,
    Mercury,
    Jupiter,
    Venus,
    Saturn,
    Other(String),
}

impl Lord {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "sun" => Self::Sun,
            "moon" => Self::Moon,
            "mars" => Self::Mars,
            "mercury" => Self::Mercury,
            "jupiter" => Self::Jupiter,
            "venus" => Self::Venus,
            "saturn" => Self::Saturn,
            _ => Self::Other(name.trim().to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Sun => "Sun",
            Self::Moon => "Moon",
            Self::Mars => "Mars",
            Self::Mercury => "Mercury",
            Self::Jupiter => "Jupiter",
            Self::Venus => "Venus",
            Self::Saturn => "Saturn",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for Lord {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Lord> for String {
    fn from(lord: Lord) -> Self {
        lord.name().to_string()
    }
}

impl fmt::Display for Lord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// HoraWindow / TimeWindowSet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoraWindow {
    pub lord: Lord,
    pub starts_at: DateTime<FixedOffset>,
    pub ends_at: DateTime<FixedOffset>,
}

impl HoraWindow {
    /// Half-open containment: start inclusive, end exclusive.
    pub fn contains(&self, now: DateTime<FixedOffset>) -> bool {
        self.starts_at <= now && now < self.ends_at
    }
}

/// A window together with the label the API filed it under.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowEntry {
    pub key: String,
    pub window: HoraWindow,
}

/// One calendar day of hora windows, iterated in chronological order.
///
/// Keys are opaque labels from the upstream payload and never drive
/// ordering. Entries with equal start times keep their source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeWindowSet {
    entries: Vec<WindowEntry>,
}

impl TimeWindowSet {
    pub fn new(entries: Vec<WindowEntry>) -> Self {
        let mut entries = entries;
        entries.sort_by_key(|e| e.window.starts_at);
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowEntry> {
        self.entries.iter()
    }

    pub fn get(&self, key: &str) -> Option<&HoraWindow> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.window)
    }

    pub fn first_start(&self) -> Option<DateTime<FixedOffset>> {
        self.entries.first().map(|e| e.window.starts_at)
    }

    pub fn last_end(&self) -> Option<DateTime<FixedOffset>> {
        self.entries.iter().map(|e| e.window.ends_at).max()
    }

    /// Calendar day the set belongs to, taken from its earliest window.
    pub fn day(&self) -> Option<NaiveDate> {
        self.first_start().map(|t| t.date_naive())
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedState {
    pub active: Option<HoraWindow>,
    pub as_of: DateTime<FixedOffset>,
}

impl ResolvedState {
    pub fn active_lord(&self) -> Option<&Lord> {
        self.active.as_ref().map(|w| &w.lord)
    }
}

/// Find the window containing `now`.
///
/// `now` must come from the same offset basis the windows were computed in.
/// Timestamps carry their offset, so the comparison is between instants.
/// A miss (empty set, stale day) is `active: None`, never an error.
pub fn resolve(windows: &TimeWindowSet, now: DateTime<FixedOffset>) -> ResolvedState {
    let active = windows
        .iter()
        .find(|e| e.window.contains(now))
        .map(|e| e.window.clone());

    ResolvedState { active, as_of: now }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    pub(crate) fn at(h: u32, m: u32) -> DateTime<FixedOffset> {
        let tz = FixedOffset::west_opt(6 * 3600).unwrap();
        tz.with_ymd_and_hms(2024, 3, 15, h, m, 0).unwrap()
    }

    pub(crate) fn window(lord: Lord, start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> HoraWindow {
        HoraWindow {
            lord,
            starts_at: start,
            ends_at: end,
        }
    }

    fn entry(key: &str, w: HoraWindow) -> WindowEntry {
        WindowEntry {
            key: key.to_string(),
            window: w,
        }
    }

    fn sun_venus() -> TimeWindowSet {
        TimeWindowSet::new(vec![
            entry("1", window(Lord::Sun, at(6, 0), at(7, 0))),
            entry("2", window(Lord::Venus, at(7, 0), at(8, 0))),
        ])
    }

    #[test]
    fn test_boundary_picks_next_window() {
        let state = resolve(&sun_venus(), at(7, 0));
        assert_eq!(state.active_lord(), Some(&Lord::Venus));
    }

    #[test]
    fn test_inside_window() {
        let state = resolve(&sun_venus(), at(6, 30));
        assert_eq!(state.active_lord(), Some(&Lord::Sun));
        assert_eq!(state.as_of, at(6, 30));
    }

    #[test]
    fn test_start_inclusive_end_exclusive() {
        let set = sun_venus();
        assert_eq!(resolve(&set, at(6, 0)).active_lord(), Some(&Lord::Sun));
        assert!(resolve(&set, at(8, 0)).active.is_none());
        assert!(resolve(&set, at(5, 59)).active.is_none());
    }

    #[test]
    fn test_empty_set_resolves_to_none() {
        let set = TimeWindowSet::empty();
        for h in 0..24 {
            assert!(resolve(&set, at(h, 0)).active.is_none());
        }
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let set = sun_venus();
        assert_eq!(resolve(&set, at(7, 15)), resolve(&set, at(7, 15)));
    }

    #[test]
    fn test_iteration_is_chronological_not_key_order() {
        // Keys deliberately out of order relative to start time
        let set = TimeWindowSet::new(vec![
            entry("b", window(Lord::Moon, at(9, 0), at(10, 0))),
            entry("a", window(Lord::Mars, at(8, 0), at(9, 0))),
            entry("10", window(Lord::Saturn, at(10, 0), at(11, 0))),
        ]);
        let lords: Vec<_> = set.iter().map(|e| e.window.lord.clone()).collect();
        assert_eq!(lords, vec![Lord::Mars, Lord::Moon, Lord::Saturn]);
        assert_eq!(set.first_start(), Some(at(8, 0)));
        assert_eq!(set.last_end(), Some(at(11, 0)));
        assert_eq!(set.get("10").map(|w| w.lord.clone()), Some(Lord::Saturn));
    }

    #[test]
    fn test_overlap_first_chronological_match_wins() {
        let set = TimeWindowSet::new(vec![
            entry("2", window(Lord::Jupiter, at(7, 30), at(9, 0))),
            entry("1", window(Lord::Mercury, at(7, 0), at(8, 0))),
        ]);
        assert_eq!(resolve(&set, at(7, 45)).active_lord(), Some(&Lord::Mercury));
    }

    #[test]
    fn test_equal_offsets_compare_as_instants() {
        // 12:30 UTC is 06:30 at UTC-6
        let set = sun_venus();
        let utc = FixedOffset::east_opt(0).unwrap();
        let now = utc.with_ymd_and_hms(2024, 3, 15, 12, 30, 0).unwrap();
        assert_eq!(resolve(&set, now).active_lord(), Some(&Lord::Sun));
    }

    #[test]
    fn test_stale_day_is_a_miss() {
        let set = sun_venus();
        assert!(resolve(&set, at(6, 30) + Duration::days(1)).active.is_none());
    }

    #[test]
    fn test_lord_parse_and_unknown() {
        assert_eq!(Lord::parse("venus"), Lord::Venus);
        assert_eq!(Lord::parse(" Saturn "), Lord::Saturn);
        assert_eq!(Lord::parse("Rahu"), Lord::Other("Rahu".into()));
        assert_eq!(Lord::Other("Rahu".into()).to_string(), "Rahu");
    }

    #[test]
    fn test_day_of_set() {
        assert_eq!(sun_venus().day(), NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(TimeWindowSet::empty().day(), None);
    }
}
