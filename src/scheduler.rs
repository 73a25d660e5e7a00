// Hora Refresh Scheduler
// Background tick loop: re-resolve every tick, re-fetch on cadence, rollover and demand

use chrono::{DateTime, FixedOffset, NaiveDate};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::HoraCache;
use crate::clock::Clock;
use crate::config::HoraConfig;
use crate::error::{HoraError, HoraResult};
use crate::fetcher::HoraSource;
use crate::hora::{resolve, ResolvedState, TimeWindowSet};
use crate::normalize::normalize_payload;
use crate::presenter::{Notice, Presenter};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    Idle = 0,
    Fetching = 1,
    FetchFailed = 2,
}

impl SchedulerState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Fetching,
            2 => Self::FetchFailed,
            _ => Self::Idle,
        }
    }
}

/// Why a fetch was started. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Cadence,
    DayRollover,
    Manual,
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Updated { windows: usize },
    Failed(HoraError),
    /// Another fetch was already in flight; this request was folded into it.
    Coalesced,
}

/// Immutable view of the loaded day. Replaced wholesale, never mutated.
#[derive(Debug, Default)]
pub struct DaySnapshot {
    pub windows: Arc<TimeWindowSet>,
    pub fetched_at: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    /// Offset the API's naive timestamps are read in.
    pub basis: FixedOffset,
    pub tick_interval: Duration,
    pub refresh_interval: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &HoraConfig) -> HoraResult<Self> {
        Ok(Self {
            basis: config.utc_offset()?,
            tick_interval: config.tick_interval(),
            refresh_interval: config.refresh_interval(),
        })
    }
}

#[derive(Debug, Default)]
struct TickBook {
    last_attempt: Option<DateTime<FixedOffset>>,
    last_seen_day: Option<NaiveDate>,
    rollover_pending: bool,
}

/// Clears the in-flight flag even if the fetch future is dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// RefreshScheduler
// ---------------------------------------------------------------------------

pub struct RefreshScheduler {
    source: Arc<dyn HoraSource>,
    presenter: Arc<dyn Presenter>,
    clock: Arc<dyn Clock>,
    cache: Option<HoraCache>,
    settings: SchedulerSettings,
    snapshot: RwLock<Arc<DaySnapshot>>,
    state: AtomicU8,
    in_flight: AtomicBool,
    book: Mutex<TickBook>,
}

impl RefreshScheduler {
    pub fn new(
        source: Arc<dyn HoraSource>,
        presenter: Arc<dyn Presenter>,
        clock: Arc<dyn Clock>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            source,
            presenter,
            clock,
            cache: None,
            settings,
            snapshot: RwLock::new(Arc::new(DaySnapshot::default())),
            state: AtomicU8::new(SchedulerState::Idle as u8),
            in_flight: AtomicBool::new(false),
            book: Mutex::new(TickBook::default()),
        }
    }

    pub fn with_cache(mut self, cache: HoraCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: SchedulerState) {
        let prev = SchedulerState::from_u8(self.state.swap(state as u8, Ordering::SeqCst));
        if prev != state {
            debug!("Scheduler {:?} -> {:?}", prev, state);
        }
    }

    /// Current day snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<DaySnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn publish(&self, snapshot: DaySnapshot) {
        let snapshot = Arc::new(snapshot);
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }

    /// Resolve the current snapshot against the clock.
    pub fn current(&self) -> ResolvedState {
        resolve(&self.snapshot().windows, self.clock.now())
    }

    fn present_current(&self) {
        self.presenter.show_state(&self.current());
    }

    /// Publish the cached day if one is on disk.
    ///
    /// Returns `true` when the cache held usable windows for today. Missing,
    /// unreadable, unparsable or stale caches return `false`.
    pub fn load_cached(&self) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };

        let cached = match cache.load() {
            Ok(Some(cached)) => cached,
            Ok(None) => return false,
            Err(e) => {
                warn!("Ignoring hora cache: {}", e);
                return false;
            }
        };

        let windows = match normalize_payload(&cached.raw, self.settings.basis) {
            Ok(set) => set,
            Err(e) => {
                warn!("Cached hora payload unusable: {}", e);
                return false;
            }
        };

        let now = self.clock.now();
        let fresh = windows.day() == Some(now.date_naive());
        info!(
            "Loaded {} cached horas for {:?}{}",
            windows.len(),
            windows.day(),
            if fresh { "" } else { " (stale)" }
        );

        self.publish(DaySnapshot {
            windows: Arc::new(windows),
            fetched_at: cached.fetched_at,
        });

        if fresh {
            let mut book = self.book.lock().unwrap_or_else(|e| e.into_inner());
            book.last_attempt = Some(cached.fetched_at.unwrap_or(now));
        }
        fresh
    }

    /// Load the cache, fetch if it had nothing usable, then present.
    pub async fn start(&self) -> Option<RefreshOutcome> {
        {
            let mut book = self.book.lock().unwrap_or_else(|e| e.into_inner());
            book.last_seen_day = Some(self.clock.now().date_naive());
        }

        let outcome = if self.load_cached() {
            let snapshot = self.snapshot();
            self.presenter.show_day(&snapshot.windows);
            None
        } else {
            Some(self.refresh(Trigger::Startup).await)
        };

        self.present_current();
        outcome
    }

    /// Fetch, normalize and publish a new day.
    ///
    /// At most one fetch runs at a time; overlapping calls return
    /// `Coalesced` immediately. Failures leave the previous snapshot in place.
    pub async fn refresh(&self, trigger: Trigger) -> RefreshOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Refresh ({:?}) coalesced into in-flight fetch", trigger);
            return RefreshOutcome::Coalesced;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let now = self.clock.now();
        let day = now.date_naive();
        {
            let mut book = self.book.lock().unwrap_or_else(|e| e.into_inner());
            book.last_attempt = Some(now);
            book.rollover_pending = false;
        }

        info!("Refreshing horas for {} ({:?})", day, trigger);
        self.set_state(SchedulerState::Fetching);
        self.presenter.notify(Notice::Fetching);

        let result = match self.source.fetch_day(day).await {
            Ok(raw) => normalize_payload(&raw, self.settings.basis).map(|set| (raw, set)),
            Err(e) => Err(e),
        };

        match result {
            Ok((raw, windows)) => {
                let fetched_at = self.clock.now();
                if let Some(cache) = &self.cache {
                    if let Err(e) = cache.store(&raw, fetched_at) {
                        warn!("Failed to write hora cache: {}", e);
                    }
                }

                let count = windows.len();
                let windows = Arc::new(windows);
                self.publish(DaySnapshot {
                    windows: windows.clone(),
                    fetched_at: Some(fetched_at),
                });
                self.set_state(SchedulerState::Idle);

                info!("Hora timings updated: {} windows", count);
                self.presenter.notify(Notice::Updated { windows: count });
                self.presenter.show_day(&windows);
                self.present_current();
                RefreshOutcome::Updated { windows: count }
            }
            Err(e) => {
                self.set_state(SchedulerState::FetchFailed);
                warn!("Hora refresh failed: {}", e);
                self.presenter.notify(Notice::Failed(&e));
                self.set_state(SchedulerState::Idle);
                RefreshOutcome::Failed(e)
            }
        }
    }

    /// Which fetch, if any, this tick owes.
    fn due_trigger(&self, now: DateTime<FixedOffset>) -> Option<Trigger> {
        let mut book = self.book.lock().unwrap_or_else(|e| e.into_inner());
        let today = now.date_naive();

        if let Some(seen) = book.last_seen_day {
            if seen != today {
                info!("Day rolled over from {} to {}", seen, today);
                book.rollover_pending = true;
            }
        }
        book.last_seen_day = Some(today);

        if book.rollover_pending {
            return Some(Trigger::DayRollover);
        }

        let cadence = chrono::Duration::from_std(self.settings.refresh_interval)
            .unwrap_or(chrono::Duration::MAX);
        match book.last_attempt {
            None => Some(Trigger::Cadence),
            Some(last) if now.signed_duration_since(last) >= cadence => Some(Trigger::Cadence),
            Some(_) => None,
        }
    }

    /// One clock tick: re-resolve, then fetch if cadence or rollover says so.
    pub async fn tick(&self) -> Option<RefreshOutcome> {
        let now = self.clock.now();
        self.presenter
            .show_state(&resolve(&self.snapshot().windows, now));

        let trigger = self.due_trigger(now)?;
        Some(self.refresh(trigger).await)
    }

    /// Manual refresh from the presentation layer, run off the caller's task.
    pub fn request_refresh(self: &Arc<Self>) -> JoinHandle<RefreshOutcome> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = scheduler.refresh(Trigger::Manual).await;
            if matches!(outcome, RefreshOutcome::Coalesced) {
                scheduler.presenter.notify(Notice::Coalesced);
            }
            outcome
        })
    }

    /// Tick until `cancel` fires. An in-flight fetch is allowed to finish.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            "Refresh scheduler started (tick {:?}, refresh every {:?})",
            self.settings.tick_interval, self.settings.refresh_interval
        );

        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; `start` already covered it.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Refresh scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(scheduler.run(cancel))
    }
}
