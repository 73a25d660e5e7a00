// Hora Widget - menu-bar planetary hour tracker
// Fetches the day's hora timings, caches them, and keeps the active hora current

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod http_retry;
pub mod hora;
pub mod normalize;
pub mod presenter;
pub mod scheduler;

pub use cache::HoraCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::HoraConfig;
pub use error::{HoraError, HoraResult};
pub use fetcher::{HoraSource, HttpHoraSource};
pub use hora::{resolve, HoraWindow, Lord, ResolvedState, TimeWindowSet};
pub use presenter::{Presenter, TerminalPresenter};
pub use scheduler::{RefreshOutcome, RefreshScheduler, SchedulerSettings, SchedulerState, Trigger};

const DEFAULT_LOG_FILTER: &str = "hora_widget=info,hora_widget_lib=info,hora_cli=info,warn";

/// Install the global tracing subscriber. Logs go to stderr; `RUST_LOG` overrides.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Wire the live API source, on-disk cache and system clock into a scheduler.
pub fn build_scheduler(
    config: &HoraConfig,
    presenter: Arc<dyn Presenter>,
) -> HoraResult<Arc<RefreshScheduler>> {
    let settings = SchedulerSettings::from_config(config)?;
    let source = Arc::new(HttpHoraSource::new(config)?);
    let clock = Arc::new(SystemClock::new(settings.basis));

    let scheduler = RefreshScheduler::new(source, presenter, clock, settings)
        .with_cache(HoraCache::new(config.cache_path.clone()));
    Ok(Arc::new(scheduler))
}
