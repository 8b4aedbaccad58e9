//! Logging for the dev server.
//!
//! Every line carries a bracketed component tag so a single stderr stream
//! stays readable while the index, the watcher and both builders run at
//! once:
//!
//! | tag         | emitted by                                         |
//! |-------------|----------------------------------------------------|
//! | `index`     | story index builds and point invalidations         |
//! | `watcher`   | file events and which specifier claimed them       |
//! | `notifier`  | debounced invalidations that were suppressed       |
//! | `channel`   | server events sent to connected clients            |
//! | `server`    | listener, static mounts, startup stages            |
//! | `preview`   | preview builder start, or skip with ignore-preview |
//! | `manager`   | manager builder failures                           |
//! | `telemetry` | reported events                                    |
//! | `entries`   | synthesized virtual entry files                    |
//! | `plugins`   | registered and detected capabilities               |
//! | `config`    | which settings directory was loaded                |
//!
//! Levels come from the `[logging]` table; `RUST_LOG` replaces it entirely.
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! storydev::watcher = "debug"
//! storydev::stories = "debug"
//! ```
//!
//! ```bash
//! RUST_LOG=storydev::watcher=trace storydev dev
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the filter directive string from config.
fn filter_directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.default.clone();
    for (module, level) in &config.modules {
        filter_str.push_str(&format!(",{module}={level}"));
    }
    filter_str
}

/// Initialize logging with configuration.
///
/// Only the first call takes effect.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_writer(std::io::stderr)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

/// Initialize logging with `LoggingConfig::default()`.
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Log an event with component context.
///
/// # Examples
/// ```ignore
/// log_event!("index", "built", "{} stories", count);
/// log_event!("server", "listening");
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-only event logging.
///
/// # Examples
/// ```ignore
/// debug_event!("channel", "emit", "storyIndexInvalidated");
/// ```
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}
