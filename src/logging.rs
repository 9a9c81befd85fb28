//! Logging setup and event macros.
//!
//! Log lines follow a `[component] event: detail` shape so watcher and
//! query-loop output can be told apart when both threads are active.
//!
//! `RUST_LOG` takes precedence over the `[logging]` config section:
//!
//! ```bash
//! RUST_LOG=debug ragwatch run
//! RUST_LOG=ragwatch::watcher=trace ragwatch run
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the filter directive string for a logging config.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut directives = config.default.clone();
    for (module, level) in &config.modules {
        directives.push_str(&format!(",{module}={level}"));
    }
    directives
}

/// Install the global subscriber. Only the first call has any effect.
///
/// Output goes to stderr so it does not interleave with answers printed
/// by the interactive loop on stdout.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Log an event with component context at info level.
///
/// ```ignore
/// log_event!("watcher", "detected", "{}", path.display());
/// log_event!("indexer", "purged");
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

/// Same as [`log_event!`] at debug level.
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_include_module_overrides() {
        let mut config = LoggingConfig::default();
        config.modules.insert("ragwatch::watcher".into(), "debug".into());
        assert_eq!(filter_directives(&config), "info,ragwatch::watcher=debug");
    }

    #[test]
    fn init_is_idempotent() {
        init();
        init();
        log_event!("test", "logged", "{}", 1);
    }
}
