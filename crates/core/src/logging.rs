//! Structured logging for the attestor.
//!
//! The node's `[logging]` table picks the output format and a default
//! filter. `RUST_LOG`, when set, takes precedence over the configured filter.

use serde::Deserialize;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Log line encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    /// One JSON object per line, for log aggregation
    Json,
}

/// Logging options read from the node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub format: LogFormat,
    /// `EnvFilter` directives used when `RUST_LOG` is unset, e.g. `procattest_identity=debug`
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl LogSettings {
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.filter))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Install the global subscriber described by `settings`.
///
/// # Example
/// ```no_run
/// use procattest_core::logging::{self, LogFormat, LogSettings};
///
/// logging::init(&LogSettings {
///     format: LogFormat::Json,
///     filter: "procattest_identity=debug,info".to_string(),
/// });
/// tracing::info!(service = "procattest-node", "service started");
/// ```
pub fn init(settings: &LogSettings) {
    let registry = tracing_subscriber::registry().with(settings.env_filter());

    match settings.format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init(),
    }
}
