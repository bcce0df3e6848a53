//! Tracing subscriber setup for hosts embedding the scanner.
//!
//! The runtime only emits `tracing` events; installing a subscriber is left to
//! the host. These helpers cover the common cases.

use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Registry};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Multi-line, human-readable.
    Pretty,

    /// One line per event.
    Compact,

    /// JSON lines.
    Json,
}

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level filter. `None` reads `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
    pub level: Option<tracing::Level>,

    pub format: TracingFormat,

    pub timestamps: bool,

    /// Include target module names.
    pub target: bool,

    /// Include thread names; camera work shows up as `scanner-render`.
    pub thread_names: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: TracingFormat::Compact,
            timestamps: true,
            target: true,
            thread_names: true,
        }
    }
}

impl TracingConfig {
    fn filter(&self) -> EnvFilter {
        match self.level {
            Some(level) => EnvFilter::new(level.to_string()),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        }
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(self.target)
            .with_thread_names(self.thread_names);

        match (self.format, self.timestamps) {
            (TracingFormat::Pretty, true) => layer.pretty().boxed(),
            (TracingFormat::Pretty, false) => layer.pretty().without_time().boxed(),
            (TracingFormat::Compact, true) => layer.compact().boxed(),
            (TracingFormat::Compact, false) => layer.compact().without_time().boxed(),
            (TracingFormat::Json, true) => layer.json().boxed(),
            (TracingFormat::Json, false) => layer.json().without_time().boxed(),
        }
    }
}

/// Install a subscriber with default settings.
///
/// # Example
///
/// ```ignore
/// scanner_host::tracing_support::init_subscriber()?;
/// ```
///
/// # Environment Variables
///
/// - `RUST_LOG=debug` - Enable debug logs
/// - `RUST_LOG=scanner_host=trace` - Include per-frame decoder traces
pub fn init_subscriber() -> Result<(), TryInitError> {
    init_subscriber_with_config(TracingConfig::default())
}

/// Install a subscriber built from `config`.
///
/// Fails if a global subscriber is already set.
pub fn init_subscriber_with_config(config: TracingConfig) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(config.layer())
        .with(config.filter())
        .try_init()
}
