//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing with an EnvFilter; `RUST_LOG` overrides the configured level
//! - Client calls run inside a span carrying `trace_id` and `span_id`, so every
//!   event logged during a call is correlated regardless of the worker thread

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Filter directive used when `RUST_LOG` is unset.
pub fn default_directive(config: &ObservabilityConfig) -> String {
    format!("traced_webclient={},tower_http=info", config.log_level)
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(
    config: &ObservabilityConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive(config))),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
