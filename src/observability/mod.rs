//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, trace ids from the call span)
//!     → metrics.rs (pool gauges, observation histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → /metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Pool gauges are pulled from live pool state at scrape time, never counted separately
//! - Log level comes from RUST_LOG, falling back to the configured level

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use self::metrics::{install_recorder, serve_metrics, PoolMetricsRegistrar};
