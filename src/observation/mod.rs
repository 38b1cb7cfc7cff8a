//! Observation subsystem.
//!
//! # Data Flow
//! ```text
//! ObservationRegistry::start(name)
//!     → propagation.rs (parent = current observation, if any)
//!     → context.rs (Observation, handlers notified on start)
//!
//! client call
//!     → convention.rs (request tags, custom tags from attributes)
//!     → ContextMap::scope (observation readable by every stage of the call)
//!     → StopGuard drop (handlers notified on stop, exactly once)
//! ```
//!
//! # Design Decisions
//! - Context travels in an explicit task-scoped store, not thread-local state
//! - Handlers are registered explicitly on the registry, no global lookup
//! - Low-cardinality tags feed metrics; high-cardinality tags only feed logs

pub mod context;
pub mod convention;
pub mod ids;
pub mod propagation;
pub mod registry;

pub use context::{
    Observation, ObservationError, ObservationEvent, ObservationSnapshot, ObservationState,
    StopGuard,
};
pub use convention::{ClientRequestContext, ClientRequestConvention, NONE_VALUE};
pub use ids::{SpanId, TraceId};
pub use propagation::{current_observation, ContextKey, ContextMap, OBSERVATION_KEY};
pub use registry::{LoggingHandler, MetricsHandler, ObservationHandler, ObservationRegistry};
