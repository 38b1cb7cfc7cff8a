//! Connection pooling subsystem.
//!
//! # Data Flow
//! ```text
//! acquire(destination)
//!     → manager.rs (look up or create the destination's sub-pool)
//!     → sub_pool.rs (evict stale idle, reuse fresh idle, or open new)
//!     → waiter.rs (queue FIFO with deadline when at the limit)
//!     → PooledConnection lease
//!
//! release / discard
//!     → sub_pool.rs (close if past life time, else grant to head waiter or park idle)
//!
//! sweeper.rs periodically evicts idle connections past their limits
//! ```
//!
//! # Design Decisions
//! - One mutex per destination; no pool-wide lock
//! - The pool owns connection state; callers only hold leases
//! - Grant and timeout for a waiter are decided under the same lock, so exactly one wins
//! - Metrics are computed from live state on read, never cached

pub mod connection;
pub mod destination;
pub mod error;
pub mod manager;
pub mod sweeper;

mod sub_pool;
mod waiter;

use serde::Serialize;

pub use connection::{Connection, ConnectionId, ConnectionLifetimeExpired, ConnectionState};
pub use destination::{Destination, DestinationError};
pub use error::PoolError;
pub use manager::{ConnectionPool, PooledConnection};
pub use sweeper::spawn_sweeper;

/// Point-in-time counts for one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolMetricsSnapshot {
    /// Active plus idle connections.
    pub total: usize,
    pub active: usize,
    pub idle: usize,
    /// Queued acquires.
    pub pending: usize,
}
