//! Errors returned by `ConnectionPool::acquire`.

use std::time::Duration;
use thiserror::Error;

use crate::pool::destination::Destination;

/// Pool-level acquisition failures. Neither is retried by the pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// No free connection, no room to open one and no room to queue.
    #[error(
        "connection pool for {destination} exhausted: {pending} pending acquires \
         (max {max_pending}), {max_connections} connections"
    )]
    PoolExhausted {
        destination: Destination,
        pending: usize,
        max_pending: usize,
        max_connections: usize,
    },

    /// Queued, but no connection was granted before the deadline.
    #[error("timed out after {timeout:?} waiting for a connection to {destination}")]
    AcquireTimeout {
        destination: Destination,
        timeout: Duration,
    },
}
