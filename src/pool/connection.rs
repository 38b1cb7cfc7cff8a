//! Pooled connection state machine.
//!
//! # Responsibilities
//! - Track connection state (Idle ⇄ Active → Closed)
//! - Generate unique connection IDs for tracing
//! - Decide freshness against max idle time and max life time
//!
//! The transport handle (`io`) is opaque to the pool; it is established by
//! the transport on first use and dropped when the connection closes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::pool::destination::Destination;

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Parked in the pool, available for acquisition.
    Idle,
    /// Handed out to a caller.
    Active,
    /// Evicted or discarded. Terminal.
    Closed,
}

/// Why a connection is no longer fit for reuse.
///
/// Internal to the pool: it triggers eviction and is logged, but never
/// surfaces as a call failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionLifetimeExpired {
    #[error("idle for {idle:?}, max idle time is {max:?}")]
    IdleTime { idle: Duration, max: Duration },

    #[error("open for {age:?}, max life time is {max:?}")]
    LifeTime { age: Duration, max: Duration },
}

/// A transport connection owned by the pool.
#[derive(Debug)]
pub struct Connection<T> {
    id: ConnectionId,
    destination: Destination,
    state: ConnectionState,
    created_at: Instant,
    last_acquired_at: Instant,
    io: Option<T>,
}

impl<T> Connection<T> {
    /// A new, idle connection with no transport handle yet.
    pub(crate) fn open(destination: Destination, now: Instant) -> Self {
        let connection = Self {
            id: ConnectionId::new(),
            destination,
            state: ConnectionState::Idle,
            created_at: now,
            last_acquired_at: now,
            io: None,
        };
        tracing::trace!(
            connection_id = %connection.id,
            destination = %connection.destination,
            "Connection opened"
        );
        connection
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_acquired_at(&self) -> Instant {
        self.last_acquired_at
    }

    pub(crate) fn io_mut(&mut self) -> &mut Option<T> {
        &mut self.io
    }

    /// Check the life time limit, and the idle time limit if the connection is idle.
    pub(crate) fn check_fresh(
        &self,
        now: Instant,
        config: &PoolConfig,
    ) -> Result<(), ConnectionLifetimeExpired> {
        let age = now.saturating_duration_since(self.created_at);
        if age > config.max_life_time() {
            return Err(ConnectionLifetimeExpired::LifeTime {
                age,
                max: config.max_life_time(),
            });
        }

        if self.state == ConnectionState::Idle {
            let idle = now.saturating_duration_since(self.last_acquired_at);
            if idle > config.max_idle_time() {
                return Err(ConnectionLifetimeExpired::IdleTime {
                    idle,
                    max: config.max_idle_time(),
                });
            }
        }
        Ok(())
    }

    /// Idle → Active.
    pub(crate) fn activate(&mut self, now: Instant) {
        self.state = ConnectionState::Active;
        self.last_acquired_at = now;
    }

    /// Active → Idle. Idle time is measured from here.
    pub(crate) fn park(&mut self, now: Instant) {
        self.state = ConnectionState::Idle;
        self.last_acquired_at = now;
    }

    /// Any → Closed. Drops the transport handle.
    pub(crate) fn close(&mut self, reason: &dyn fmt::Display) {
        self.state = ConnectionState::Closed;
        self.io = None;
        tracing::debug!(
            connection_id = %self.id,
            destination = %self.destination,
            reason = %reason,
            "Connection closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(idle_ms: u64, life_ms: u64) -> PoolConfig {
        PoolConfig {
            max_idle_time_ms: idle_ms,
            max_life_time_ms: life_ms,
            ..PoolConfig::default()
        }
    }

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("conn-"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_only_applies_to_idle_connections() {
        let config = config(50, 1_000);
        let mut conn: Connection<()> = Connection::open(Destination::new("host", 1), Instant::now());
        conn.activate(Instant::now());

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(conn.check_fresh(Instant::now(), &config).is_ok());

        conn.park(Instant::now());
        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(matches!(
            conn.check_fresh(Instant::now(), &config),
            Err(ConnectionLifetimeExpired::IdleTime { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn life_time_applies_even_when_recently_used() {
        let config = config(1_000, 100);
        let mut conn: Connection<()> = Connection::open(Destination::new("host", 1), Instant::now());

        tokio::time::advance(Duration::from_millis(90)).await;
        conn.park(Instant::now());
        tokio::time::advance(Duration::from_millis(20)).await;

        assert!(matches!(
            conn.check_fresh(Instant::now(), &config),
            Err(ConnectionLifetimeExpired::LifeTime { .. })
        ));
    }

    #[test]
    fn close_drops_io() {
        let mut conn = Connection::open(Destination::new("host", 1), Instant::now());
        *conn.io_mut() = Some(7u8);
        conn.close(&"test");
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.io_mut().is_none());
    }
}
