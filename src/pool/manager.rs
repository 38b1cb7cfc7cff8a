//! Connection pool management.
//!
//! # Responsibilities
//! - Partition connections by destination, one sub-pool each
//! - Hand out fresh idle connections, open new ones up to the limit
//! - Queue callers (bounded, FIFO, with deadline) when the limit is reached
//! - Provide leases that return or close their connection

use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::pool::connection::{Connection, ConnectionId};
use crate::pool::destination::Destination;
use crate::pool::error::PoolError;
use crate::pool::sub_pool::{lock, SubPool};
use crate::pool::waiter::{PendingAcquire, Waiter};
use crate::pool::PoolMetricsSnapshot;

/// Pools transport connections per destination.
///
/// There is no pool-wide lock: each destination's sub-pool has its own
/// mutex, held only while its connection set or waiter queue changes.
#[derive(Debug)]
pub struct ConnectionPool<T> {
    config: Arc<PoolConfig>,
    sub_pools: DashMap<Destination, Arc<Mutex<SubPool<T>>>>,
}

impl<T> ConnectionPool<T> {
    /// Create a new, empty pool.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config: Arc::new(config),
            sub_pools: DashMap::new(),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn sub_pool(&self, destination: &Destination) -> Arc<Mutex<SubPool<T>>> {
        if let Some(existing) = self.sub_pools.get(destination) {
            return Arc::clone(existing.value());
        }
        let entry = self.sub_pools.entry(destination.clone()).or_insert_with(|| {
            tracing::debug!(destination = %destination, "Creating sub-pool");
            Arc::new(Mutex::new(SubPool::new(
                destination.clone(),
                Arc::clone(&self.config),
            )))
        });
        Arc::clone(entry.value())
    }

    /// Acquire a connection to `destination`.
    ///
    /// Returns an idle connection if a fresh one exists, opens a new one if
    /// the destination is below its limit, and otherwise waits in line until
    /// a release grants one or the pending-acquire timeout passes.
    pub async fn acquire(&self, destination: &Destination) -> Result<PooledConnection<T>, PoolError> {
        let sub_pool = self.sub_pool(destination);
        let timeout = self.config.pending_acquire_timeout();

        let pending = {
            let mut pool = lock(&sub_pool);
            let now = Instant::now();

            if let Some(connection) = pool.take_idle(now) {
                tracing::trace!(
                    destination = %destination,
                    connection_id = %connection.id(),
                    "Reusing idle connection"
                );
                drop(pool);
                return Ok(PooledConnection::new(connection, sub_pool));
            }

            if pool.has_capacity() {
                let connection = pool.open_active(now);
                drop(pool);
                return Ok(PooledConnection::new(connection, sub_pool));
            }

            if timeout.is_zero() || pool.pending() >= self.config.pending_acquire_max_count {
                tracing::warn!(
                    destination = %destination,
                    pending = pool.pending(),
                    max_pending = self.config.pending_acquire_max_count,
                    "Connection pool exhausted"
                );
                return Err(PoolError::PoolExhausted {
                    destination: destination.clone(),
                    pending: pool.pending(),
                    max_pending: self.config.pending_acquire_max_count,
                    max_connections: self.config.max_connections_per_destination,
                });
            }

            let (waiter, rx) = Waiter::new(now, timeout);
            let pending =
                PendingAcquire::new(Arc::clone(&sub_pool), &waiter, destination.clone(), timeout, rx);
            pool.enqueue(waiter);
            tracing::debug!(
                destination = %destination,
                pending = pool.pending(),
                "No connection available, waiting"
            );
            pending
        };

        let connection = pending.wait().await?;
        Ok(PooledConnection::new(connection, sub_pool))
    }

    /// Close idle connections past their idle time or life time, across all destinations.
    /// Active connections are never touched. Destinations left with no
    /// connections and no users are forgotten.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let evicted: usize = self
            .all_sub_pools()
            .iter()
            .map(|sub_pool| lock(sub_pool).evict_expired(now))
            .sum();
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted expired idle connections");
        }
        self.remove_empty_sub_pools();
        evicted
    }

    // A sub-pool referenced only by the map has no lease, waiter or in-flight
    // acquire, and the shard write lock held by `retain` stops new lookups.
    fn remove_empty_sub_pools(&self) {
        let before = self.sub_pools.len();
        self.sub_pools.retain(|_, sub_pool| {
            Arc::strong_count(sub_pool) > 1 || lock(sub_pool).total() > 0
        });
        let removed = before.saturating_sub(self.sub_pools.len());
        if removed > 0 {
            tracing::debug!(removed, "Removed empty sub-pools");
        }
    }

    /// Live counts for one destination, `None` if it was never used.
    pub fn snapshot(&self, destination: &Destination) -> Option<PoolMetricsSnapshot> {
        let sub_pool = self.sub_pools.get(destination).map(|e| Arc::clone(e.value()))?;
        let snapshot = lock(&sub_pool).snapshot();
        Some(snapshot)
    }

    /// Live counts for every destination.
    pub fn snapshots(&self) -> Vec<(Destination, PoolMetricsSnapshot)> {
        let mut snapshots: Vec<_> = self
            .sub_pools
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|(destination, sub_pool)| (destination, lock(&sub_pool).snapshot()))
            .collect();
        snapshots.sort_by(|a, b| a.0.cmp(&b.0));
        snapshots
    }

    pub fn destinations(&self) -> Vec<Destination> {
        self.sub_pools.iter().map(|e| e.key().clone()).collect()
    }

    // Collected first so no map shard lock is held while a sub-pool is locked.
    fn all_sub_pools(&self) -> Vec<Arc<Mutex<SubPool<T>>>> {
        self.sub_pools.iter().map(|e| Arc::clone(e.value())).collect()
    }
}

/// A connection leased from the pool.
///
/// Call [`release`](Self::release) after a successful exchange to return it
/// for reuse, or [`discard`](Self::discard) after a transport failure.
/// Dropping the lease without either discards the connection, since its
/// stream may hold a half-finished exchange.
#[derive(Debug)]
pub struct PooledConnection<T> {
    connection: Option<Connection<T>>,
    sub_pool: Arc<Mutex<SubPool<T>>>,
}

impl<T> PooledConnection<T> {
    fn new(connection: Connection<T>, sub_pool: Arc<Mutex<SubPool<T>>>) -> Self {
        Self {
            connection: Some(connection),
            sub_pool,
        }
    }

    fn connection(&self) -> &Connection<T> {
        // Only `release`/`discard`/`drop` take the connection out, and they consume the lease.
        self.connection
            .as_ref()
            .expect("lease holds its connection until consumed")
    }

    pub fn id(&self) -> ConnectionId {
        self.connection().id()
    }

    pub fn destination(&self) -> &Destination {
        self.connection().destination()
    }

    pub fn created_at(&self) -> Instant {
        self.connection().created_at()
    }

    /// The transport handle slot. Empty until the transport establishes it.
    pub fn io_mut(&mut self) -> &mut Option<T> {
        self.connection
            .as_mut()
            .expect("lease holds its connection until consumed")
            .io_mut()
    }

    /// Return the connection to the pool for reuse.
    pub fn release(mut self) {
        if let Some(connection) = self.connection.take() {
            lock(&self.sub_pool).checkin(connection, Instant::now());
        }
    }

    /// Close the connection and free its slot.
    pub fn discard(mut self) {
        if let Some(connection) = self.connection.take() {
            lock(&self.sub_pool).discard(connection, Instant::now());
        }
    }
}

impl<T> Drop for PooledConnection<T> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            tracing::trace!(connection_id = %connection.id(), "Lease dropped without release");
            lock(&self.sub_pool).discard(connection, Instant::now());
        }
    }
}
