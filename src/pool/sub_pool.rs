//! Per-destination connection set and waiter queue.
//!
//! Every method here runs inside the sub-pool's critical section; the
//! manager takes the lock, calls one of these, and releases it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::pool::connection::Connection;
use crate::pool::destination::Destination;
use crate::pool::waiter::{Waiter, WaiterId};
use crate::pool::PoolMetricsSnapshot;

/// Lock a sub-pool. A panic while holding the lock cannot leave the
/// collections half-updated, so a poisoned lock is still usable.
pub(crate) fn lock<T>(sub_pool: &Mutex<SubPool<T>>) -> MutexGuard<'_, SubPool<T>> {
    sub_pool.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub(crate) struct SubPool<T> {
    destination: Destination,
    config: Arc<PoolConfig>,
    /// Parked connections, least recently released first.
    idle: VecDeque<Connection<T>>,
    /// Connections currently handed out.
    active: usize,
    /// FIFO: earliest request first.
    waiters: VecDeque<Waiter<T>>,
}

impl<T> SubPool<T> {
    pub(crate) fn new(destination: Destination, config: Arc<PoolConfig>) -> Self {
        Self {
            destination,
            config,
            idle: VecDeque::new(),
            active: 0,
            waiters: VecDeque::new(),
        }
    }

    pub(crate) fn total(&self) -> usize {
        self.idle.len() + self.active
    }

    pub(crate) fn pending(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn has_capacity(&self) -> bool {
        self.total() < self.config.max_connections_per_destination
    }

    pub(crate) fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            total: self.total(),
            active: self.active,
            idle: self.idle.len(),
            pending: self.waiters.len(),
        }
    }

    /// Close every idle connection past its idle time or life time.
    pub(crate) fn evict_expired(&mut self, now: Instant) -> usize {
        let config = Arc::clone(&self.config);
        let before = self.idle.len();
        self.idle.retain_mut(|connection| match connection.check_fresh(now, &config) {
            Ok(()) => true,
            Err(reason) => {
                connection.close(&reason);
                false
            }
        });
        before - self.idle.len()
    }

    /// Take a fresh idle connection, evicting stale ones on the way.
    pub(crate) fn take_idle(&mut self, now: Instant) -> Option<Connection<T>> {
        self.evict_expired(now);
        let mut connection = self.idle.pop_front()?;
        connection.activate(now);
        self.active += 1;
        Some(connection)
    }

    /// Open a new connection straight into the active set. Caller checks capacity.
    pub(crate) fn open_active(&mut self, now: Instant) -> Connection<T> {
        let mut connection = Connection::open(self.destination.clone(), now);
        connection.activate(now);
        self.active += 1;
        connection
    }

    pub(crate) fn enqueue(&mut self, waiter: Waiter<T>) {
        self.waiters.push_back(waiter);
    }

    /// Remove a waiter. Returns false if it was already resolved.
    pub(crate) fn remove_waiter(&mut self, id: WaiterId) -> bool {
        match self.waiters.iter().position(|w| w.id == id) {
            Some(index) => {
                self.waiters.remove(index);
                true
            }
            None => false,
        }
    }

    /// Return a connection from a caller.
    ///
    /// Connections past their life time are closed; otherwise the connection
    /// goes to the head waiter, or back to the idle set if nobody waits.
    pub(crate) fn checkin(&mut self, mut connection: Connection<T>, now: Instant) {
        self.active = self.active.saturating_sub(1);

        if let Err(reason) = connection.check_fresh(now, &self.config) {
            connection.close(&reason);
            self.replace_for_waiter(now);
            return;
        }

        connection.park(now);
        if let Some(connection) = self.hand_off(connection, now) {
            self.idle.push_back(connection);
        }
    }

    /// Close a connection a caller could not use (transport failure, abandoned lease).
    pub(crate) fn discard(&mut self, mut connection: Connection<T>, now: Instant) {
        self.active = self.active.saturating_sub(1);
        connection.close(&"discarded");
        self.replace_for_waiter(now);
    }

    /// A slot was freed by closing a connection; serve the head waiter with a new one.
    fn replace_for_waiter(&mut self, now: Instant) {
        if self.waiters.is_empty() || !self.has_capacity() {
            return;
        }
        let connection = Connection::open(self.destination.clone(), now);
        if let Some(connection) = self.hand_off(connection, now) {
            self.idle.push_back(connection);
        }
    }

    /// Grant an idle connection to the earliest live waiter.
    ///
    /// Waiters past their deadline are dropped, which resolves them as timed
    /// out. Returns the connection if no waiter took it.
    fn hand_off(&mut self, mut connection: Connection<T>, now: Instant) -> Option<Connection<T>> {
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.deadline <= now {
                tracing::trace!(destination = %self.destination, "Dropping expired waiter");
                continue;
            }

            connection.activate(now);
            self.active += 1;
            let waited = now.saturating_duration_since(waiter.requested_at);
            let id = connection.id();
            match waiter.tx.send(connection) {
                Ok(()) => {
                    tracing::trace!(
                        destination = %self.destination,
                        connection_id = %id,
                        waited = ?waited,
                        "Connection granted to waiter"
                    );
                    return None;
                }
                Err(mut returned) => {
                    self.active -= 1;
                    returned.park(now);
                    connection = returned;
                }
            }
        }
        Some(connection)
    }
}
