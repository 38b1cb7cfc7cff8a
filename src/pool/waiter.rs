//! Queued acquire requests.
//!
//! A waiter is resolved exactly once: a release hands it a connection
//! through its oneshot sender, or its deadline passes. Both outcomes are
//! decided under the sub-pool lock, so exactly one of them wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::pool::connection::Connection;
use crate::pool::destination::Destination;
use crate::pool::error::PoolError;
use crate::pool::sub_pool::{lock, SubPool};

static WAITER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct WaiterId(u64);

impl WaiterId {
    fn new() -> Self {
        Self(WAITER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A queued request for a connection.
#[derive(Debug)]
pub(crate) struct Waiter<T> {
    pub(crate) id: WaiterId,
    pub(crate) requested_at: Instant,
    pub(crate) deadline: Instant,
    pub(crate) tx: oneshot::Sender<Connection<T>>,
}

impl<T> Waiter<T> {
    pub(crate) fn new(
        requested_at: Instant,
        timeout: Duration,
    ) -> (Self, oneshot::Receiver<Connection<T>>) {
        let (tx, rx) = oneshot::channel();
        let waiter = Self {
            id: WaiterId::new(),
            requested_at,
            deadline: requested_at + timeout,
            tx,
        };
        (waiter, rx)
    }
}

/// The caller's side of a queued acquire.
///
/// Dropping it before it resolves (cancellation) removes the waiter from
/// the queue. If a release already granted it a connection, that
/// connection goes back to the pool.
pub(crate) struct PendingAcquire<T> {
    sub_pool: Arc<Mutex<SubPool<T>>>,
    id: WaiterId,
    deadline: Instant,
    destination: Destination,
    timeout: Duration,
    rx: Option<oneshot::Receiver<Connection<T>>>,
}

impl<T> PendingAcquire<T> {
    pub(crate) fn new(
        sub_pool: Arc<Mutex<SubPool<T>>>,
        waiter: &Waiter<T>,
        destination: Destination,
        timeout: Duration,
        rx: oneshot::Receiver<Connection<T>>,
    ) -> Self {
        Self {
            sub_pool,
            id: waiter.id,
            deadline: waiter.deadline,
            destination,
            timeout,
            rx: Some(rx),
        }
    }

    /// Wait for a grant or for the deadline, whichever comes first.
    pub(crate) async fn wait(mut self) -> Result<Connection<T>, PoolError> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(self.timed_out());
        };

        let granted = match tokio::time::timeout_at(self.deadline, rx).await {
            Ok(Ok(connection)) => Some(connection),
            // The sender was dropped because the deadline passed before a release reached us.
            Ok(Err(_)) => None,
            Err(_elapsed) => {
                let mut pool = lock(&self.sub_pool);
                if pool.remove_waiter(self.id) {
                    None
                } else {
                    // A release granted us under the lock before the timer got there.
                    self.rx.as_mut().and_then(|rx| rx.try_recv().ok())
                }
            }
        };
        self.rx = None;

        match granted {
            Some(connection) => Ok(connection),
            None => {
                tracing::warn!(
                    destination = %self.destination,
                    timeout = ?self.timeout,
                    "Pending acquire timed out"
                );
                Err(self.timed_out())
            }
        }
    }

    fn timed_out(&self) -> PoolError {
        PoolError::AcquireTimeout {
            destination: self.destination.clone(),
            timeout: self.timeout,
        }
    }
}

impl<T> Drop for PendingAcquire<T> {
    fn drop(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };

        let mut pool = lock(&self.sub_pool);
        if pool.remove_waiter(self.id) {
            tracing::trace!(destination = %self.destination, "Pending acquire cancelled");
            return;
        }
        if let Ok(connection) = rx.try_recv() {
            tracing::trace!(
                destination = %self.destination,
                connection_id = %connection.id(),
                "Pending acquire cancelled after grant, returning connection"
            );
            pool.checkin(connection, Instant::now());
        }
    }
}
