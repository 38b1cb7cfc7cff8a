//! Background eviction of expired idle connections.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::pool::ConnectionPool;

/// Periodically evict idle connections past their idle time or life time,
/// until the shutdown signal fires.
pub fn spawn_sweeper<T>(
    pool: Arc<ConnectionPool<T>>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()>
where
    T: Send + 'static,
{
    tokio::spawn(async move {
        tracing::info!(interval = ?interval, "Pool sweeper starting");

        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    pool.evict_expired();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Pool sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::lifecycle::Shutdown;
    use crate::pool::Destination;

    #[tokio::test(start_paused = true)]
    async fn sweeps_idle_connections_until_shutdown() {
        let pool = Arc::new(ConnectionPool::<()>::new(PoolConfig {
            max_idle_time_ms: 50,
            ..PoolConfig::default()
        }));
        let destination = Destination::new("host", 1);
        pool.acquire(&destination).await.unwrap().release();

        let shutdown = Shutdown::new();
        let handle = spawn_sweeper(pool.clone(), Duration::from_millis(20), shutdown.subscribe());

        time::sleep(Duration::from_millis(100)).await;
        // Emptied destinations are dropped from the pool altogether.
        assert!(pool.snapshot(&destination).is_none());

        shutdown.trigger();
        handle.await.unwrap();
    }
}
