//! Metrics collection and exposition.
//!
//! # Metrics
//! - `connection_pool.total` (gauge): active plus idle connections
//! - `connection_pool.active` (gauge): connections handed out
//! - `connection_pool.idle` (gauge): parked connections
//! - `connection_pool.pending` (gauge): queued acquires
//! - `<observation name>` (histogram): call duration, labelled by low-cardinality tags
//!
//! Pool gauges carry `destination` and `client_name` labels and are set
//! from live pool state by [`PoolMetricsRegistrar::export`], which the
//! `/metrics` handler calls right before rendering.

use axum::{extract::State, routing::get, Router};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::pool::{ConnectionPool, Destination, PoolMetricsSnapshot};

pub const POOL_TOTAL: &str = "connection_pool.total";
pub const POOL_ACTIVE: &str = "connection_pool.active";
pub const POOL_IDLE: &str = "connection_pool.idle";
pub const POOL_PENDING: &str = "connection_pool.pending";

/// Publishes pool state as gauges. Holds no counters of its own.
pub struct PoolMetricsRegistrar<T> {
    pool: Arc<ConnectionPool<T>>,
    client_name: String,
}

impl<T> PoolMetricsRegistrar<T> {
    pub fn new(pool: Arc<ConnectionPool<T>>, client_name: impl Into<String>) -> Self {
        Self {
            pool,
            client_name: client_name.into(),
        }
    }

    /// Register gauge descriptions with the installed recorder.
    pub fn describe() {
        metrics::describe_gauge!(POOL_TOTAL, "The number of all connections, active or idle.");
        metrics::describe_gauge!(
            POOL_ACTIVE,
            "The number of the connections that have been successfully acquired and are in active use"
        );
        metrics::describe_gauge!(POOL_IDLE, "The number of the idle connections");
        metrics::describe_gauge!(
            POOL_PENDING,
            "The number of the request, that are pending acquire a connection"
        );
    }

    /// Read every destination's live counts and set the gauges.
    pub fn export(&self) {
        for (destination, snapshot) in self.pool.snapshots() {
            self.set_gauges(&destination, &snapshot);
        }
    }

    pub fn snapshots(&self) -> Vec<(Destination, PoolMetricsSnapshot)> {
        self.pool.snapshots()
    }

    fn set_gauges(&self, destination: &Destination, snapshot: &PoolMetricsSnapshot) {
        let destination = destination.to_string();
        for (name, value) in [
            (POOL_TOTAL, snapshot.total),
            (POOL_ACTIVE, snapshot.active),
            (POOL_IDLE, snapshot.idle),
            (POOL_PENDING, snapshot.pending),
        ] {
            metrics::gauge!(
                name,
                "destination" => destination.clone(),
                "client_name" => self.client_name.clone()
            )
            .set(value as f64);
        }
    }
}

/// Install the Prometheus recorder globally and describe the pool gauges.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    PoolMetricsRegistrar::<()>::describe();
    Ok(handle)
}

struct MetricsState<T> {
    registrar: Arc<PoolMetricsRegistrar<T>>,
    handle: PrometheusHandle,
}

impl<T> Clone for MetricsState<T> {
    fn clone(&self) -> Self {
        Self {
            registrar: Arc::clone(&self.registrar),
            handle: self.handle.clone(),
        }
    }
}

async fn render_metrics<T: Send + 'static>(State(state): State<MetricsState<T>>) -> String {
    state.registrar.export();
    state.handle.render()
}

/// Serve `GET /metrics` until the shutdown signal fires.
pub async fn serve_metrics<T: Send + 'static>(
    listener: TcpListener,
    registrar: Arc<PoolMetricsRegistrar<T>>,
    handle: PrometheusHandle,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let app = Router::new()
        .route("/metrics", get(render_metrics::<T>))
        .with_state(MetricsState { registrar, handle })
        .layer(TraceLayer::new_for_http());

    tracing::info!(address = ?listener.local_addr().ok(), "Metrics endpoint starting");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    tracing::info!("Metrics endpoint stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;

    fn gauge(rendered: &str, name: &str) -> Option<f64> {
        rendered
            .lines()
            .filter(|line| line.starts_with(&format!("{name}{{")))
            .find(|line| {
                line.contains("destination=\"localhost:3000\"") && line.contains("client_name=\"abc\"")
            })
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|value| value.parse().ok())
    }

    #[tokio::test]
    async fn export_reflects_live_pool_state() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let pool = Arc::new(ConnectionPool::<()>::new(PoolConfig::default()));
        let registrar = PoolMetricsRegistrar::new(pool.clone(), "abc");
        let destination = Destination::new("localhost", 3000);

        let held = pool.acquire(&destination).await.unwrap();
        pool.acquire(&destination).await.unwrap().release();

        metrics::with_local_recorder(&recorder, || registrar.export());
        let rendered = handle.render();
        assert_eq!(gauge(&rendered, "connection_pool_total"), Some(2.0));
        assert_eq!(gauge(&rendered, "connection_pool_active"), Some(1.0));
        assert_eq!(gauge(&rendered, "connection_pool_idle"), Some(1.0));
        assert_eq!(gauge(&rendered, "connection_pool_pending"), Some(0.0));

        held.release();
        metrics::with_local_recorder(&recorder, || registrar.export());
        let rendered = handle.render();
        assert_eq!(gauge(&rendered, "connection_pool_active"), Some(0.0));
        assert_eq!(gauge(&rendered, "connection_pool_idle"), Some(2.0));
    }

    #[tokio::test]
    async fn snapshots_match_pool() {
        let pool = Arc::new(ConnectionPool::<()>::new(PoolConfig::default()));
        let registrar = PoolMetricsRegistrar::new(pool.clone(), "abc");
        let destination = Destination::new("localhost", 3000);
        let _held = pool.acquire(&destination).await.unwrap();

        assert_eq!(registrar.snapshots(), pool.snapshots());
    }
}
