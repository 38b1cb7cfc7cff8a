//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Build the pool, observation registry, client and metrics registrar in dependency order
//! - Start background tasks (pool sweeper, metrics endpoint)

use metrics_exporter_prometheus::{BuildError, PrometheusHandle};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::client::{ClientError, HttpConnection, HyperTransport, ObservedClient};
use crate::config::{validation::validate_config, ClientConfig, ConfigError};
use crate::lifecycle::Shutdown;
use crate::observability::{serve_metrics, PoolMetricsRegistrar};
use crate::observation::{LoggingHandler, MetricsHandler, ObservationRegistry};
use crate::pool::{spawn_sweeper, ConnectionPool};

/// The HTTP client as assembled at startup.
pub type HttpClient = ObservedClient<HyperTransport>;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid client configuration: {0}")]
    Client(#[from] ClientError),

    #[error("Failed to install metrics recorder: {0}")]
    Metrics(#[from] BuildError),

    #[error("Failed to bind metrics endpoint: {0}")]
    Bind(#[from] std::io::Error),
}

/// Every long-lived component, wired together.
pub struct Components {
    pub config: ClientConfig,
    pub pool: Arc<ConnectionPool<HttpConnection>>,
    pub registry: ObservationRegistry,
    pub client: Arc<HttpClient>,
    pub registrar: Arc<PoolMetricsRegistrar<HttpConnection>>,
}

impl Components {
    pub fn assemble(config: ClientConfig) -> Result<Self, StartupError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let pool = Arc::new(ConnectionPool::new(config.pool.clone()));

        let mut registry = ObservationRegistry::new().with_handler(Arc::new(LoggingHandler));
        if config.observability.metrics_enabled {
            registry = registry.with_handler(Arc::new(MetricsHandler));
        }

        let client = Arc::new(ObservedClient::from_config(
            &config,
            Arc::clone(&pool),
            HyperTransport::from_config(&config.client),
            registry.clone(),
        )?);
        let registrar = Arc::new(PoolMetricsRegistrar::new(
            Arc::clone(&pool),
            config.client.name.clone(),
        ));

        tracing::info!(
            client_name = %config.client.name,
            base_url = %config.client.base_url,
            max_connections = config.pool.max_connections_per_destination,
            pending_acquire_max_count = config.pool.pending_acquire_max_count,
            pending_acquire_timeout_ms = config.pool.pending_acquire_timeout_ms,
            "Components assembled"
        );

        Ok(Self {
            config,
            pool,
            registry,
            client,
            registrar,
        })
    }

    /// Start the pool sweeper, unless eviction is disabled.
    pub fn spawn_background(&self, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        self.config
            .pool
            .eviction_interval()
            .map(|interval| spawn_sweeper(Arc::clone(&self.pool), interval, shutdown.subscribe()))
            .into_iter()
            .collect()
    }

    /// Bind the configured metrics address and serve `/metrics` in the background.
    pub async fn spawn_metrics(
        &self,
        handle: PrometheusHandle,
        shutdown: &Shutdown,
    ) -> Result<JoinHandle<()>, StartupError> {
        let listener = TcpListener::bind(&self.config.observability.metrics_address).await?;
        let registrar = Arc::clone(&self.registrar);
        let rx = shutdown.subscribe();

        Ok(tokio::spawn(async move {
            if let Err(err) = serve_metrics(listener, registrar, handle, rx).await {
                tracing::error!(error = %err, "Metrics endpoint failed");
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn assembles_from_defaults() {
        let components = Components::assemble(ClientConfig::default()).unwrap();
        assert_eq!(components.registry.handler_count(), 2);
        assert_eq!(components.client.base_url().as_str(), "http://localhost:3000/");
        assert!(components.pool.destinations().is_empty());
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let mut config = ClientConfig::default();
        config.client.name.clear();
        config.observation.custom_tag_prefix.clear();

        match Components::assemble(config) {
            Err(StartupError::Config(ConfigError::Validation(errors))) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation errors, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn sweeper_respects_disabled_eviction() {
        let mut config = ClientConfig::default();
        config.pool.eviction_interval_ms = 0;
        let components = Components::assemble(config).unwrap();
        let shutdown = Shutdown::new();

        assert!(components.spawn_background(&shutdown).is_empty());
    }
}
