//! Observed client calls.
//!
//! # Responsibilities
//! - Start one observation per call, before anything can suspend
//! - Make it the current observation for every stage of the call
//! - Acquire a pooled connection, send, then release or discard it
//! - Record tags and any error, and stop the observation on every exit path
//!
//! # Data Flow
//! ```text
//! call(request)
//!     → registry.start (child of the caller's observation, if any)
//!     → ContextMap::scope + tracing span
//!         → pool.acquire(destination)
//!         → transport.send (traceparent from the current observation)
//!         → lease.release() | lease.discard()
//!     → final tags, error → StopGuard drop stops the observation
//! ```

use axum::body::Bytes;
use std::sync::Arc;
use tracing::Instrument;
use url::Url;

use crate::client::error::ClientError;
use crate::client::request::{ClientRequest, ClientResponse};
use crate::client::transport::Transport;
use crate::config::ClientConfig;
use crate::observation::{
    ClientRequestContext, ClientRequestConvention, ContextMap, Observation, ObservationRegistry,
    OBSERVATION_KEY,
};
use crate::pool::ConnectionPool;

/// HTTP client whose calls are pooled and observed.
pub struct ObservedClient<T: Transport> {
    pool: Arc<ConnectionPool<T::Io>>,
    transport: T,
    registry: ObservationRegistry,
    convention: ClientRequestConvention,
    observation_name: String,
    base_url: Url,
}

impl<T: Transport> ObservedClient<T> {
    pub fn from_config(
        config: &ClientConfig,
        pool: Arc<ConnectionPool<T::Io>>,
        transport: T,
        registry: ObservationRegistry,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            pool,
            transport,
            registry,
            convention: ClientRequestConvention::from_config(&config.client, &config.observation),
            observation_name: config.observation.name.clone(),
            base_url: Url::parse(&config.client.base_url)?,
        })
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<T::Io>> {
        &self.pool
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn convention(&self) -> &ClientRequestConvention {
        &self.convention
    }

    /// POST `body` to `path`, resolved against the base URL.
    pub async fn post(&self, path: &str, body: impl Into<Bytes>) -> Result<ClientResponse, ClientError> {
        let url = self.base_url.join(path)?;
        self.call(ClientRequest::post(url, body).uri_template(path))
            .await
    }

    /// Send `request` under a new observation.
    ///
    /// The observation is stopped exactly once, including when this future
    /// is dropped before completion.
    pub async fn call(&self, request: ClientRequest) -> Result<ClientResponse, ClientError> {
        let observation = self.registry.start(&self.observation_name);
        let _stop = observation.stop_guard();
        self.record_tags(&observation, &ClientRequestContext::unmaterialized());

        let span = observation.span();
        let result = ContextMap::current()
            .with(&OBSERVATION_KEY, observation.clone())
            .scope(self.exchange(&observation, &request))
            .instrument(span)
            .await;

        let context = match &result {
            Ok(response) => ClientRequestContext {
                request: Some(&request),
                status: Some(response.status().as_u16()),
                error_kind: None,
            },
            Err(err) => ClientRequestContext {
                request: Some(&request),
                status: None,
                error_kind: Some(err.kind()),
            },
        };
        self.record_tags(&observation, &context);
        if let Err(err) = &result {
            if let Err(stopped) = observation.error(err) {
                tracing::debug!(error = %stopped, "Could not record call error");
            }
        }
        result
    }

    async fn exchange(
        &self,
        observation: &Observation,
        request: &ClientRequest,
    ) -> Result<ClientResponse, ClientError> {
        let destination = request.destination()?;
        let mut lease = self.pool.acquire(&destination).await?;
        if let Err(err) = observation.event("connection.acquired") {
            tracing::debug!(error = %err, "Dropped event for stopped observation");
        }
        self.record_tags(observation, &ClientRequestContext::request(request));

        tracing::debug!(
            destination = %destination,
            connection_id = %lease.id(),
            method = %request.method(),
            "Sending request"
        );
        match self.transport.send(lease.io_mut(), &destination, request).await {
            Ok(response) => {
                lease.release();
                Ok(response)
            }
            Err(err) => {
                tracing::warn!(
                    destination = %destination,
                    connection_id = %lease.id(),
                    error = %err,
                    "Transport failed, discarding connection"
                );
                lease.discard();
                Err(err.into())
            }
        }
    }

    fn record_tags(&self, observation: &Observation, context: &ClientRequestContext<'_>) {
        let low = self.convention.low_cardinality_tags(context);
        let high = self.convention.high_cardinality_tags(context);
        let written = low
            .into_iter()
            .try_for_each(|(key, value)| observation.low_cardinality_tag(key, value))
            .and_then(|()| {
                high.into_iter()
                    .try_for_each(|(key, value)| observation.high_cardinality_tag(key, value))
            });
        if let Err(err) = written {
            tracing::debug!(error = %err, "Dropped tags for stopped observation");
        }
    }
}
