//! Client call errors.

use std::time::Duration;
use thiserror::Error;

use crate::pool::{Destination, DestinationError, PoolError};

/// Failure of a send on an acquired connection.
///
/// The connection is discarded, never returned to the idle set.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Unsupported scheme '{0}', only http is supported")]
    UnsupportedScheme(String),

    #[error("Failed to connect to {destination}: {source}")]
    Connect {
        destination: Destination,
        #[source]
        source: std::io::Error,
    },

    #[error("Connecting to {destination} timed out after {timeout:?}")]
    ConnectTimeout {
        destination: Destination,
        timeout: Duration,
    },

    #[error("HTTP handshake with {destination} failed: {source}")]
    Handshake {
        destination: Destination,
        #[source]
        source: hyper::Error,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] axum::http::Error),

    #[error("Request failed: {0}")]
    Send(#[source] hyper::Error),

    #[error("Failed to read response body: {0}")]
    Body(#[source] axum::Error),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid destination: {0}")]
    Destination(#[from] DestinationError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ClientError {
    /// Bounded name of the failure, used as the `exception` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Url(_) => "InvalidUrl",
            ClientError::Destination(_) => "InvalidDestination",
            ClientError::Pool(PoolError::PoolExhausted { .. }) => "PoolExhausted",
            ClientError::Pool(PoolError::AcquireTimeout { .. }) => "AcquireTimeout",
            ClientError::Transport(_) => "TransportError",
        }
    }
}
