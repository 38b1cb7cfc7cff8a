//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, sizes > 0)
//! - Check that addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Zero pool capacity and zero pending timeout are legal settings

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::ClientConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("client.name must not be empty")]
    EmptyClientName,

    #[error("client.base_url '{0}' is not a valid URL")]
    InvalidBaseUrl(String),

    #[error("client.base_url '{0}' must use the http scheme")]
    UnsupportedScheme(String),

    #[error("client.connect_timeout_ms must be greater than zero")]
    ZeroConnectTimeout,

    #[error("client.max_in_memory_size must be greater than zero")]
    ZeroBodyLimit,

    #[error("observation.custom_tag_prefix must not be empty")]
    EmptyTagPrefix,

    #[error("observation.name must not be empty")]
    EmptyObservationName,

    #[error("observability.log_level '{0}' is not one of trace, debug, info, warn, error")]
    UnknownLogLevel(String),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.client.name.trim().is_empty() {
        errors.push(ValidationError::EmptyClientName);
    }

    match Url::parse(&config.client.base_url) {
        Ok(url) if url.scheme() != "http" => {
            errors.push(ValidationError::UnsupportedScheme(config.client.base_url.clone()));
        }
        Ok(url) if url.host_str().is_none() => {
            errors.push(ValidationError::InvalidBaseUrl(config.client.base_url.clone()));
        }
        Ok(_) => {}
        Err(_) => errors.push(ValidationError::InvalidBaseUrl(config.client.base_url.clone())),
    }

    if config.client.connect_timeout_ms == 0 {
        errors.push(ValidationError::ZeroConnectTimeout);
    }
    if config.client.max_in_memory_size == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if config.observation.custom_tag_prefix.is_empty() {
        errors.push(ValidationError::EmptyTagPrefix);
    }
    if config.observation.name.trim().is_empty() {
        errors.push(ValidationError::EmptyObservationName);
    }

    let level = config.observability.log_level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::UnknownLogLevel(config.observability.log_level.clone()));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
