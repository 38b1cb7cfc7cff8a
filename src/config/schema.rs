//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the traced web client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Client identity and target settings.
    pub client: WebClientConfig,

    /// Connection pool limits and lifetimes.
    pub pool: PoolConfig,

    /// Observation naming and tag extraction.
    pub observation: ObservationConfig,

    /// Logging and metrics exposition.
    pub observability: ObservabilityConfig,
}

/// Client identity and transport settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebClientConfig {
    /// Name of the client. Used as the `client.name` tag and the
    /// `client_name` label on pool gauges.
    pub name: String,

    /// Base URL relative paths are resolved against.
    pub base_url: String,

    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Maximum response body buffered in memory, in bytes.
    pub max_in_memory_size: usize,
}

impl Default for WebClientConfig {
    fn default() -> Self {
        Self {
            name: "abc".to_string(),
            base_url: "http://localhost:3000".to_string(),
            connect_timeout_ms: 5_000,
            max_in_memory_size: 16 * 1024 * 1024, // 16MB
        }
    }
}

impl WebClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum connections (active + idle) per destination.
    pub max_connections_per_destination: usize,

    /// Idle connections unused for longer than this are evicted.
    pub max_idle_time_ms: u64,

    /// Connections older than this are evicted regardless of use.
    pub max_life_time_ms: u64,

    /// How long a pending acquire waits before failing. Zero disables queuing.
    pub pending_acquire_timeout_ms: u64,

    /// Maximum queued acquires per destination.
    pub pending_acquire_max_count: usize,

    /// Background eviction interval. Zero disables the sweeper.
    pub eviction_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections_per_destination: 50,
            max_idle_time_ms: 120_000, // 2 mins
            max_life_time_ms: 180_000, // 3 mins
            pending_acquire_timeout_ms: 15_000,
            pending_acquire_max_count: 1_500,
            eviction_interval_ms: 30_000,
        }
    }
}

impl PoolConfig {
    pub fn max_idle_time(&self) -> Duration {
        Duration::from_millis(self.max_idle_time_ms)
    }

    pub fn max_life_time(&self) -> Duration {
        Duration::from_millis(self.max_life_time_ms)
    }

    pub fn pending_acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.pending_acquire_timeout_ms)
    }

    /// Sweeper interval, `None` when background eviction is disabled.
    pub fn eviction_interval(&self) -> Option<Duration> {
        (self.eviction_interval_ms > 0).then(|| Duration::from_millis(self.eviction_interval_ms))
    }
}

/// Observation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservationConfig {
    /// Request attributes whose key starts with this marker become tags.
    pub custom_tag_prefix: String,

    /// Name of the observation recorded for each client call.
    pub name: String,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            custom_tag_prefix: "CUSTOM_TAG_PREFIX".to_string(),
            name: "http.client.requests".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
