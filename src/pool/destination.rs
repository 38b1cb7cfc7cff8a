//! Remote address a pool partition targets.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::{Host, Url};

/// Errors turning a URL or string into a destination.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DestinationError {
    #[error("'{0}' has no host")]
    MissingHost(String),

    #[error("'{0}' has no port and no known default for its scheme")]
    MissingPort(String),

    #[error("'{0}' has an invalid port")]
    InvalidPort(String),
}

/// A host and port pair. Sub-pools are keyed by destination.
///
/// IPv6 literals are stored without brackets so the host can be handed to
/// the resolver as is; `Display` adds them back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Destination {
    host: String,
    port: u16,
}

impl Destination {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let host = match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            Some(unbracketed) => unbracketed.to_lowercase(),
            None => host.to_lowercase(),
        };
        Self { host, port }
    }

    /// Destination addressed by a URL, using the scheme's default port if none is given.
    pub fn from_url(url: &Url) -> Result<Self, DestinationError> {
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(DestinationError::MissingHost(url.to_string())),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| DestinationError::MissingPort(url.to_string()))?;
        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Destination {
    type Err = DestinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| DestinationError::MissingPort(s.to_string()))?;
        if host.is_empty() {
            return Err(DestinationError::MissingHost(s.to_string()));
        }
        let port = port
            .parse()
            .map_err(|_| DestinationError::InvalidPort(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}
