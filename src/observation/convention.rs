//! Client request tag extraction.
//!
//! # Responsibilities
//! - Derive metric tags from a client request, its response status and its failure
//! - Extract custom tags from request attributes carrying the configured prefix
//! - Tolerate an absent request (observation started before the request exists)

use serde_json::Value;

use crate::client::ClientRequest;
use crate::config::{ObservationConfig, WebClientConfig};

/// Value used for tags whose source is not available.
pub const NONE_VALUE: &str = "none";

/// What is known about a call when tags are derived.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientRequestContext<'a> {
    pub request: Option<&'a ClientRequest>,
    pub status: Option<u16>,
    /// Bounded error kind, see `ClientError::kind`.
    pub error_kind: Option<&'static str>,
}

impl<'a> ClientRequestContext<'a> {
    /// Nothing materialized yet.
    pub fn unmaterialized() -> Self {
        Self::default()
    }

    pub fn request(request: &'a ClientRequest) -> Self {
        Self {
            request: Some(request),
            ..Self::default()
        }
    }
}

/// Tag naming for client request observations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequestConvention {
    client_name: String,
    custom_tag_prefix: String,
}

impl ClientRequestConvention {
    pub fn new(client_name: impl Into<String>, custom_tag_prefix: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            custom_tag_prefix: custom_tag_prefix.into(),
        }
    }

    pub fn from_config(client: &WebClientConfig, observation: &ObservationConfig) -> Self {
        Self::new(&client.name, &observation.custom_tag_prefix)
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn custom_tag_prefix(&self) -> &str {
        &self.custom_tag_prefix
    }

    /// One tag per attribute whose key starts with the prefix, prefix stripped.
    ///
    /// Empty when the request is absent. Keys equal to the bare prefix are skipped.
    pub fn custom_tags(&self, request: Option<&ClientRequest>) -> Vec<(String, String)> {
        let Some(request) = request else {
            return Vec::new();
        };
        request
            .attributes()
            .iter()
            .filter_map(|(key, value)| {
                let name = key.strip_prefix(self.custom_tag_prefix.as_str())?;
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), attribute_string(value)))
            })
            .collect()
    }

    pub fn host_tag(&self, request: Option<&ClientRequest>) -> (String, String) {
        let host = request
            .and_then(|r| r.url().host_str())
            .unwrap_or(NONE_VALUE);
        ("host".to_string(), host.to_string())
    }

    /// Metric-safe tags. Custom tags come last and override defaults with the same name.
    pub fn low_cardinality_tags(&self, context: &ClientRequestContext<'_>) -> Vec<(String, String)> {
        let request = context.request;
        let method = request.map_or(NONE_VALUE, |r| r.method().as_str());
        let uri = request
            .and_then(|r| r.template())
            .unwrap_or(NONE_VALUE);
        let status = match (context.status, context.error_kind) {
            (Some(code), _) => code.to_string(),
            (None, Some(_)) => "CLIENT_ERROR".to_string(),
            (None, None) => NONE_VALUE.to_string(),
        };

        let mut tags = vec![
            ("method".to_string(), method.to_string()),
            ("uri".to_string(), uri.to_string()),
            ("status".to_string(), status),
            ("outcome".to_string(), outcome(context.status).to_string()),
            (
                "exception".to_string(),
                context.error_kind.unwrap_or(NONE_VALUE).to_string(),
            ),
            ("client.name".to_string(), self.client_name.clone()),
            self.host_tag(request),
        ];
        tags.extend(self.custom_tags(request));
        tags
    }

    pub fn high_cardinality_tags(&self, context: &ClientRequestContext<'_>) -> Vec<(String, String)> {
        let url = context
            .request
            .map_or_else(|| NONE_VALUE.to_string(), |r| r.url().to_string());
        vec![("http.url".to_string(), url)]
    }
}

/// Outcome class of an HTTP status.
pub fn outcome(status: Option<u16>) -> &'static str {
    match status {
        Some(100..=199) => "INFORMATIONAL",
        Some(200..=299) => "SUCCESS",
        Some(300..=399) => "REDIRECTION",
        Some(400..=499) => "CLIENT_ERROR",
        Some(500..=599) => "SERVER_ERROR",
        _ => "UNKNOWN",
    }
}

fn attribute_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
