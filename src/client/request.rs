//! Outgoing request and response types.

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

use crate::pool::{Destination, DestinationError};

/// A request to send through the client.
///
/// Attributes are caller-supplied metadata that never go on the wire.
/// Attributes whose key carries the custom tag prefix become observation tags.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    method: Method,
    url: Url,
    uri_template: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    attributes: BTreeMap<String, Value>,
}

impl ClientRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            uri_template: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url, body: impl Into<Bytes>) -> Self {
        Self::new(Method::POST, url).body(body)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// The unexpanded path used for the `uri` tag, e.g. `/users/{id}`.
    pub fn uri_template(mut self, template: impl Into<String>) -> Self {
        self.uri_template = Some(template.into());
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn template(&self) -> Option<&str> {
        self.uri_template.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn payload(&self) -> &Bytes {
        &self.body
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn destination(&self) -> Result<Destination, DestinationError> {
        Destination::from_url(&self.url)
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ClientResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_builder() {
        let request = ClientRequest::post(Url::parse("http://Example.com:8080/echo").unwrap(), "hi")
            .uri_template("/echo")
            .attribute("CUSTOM_TAG_PREFIXregion", "us-east");

        assert_eq!(*request.method(), Method::POST);
        assert_eq!(request.payload().as_ref(), b"hi");
        assert_eq!(request.template(), Some("/echo"));
        assert_eq!(request.attributes().len(), 1);
        assert_eq!(request.destination().unwrap().to_string(), "example.com:8080");
    }

    #[test]
    fn destination_uses_scheme_default_port() {
        let request = ClientRequest::get(Url::parse("http://localhost/").unwrap());
        assert_eq!(request.destination().unwrap().port(), 80);
    }
}
