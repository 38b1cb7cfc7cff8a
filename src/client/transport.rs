//! Point-to-point transport over pooled connections.
//!
//! # Responsibilities
//! - Establish the transport handle for a leased connection on first use
//! - Send one request and buffer its response, bounded by the in-memory limit
//! - Forward the current observation as a W3C `traceparent` header
//!
//! # Design Decisions
//! - The pool owns connection bookkeeping; the transport only owns the I/O handle
//! - HTTP/1.1 only, one exchange at a time per connection
//! - Plain `http` only; other schemes fail before any I/O

use axum::body::Body;
use axum::http::{header, HeaderName, Request};
use futures_util::future::BoxFuture;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::net::TcpStream;
use url::Position;

use crate::client::error::TransportError;
use crate::client::request::{ClientRequest, ClientResponse};
use crate::config::WebClientConfig;
use crate::observation::current_observation;
use crate::pool::Destination;

const TRACEPARENT: HeaderName = HeaderName::from_static("traceparent");

/// Sends requests over a pooled connection's I/O handle.
///
/// `io` is `None` for a freshly opened pool connection; the transport fills
/// it in. A handle left in place is reused on the connection's next lease.
pub trait Transport: Send + Sync + 'static {
    type Io: Send + 'static;

    fn send<'a>(
        &'a self,
        io: &'a mut Option<Self::Io>,
        destination: &'a Destination,
        request: &'a ClientRequest,
    ) -> BoxFuture<'a, Result<ClientResponse, TransportError>>;
}

pub type HttpConnection = http1::SendRequest<Body>;

/// HTTP/1.1 transport on hyper's connection-level client.
#[derive(Debug, Clone)]
pub struct HyperTransport {
    connect_timeout: Duration,
    max_in_memory_size: usize,
}

impl HyperTransport {
    pub fn new(connect_timeout: Duration, max_in_memory_size: usize) -> Self {
        Self {
            connect_timeout,
            max_in_memory_size,
        }
    }

    pub fn from_config(config: &WebClientConfig) -> Self {
        Self::new(config.connect_timeout(), config.max_in_memory_size)
    }

    async fn connect(&self, destination: &Destination) -> Result<HttpConnection, TransportError> {
        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((destination.host(), destination.port())),
        )
        .await
        .map_err(|_| TransportError::ConnectTimeout {
            destination: destination.clone(),
            timeout: self.connect_timeout,
        })?
        .map_err(|source| TransportError::Connect {
            destination: destination.clone(),
            source,
        })?;
        let _ = stream.set_nodelay(true);

        let (sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|source| TransportError::Handshake {
                destination: destination.clone(),
                source,
            })?;

        let target = destination.clone();
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::debug!(destination = %target, error = %err, "Connection closed with error");
            }
        });

        tracing::debug!(destination = %destination, "Transport connection established");
        Ok(sender)
    }

    async fn exchange(
        &self,
        io: &mut Option<HttpConnection>,
        destination: &Destination,
        request: &ClientRequest,
    ) -> Result<ClientResponse, TransportError> {
        let scheme = request.url().scheme();
        if scheme != "http" {
            return Err(TransportError::UnsupportedScheme(scheme.to_string()));
        }

        let sender = match io.take() {
            Some(sender) if !sender.is_closed() => io.insert(sender),
            _ => io.insert(self.connect(destination).await?),
        };
        sender.ready().await.map_err(TransportError::Send)?;

        let response = sender
            .send_request(build_request(request)?)
            .await
            .map_err(TransportError::Send)?;

        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(Body::new(body), self.max_in_memory_size)
            .await
            .map_err(TransportError::Body)?;

        tracing::trace!(
            destination = %destination,
            status = %parts.status,
            bytes = body.len(),
            "Response received"
        );
        Ok(ClientResponse::new(parts.status, parts.headers, body))
    }
}

impl Transport for HyperTransport {
    type Io = HttpConnection;

    fn send<'a>(
        &'a self,
        io: &'a mut Option<Self::Io>,
        destination: &'a Destination,
        request: &'a ClientRequest,
    ) -> BoxFuture<'a, Result<ClientResponse, TransportError>> {
        Box::pin(self.exchange(io, destination, request))
    }
}

/// Origin-form request with `Host` and, inside an observation, `traceparent`.
fn build_request(request: &ClientRequest) -> Result<Request<Body>, TransportError> {
    let url = request.url();
    let host = &url[Position::BeforeHost..Position::AfterPort];

    let mut builder = Request::builder()
        .method(request.method().clone())
        .uri(&url[Position::BeforePath..Position::AfterQuery])
        .header(header::HOST, host);
    for (name, value) in request.headers() {
        builder = builder.header(name, value);
    }
    if let Some(observation) = current_observation() {
        builder = builder.header(TRACEPARENT, observation.traceparent());
    }

    Ok(builder.body(Body::from(request.payload().clone()))?)
}
