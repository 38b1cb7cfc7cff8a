//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::HeaderMap,
    routing::post,
    Router,
};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

use traced_webclient::client::{HyperTransport, ObservedClient};
use traced_webclient::config::ClientConfig;
use traced_webclient::observation::{ObservationHandler, ObservationRegistry, ObservationSnapshot};
use traced_webclient::pool::ConnectionPool;

/// What the echo backend observed.
#[derive(Default)]
pub struct Seen {
    pub peers: Mutex<HashSet<SocketAddr>>,
    pub traceparents: Mutex<Vec<String>>,
}

#[derive(Clone)]
struct EchoState {
    seen: Arc<Seen>,
}

async fn echo(
    State(state): State<EchoState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Bytes {
    state.seen.peers.lock().unwrap().insert(peer);
    if let Some(value) = headers.get("traceparent").and_then(|v| v.to_str().ok()) {
        state.seen.traceparents.lock().unwrap().push(value.to_string());
    }
    body
}

async fn slow(body: Bytes) -> Bytes {
    tokio::time::sleep(Duration::from_secs(5)).await;
    body
}

/// Start an echo backend on an ephemeral port. `POST /echo` returns the
/// request body, `POST /slow` does the same after five seconds.
pub async fn start_echo_backend() -> (SocketAddr, Arc<Seen>) {
    start_echo_backend_on("127.0.0.1:0").await
}

/// Like [`start_echo_backend`], bound to `bind`.
pub async fn start_echo_backend_on(bind: &str) -> (SocketAddr, Arc<Seen>) {
    let listener = TcpListener::bind(bind).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Seen::default());

    let app = Router::new()
        .route("/echo", post(echo))
        .route("/slow", post(slow))
        .with_state(EchoState { seen: seen.clone() });

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    (addr, seen)
}

/// Start a backend that reads the request and closes without answering.
pub async fn start_closing_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
            });
        }
    });
    addr
}

/// Collects every stopped observation.
#[derive(Default)]
pub struct RecordingHandler {
    pub stopped: Mutex<Vec<ObservationSnapshot>>,
}

impl RecordingHandler {
    pub fn snapshots(&self) -> Vec<ObservationSnapshot> {
        self.stopped.lock().unwrap().clone()
    }
}

impl ObservationHandler for RecordingHandler {
    fn on_stop(&self, snapshot: &ObservationSnapshot) {
        self.stopped.lock().unwrap().push(snapshot.clone());
    }
}

pub fn config_for(addr: SocketAddr) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.client.base_url = format!("http://{addr}");
    config
}

pub fn recorded_client(
    config: &ClientConfig,
) -> (ObservedClient<HyperTransport>, Arc<RecordingHandler>) {
    let recorder = Arc::new(RecordingHandler::default());
    let client = ObservedClient::from_config(
        config,
        Arc::new(ConnectionPool::new(config.pool.clone())),
        HyperTransport::from_config(&config.client),
        ObservationRegistry::new().with_handler(recorder.clone()),
    )
    .unwrap();
    (client, recorder)
}
