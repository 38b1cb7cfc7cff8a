//! End-to-end client calls against in-process backends.

use std::time::Duration;
use url::Url;

use traced_webclient::client::ClientRequest;
use traced_webclient::pool::{Destination, PoolMetricsSnapshot};

mod common;

#[tokio::test]
async fn echo_call_succeeds_and_parks_connection() {
    let (addr, _seen) = common::start_echo_backend().await;
    let (client, recorder) = common::recorded_client(&common::config_for(addr));

    let response = client.post("/echo", "hello pool").await.unwrap();
    assert!(response.status().is_success());
    assert_eq!(response.body().as_ref(), b"hello pool");

    let destination = Destination::new("127.0.0.1", addr.port());
    assert_eq!(
        client.pool().snapshot(&destination),
        Some(PoolMetricsSnapshot { total: 1, active: 0, idle: 1, pending: 0 })
    );

    let stopped = recorder.snapshots();
    assert_eq!(stopped.len(), 1);
    assert_eq!(stopped[0].low_cardinality_tags["outcome"], "SUCCESS");
    assert_eq!(stopped[0].low_cardinality_tags["uri"], "/echo");
    assert_eq!(stopped[0].low_cardinality_tags["host"], "127.0.0.1");
    assert_eq!(
        stopped[0].high_cardinality_tags["http.url"],
        format!("http://{addr}/echo")
    );
}

#[tokio::test]
async fn ipv6_literal_base_url_connects() {
    let (addr, _seen) = common::start_echo_backend_on("[::1]:0").await;
    let config = common::config_for(addr);
    assert!(config.client.base_url.starts_with("http://[::1]:"));
    let (client, recorder) = common::recorded_client(&config);

    let response = client.post("/echo", "over v6").await.unwrap();
    assert_eq!(response.body().as_ref(), b"over v6");

    let destination = Destination::new("::1", addr.port());
    assert_eq!(client.pool().snapshot(&destination).unwrap().idle, 1);
    assert_eq!(recorder.snapshots()[0].low_cardinality_tags["host"], "[::1]");
}

#[tokio::test]
async fn sequential_calls_reuse_one_connection() {
    let (addr, seen) = common::start_echo_backend().await;
    let (client, _recorder) = common::recorded_client(&common::config_for(addr));

    for i in 0..3 {
        let body = format!("call {i}");
        let response = client.post("/echo", body.clone()).await.unwrap();
        assert_eq!(response.body().as_ref(), body.as_bytes());
    }

    assert_eq!(seen.peers.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn traceparent_carries_the_call_observation() {
    let (addr, seen) = common::start_echo_backend().await;
    let (client, recorder) = common::recorded_client(&common::config_for(addr));

    client.post("/echo", "traced").await.unwrap();

    let stopped = recorder.snapshots();
    let expected = format!("00-{}-{}-01", stopped[0].trace_id, stopped[0].span_id);
    assert_eq!(*seen.traceparents.lock().unwrap(), vec![expected]);
}

#[tokio::test]
async fn custom_attributes_become_tags() {
    let (addr, _seen) = common::start_echo_backend().await;
    let (client, recorder) = common::recorded_client(&common::config_for(addr));

    let url = Url::parse(&format!("http://{addr}/echo")).unwrap();
    let request = ClientRequest::post(url, "tagged")
        .uri_template("/echo")
        .attribute("CUSTOM_TAG_PREFIXregion", "us-east")
        .attribute("ignored", "value");
    client.call(request).await.unwrap();

    let tags = &recorder.snapshots()[0].low_cardinality_tags;
    assert_eq!(tags["region"], "us-east");
    assert!(!tags.contains_key("ignored"));
}

#[tokio::test]
async fn transport_failure_discards_connection() {
    let addr = common::start_closing_backend().await;
    let (client, recorder) = common::recorded_client(&common::config_for(addr));

    let err = client.post("/echo", "lost").await.unwrap_err();
    assert_eq!(err.kind(), "TransportError");

    let destination = Destination::new("127.0.0.1", addr.port());
    assert_eq!(client.pool().snapshot(&destination).unwrap().total, 0);

    let stopped = recorder.snapshots();
    assert_eq!(stopped.len(), 1);
    assert!(stopped[0].error.is_some());
    assert_eq!(stopped[0].low_cardinality_tags["exception"], "TransportError");
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (client, _recorder) = common::recorded_client(&common::config_for(addr));
    let err = client.post("/echo", "nobody home").await.unwrap_err();
    assert_eq!(err.kind(), "TransportError");
}

#[tokio::test]
async fn cancelled_call_stops_observation_and_frees_connection() {
    let (addr, _seen) = common::start_echo_backend().await;
    let (client, recorder) = common::recorded_client(&common::config_for(addr));

    let result = tokio::time::timeout(Duration::from_millis(200), client.post("/slow", "x")).await;
    assert!(result.is_err());

    let stopped = recorder.snapshots();
    assert_eq!(stopped.len(), 1);
    assert_eq!(stopped[0].low_cardinality_tags["outcome"], "UNKNOWN");

    let destination = Destination::new("127.0.0.1", addr.port());
    let snapshot = client.pool().snapshot(&destination).unwrap();
    assert_eq!(snapshot.active, 0);
    assert_eq!(snapshot.pending, 0);
}

#[tokio::test]
async fn saturated_pool_rejects_without_queue() {
    let (addr, _seen) = common::start_echo_backend().await;
    let mut config = common::config_for(addr);
    config.pool.max_connections_per_destination = 1;
    config.pool.pending_acquire_max_count = 0;
    let (client, _recorder) = common::recorded_client(&config);
    let client = std::sync::Arc::new(client);

    let slow = tokio::spawn({
        let client = client.clone();
        async move { client.post("/slow", "hold").await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = client.post("/echo", "rejected").await.unwrap_err();
    assert_eq!(err.kind(), "PoolExhausted");
    slow.abort();
}
