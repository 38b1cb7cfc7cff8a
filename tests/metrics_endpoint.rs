//! Scraping pool gauges over HTTP.

use std::sync::Arc;
use tokio::net::TcpListener;

use traced_webclient::lifecycle::Shutdown;
use traced_webclient::observability::{install_recorder, serve_metrics, PoolMetricsRegistrar};

mod common;

#[tokio::test]
async fn scrape_reports_live_pool_state() {
    let handle = install_recorder().unwrap();
    let (addr, _seen) = common::start_echo_backend().await;
    let config = common::config_for(addr);
    let (client, _recorder) = common::recorded_client(&config);
    client.post("/echo", "scraped").await.unwrap();

    let registrar = Arc::new(PoolMetricsRegistrar::new(client.pool().clone(), "abc"));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let metrics_addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = tokio::spawn(serve_metrics(listener, registrar, handle, shutdown.subscribe()));

    let body = reqwest::get(format!("http://{metrics_addr}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let destination = format!("destination=\"127.0.0.1:{}\"", addr.port());
    let idle = body
        .lines()
        .find(|line| line.starts_with("connection_pool_idle{") && line.contains(&destination))
        .expect("idle gauge for the echo backend");
    assert!(idle.contains("client_name=\"abc\""));
    let value: f64 = idle.rsplit(' ').next().unwrap().parse().unwrap();
    assert_eq!(value, 1.0);
    assert!(body.contains("The number of the idle connections"));

    shutdown.trigger();
    server.await.unwrap().unwrap();
}
