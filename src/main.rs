//! Demo runner for the observed web client.
//!
//! ```text
//!   ┌────────────────┐    ┌─────────────────┐    ┌──────────────┐    ┌─────────┐
//!   │ webclient-     │───▶│ ObservedClient  │───▶│ Connection   │───▶│ backend │
//!   │ sample         │    │ (child          │    │ Pool         │    │ /echo   │
//!   │ observation    │    │  observation)   │    │              │    │         │
//!   └────────────────┘    └─────────────────┘    └──────┬───────┘    └─────────┘
//!                                                       │
//!                                              ┌────────▼────────┐
//!                                              │ /metrics gauges │
//!                                              └─────────────────┘
//! ```
//!
//! Posts a large body to `<url>/echo` repeatedly, each call inside a
//! `webclient-sample` observation, until the iteration count is reached or
//! Ctrl-C arrives.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Instrument;

use traced_webclient::config::{load_config, ClientConfig};
use traced_webclient::lifecycle::{shutdown_signal, Components, Shutdown};
use traced_webclient::observability::{init_logging, install_recorder};
use traced_webclient::observation::{ContextMap, OBSERVATION_KEY};

const SAMPLE_OBSERVATION: &str = "webclient-sample";

#[derive(Parser, Debug)]
#[command(name = "traced-webclient", version, about = "Pooled, observed HTTP client demo")]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override client.base_url
    #[arg(long)]
    url: Option<String>,

    /// Path posted to on every iteration
    #[arg(long, default_value = "/echo")]
    path: String,

    /// Number of calls; 0 runs until interrupted
    #[arg(short, long, default_value_t = 0)]
    iterations: u64,

    /// How many times the sample payload is repeated in the body
    #[arg(long, default_value_t = 100_000)]
    body_repeat: usize,

    /// Pause between calls in milliseconds
    #[arg(long, default_value_t = 1_000)]
    interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };
    if let Some(url) = &cli.url {
        config.client.base_url = url.clone();
    }

    init_logging(&config.observability)?;
    tracing::info!("traced-webclient v{} starting", env!("CARGO_PKG_VERSION"));

    let components = Components::assemble(config)?;
    let shutdown = Shutdown::new();
    let mut background = components.spawn_background(&shutdown);

    if components.config.observability.metrics_enabled {
        let handle = install_recorder()?;
        background.push(components.spawn_metrics(handle, &shutdown).await?);
        tracing::info!(
            address = %components.config.observability.metrics_address,
            "Serving pool metrics"
        );
    }

    let body = "Hello from consumer ".repeat(cli.body_repeat);
    tokio::select! {
        _ = run(&components, &cli, body) => {}
        _ = shutdown_signal() => {}
    }

    shutdown.trigger();
    for task in background {
        let _ = task.await;
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn run(components: &Components, cli: &Cli, body: String) {
    let mut iteration = 0u64;
    while cli.iterations == 0 || iteration < cli.iterations {
        iteration += 1;
        call_once(components, &cli.path, body.clone()).await;
        tokio::time::sleep(Duration::from_millis(cli.interval_ms)).await;
    }
}

async fn call_once(components: &Components, path: &str, body: String) {
    let observation = components.registry.start(SAMPLE_OBSERVATION);
    let _stop = observation.stop_guard();
    let span = observation.span();

    let result = ContextMap::current()
        .with(&OBSERVATION_KEY, observation.clone())
        .scope(async {
            tracing::info!(
                trace_id = %observation.trace_id(),
                "<ACCEPTANCE_TEST> Hello from consumer"
            );
            components.client.post(path, body).await
        })
        .instrument(span)
        .await;

    match result {
        Ok(response) => {
            tracing::info!(
                trace_id = %observation.trace_id(),
                status = %response.status(),
                length = response.body().len(),
                "Response received"
            );
        }
        Err(err) => {
            let _ = observation.error(&err);
            tracing::error!(trace_id = %observation.trace_id(), error = %err, "Call failed");
        }
    }
}
