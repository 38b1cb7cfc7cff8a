//! Observation registry and built-in handlers.

use metrics::Label;
use std::sync::Arc;

use crate::observation::context::{Observation, ObservationSnapshot};
use crate::observation::propagation;

/// Reacts to observations starting and stopping.
///
/// `on_start` and `on_stop` each run exactly once per observation.
pub trait ObservationHandler: Send + Sync {
    fn on_start(&self, _observation: &Observation) {}

    fn on_stop(&self, snapshot: &ObservationSnapshot);
}

/// Creates observations and attaches the configured handlers to them.
#[derive(Clone, Default)]
pub struct ObservationRegistry {
    handlers: Vec<Arc<dyn ObservationHandler>>,
}

impl ObservationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, handler: Arc<dyn ObservationHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Start an observation, as a child of the current one in the propagation store if any.
    pub fn start(&self, name: &str) -> Observation {
        let parent = propagation::current_observation();
        self.start_with_parent(name, parent.as_ref())
    }

    pub fn start_with_parent(&self, name: &str, parent: Option<&Observation>) -> Observation {
        Observation::start(name, parent, self.handlers.clone())
    }
}

impl std::fmt::Debug for ObservationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Logs observation start and stop through `tracing`.
#[derive(Debug, Default)]
pub struct LoggingHandler;

impl ObservationHandler for LoggingHandler {
    fn on_start(&self, observation: &Observation) {
        tracing::debug!(
            name = observation.name(),
            trace_id = %observation.trace_id(),
            span_id = %observation.span_id(),
            "Observation started"
        );
    }

    fn on_stop(&self, snapshot: &ObservationSnapshot) {
        match &snapshot.error {
            Some(error) => tracing::warn!(
                name = %snapshot.name,
                trace_id = %snapshot.trace_id,
                span_id = %snapshot.span_id,
                duration = ?snapshot.duration,
                tags = ?snapshot.low_cardinality_tags,
                error = %error,
                "Observation stopped with error"
            ),
            None => tracing::debug!(
                name = %snapshot.name,
                trace_id = %snapshot.trace_id,
                span_id = %snapshot.span_id,
                duration = ?snapshot.duration,
                tags = ?snapshot.low_cardinality_tags,
                "Observation stopped"
            ),
        }
    }
}

/// Records each stopped observation's duration in a histogram named after it.
///
/// Only low-cardinality tags become labels.
#[derive(Debug, Default)]
pub struct MetricsHandler;

impl ObservationHandler for MetricsHandler {
    fn on_stop(&self, snapshot: &ObservationSnapshot) {
        let Some(duration) = snapshot.duration else {
            return;
        };
        let labels: Vec<Label> = snapshot
            .low_cardinality_tags
            .iter()
            .map(|(key, value)| Label::new(key.clone(), value.clone()))
            .collect();
        metrics::histogram!(snapshot.name.clone(), labels).record(duration.as_secs_f64());
    }
}
