//! The per-call observation record.
//!
//! # Responsibilities
//! - Hold trace/span identifiers, tags, events and the recorded error of one logical call
//! - Reject mutation once stopped
//! - Stop exactly once and notify the registry's handlers
//!
//! # Design Decisions
//! - Cheap to clone: clones share one record, propagation never forks a copy
//! - Stop is idempotent; only the first call notifies handlers
//! - [`StopGuard`] stops on drop, so every exit path (including cancellation) closes it

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::observation::ids::{SpanId, TraceId};
use crate::observation::registry::ObservationHandler;

/// Lifecycle state of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ObservationState {
    Started,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObservationError {
    #[error("Observation '{name}' is already stopped")]
    Stopped { name: String },
}

/// A named point in time within an observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationEvent {
    pub name: String,
    pub at: Instant,
}

/// Immutable copy of an observation's record, as handed to handlers on stop.
#[derive(Debug, Clone)]
pub struct ObservationSnapshot {
    pub name: String,
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub state: ObservationState,
    pub low_cardinality_tags: BTreeMap<String, String>,
    pub high_cardinality_tags: BTreeMap<String, String>,
    pub events: Vec<ObservationEvent>,
    pub error: Option<String>,
    /// Set once stopped.
    pub duration: Option<Duration>,
}

struct Inner {
    name: String,
    trace_id: TraceId,
    span_id: SpanId,
    parent_span_id: Option<SpanId>,
    started_at: Instant,
    handlers: Vec<Arc<dyn ObservationHandler>>,
    record: Mutex<Record>,
}

#[derive(Default)]
struct Record {
    stopped: bool,
    low_cardinality_tags: BTreeMap<String, String>,
    high_cardinality_tags: BTreeMap<String, String>,
    events: Vec<ObservationEvent>,
    error: Option<String>,
    duration: Option<Duration>,
}

/// One logical unit of work with a start and a terminal stop.
#[derive(Clone)]
pub struct Observation {
    inner: Arc<Inner>,
}

impl Observation {
    /// Start an observation. A child shares its parent's trace id.
    pub(crate) fn start(
        name: impl Into<String>,
        parent: Option<&Observation>,
        handlers: Vec<Arc<dyn ObservationHandler>>,
    ) -> Self {
        let observation = Self {
            inner: Arc::new(Inner {
                name: name.into(),
                trace_id: parent.map_or_else(TraceId::generate, |p| p.trace_id()),
                span_id: SpanId::generate(),
                parent_span_id: parent.map(|p| p.span_id()),
                started_at: Instant::now(),
                handlers,
                record: Mutex::new(Record::default()),
            }),
        };
        for handler in &observation.inner.handlers {
            handler.on_start(&observation);
        }
        observation
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn trace_id(&self) -> TraceId {
        self.inner.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.inner.span_id
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.inner.parent_span_id
    }

    pub fn started_at(&self) -> Instant {
        self.inner.started_at
    }

    pub fn state(&self) -> ObservationState {
        if self.record().stopped {
            ObservationState::Stopped
        } else {
            ObservationState::Started
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == ObservationState::Stopped
    }

    /// Set a metric-safe tag. Last write per key wins.
    pub fn low_cardinality_tag(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ObservationError> {
        self.open_record()?
            .low_cardinality_tags
            .insert(key.into(), value.into());
        Ok(())
    }

    /// Set a diagnostic tag that never becomes a metric label.
    pub fn high_cardinality_tag(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ObservationError> {
        self.open_record()?
            .high_cardinality_tags
            .insert(key.into(), value.into());
        Ok(())
    }

    /// Append a timestamped event.
    pub fn event(&self, name: impl Into<String>) -> Result<(), ObservationError> {
        let mut record = self.open_record()?;
        record.events.push(ObservationEvent {
            name: name.into(),
            at: Instant::now(),
        });
        Ok(())
    }

    /// Attach the error that ended the call. A later error replaces an earlier one.
    pub fn error(&self, error: &dyn fmt::Display) -> Result<(), ObservationError> {
        self.open_record()?.error = Some(error.to_string());
        Ok(())
    }

    /// Stop the observation and notify handlers.
    ///
    /// Returns `false` if it was already stopped, in which case nothing happens.
    pub fn stop(&self) -> bool {
        let snapshot = {
            let mut record = self.record();
            if record.stopped {
                return false;
            }
            record.stopped = true;
            record.duration = Some(self.inner.started_at.elapsed());
            self.snapshot_of(&record)
        };

        for handler in &self.inner.handlers {
            handler.on_stop(&snapshot);
        }
        true
    }

    /// A guard that stops this observation when dropped.
    pub fn stop_guard(&self) -> StopGuard {
        StopGuard {
            observation: self.clone(),
        }
    }

    pub fn snapshot(&self) -> ObservationSnapshot {
        self.snapshot_of(&self.record())
    }

    /// A tracing span carrying this observation's identifiers.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "observation",
            name = %self.inner.name,
            trace_id = %self.inner.trace_id,
            span_id = %self.inner.span_id,
        )
    }

    /// W3C `traceparent` header value, always sampled.
    pub fn traceparent(&self) -> String {
        format!("00-{}-{}-01", self.inner.trace_id, self.inner.span_id)
    }

    /// Whether both handles refer to the same observation.
    pub fn ptr_eq(&self, other: &Observation) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn record(&self) -> MutexGuard<'_, Record> {
        self.inner
            .record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn open_record(&self) -> Result<MutexGuard<'_, Record>, ObservationError> {
        let record = self.record();
        if record.stopped {
            return Err(ObservationError::Stopped {
                name: self.inner.name.clone(),
            });
        }
        Ok(record)
    }

    fn snapshot_of(&self, record: &Record) -> ObservationSnapshot {
        ObservationSnapshot {
            name: self.inner.name.clone(),
            trace_id: self.inner.trace_id,
            span_id: self.inner.span_id,
            parent_span_id: self.inner.parent_span_id,
            state: if record.stopped {
                ObservationState::Stopped
            } else {
                ObservationState::Started
            },
            low_cardinality_tags: record.low_cardinality_tags.clone(),
            high_cardinality_tags: record.high_cardinality_tags.clone(),
            events: record.events.clone(),
            error: record.error.clone(),
            duration: record.duration,
        }
    }
}

impl fmt::Debug for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observation")
            .field("name", &self.inner.name)
            .field("trace_id", &self.inner.trace_id)
            .field("span_id", &self.inner.span_id)
            .field("parent_span_id", &self.inner.parent_span_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Stops its observation when dropped.
#[must_use = "the observation stops as soon as the guard is dropped"]
#[derive(Debug)]
pub struct StopGuard {
    observation: Observation,
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.observation.stop();
    }
}
