//! Keyed, task-scoped context store.
//!
//! A [`ContextMap`] is installed for the duration of a future with
//! [`ContextMap::scope`]. Any code polled inside that future reads it back
//! with [`ContextMap::current`], whichever worker thread polls it. Values
//! are shared, never copied, so a stage reading the current observation
//! gets the same instance its caller created.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::task::futures::TaskLocalFuture;
use tokio::task::JoinHandle;

use crate::observation::context::Observation;

tokio::task_local! {
    static CURRENT: ContextMap;
}

/// Typed key into a [`ContextMap`].
pub struct ContextKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Key under which the current observation is stored.
pub const OBSERVATION_KEY: ContextKey<Observation> = ContextKey::new("observation");

/// Immutable map of context values. `with` returns an extended copy.
#[derive(Clone, Default)]
pub struct ContextMap {
    values: HashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

impl ContextMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The map installed for the running task, or an empty one.
    pub fn current() -> Self {
        CURRENT.try_with(Clone::clone).unwrap_or_default()
    }

    pub fn with<T>(mut self, key: &ContextKey<T>, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.values.insert(key.name, Arc::new(value));
        self
    }

    pub fn get<T>(&self, key: &ContextKey<T>) -> Option<&T>
    where
        T: Any + Send + Sync,
    {
        self.values.get(key.name)?.as_ref().downcast_ref::<T>()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Run `future` with this map as the current context.
    pub fn scope<F: Future>(self, future: F) -> TaskLocalFuture<ContextMap, F> {
        CURRENT.scope(self, future)
    }
}

impl fmt::Debug for ContextMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// The observation in the current context, if any.
pub fn current_observation() -> Option<Observation> {
    CURRENT
        .try_with(|map| map.get(&OBSERVATION_KEY).cloned())
        .ok()
        .flatten()
}

/// Spawn a task that inherits the current context.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(ContextMap::current().scope(future))
}
