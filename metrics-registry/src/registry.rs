use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use thiserror::Error;

use crate::Metric;

/// Errors that could occur while registering a metric.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A metric is already registered under this name.
    #[error("duplicate metric '{name}'")]
    Duplicate { name: String },
}

/// A thread-safe, enumerable collection of named metrics.
///
/// `Registry` is a cheap handle: clones share the same underlying collection. Metrics are
/// enumerated in registration order.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    inner: Arc<RwLock<IndexMap<String, Metric>>>,
}

impl Registry {
    /// Creates an empty `Registry`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a metric under the given name.
    ///
    /// # Errors
    ///
    /// If a metric is already registered under `name`, an error is returned and the registry is
    /// left unchanged.
    pub fn register<M>(&self, name: impl Into<String>, metric: M) -> Result<(), RegistryError>
    where
        M: Into<Metric>,
    {
        let name = name.into();
        let mut metrics = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if metrics.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }

        metrics.insert(name, metric.into());
        Ok(())
    }

    /// Gets the metric registered under the given name.
    pub fn get(&self, name: &str) -> Option<Metric> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    /// Gets the metric registered under the given name, registering the one built by `init` if
    /// there is none.
    pub fn get_or_register<F>(&self, name: &str, init: F) -> Metric
    where
        F: FnOnce() -> Metric,
    {
        if let Some(metric) = self.get(name) {
            return metric;
        }

        // Another writer may have won the race between the two locks.
        let mut metrics = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        metrics.entry(name.to_string()).or_insert_with(init).clone()
    }

    /// Removes the metric registered under the given name, returning it if it was present.
    pub fn unregister(&self, name: &str) -> Option<Metric> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner).shift_remove(name)
    }

    /// Visits every metric, in registration order.
    ///
    /// The lock is released before `f` is called, so `f` may freely use the registry.
    pub fn each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Metric),
    {
        for (name, metric) in self.snapshot() {
            f(&name, &metric);
        }
    }

    /// Gets a point-in-time copy of the registered handles, in registration order.
    pub fn snapshot(&self) -> Vec<(String, Metric)> {
        let metrics = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        metrics.iter().map(|(name, metric)| (name.clone(), metric.clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether both handles point to the same underlying collection.
    pub fn ptr_eq(&self, other: &Registry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
