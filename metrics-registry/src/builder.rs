use std::{collections::HashSet, sync::Arc};

use quanta::Clock;
use thiserror::Error;

use crate::{
    Counter, Gauge, GaugeF64, Histogram, Meter, Metric, Registry, SampleConfig, SampleError, Timer,
};

/// Errors that could occur while building a registry.
#[derive(Debug, Error, PartialEq)]
pub enum BuildError {
    /// Two metrics map to the same sanitized name.
    #[error("metric name '{name}' is duplicated")]
    DuplicatedName { name: String },

    /// A histogram sample configuration could not be parsed.
    #[error(transparent)]
    Sample(#[from] SampleError),
}

/// Normalizes a metric name: names are case-insensitive and stored lower-cased.
pub fn sanitize(name: &str) -> String {
    name.to_lowercase()
}

/// Builder for a [`Registry`].
///
/// Every `add_*` method creates a metric, queues it under its sanitized name and hands back the
/// shared handle, so the caller can keep updating the metric once the registry is built.
///
/// ```
/// use metrics_registry::RegistryBuilder;
///
/// let mut builder = RegistryBuilder::new();
/// let hits = builder.add_counter("Hits");
/// let registry = builder.build().expect("names are unique");
///
/// hits.inc(1);
/// assert!(registry.get("hits").is_some());
/// ```
#[derive(Debug)]
pub struct RegistryBuilder {
    clock: Clock,
    metrics: Vec<(String, Metric)>,
    names: HashSet<String>,
    error: Option<BuildError>,
}

impl RegistryBuilder {
    /// Creates a new `RegistryBuilder`.
    pub fn new() -> Self {
        Self { clock: Clock::new(), metrics: Vec::new(), names: HashSet::new(), error: None }
    }

    /// Sets the clock used by meters, timers and decaying histograms created afterwards.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn add_counter(&mut self, name: &str) -> Arc<Counter> {
        self.add(name, Arc::new(Counter::new()))
    }

    pub fn add_gauge(&mut self, name: &str) -> Arc<Gauge> {
        self.add(name, Arc::new(Gauge::new()))
    }

    pub fn add_gauge_f64(&mut self, name: &str) -> Arc<GaugeF64> {
        self.add(name, Arc::new(GaugeF64::new()))
    }

    pub fn add_meter(&mut self, name: &str) -> Arc<Meter> {
        let meter = Arc::new(Meter::with_clock(self.clock.clone()));
        self.add(name, meter)
    }

    pub fn add_timer(&mut self, name: &str) -> Arc<Timer> {
        let timer = Arc::new(Timer::with_clock(self.clock.clone()));
        self.add(name, timer)
    }

    pub fn add_histogram(&mut self, name: &str, config: SampleConfig) -> Arc<Histogram> {
        let histogram = Arc::new(Histogram::with_clock(config, self.clock.clone()));
        self.add(name, histogram)
    }

    /// Adds an already-built metric.
    pub fn add_metric(&mut self, name: &str, metric: impl Into<Metric>) {
        let name = sanitize(name);
        if !self.names.insert(name.clone()) {
            self.fail(BuildError::DuplicatedName { name });
            return;
        }
        self.metrics.push((name, metric.into()));
    }

    /// Records an error to be reported by [`build`](RegistryBuilder::build).
    ///
    /// Only the first recorded error is kept.
    pub fn fail(&mut self, error: BuildError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Builds the registry.
    ///
    /// # Errors
    ///
    /// If two metrics were added under the same sanitized name, or if any other error was
    /// recorded, the first error is returned and no registry is built.
    pub fn build(self) -> Result<Registry, BuildError> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let registry = Registry::new();
        for (name, metric) in self.metrics {
            registry
                .register(name.clone(), metric)
                .map_err(|_| BuildError::DuplicatedName { name })?;
        }
        Ok(registry)
    }

    fn add<T>(&mut self, name: &str, handle: Arc<T>) -> Arc<T>
    where
        Arc<T>: Into<Metric>,
    {
        self.add_metric(name, Arc::clone(&handle));
        handle
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{sanitize, BuildError, RegistryBuilder};
    use crate::{MetricKind, SampleConfig};

    #[test]
    fn sanitize_lowercases() {
        assert_eq!(sanitize("RequestCount"), "requestcount");
        assert_eq!(sanitize("already_lower"), "already_lower");
    }

    #[test]
    fn builds_every_kind() {
        let mut builder = RegistryBuilder::new();
        builder.add_counter("Counter");
        builder.add_gauge("Gauge");
        builder.add_gauge_f64("GaugeF64");
        builder.add_meter("Meter");
        builder.add_timer("Timer");
        builder.add_histogram("Histogram", SampleConfig::ExpDecay { size: 42, alpha: 12.5 });

        let registry = builder.build().unwrap();
        let kinds: Vec<_> = registry.snapshot().into_iter().map(|(n, m)| (n, m.kind())).collect();
        assert_eq!(
            kinds,
            vec![
                ("counter".to_string(), MetricKind::Counter),
                ("gauge".to_string(), MetricKind::Gauge),
                ("gaugef64".to_string(), MetricKind::GaugeF64),
                ("meter".to_string(), MetricKind::Meter),
                ("timer".to_string(), MetricKind::Timer),
                ("histogram".to_string(), MetricKind::Histogram),
            ]
        );
    }

    #[test]
    fn duplicated_sanitized_names_fail() {
        let mut builder = RegistryBuilder::new();
        builder.add_counter("Requests");
        builder.add_gauge("requests");

        assert_eq!(
            builder.build().unwrap_err(),
            BuildError::DuplicatedName { name: "requests".to_string() }
        );
    }

    #[test]
    fn handles_are_shared_with_registry() {
        let mut builder = RegistryBuilder::new();
        let gauge = builder.add_gauge("g");
        let registry = builder.build().unwrap();

        gauge.update(7);
        match registry.get("g") {
            Some(crate::Metric::Gauge(g)) => assert_eq!(g.value(), 7),
            _ => panic!("gauge not registered"),
        }
    }
}
