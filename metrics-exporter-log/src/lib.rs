//! Exports metric registries via the `log` crate.
//!
//! Every time the manager sends a batch, [`LogDriver`] emits one record per binding, at the
//! configured level and target. The record carries structured key/value pairs:
//!
//! - `application`: the application name given to the driver
//! - `registry`: the binding name
//! - one pair per binding tag
//! - one pair per expanded metric field, named in the dotted style (`hits.count`,
//!   `latency.99-percentile`, `requests.one-minute`, ...)
//!
//! Loggers that do not support key/value pairs still get the message, which names the binding.
//! Metrics that cannot be expanded are left out of the record and reported through `tracing`.
use std::{fmt, sync::Arc, time::Duration};

use log::{
    kv::{ToValue, Value as KvValue},
    Level, Log, Metadata, Record,
};
use metrics_flush::{Binding, Driver, Expander, FactoryError, NamingStyle, SendFuture, Value};
use tracing::warn;

/// Target of the records unless configured otherwise.
pub const DEFAULT_TARGET: &str = "metrics";

/// Level of the records unless configured otherwise.
pub const DEFAULT_LEVEL: Level = Level::Info;

struct FieldValue(Value);

impl ToValue for FieldValue {
    fn to_value(&self) -> KvValue<'_> {
        match &self.0 {
            Value::Bool(b) => KvValue::from(*b),
            Value::Int(i) => KvValue::from(*i),
            Value::Float(f) => KvValue::from(*f),
            Value::Str(s) => KvValue::from(s.as_str()),
        }
    }
}

/// Builder for creating a [`LogDriver`].
#[derive(Clone)]
pub struct LogExporterBuilder {
    level: Level,
    target: String,
    duration_unit: Duration,
    logger: Option<Arc<dyn Log>>,
}

impl LogExporterBuilder {
    /// Creates a new [`LogExporterBuilder`].
    pub fn new() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            target: DEFAULT_TARGET.to_string(),
            duration_unit: Duration::from_nanos(1),
            logger: None,
        }
    }

    /// Sets the level of the records.
    ///
    /// Defaults to `Info`.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the target of the records.
    ///
    /// Defaults to `metrics`.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Sets the unit in which timer durations are reported.
    ///
    /// Defaults to nanoseconds.
    #[must_use]
    pub fn with_duration_unit(mut self, unit: Duration) -> Self {
        self.duration_unit = unit;
        self
    }

    /// Sends the records to `logger` instead of the logger installed for the process.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Log>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Builds the driver for the given application.
    pub fn build(self, application: impl Into<String>) -> LogDriver {
        LogDriver {
            inner: Arc::new(Inner {
                application: application.into(),
                level: self.level,
                target: self.target,
                expander: Expander::new(NamingStyle::Dotted)
                    .with_duration_unit(self.duration_unit),
                logger: self.logger,
            }),
        }
    }

    /// Returns a driver factory building the driver.
    ///
    /// The driver is always enabled.
    pub fn factory(
        self,
    ) -> impl Fn(&str) -> Result<Option<Arc<dyn Driver>>, FactoryError> + Send + Sync + 'static
    {
        move |application| Ok(Some(Arc::new(self.clone().build(application)) as Arc<dyn Driver>))
    }
}

impl Default for LogExporterBuilder {
    fn default() -> Self {
        LogExporterBuilder::new()
    }
}

impl fmt::Debug for LogExporterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogExporterBuilder")
            .field("level", &self.level)
            .field("target", &self.target)
            .field("duration_unit", &self.duration_unit)
            .field("custom_logger", &self.logger.is_some())
            .finish()
    }
}

struct Inner {
    application: String,
    level: Level,
    target: String,
    expander: Expander,
    logger: Option<Arc<dyn Log>>,
}

/// Driver logging every binding it is sent.
#[derive(Clone)]
pub struct LogDriver {
    inner: Arc<Inner>,
}

impl LogDriver {
    /// Logs one record per binding.
    pub fn log_batch(&self, batch: &[Binding]) {
        let logger: &dyn Log = match &self.inner.logger {
            Some(logger) => logger.as_ref(),
            None if self.inner.level <= log::max_level() => log::logger(),
            None => return,
        };

        let metadata =
            Metadata::builder().level(self.inner.level).target(&self.inner.target).build();
        if !logger.enabled(&metadata) {
            return;
        }

        for binding in batch {
            self.log_binding(logger, binding);
        }
    }

    fn log_binding(&self, logger: &dyn Log, binding: &Binding) {
        let mut fields = vec![
            ("application".to_string(), FieldValue(Value::Str(self.inner.application.clone()))),
            ("registry".to_string(), FieldValue(Value::Str(binding.name().to_string()))),
        ];
        for (key, value) in binding.tags() {
            fields.push((key.clone(), FieldValue(Value::Str(value.clone()))));
        }

        let mut errors = Vec::new();
        binding.registry().each(|name, metric| match self.inner.expander.expand(name, metric) {
            Ok(samples) => fields.extend(
                samples.into_iter().map(|sample| (sample.name, FieldValue(sample.value))),
            ),
            Err(e) => errors.push(e),
        });

        if !errors.is_empty() {
            let errors = errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
            warn!(registry = %binding.id(), %errors, "failed to expand some metrics");
        }

        logger.log(
            &Record::builder()
                .args(format_args!("metrics for {}", binding.id()))
                .level(self.inner.level)
                .target(&self.inner.target)
                .module_path_static(Some(module_path!()))
                .key_values(&fields)
                .build(),
        );
    }
}

impl Driver for LogDriver {
    fn send(&self, batch: Vec<Binding>) -> SendFuture {
        let driver = self.clone();
        Box::pin(async move {
            driver.log_batch(&batch);
            Ok(())
        })
    }
}

impl fmt::Debug for LogDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogDriver")
            .field("application", &self.inner.application)
            .field("level", &self.inner.level)
            .field("target", &self.inner.target)
            .finish_non_exhaustive()
    }
}
