//! Expansion of metrics into flat, named samples.
//!
//! Every backend that flattens metrics does it the same way: a counter becomes its count, a
//! histogram becomes its count, extrema, mean, standard deviation and percentiles, and so on.
//! Only the naming style and the unit of durations differ from one backend to the other.

use std::{fmt, time::Duration};

use metrics_registry::{HistogramSnapshot, MeterSnapshot, Metric};
use thiserror::Error;

/// Quantiles emitted for histograms and timers, in order.
pub const PERCENTILES: [f64; 5] = [0.5, 0.75, 0.95, 0.99, 0.999];

/// Errors that could occur while expanding a metric.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExpandError {
    /// No expansion is defined for this kind of metric.
    #[error("unknown metric kind for name {name}")]
    UnknownKind { name: String },
}

/// A scalar value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
        }
    }
}

/// A named value produced by expanding a metric.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub name: String,
    pub value: Value,
}

/// How sample names are built from a metric name and a field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NamingStyle {
    /// `requests.std-dev`, `requests.50-percentile`, `requests.one-minute`.
    #[default]
    Dotted,

    /// `requests_std_dev`, `requests_50_percentile`, `requests_one_minute`.
    Underscored,
}

#[derive(Clone, Copy)]
struct Field(&'static str);

const COUNT: Field = Field("count");
const VALUE: Field = Field("value");
const MIN: Field = Field("min");
const MAX: Field = Field("max");
const MEAN: Field = Field("mean");
const STD_DEV: Field = Field("std-dev");
const ONE_MINUTE: Field = Field("one-minute");
const FIVE_MINUTE: Field = Field("five-minute");
const FIFTEEN_MINUTE: Field = Field("fifteen-minute");
const MEAN_RATE: Field = Field("mean-rate");
const PERCENTILE_FIELDS: [Field; 5] = [
    Field("50-percentile"),
    Field("75-percentile"),
    Field("95-percentile"),
    Field("99-percentile"),
    Field("999-percentile"),
];

/// Expands metrics into samples.
#[derive(Clone, Copy, Debug)]
pub struct Expander {
    style: NamingStyle,
    duration_unit: Duration,
}

impl Expander {
    /// Creates an expander with the given naming style, reporting durations in nanoseconds.
    pub fn new(style: NamingStyle) -> Self {
        Self { style, duration_unit: Duration::from_nanos(1) }
    }

    /// Sets the unit in which timer durations are reported.
    ///
    /// A unit of one millisecond reports a 1.5ms duration as `1.5`. Units below one nanosecond
    /// are treated as one nanosecond.
    #[must_use]
    pub fn with_duration_unit(mut self, unit: Duration) -> Self {
        self.duration_unit = unit;
        self
    }

    pub fn style(&self) -> NamingStyle {
        self.style
    }

    pub fn duration_unit(&self) -> Duration {
        self.duration_unit
    }

    /// Expands a metric registered under `name`.
    ///
    /// # Errors
    ///
    /// Metrics without a known expansion yield [`ExpandError::UnknownKind`].
    pub fn expand(&self, name: &str, metric: &Metric) -> Result<Vec<Sample>, ExpandError> {
        let mut out = Vec::new();
        match metric {
            Metric::Counter(counter) => {
                self.push(&mut out, name, COUNT, Value::Int(counter.count()));
            }
            Metric::Gauge(gauge) => self.push(&mut out, name, VALUE, Value::Int(gauge.value())),
            Metric::GaugeF64(gauge) => {
                self.push(&mut out, name, VALUE, Value::Float(gauge.value()));
            }
            Metric::Histogram(histogram) => {
                self.push_histogram(&mut out, name, &histogram.snapshot(), 1);
            }
            Metric::Meter(meter) => {
                self.push_rates(&mut out, name, &meter.snapshot(), MEAN, true);
            }
            Metric::Timer(timer) => {
                let snapshot = timer.snapshot();
                self.push_histogram(&mut out, name, snapshot.histogram(), self.unit_nanos());
                self.push_rates(&mut out, name, snapshot.meter(), MEAN_RATE, false);
            }
            Metric::Ewma(_) => return Err(ExpandError::UnknownKind { name: name.to_string() }),
        }
        Ok(out)
    }

    fn unit_nanos(&self) -> i64 {
        i64::try_from(self.duration_unit.as_nanos()).unwrap_or(i64::MAX).max(1)
    }

    fn push_histogram(&self, out: &mut Vec<Sample>, name: &str, h: &HistogramSnapshot, unit: i64) {
        let unit_f = unit as f64;
        self.push(out, name, COUNT, Value::Int(h.count()));
        self.push(out, name, MIN, Value::Int(h.min() / unit));
        self.push(out, name, MAX, Value::Int(h.max() / unit));
        self.push(out, name, MEAN, Value::Float(h.mean() / unit_f));
        self.push(out, name, STD_DEV, Value::Float(h.std_dev() / unit_f));
        for (field, p) in PERCENTILE_FIELDS.into_iter().zip(h.percentiles(&PERCENTILES)) {
            self.push(out, name, field, Value::Float(p / unit_f));
        }
    }

    fn push_rates(
        &self,
        out: &mut Vec<Sample>,
        name: &str,
        m: &MeterSnapshot,
        mean_field: Field,
        with_count: bool,
    ) {
        if with_count {
            self.push(out, name, COUNT, Value::Int(m.count));
        }
        self.push(out, name, ONE_MINUTE, Value::Float(m.rate1));
        self.push(out, name, FIVE_MINUTE, Value::Float(m.rate5));
        self.push(out, name, FIFTEEN_MINUTE, Value::Float(m.rate15));
        self.push(out, name, mean_field, Value::Float(m.rate_mean));
    }

    fn push(&self, out: &mut Vec<Sample>, name: &str, field: Field, value: Value) {
        let name = match self.style {
            NamingStyle::Dotted => format!("{name}.{}", field.0),
            NamingStyle::Underscored => format!("{name}_{}", field.0.replace('-', "_")),
        };
        out.push(Sample { name, value });
    }
}

impl Default for Expander {
    fn default() -> Self {
        Self::new(NamingStyle::default())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use metrics_registry::{Counter, Ewma, GaugeF64, Histogram, Metric, SampleConfig, Timer};

    use super::{ExpandError, Expander, NamingStyle, Value};

    fn names(samples: &[super::Sample]) -> Vec<&str> {
        samples.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn counter_and_gauge() {
        let counter = Arc::new(Counter::new());
        counter.inc(4);
        let samples = Expander::default().expand("hits", &Metric::Counter(counter)).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "hits.count");
        assert_eq!(samples[0].value, Value::Int(4));

        let gauge = Arc::new(GaugeF64::new());
        gauge.update(0.5);
        let samples = Expander::new(NamingStyle::Underscored)
            .expand("ratio", &Metric::GaugeF64(gauge))
            .unwrap();
        assert_eq!(samples[0].name, "ratio_value");
        assert_eq!(samples[0].value, Value::Float(0.5));
    }

    #[test]
    fn histogram_fields_in_order() {
        let histogram = Arc::new(Histogram::new(SampleConfig::default()));
        histogram.update(10);
        let samples = Expander::default().expand("h", &Metric::Histogram(histogram)).unwrap();
        assert_eq!(
            names(&samples),
            vec![
                "h.count",
                "h.min",
                "h.max",
                "h.mean",
                "h.std-dev",
                "h.50-percentile",
                "h.75-percentile",
                "h.95-percentile",
                "h.99-percentile",
                "h.999-percentile",
            ]
        );
    }

    #[test]
    fn timer_durations_use_unit() {
        let timer = Arc::new(Timer::new());
        timer.update(Duration::from_millis(3));

        let expander = Expander::new(NamingStyle::Underscored)
            .with_duration_unit(Duration::from_millis(1));
        let samples = expander.expand("t", &Metric::Timer(timer)).unwrap();

        assert_eq!(samples.len(), 14);
        assert_eq!(samples[1].name, "t_min");
        assert_eq!(samples[1].value, Value::Int(3));
        assert_eq!(samples[3].name, "t_mean");
        assert_eq!(samples[3].value, Value::Float(3.0));
        assert_eq!(samples[5].name, "t_50_percentile");
        assert_eq!(samples[10].name, "t_one_minute");
        assert_eq!(samples[13].name, "t_mean_rate");
    }

    #[test]
    fn meter_mean_rate_is_named_mean() {
        let meter = Arc::new(metrics_registry::Meter::new());
        meter.mark(1);
        let samples = Expander::default().expand("m", &Metric::Meter(meter)).unwrap();
        assert_eq!(
            names(&samples),
            vec!["m.count", "m.one-minute", "m.five-minute", "m.fifteen-minute", "m.mean"]
        );
    }

    #[test]
    fn unknown_kind() {
        let err = Expander::default().expand("e", &Metric::Ewma(Arc::new(Ewma::one_minute())));
        let err = err.unwrap_err();
        assert_eq!(err, ExpandError::UnknownKind { name: "e".to_string() });
        assert_eq!(err.to_string(), "unknown metric kind for name e");
    }
}
