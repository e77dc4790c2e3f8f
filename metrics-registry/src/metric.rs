use std::{fmt, sync::Arc};

use crate::{Counter, Ewma, Gauge, GaugeF64, Histogram, Meter, Timer};

/// Metric kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    GaugeF64,
    Histogram,
    Meter,
    Timer,
    Ewma,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::GaugeF64 => "gauge_f64",
            MetricKind::Histogram => "histogram",
            MetricKind::Meter => "meter",
            MetricKind::Timer => "timer",
            MetricKind::Ewma => "ewma",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A shared handle to any metric that can be held by a [`Registry`](crate::Registry).
///
/// Cloning a `Metric` clones the handle, not the metric.
#[derive(Clone, Debug)]
pub enum Metric {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    GaugeF64(Arc<GaugeF64>),
    Histogram(Arc<Histogram>),
    Meter(Arc<Meter>),
    Timer(Arc<Timer>),
    Ewma(Arc<Ewma>),
}

impl Metric {
    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Gauge(_) => MetricKind::Gauge,
            Metric::GaugeF64(_) => MetricKind::GaugeF64,
            Metric::Histogram(_) => MetricKind::Histogram,
            Metric::Meter(_) => MetricKind::Meter,
            Metric::Timer(_) => MetricKind::Timer,
            Metric::Ewma(_) => MetricKind::Ewma,
        }
    }
}

macro_rules! impl_from_handle {
    ($($variant:ident),+) => {
        $(
            impl From<Arc<$variant>> for Metric {
                fn from(handle: Arc<$variant>) -> Self {
                    Metric::$variant(handle)
                }
            }
        )+
    };
}

impl_from_handle!(Counter, Gauge, GaugeF64, Histogram, Meter, Timer, Ewma);
