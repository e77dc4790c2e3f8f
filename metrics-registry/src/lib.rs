//! Metric primitives grouped into enumerable registries.
//!
//! This crate provides the metrics that application code updates:
//!
//! - [`Counter`]: a signed count
//! - [`Gauge`] and [`GaugeF64`]: the last value set
//! - [`Histogram`]: a distribution of values, sampled into a bounded reservoir
//! - [`Meter`]: a count of events along with their moving rates
//! - [`Timer`]: a histogram of durations plus a meter of their occurrences
//!
//! Metrics are collected into a [`Registry`], either one at a time, through a
//! [`RegistryBuilder`], or by declaring a struct of handles with [`metric_group!`].
//!
//! Statistics are always read through snapshots, so that a histogram or meter can be encoded
//! consistently while it keeps being updated.

mod builder;
pub use builder::{sanitize, BuildError, RegistryBuilder};

mod counter;
pub use counter::Counter;

mod ewma;
pub use ewma::{Ewma, TICK_INTERVAL};

mod gauge;
pub use gauge::{Gauge, GaugeF64};

mod histogram;
pub use histogram::{Histogram, HistogramSnapshot};

mod macros;

/// A struct of metric handles that can build the registry holding them.
///
/// Implemented by the structs declared with [`metric_group!`].
pub trait MetricGroup: Sized {
    /// Creates every metric of the group and the registry holding them.
    fn build() -> Result<(Self, Registry), BuildError>;
}

mod meter;
pub use meter::{Meter, MeterSnapshot};

mod metric;
pub use metric::{Metric, MetricKind};

mod registry;
pub use registry::{Registry, RegistryError};

mod sample;
pub use sample::{
    SampleConfig, SampleError, DEFAULT_EXP_DECAY_ALPHA, DEFAULT_EXP_DECAY_SIZE,
    DEFAULT_UNIFORM_SIZE,
};

mod timer;
pub use timer::{Timer, TimerSnapshot};
