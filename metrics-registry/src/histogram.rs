use quanta::Clock;

use crate::sample::{Sample, SampleConfig};

/// A histogram.
///
/// Values are recorded into a bounded [`SampleConfig`] reservoir, and statistics are computed over
/// a [`HistogramSnapshot`] of that reservoir.
pub struct Histogram {
    sample: Sample,
}

impl Histogram {
    /// Creates a new `Histogram` backed by the given sample.
    pub fn new(config: SampleConfig) -> Self {
        Self::with_clock(config, Clock::new())
    }

    /// Creates a new `Histogram` whose sample reads time from the given clock.
    pub fn with_clock(config: SampleConfig, clock: Clock) -> Self {
        Self { sample: config.build(clock) }
    }

    /// Records a value.
    pub fn update(&self, value: i64) {
        self.sample.update(value);
    }

    /// Number of values ever recorded.
    pub fn count(&self) -> i64 {
        self.sample.count()
    }

    /// Forgets every recorded value.
    pub fn clear(&self) {
        self.sample.clear();
    }

    /// Takes a point-in-time snapshot of the histogram.
    pub fn snapshot(&self) -> HistogramSnapshot {
        let mut values = self.sample.values();
        values.values.sort_unstable();
        HistogramSnapshot { count: values.count, values: values.values }
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new(SampleConfig::default())
    }
}

impl std::fmt::Debug for Histogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Histogram").field("count", &self.count()).finish_non_exhaustive()
    }
}

/// A point-in-time view of a histogram.
///
/// Every statistic except [`count`](HistogramSnapshot::count) is computed over the retained
/// values only, and is zero when no value is retained.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistogramSnapshot {
    count: i64,
    // Sorted ascending.
    values: Vec<i64>,
}

impl HistogramSnapshot {
    /// Number of values ever recorded.
    pub fn count(&self) -> i64 {
        self.count
    }

    /// Retained values, sorted ascending.
    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn min(&self) -> i64 {
        self.values.first().copied().unwrap_or_default()
    }

    pub fn max(&self) -> i64 {
        self.values.last().copied().unwrap_or_default()
    }

    pub fn sum(&self) -> i64 {
        self.values.iter().fold(0i64, |acc, v| acc.wrapping_add(*v))
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.sum() as f64 / self.values.len() as f64
    }

    /// Population variance of the retained values.
    pub fn variance(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }

        let mean = self.mean();
        let squares: f64 = self
            .values
            .iter()
            .map(|v| {
                let delta = *v as f64 - mean;
                delta * delta
            })
            .sum();
        squares / self.values.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Gets the value at the given quantile, with `0.5` being the median.
    ///
    /// Quantiles outside of `[0, 1]` are clamped. `NaN` gives zero.
    pub fn percentile(&self, p: f64) -> f64 {
        let size = self.values.len();
        if size == 0 || p.is_nan() {
            return 0.0;
        }

        let pos = p.clamp(0.0, 1.0) * (size as f64 + 1.0);
        if pos < 1.0 {
            self.values[0] as f64
        } else if pos >= size as f64 {
            self.values[size - 1] as f64
        } else {
            // 1 <= pos < size, so both neighbours exist.
            let lower = self.values[pos as usize - 1] as f64;
            let upper = self.values[pos as usize] as f64;
            lower + (pos - pos.floor()) * (upper - lower)
        }
    }

    /// Gets the values at each of the given quantiles, in order.
    pub fn percentiles(&self, ps: &[f64]) -> Vec<f64> {
        ps.iter().map(|p| self.percentile(*p)).collect()
    }
}
