use std::time::{Duration, Instant};

use quanta::Clock;

use crate::{Histogram, HistogramSnapshot, Meter, MeterSnapshot, SampleConfig};

/// A timer.
///
/// Records durations, in nanoseconds, into a histogram and counts them with a meter.
#[derive(Debug)]
pub struct Timer {
    histogram: Histogram,
    meter: Meter,
}

impl Timer {
    /// Creates a new `Timer` backed by an exponentially-decaying sample.
    pub fn new() -> Self {
        Self::with_clock(Clock::new())
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            histogram: Histogram::with_clock(SampleConfig::timer_default(), clock.clone()),
            meter: Meter::with_clock(clock),
        }
    }

    /// Records a duration.
    pub fn update(&self, duration: Duration) {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        self.histogram.update(nanos);
        self.meter.mark(1);
    }

    /// Records the time elapsed since `start`.
    pub fn update_since(&self, start: Instant) {
        self.update(start.elapsed());
    }

    /// Runs `f` and records how long it took.
    pub fn time<F, T>(&self, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let start = Instant::now();
        let result = f();
        self.update_since(start);
        result
    }

    /// Number of durations ever recorded.
    pub fn count(&self) -> i64 {
        self.histogram.count()
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot { histogram: self.histogram.snapshot(), meter: self.meter.snapshot() }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time view of a timer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimerSnapshot {
    histogram: HistogramSnapshot,
    meter: MeterSnapshot,
}

impl TimerSnapshot {
    /// Recorded durations, in nanoseconds.
    pub fn histogram(&self) -> &HistogramSnapshot {
        &self.histogram
    }

    pub fn meter(&self) -> &MeterSnapshot {
        &self.meter
    }
}
