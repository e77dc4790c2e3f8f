use std::time::Duration;

use parking_lot::Mutex;

/// Interval at which moving averages expect to be ticked.
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

fn alpha_for(minutes: f64) -> f64 {
    1.0 - (-TICK_INTERVAL.as_secs_f64() / 60.0 / minutes).exp()
}

/// Lock-free state of a moving average, owned by whoever synchronizes it.
#[derive(Debug)]
pub(crate) struct EwmaRate {
    alpha: f64,
    uncounted: i64,
    // Events per second.
    rate: f64,
    init: bool,
}

impl EwmaRate {
    pub fn with_minutes(minutes: f64) -> Self {
        Self { alpha: alpha_for(minutes), uncounted: 0, rate: 0.0, init: false }
    }

    pub fn update(&mut self, n: i64) {
        self.uncounted += n;
    }

    pub fn tick(&mut self) {
        self.tick_many(1);
    }

    /// Applies `n` ticks at once; only the first one observes the uncounted events.
    pub fn tick_many(&mut self, n: u64) {
        if n == 0 {
            return;
        }

        let instant = self.uncounted as f64 / TICK_INTERVAL.as_secs_f64();
        self.uncounted = 0;
        if self.init {
            self.rate += self.alpha * (instant - self.rate);
        } else {
            self.rate = instant;
            self.init = true;
        }

        if n > 1 {
            let idle = i32::try_from(n - 1).unwrap_or(i32::MAX);
            self.rate *= (1.0 - self.alpha).powi(idle);
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

/// An exponentially-weighted moving average of a rate, in events per second.
///
/// The average must be ticked every [`TICK_INTERVAL`] by its owner. [`Meter`](crate::Meter)
/// does this on its own.
#[derive(Debug)]
pub struct Ewma {
    inner: Mutex<EwmaRate>,
}

impl Ewma {
    /// Creates a moving average over the given window, in minutes.
    pub fn with_minutes(minutes: f64) -> Self {
        Self { inner: Mutex::new(EwmaRate::with_minutes(minutes)) }
    }

    pub fn one_minute() -> Self {
        Self::with_minutes(1.0)
    }

    pub fn five_minutes() -> Self {
        Self::with_minutes(5.0)
    }

    pub fn fifteen_minutes() -> Self {
        Self::with_minutes(15.0)
    }

    /// Adds `n` uncounted events.
    pub fn update(&self, n: i64) {
        self.inner.lock().update(n);
    }

    /// Folds the uncounted events into the average.
    pub fn tick(&self) {
        self.inner.lock().tick();
    }

    /// Current rate, in events per second.
    pub fn rate(&self) -> f64 {
        self.inner.lock().rate()
    }
}
