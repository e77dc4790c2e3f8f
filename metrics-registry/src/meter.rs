use parking_lot::Mutex;
use quanta::{Clock, Instant};

use crate::ewma::{EwmaRate, TICK_INTERVAL};

#[derive(Debug)]
struct MeterState {
    count: i64,
    last_tick: Instant,
    rate1: EwmaRate,
    rate5: EwmaRate,
    rate15: EwmaRate,
}

impl MeterState {
    // Catches up on the ticks that elapsed since the last one.
    fn tick_to(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        let ticks = (elapsed.as_nanos() / TICK_INTERVAL.as_nanos()) as u64;
        if ticks == 0 {
            return;
        }

        self.rate1.tick_many(ticks);
        self.rate5.tick_many(ticks);
        self.rate15.tick_many(ticks);
        self.last_tick += TICK_INTERVAL * u32::try_from(ticks).unwrap_or(u32::MAX);
    }
}

/// A meter.
///
/// Counts events and tracks their rate as 1, 5 and 15-minute moving averages, plus the mean
/// rate since creation. Moving averages are ticked lazily, whenever the meter is marked or
/// snapshotted.
#[derive(Debug)]
pub struct Meter {
    clock: Clock,
    start: Instant,
    state: Mutex<MeterState>,
}

impl Meter {
    /// Creates a new `Meter`.
    pub fn new() -> Self {
        Self::with_clock(Clock::new())
    }

    /// Creates a new `Meter` reading time from the given clock.
    pub fn with_clock(clock: Clock) -> Self {
        let start = clock.now();
        let state = MeterState {
            count: 0,
            last_tick: start,
            rate1: EwmaRate::with_minutes(1.0),
            rate5: EwmaRate::with_minutes(5.0),
            rate15: EwmaRate::with_minutes(15.0),
        };

        Self { clock, start, state: Mutex::new(state) }
    }

    /// Records `n` events.
    pub fn mark(&self, n: i64) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.tick_to(now);
        state.count += n;
        state.rate1.update(n);
        state.rate5.update(n);
        state.rate15.update(n);
    }

    /// Number of events ever recorded.
    pub fn count(&self) -> i64 {
        self.state.lock().count
    }

    /// Takes a point-in-time snapshot of the meter.
    pub fn snapshot(&self) -> MeterSnapshot {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.tick_to(now);

        let elapsed = now.saturating_duration_since(self.start).as_secs_f64();
        let rate_mean = if elapsed > 0.0 { state.count as f64 / elapsed } else { 0.0 };

        MeterSnapshot {
            count: state.count,
            rate1: state.rate1.rate(),
            rate5: state.rate5.rate(),
            rate15: state.rate15.rate(),
            rate_mean,
        }
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time view of a meter. Rates are in events per second.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeterSnapshot {
    pub count: i64,
    pub rate1: f64,
    pub rate5: f64,
    pub rate15: f64,
    pub rate_mean: f64,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use approx::assert_relative_eq;
    use quanta::Clock;

    use super::Meter;

    #[test]
    fn rates_before_first_tick_are_zero() {
        let (clock, mock) = Clock::mock();
        let meter = Meter::with_clock(clock);
        meter.mark(47);
        mock.increment(Duration::from_secs(1));

        let snapshot = meter.snapshot();
        assert_eq!(snapshot.count, 47);
        assert_eq!(snapshot.rate1, 0.0);
        assert_relative_eq!(snapshot.rate_mean, 47.0);
    }

    #[test]
    fn rates_follow_ticks() {
        let (clock, mock) = Clock::mock();
        let meter = Meter::with_clock(clock);
        meter.mark(3);
        mock.increment(Duration::from_secs(5));

        let snapshot = meter.snapshot();
        assert_relative_eq!(snapshot.rate1, 0.6, epsilon = 1e-9);
        assert_relative_eq!(snapshot.rate5, 0.6, epsilon = 1e-9);
        assert_relative_eq!(snapshot.rate15, 0.6, epsilon = 1e-9);

        mock.increment(Duration::from_secs(60));
        let snapshot = meter.snapshot();
        assert_relative_eq!(snapshot.rate1, 0.22072766470286553, epsilon = 1e-9);
        assert_relative_eq!(snapshot.rate_mean, 3.0 / 65.0, epsilon = 1e-9);
    }
}
