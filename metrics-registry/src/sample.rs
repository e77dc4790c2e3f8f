//! Sampling reservoirs backing histograms and timers.

use std::{cmp::Reverse, collections::BinaryHeap, time::Duration};

use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use quanta::{Clock, Instant};
use rand::Rng;
use thiserror::Error;

/// Default reservoir size of a uniform sample.
pub const DEFAULT_UNIFORM_SIZE: usize = 999;

/// Default reservoir size of the exponentially-decaying sample used by timers.
pub const DEFAULT_EXP_DECAY_SIZE: usize = 1028;

/// Default decay factor of the exponentially-decaying sample used by timers.
///
/// Heavily biases the reservoir towards the last five minutes of values.
pub const DEFAULT_EXP_DECAY_ALPHA: f64 = 0.015;

const RESCALE_THRESHOLD: Duration = Duration::from_secs(60 * 60);

/// Errors that could occur while parsing a sample configuration.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SampleError {
    /// The sample kind is neither `uniform` nor `exp`.
    #[error("unknown sample type '{kind}'")]
    UnknownSampleType {
        /// The kind that was given.
        kind: String,
    },

    /// The reservoir size of a uniform sample is not an integer.
    #[error("invalid uniform sample value '{value}'")]
    InvalidUniformValue {
        /// The value that was given.
        value: String,
    },

    /// An exponentially-decaying sample was not given as `<size>-<alpha>`.
    #[error("invalid exp sample format '{value}' (expected '<size>-<alpha>')")]
    InvalidExpFormat {
        /// The value that was given.
        value: String,
    },

    /// The size or alpha of an exponentially-decaying sample could not be parsed.
    #[error("invalid exp sample value '{value}'")]
    InvalidExpValue {
        /// The value that was given.
        value: String,
    },
}

/// How a histogram samples the values recorded into it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SampleConfig {
    /// A uniform random sample of up to `size` values, using Vitter's [Algorithm R][vitter].
    ///
    /// [vitter]: https://www.cs.umd.edu/~samir/498/vitter.pdf
    Uniform {
        /// Reservoir size.
        size: usize,
    },

    /// A forward-decaying priority reservoir of up to `size` values.
    ///
    /// Newer values are given exponentially more weight according to `alpha`, as described by
    /// Cormode et al. in [Forward Decay][fwd].
    ///
    /// [fwd]: http://dimacs.rutgers.edu/~graham/pubs/papers/fwddecay.pdf
    ExpDecay {
        /// Reservoir size.
        size: usize,
        /// Decay factor.
        alpha: f64,
    },
}

impl SampleConfig {
    /// Parses a sample configuration from its textual form.
    ///
    /// `kind` is either empty or `uniform`, in which case `value` is the reservoir size (and may
    /// be empty to use [`DEFAULT_UNIFORM_SIZE`]), or `exp`, in which case `value` must be
    /// `<size>-<alpha>`, such as `1028-0.015`.
    ///
    /// # Errors
    ///
    /// Each malformed input maps to a distinct [`SampleError`] variant.
    pub fn parse(kind: &str, value: &str) -> Result<Self, SampleError> {
        match kind {
            "" | "uniform" => {
                if value.is_empty() {
                    return Ok(SampleConfig::Uniform { size: DEFAULT_UNIFORM_SIZE });
                }

                let size = value
                    .parse()
                    .map_err(|_| SampleError::InvalidUniformValue { value: value.to_string() })?;
                Ok(SampleConfig::Uniform { size })
            }
            "exp" => {
                let segments: Vec<&str> = value.split('-').collect();
                let [size, alpha] = segments.as_slice() else {
                    return Err(SampleError::InvalidExpFormat { value: value.to_string() });
                };

                let invalid = || SampleError::InvalidExpValue { value: value.to_string() };
                let size = size.parse().map_err(|_| invalid())?;
                let alpha = alpha.parse().map_err(|_| invalid())?;
                Ok(SampleConfig::ExpDecay { size, alpha })
            }
            _ => Err(SampleError::UnknownSampleType { kind: kind.to_string() }),
        }
    }

    /// Configuration used by timers.
    pub const fn timer_default() -> Self {
        SampleConfig::ExpDecay { size: DEFAULT_EXP_DECAY_SIZE, alpha: DEFAULT_EXP_DECAY_ALPHA }
    }

    pub(crate) fn build(self, clock: Clock) -> Sample {
        match self {
            SampleConfig::Uniform { size } => Sample::Uniform(UniformSample::new(size)),
            SampleConfig::ExpDecay { size, alpha } => {
                Sample::ExpDecay(ExpDecaySample::new(size, alpha, clock))
            }
        }
    }
}

impl Default for SampleConfig {
    fn default() -> Self {
        SampleConfig::Uniform { size: DEFAULT_UNIFORM_SIZE }
    }
}

/// Values held by a sample at a given point in time.
pub(crate) struct SampleValues {
    /// Number of values ever recorded, not only those retained.
    pub count: i64,
    pub values: Vec<i64>,
}

pub(crate) enum Sample {
    Uniform(UniformSample),
    ExpDecay(ExpDecaySample),
}

impl Sample {
    pub fn update(&self, value: i64) {
        match self {
            Sample::Uniform(sample) => sample.update(value),
            Sample::ExpDecay(sample) => sample.update(value),
        }
    }

    pub fn count(&self) -> i64 {
        match self {
            Sample::Uniform(sample) => sample.state.lock().count,
            Sample::ExpDecay(sample) => sample.state.lock().count,
        }
    }

    pub fn values(&self) -> SampleValues {
        match self {
            Sample::Uniform(sample) => {
                let state = sample.state.lock();
                SampleValues { count: state.count, values: state.values.clone() }
            }
            Sample::ExpDecay(sample) => {
                let state = sample.state.lock();
                let values = state.heap.iter().map(|Reverse(entry)| entry.value).collect();
                SampleValues { count: state.count, values }
            }
        }
    }

    pub fn clear(&self) {
        match self {
            Sample::Uniform(sample) => {
                let mut state = sample.state.lock();
                state.count = 0;
                state.values.clear();
            }
            Sample::ExpDecay(sample) => sample.clear(),
        }
    }
}

struct UniformState {
    count: i64,
    values: Vec<i64>,
}

pub(crate) struct UniformSample {
    size: usize,
    state: Mutex<UniformState>,
}

impl UniformSample {
    fn new(size: usize) -> Self {
        let state = UniformState { count: 0, values: Vec::with_capacity(size.min(4096)) };
        Self { size, state: Mutex::new(state) }
    }

    fn update(&self, value: i64) {
        let mut state = self.state.lock();
        state.count += 1;
        if state.values.len() < self.size {
            state.values.push(value);
            return;
        }

        let idx = rand::rng().random_range(0..state.count as u64) as usize;
        if idx < self.size {
            state.values[idx] = value;
        }
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct Prioritized {
    priority: OrderedFloat<f64>,
    value: i64,
}

struct ExpDecayState {
    count: i64,
    start: Instant,
    next_rescale: Instant,
    // Min-heap on priority: the root is the first value evicted.
    heap: BinaryHeap<Reverse<Prioritized>>,
}

pub(crate) struct ExpDecaySample {
    size: usize,
    alpha: f64,
    clock: Clock,
    state: Mutex<ExpDecayState>,
}

impl ExpDecaySample {
    fn new(size: usize, alpha: f64, clock: Clock) -> Self {
        let now = clock.now();
        let state = ExpDecayState {
            count: 0,
            start: now,
            next_rescale: now + RESCALE_THRESHOLD,
            heap: BinaryHeap::with_capacity(size.min(4096)),
        };

        Self { size, alpha, clock, state: Mutex::new(state) }
    }

    fn update(&self, value: i64) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.count += 1;

        let weight = (self.alpha * now.duration_since(state.start).as_secs_f64()).exp();
        // `random` yields [0, 1): flip it so the divisor is never zero.
        let priority = OrderedFloat(weight / (1.0 - rand::random::<f64>()));
        let entry = Reverse(Prioritized { priority, value });

        if state.heap.len() < self.size {
            state.heap.push(entry);
        } else if let Some(mut lowest) = state.heap.peek_mut() {
            if lowest.0.priority < priority {
                *lowest = entry;
            }
        }

        if now > state.next_rescale {
            self.rescale(&mut state, now);
        }
    }

    fn rescale(&self, state: &mut ExpDecayState, now: Instant) {
        let previous = state.start;
        state.start = now;
        state.next_rescale = now + RESCALE_THRESHOLD;

        let factor = (-self.alpha * now.duration_since(previous).as_secs_f64()).exp();
        let entries = std::mem::take(&mut state.heap).into_vec();
        state.heap = entries
            .into_iter()
            .map(|Reverse(entry)| {
                let priority = OrderedFloat(entry.priority.0 * factor);
                Reverse(Prioritized { priority, value: entry.value })
            })
            .collect();
    }

    fn clear(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.count = 0;
        state.heap.clear();
        state.start = now;
        state.next_rescale = now + RESCALE_THRESHOLD;
    }
}
