use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// An integer gauge.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    /// Creates a new `Gauge` set to zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the gauge to the given value.
    pub fn update(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Gets the current value.
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A floating-point gauge.
///
/// The value is stored as its bit representation so that it can be updated atomically.
#[derive(Debug)]
pub struct GaugeF64 {
    bits: AtomicU64,
}

impl GaugeF64 {
    /// Creates a new `GaugeF64` set to zero.
    pub fn new() -> Self {
        Self { bits: AtomicU64::new(0.0f64.to_bits()) }
    }

    /// Sets the gauge to the given value.
    pub fn update(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Adds the given amount to the gauge.
    pub fn add(&self, value: f64) {
        let _ = self.bits.fetch_update(Ordering::AcqRel, Ordering::Relaxed, |current| {
            Some((f64::from_bits(current) + value).to_bits())
        });
    }

    /// Gets the current value.
    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl Default for GaugeF64 {
    fn default() -> Self {
        Self::new()
    }
}
