use std::sync::atomic::{AtomicI64, Ordering};

/// A counter.
///
/// Holds a signed 64-bit count which can be incremented or decremented from any thread.
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicI64,
}

impl Counter {
    /// Creates a new `Counter` starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter by the given amount.
    pub fn inc(&self, value: i64) {
        self.count.fetch_add(value, Ordering::Relaxed);
    }

    /// Decrements the counter by the given amount.
    pub fn dec(&self, value: i64) {
        self.count.fetch_sub(value, Ordering::Relaxed);
    }

    /// Gets the current count.
    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Resets the counter to zero.
    pub fn clear(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::Counter;

    #[test]
    fn inc_and_dec() {
        let counter = Counter::new();
        counter.inc(12);
        counter.dec(2);
        assert_eq!(counter.count(), 10);

        counter.clear();
        assert_eq!(counter.count(), 0);
    }
}
