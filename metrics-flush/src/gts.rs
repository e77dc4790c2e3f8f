use crate::{expand::Value, Sample, Tags};

/// A generic time series point: a named, tagged, optionally timestamped value.
///
/// Points only exist while a batch is being encoded. The timestamp unit is up to the backend.
#[derive(Clone, Debug, PartialEq)]
pub struct Gts {
    pub timestamp: Option<i64>,
    pub name: String,
    pub labels: Tags,
    pub value: Value,
}

impl Gts {
    /// Creates a point from an expanded sample.
    pub fn from_sample(sample: Sample, labels: &Tags, timestamp: Option<i64>) -> Self {
        Self { timestamp, name: sample.name, labels: labels.clone(), value: sample.value }
    }

    /// Prepends `prefix` and a dot to the name.
    #[must_use]
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        if !prefix.is_empty() {
            self.name = format!("{prefix}.{}", self.name);
        }
        self
    }
}
