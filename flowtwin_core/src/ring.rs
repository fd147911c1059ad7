//! Fixed-capacity metric history.
//!
//! Each station keeps one ring per metric id. Once full, every push evicts
//! the oldest sample, so a ring always holds the most recent `capacity`
//! samples in arrival order.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of samples retained per station metric.
pub const DEFAULT_METRIC_CAPACITY: usize = 60;

/// A single telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub value: f64,
    pub unit: String,
    pub timestamp_ms: u64,
}

/// Bounded FIFO of metric samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRing {
    capacity: usize,
    samples: VecDeque<MetricSample>,
}

impl MetricRing {
    /// Creates an empty ring. A capacity of 0 is bumped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends a sample, evicting the oldest one if the ring is full.
    /// Returns the evicted sample, if any.
    pub fn push(&mut self, sample: MetricSample) -> Option<MetricSample> {
        let evicted = if self.samples.len() == self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<&MetricSample> {
        self.samples.back()
    }

    /// Samples oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter()
    }

    /// Sample values oldest-first.
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }
}

impl Default for MetricRing {
    fn default() -> Self {
        Self::new(DEFAULT_METRIC_CAPACITY)
    }
}
