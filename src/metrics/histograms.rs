//! Latency histogram.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A cumulative-bucket histogram of observed values.
#[derive(Debug)]
pub struct Histogram {
    name: &'static str,
    help: &'static str,
    buckets: Vec<f64>,
    bucket_counts: Vec<AtomicU64>,
    // f64 bits
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Create a histogram with the given upper bounds.
    pub fn with_buckets(name: &'static str, help: &'static str, mut buckets: Vec<f64>) -> Self {
        buckets.retain(|b| b.is_finite());
        buckets.sort_by(f64::total_cmp);
        let bucket_counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();

        Self {
            name,
            help,
            buckets,
            bucket_counts,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Get the histogram name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Get the histogram help text.
    pub fn help(&self) -> &'static str {
        self.help
    }

    /// Observe a value.
    pub fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);

        let mut current = self.sum.load(Ordering::Relaxed);
        loop {
            let new_sum = (f64::from_bits(current) + value).to_bits();
            match self.sum.compare_exchange_weak(
                current,
                new_sum,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        for (upper, count) in self.buckets.iter().zip(&self.bucket_counts) {
            if value <= *upper {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Observe a duration in seconds.
    pub fn observe_duration(&self, duration: Duration) {
        self.observe(duration.as_secs_f64());
    }

    /// Get a snapshot of the histogram data.
    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            buckets: self.buckets.clone(),
            bucket_counts: self
                .bucket_counts
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect(),
            sum: f64::from_bits(self.sum.load(Ordering::Relaxed)),
            count: self.count.load(Ordering::Relaxed),
        }
    }
}

/// A snapshot of histogram data.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// Bucket upper bounds.
    pub buckets: Vec<f64>,
    /// Count of observations <= each bound.
    pub bucket_counts: Vec<u64>,
    /// Sum of all observations.
    pub sum: f64,
    /// Total count of observations.
    pub count: u64,
}

impl HistogramSnapshot {
    /// Mean of the observations, 0 when empty.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}
