//! Monotonic counters and the per-kind error counter.

use crate::error::ErrorKind;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonic count exported as a Prometheus `counter`.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    help: &'static str,
    value: AtomicU64,
}

impl Counter {
    /// Create a counter starting at zero.
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            value: AtomicU64::new(0),
        }
    }

    /// Metric name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Add one.
    pub fn inc(&self) {
        self.add(1);
    }

    /// Add `n`.
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current count.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub(crate) fn write_prometheus(&self, out: &mut String) {
        let _ = writeln!(out, "# HELP {} {}", self.name, self.help);
        let _ = writeln!(out, "# TYPE {} counter", self.name);
        let _ = writeln!(out, "{} {}", self.name, self.get());
    }
}

/// Errors surfaced to callers, one slot per [`ErrorKind`].
///
/// The set of kinds is closed, so every kind is exported, zeros included,
/// under a single `kind` label.
#[derive(Debug)]
pub struct ErrorCounter {
    name: &'static str,
    help: &'static str,
    by_kind: [AtomicU64; ErrorKind::ALL.len()],
}

impl ErrorCounter {
    /// Create a counter with every kind at zero.
    pub fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            by_kind: Default::default(),
        }
    }

    /// Metric name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Count one error of `kind`.
    pub fn inc(&self, kind: ErrorKind) {
        self.by_kind[kind as usize].fetch_add(1, Ordering::Relaxed);
    }

    /// Errors of `kind` so far.
    pub fn get(&self, kind: ErrorKind) -> u64 {
        self.by_kind[kind as usize].load(Ordering::Relaxed)
    }

    /// Errors of every kind so far.
    pub fn total(&self) -> u64 {
        ErrorKind::ALL.iter().map(|&kind| self.get(kind)).sum()
    }

    pub(crate) fn write_prometheus(&self, out: &mut String) {
        let _ = writeln!(out, "# HELP {} {}", self.name, self.help);
        let _ = writeln!(out, "# TYPE {} counter", self.name);
        for kind in ErrorKind::ALL {
            let _ = writeln!(out, "{}{{kind=\"{}\"}} {}", self.name, kind, self.get(kind));
        }
    }
}
