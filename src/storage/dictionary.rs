#![forbid(unsafe_code)]

use std::cell::Cell;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::types::{LabelIdx, Result, VeilError};

/// Per-scan counters for dictionary activity.
///
/// Single-threaded by design: a dictionary is owned by exactly one
/// resolution context, so plain cells suffice.
#[derive(Debug, Default)]
pub struct DictMetrics {
    intern_calls: Cell<u64>,
    intern_hits: Cell<u64>,
    intern_misses: Cell<u64>,
    resolve_calls: Cell<u64>,
    resolve_misses: Cell<u64>,
}

/// A point-in-time copy of [`DictMetrics`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DictMetricsSnapshot {
    /// Total `intern` calls.
    pub intern_calls: u64,
    /// `intern` calls that found an existing index.
    pub intern_hits: u64,
    /// `intern` calls that assigned a new index.
    pub intern_misses: u64,
    /// Total `resolve` calls.
    pub resolve_calls: u64,
    /// `resolve` calls with an out-of-range index.
    pub resolve_misses: u64,
}

impl DictMetricsSnapshot {
    /// Fraction of intern calls that hit an existing entry.
    pub fn intern_hit_rate(&self) -> f64 {
        if self.intern_calls == 0 {
            return 0.0;
        }
        self.intern_hits as f64 / self.intern_calls as f64
    }
}

impl DictMetrics {
    fn snapshot(&self) -> DictMetricsSnapshot {
        DictMetricsSnapshot {
            intern_calls: self.intern_calls.get(),
            intern_hits: self.intern_hits.get(),
            intern_misses: self.intern_misses.get(),
            resolve_calls: self.resolve_calls.get(),
            resolve_misses: self.resolve_misses.get(),
        }
    }

    fn inc(counter: &Cell<u64>) {
        counter.set(counter.get() + 1);
    }
}

/// A scan-scoped string-interning table mapping labels and property names
/// to dense small-integer indices.
///
/// Scoped to a single scan or record batch, never a durable global
/// registry. Growth is append-only within that lifetime, and each
/// resolution context constructs its own instance; instances are never
/// shared across threads.
#[derive(Debug, Default)]
pub struct LabelDict {
    labels: Vec<String>,
    index: FxHashMap<String, LabelIdx>,
    metrics: DictMetrics,
}

impl LabelDict {
    /// Creates an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index for `label`, assigning the next unused index the
    /// first time the string is seen.
    pub fn intern(&mut self, label: &str) -> LabelIdx {
        DictMetrics::inc(&self.metrics.intern_calls);
        if let Some(&idx) = self.index.get(label) {
            DictMetrics::inc(&self.metrics.intern_hits);
            trace!(len = label.len(), idx = idx.0, "dict.intern.hit");
            return idx;
        }
        DictMetrics::inc(&self.metrics.intern_misses);
        let idx = LabelIdx(self.labels.len() as u32);
        self.labels.push(label.to_owned());
        self.index.insert(label.to_owned(), idx);
        trace!(len = label.len(), idx = idx.0, "dict.intern.insert");
        idx
    }

    /// The inverse of [`LabelDict::intern`]. An out-of-range index means
    /// the record and dictionary do not belong together and is fatal.
    pub fn resolve(&self, idx: LabelIdx) -> Result<&str> {
        DictMetrics::inc(&self.metrics.resolve_calls);
        match self.labels.get(idx.0 as usize) {
            Some(label) => Ok(label),
            None => {
                DictMetrics::inc(&self.metrics.resolve_misses);
                trace!(idx = idx.0, "dict.resolve.miss");
                Err(VeilError::InvalidLabelIndex(idx.0))
            }
        }
    }

    /// Number of interned strings.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True when nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Copies out the current metrics counters.
    pub fn metrics_snapshot(&self) -> DictMetricsSnapshot {
        self.metrics.snapshot()
    }
}
