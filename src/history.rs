// src/history.rs - Time-ordered feedback samples collected during a session
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default growth increment, one device output block
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Feedback position and velocity of one axis for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Sample {
    pub position: f64,
    pub velocity: f64,
}

impl Sample {
    pub fn new(position: f64, velocity: f64) -> Self {
        Self { position, velocity }
    }
}

impl From<(f64, f64)> for Sample {
    fn from((position, velocity): (f64, f64)) -> Self {
        Self::new(position, velocity)
    }
}

/// Append-only sample buffer. Capacity grows by `chunk_size` samples at a
/// time rather than per append.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    samples: Vec<Sample>,
    overflow: bool,
    chunk_size: usize,
}

/// Snapshot reported when a session is paused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistorySummary {
    pub count: usize,
    pub overflow: bool,
}

impl fmt::Display for HistorySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LogDataHistory: {} entries, overflow: {}",
            self.count,
            if self.overflow { "TRUE" } else { "FALSE" }
        )
    }
}

impl SampleHistory {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            samples: Vec::with_capacity(chunk_size),
            overflow: false,
            chunk_size,
        }
    }

    pub fn append(&mut self, position: f64, velocity: f64) {
        if self.samples.len() == self.samples.capacity() {
            self.samples.reserve_exact(self.chunk_size);
        }
        self.samples.push(Sample::new(position, velocity));
    }

    /// Latch the overflow flag. There is no way to clear it.
    pub fn mark_overflow(&mut self) {
        self.overflow = true;
    }

    pub fn overflow(&self) -> bool {
        self.overflow
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Sample at `index`, or a zeroed sample when `index` is past the end.
    /// Readers holding a stale length rely on this never failing.
    pub fn get(&self, index: usize) -> Sample {
        self.samples.get(index).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    pub fn summary(&self) -> HistorySummary {
        HistorySummary {
            count: self.samples.len(),
            overflow: self.overflow,
        }
    }
}

impl Default for SampleHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// History shared between a session and its acquisition thread
pub type SharedHistory = Arc<Mutex<SampleHistory>>;

pub fn shared(history: SampleHistory) -> SharedHistory {
    Arc::new(Mutex::new(history))
}

/// Lock a shared history. Every mutation is a single push or flag store, so
/// a poisoned lock still guards a consistent history and is recovered.
pub fn lock_history(history: &SharedHistory) -> MutexGuard<'_, SampleHistory> {
    history.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut history = SampleHistory::with_chunk_size(4);
        for i in 0..10 {
            history.append(i as f64, -(i as f64));
        }
        assert_eq!(history.len(), 10);
        for i in 0..10 {
            assert_eq!(history.get(i), Sample::new(i as f64, -(i as f64)));
        }
    }

    #[test]
    fn test_get_out_of_range_is_zero() {
        let mut history = SampleHistory::new();
        assert_eq!(history.get(0), Sample::new(0.0, 0.0));
        history.append(1.5, 2.5);
        assert_eq!(history.get(1), Sample::default());
        assert_eq!(history.get(usize::MAX), Sample::default());
    }

    #[test]
    fn test_capacity_grows_in_chunks() {
        let mut history = SampleHistory::with_chunk_size(8);
        assert!(history.capacity() >= 8);
        for i in 0..8 {
            history.append(i as f64, 0.0);
        }
        history.append(8.0, 0.0);
        assert!(history.capacity() >= 16);
        assert_eq!(history.len(), 9);
    }

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        let mut history = SampleHistory::with_chunk_size(0);
        assert_eq!(history.chunk_size(), 1);
        history.append(1.0, 1.0);
        history.append(2.0, 2.0);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_mark_overflow_is_idempotent() {
        let mut once = SampleHistory::new();
        once.mark_overflow();
        let mut many = SampleHistory::new();
        for _ in 0..5 {
            many.mark_overflow();
        }
        assert_eq!(once.summary(), many.summary());
        assert!(many.overflow());
    }

    #[test]
    fn test_summary_display() {
        let mut history = SampleHistory::new();
        history.append(0.0, 0.0);
        history.append(1.0, 1.0);
        assert_eq!(history.summary().to_string(), "LogDataHistory: 2 entries, overflow: FALSE");
        history.mark_overflow();
        assert_eq!(history.summary().to_string(), "LogDataHistory: 2 entries, overflow: TRUE");
    }
}
