//! Tempo re-estimation strategies
//!
//! Convert observed onset evidence into BPM candidates using:
//! - Quantized inter-onset interval histogram with octave correction
//! - Resonating comb filter bank over tempo hypotheses
//!
//! Both run behind the [`TempoStrategy`] capability so the tracker can be
//! configured with either without caring which is active.

pub mod comb;
pub mod histogram;

use crate::ring::RingBuffer;

/// BPM candidate with confidence
#[derive(Debug, Clone)]
pub struct BpmCandidate {
    /// BPM estimate
    pub bpm: f32,

    /// Confidence score (0.0-1.0)
    pub confidence: f32,
}

/// Bounded log of inter-onset intervals
///
/// Stores intervals in milliseconds as `u16`, keeping only those inside
/// the musically valid window implied by the configured BPM range
/// (60-200 BPM gives 300-1000 ms). Overwrites the oldest entry when full.
#[derive(Debug, Clone)]
pub struct IntervalHistory {
    intervals: RingBuffer<u16>,
    min_interval_ms: u16,
    max_interval_ms: u16,
}

impl IntervalHistory {
    /// Create a log holding `capacity` intervals for the given BPM range
    ///
    /// The BPM range is assumed pre-validated by the owning config; values
    /// are still clamped so a hostile range cannot overflow the `u16`
    /// storage.
    pub fn new(capacity: usize, min_bpm: f32, max_bpm: f32) -> Self {
        let min_interval_ms = (60_000.0 / max_bpm.max(1.0)).round() as u16;
        let max_interval_ms = (60_000.0 / min_bpm.max(1.0)).min(u16::MAX as f32).round() as u16;
        Self {
            intervals: RingBuffer::with_capacity(capacity),
            min_interval_ms,
            max_interval_ms,
        }
    }

    /// Record an interval if it falls inside the valid window
    ///
    /// Returns `true` when the interval was stored. Out-of-window values
    /// (dropout gaps, double-triggered onsets) are silently discarded.
    pub fn record(&mut self, interval_ms: u32) -> bool {
        if interval_ms < self.min_interval_ms as u32 || interval_ms > self.max_interval_ms as u32 {
            return false;
        }
        self.intervals.push(interval_ms as u16);
        true
    }

    /// Number of intervals currently stored
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// True when no interval has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Mean of the stored intervals in milliseconds
    ///
    /// Returns `None` until at least one interval has been recorded.
    pub fn mean_ms(&self) -> Option<f32> {
        if self.intervals.is_empty() {
            return None;
        }
        let sum: u32 = self.intervals.iter().map(u32::from).sum();
        Some(sum as f32 / self.intervals.len() as f32)
    }

    /// The accepted interval window in milliseconds
    pub fn valid_range(&self) -> (u16, u16) {
        (self.min_interval_ms, self.max_interval_ms)
    }

    /// Iterate over the stored intervals, oldest first
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.intervals.iter()
    }

    /// Drop all stored intervals
    pub fn clear(&mut self) {
        self.intervals.clear();
    }
}

/// Capability implemented by both tempo re-estimation strategies
///
/// The tracker feeds every strategy the same evidence: beat-band onsets as
/// they arrive, elapsed time every frame, and the interval log when a
/// re-estimate is due. A strategy is free to ignore the feeds it does not
/// use; the histogram only reads the interval log, the comb bank only the
/// onset stream.
pub trait TempoStrategy: std::fmt::Debug + Send {
    /// Observe one beat-band onset
    fn on_onset(&mut self, timestamp_ms: u32);

    /// Advance internal decay by one frame
    fn tick(&mut self, dt_seconds: f32);

    /// Produce a tempo candidate from the accumulated evidence, if any
    fn estimate(&mut self, intervals: &IntervalHistory) -> Option<BpmCandidate>;

    /// Drop all accumulated evidence
    fn reset(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_window_from_bpm_range() {
        let history = IntervalHistory::new(16, 60.0, 200.0);
        assert_eq!(history.valid_range(), (300, 1000));
    }

    #[test]
    fn test_record_filters_to_window() {
        let mut history = IntervalHistory::new(16, 60.0, 200.0);

        assert!(!history.record(250), "Faster than 200 BPM must be dropped");
        assert!(history.record(300));
        assert!(history.record(500));
        assert!(history.record(1000));
        assert!(!history.record(1100), "Slower than 60 BPM must be dropped");
        assert!(!history.record(30_000), "Dropout gaps must be dropped");

        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_mean_ms() {
        let mut history = IntervalHistory::new(16, 60.0, 200.0);
        assert_eq!(history.mean_ms(), None);

        history.record(400);
        history.record(600);
        assert_eq!(history.mean_ms(), Some(500.0));
    }

    #[test]
    fn test_capacity_overwrites_oldest() {
        let mut history = IntervalHistory::new(2, 60.0, 200.0);
        history.record(400);
        history.record(500);
        history.record(600);

        assert_eq!(history.len(), 2);
        let values: Vec<u16> = history.iter().collect();
        assert_eq!(values, vec![500, 600]);
    }

    #[test]
    fn test_clear() {
        let mut history = IntervalHistory::new(4, 60.0, 200.0);
        history.record(500);
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.mean_ms(), None);
    }
}
