//! Interval histogram tempo estimation
//!
//! Quantizes the logged inter-onset intervals into fixed-width bins and
//! votes. The winning bin needs a minimum number of votes, and candidates
//! below the octave threshold get a double-tempo check: if the bin at half
//! the winning interval carries enough support, the estimate is read as
//! half notes of a faster pulse and doubled.

use super::{BpmCandidate, IntervalHistory, TempoStrategy};
use crate::config::TrackerConfig;

/// Histogram-vote tempo estimator
///
/// The bin and sum buffers span the valid interval window and are
/// allocated once; every estimate pass reuses them.
#[derive(Debug)]
pub struct HistogramEstimator {
    bin_width_ms: u16,
    min_bin_votes: u8,
    octave_bpm_threshold: f32,
    min_octave_votes: u8,
    octave_vote_ratio: f32,
    min_interval_ms: u16,
    /// Vote count per bin, reused across passes
    bins: Vec<u8>,
    /// Interval sum per bin, for per-bin means
    sums: Vec<u32>,
}

impl HistogramEstimator {
    /// Create an estimator sized for the config's BPM range
    pub fn new(config: &TrackerConfig) -> Self {
        let min_interval_ms = (60_000.0 / config.max_bpm.max(1.0)).round() as u16;
        let max_interval_ms = (60_000.0 / config.min_bpm.max(1.0))
            .min(u16::MAX as f32)
            .round() as u16;
        let bin_width_ms = config.bin_width_ms.max(1);
        let bin_count =
            ((max_interval_ms.saturating_sub(min_interval_ms)) / bin_width_ms) as usize + 1;

        Self {
            bin_width_ms,
            min_bin_votes: config.min_bin_votes,
            octave_bpm_threshold: config.octave_bpm_threshold,
            min_octave_votes: config.min_octave_votes,
            octave_vote_ratio: config.octave_vote_ratio,
            min_interval_ms,
            bins: vec![0; bin_count],
            sums: vec![0; bin_count],
        }
    }

    fn bin_index(&self, interval_ms: u16) -> Option<usize> {
        if interval_ms < self.min_interval_ms {
            return None;
        }
        let index = ((interval_ms - self.min_interval_ms) / self.bin_width_ms) as usize;
        if index < self.bins.len() {
            Some(index)
        } else {
            None
        }
    }

    fn bin_mean(&self, index: usize) -> f32 {
        let votes = self.bins[index];
        if votes == 0 {
            0.0
        } else {
            self.sums[index] as f32 / votes as f32
        }
    }
}

impl TempoStrategy for HistogramEstimator {
    fn on_onset(&mut self, _timestamp_ms: u32) {}

    fn tick(&mut self, _dt_seconds: f32) {}

    fn estimate(&mut self, intervals: &IntervalHistory) -> Option<BpmCandidate> {
        if intervals.len() < self.min_bin_votes as usize {
            return None;
        }

        self.bins.fill(0);
        self.sums.fill(0);

        for interval in intervals.iter() {
            if let Some(index) = self.bin_index(interval) {
                self.bins[index] = self.bins[index].saturating_add(1);
                self.sums[index] += interval as u32;
            }
        }

        let (best_index, best_votes) = self
            .bins
            .iter()
            .enumerate()
            .max_by_key(|(_, &votes)| votes)
            .map(|(i, &votes)| (i, votes))?;

        if best_votes < self.min_bin_votes {
            return None;
        }

        let mut period_ms = self.bin_mean(best_index);
        if period_ms <= 0.0 {
            return None;
        }
        let mut bpm = 60_000.0 / period_ms;

        // Slow candidates may be half notes of the real pulse. Promote to
        // double tempo when the half-interval bin carries real support.
        if bpm < self.octave_bpm_threshold {
            let half_ms = (period_ms / 2.0).round() as u16;
            if let Some(half_index) = self.bin_index(half_ms) {
                let half_votes = self.bins[half_index];
                if half_votes >= self.min_octave_votes
                    && half_votes as f32 >= self.octave_vote_ratio * best_votes as f32
                {
                    period_ms = self.bin_mean(half_index);
                    if period_ms > 0.0 {
                        bpm = 60_000.0 / period_ms;
                        log::debug!(
                            "Octave correction: {} half-interval votes, doubling to {:.1} BPM",
                            half_votes,
                            bpm
                        );
                    }
                }
            }
        }

        let confidence = (best_votes as f32 / intervals.len() as f32).clamp(0.0, 1.0);

        log::debug!(
            "Histogram estimate: {:.1} BPM from {} of {} intervals",
            bpm,
            best_votes,
            intervals.len()
        );

        Some(BpmCandidate { bpm, confidence })
    }

    fn reset(&mut self) {
        self.bins.fill(0);
        self.sums.fill(0);
    }
}
