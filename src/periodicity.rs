//! Buffered-signal periodicity detection
//!
//! Consumes one onset-strength scalar per analysis frame and periodically
//! autocorrelates the recent history to find the dominant beat period.
//!
//! # Algorithm
//!
//! 1. Every frame, append the onset strength to a fixed ring (`add_sample`)
//! 2. At most once per configured interval, scan the lag range implied by
//!    the BPM range and score each lag with the mean product
//!    `R(L) = (1/count) * sum(s[i] * s[i-L])`
//! 3. Normalize the winning score against the buffer signal energy to get a
//!    strength in [0, 1]; below the threshold the detector holds an explicit
//!    no-pattern state
//! 4. Blend accepted periods 80/20 into the running estimate; a change of
//!    more than 10% resyncs the beat phase
//!
//! The beat phase advances from elapsed wall-clock time on every `update`
//! call, so it stays continuous between the throttled analysis passes.

use crate::config::DetectorConfig;
use crate::error::ConfigError;
use crate::ring::RingBuffer;

/// Numerical stability epsilon
const EPSILON: f32 = 1e-10;

/// Shorter lags within this fraction of the peak score win the peak pick.
/// The count normalization slightly favors lag multiples of the true
/// period, so a clean pulse train would otherwise read at half tempo.
const PEAK_TOLERANCE: f32 = 0.95;

/// Periodicity estimate produced by an autocorrelation pass
#[derive(Debug, Clone, Copy)]
pub struct PeriodicityEstimate {
    /// Beat period in milliseconds
    pub period_ms: f32,

    /// Normalized periodicity strength (0.0-1.0)
    pub strength: f32,
}

/// Throttled autocorrelation detector over an onset-strength history
///
/// Owns all of its state; time enters exclusively through the `now_ms`
/// argument of [`update`](PeriodicityDetector::update), so simulated-time
/// tests drive it deterministically. No method allocates after
/// construction and none of them can panic on hostile input.
#[derive(Debug, Clone)]
pub struct PeriodicityDetector {
    config: DetectorConfig,
    history: RingBuffer<f32>,
    /// Chronological copy of the ring, refilled per analysis pass
    scratch: Vec<f32>,
    /// Per-lag scores for the current analysis pass
    lag_scores: Vec<f32>,
    period_ms: f32,
    period_frames: usize,
    strength: f32,
    phase: f32,
    last_update_ms: Option<u32>,
    last_analysis_ms: Option<u32>,
}

impl PeriodicityDetector {
    /// Create a detector with the given configuration
    ///
    /// Allocates the onset history and the analysis scratch buffer once;
    /// nothing allocates after this returns.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration fails validation.
    pub fn new(config: DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let capacity = config.history_capacity;
        Ok(Self {
            config,
            history: RingBuffer::with_capacity(capacity),
            scratch: Vec::with_capacity(capacity),
            lag_scores: Vec::with_capacity(capacity / 2 + 1),
            period_ms: 0.0,
            period_frames: 0,
            strength: 0.0,
            phase: 0.0,
            last_update_ms: None,
            last_analysis_ms: None,
        })
    }

    /// Append one frame's onset strength to the history
    ///
    /// O(1), never blocks or allocates. Negative or non-finite values are
    /// sanitized to zero rather than rejected.
    pub fn add_sample(&mut self, strength: f32) {
        let value = if strength.is_finite() && strength > 0.0 {
            strength
        } else {
            0.0
        };
        self.history.push(value);
    }

    /// Advance the beat phase and, when due, re-run the periodicity analysis
    ///
    /// The phase advances by elapsed wall-clock time modulo the current
    /// period on every invocation. The autocorrelation pass itself runs at
    /// most once per configured interval and only once the history is full.
    ///
    /// # Arguments
    ///
    /// * `now_ms` - Caller's monotonic millisecond timestamp (wrap-safe)
    /// * `frame_rate` - Analysis frame rate in Hz, for the lag conversion
    ///
    /// # Returns
    ///
    /// `true` while a periodic pattern is currently detected
    pub fn update(&mut self, now_ms: u32, frame_rate: f32) -> bool {
        if let Some(last) = self.last_update_ms {
            let elapsed_ms = now_ms.wrapping_sub(last) as f32;
            if self.period_ms > 0.0 {
                self.phase = (self.phase + elapsed_ms / self.period_ms).fract();
            }
        }
        self.last_update_ms = Some(now_ms);

        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return self.has_pattern();
        }

        if !self.history.is_full() {
            return self.has_pattern();
        }

        let due = match self.last_analysis_ms {
            None => true,
            Some(t) => now_ms.wrapping_sub(t) >= self.config.analysis_interval_ms,
        };
        if !due {
            return self.has_pattern();
        }
        self.last_analysis_ms = Some(now_ms);

        self.analyze(1000.0 / frame_rate);
        self.has_pattern()
    }

    /// Run one autocorrelation pass over the full history
    fn analyze(&mut self, frame_period_ms: f32) {
        self.scratch.clear();
        self.scratch.extend(self.history.iter());
        let len = self.scratch.len();

        let lag_min = ((60_000.0 / (self.config.max_bpm * frame_period_ms)).ceil() as usize).max(2);
        let lag_max =
            ((60_000.0 / (self.config.min_bpm * frame_period_ms)).floor() as usize).min(len / 2);

        if lag_min > lag_max {
            log::warn!(
                "Degenerate lag range [{}, {}] for {} frames at {:.2} ms/frame",
                lag_min,
                lag_max,
                len,
                frame_period_ms
            );
            return;
        }

        let energy: f32 =
            self.scratch.iter().map(|s| s * s).sum::<f32>() / len.max(1) as f32;
        if energy < EPSILON {
            self.clear_estimate();
            return;
        }

        self.lag_scores.clear();
        for lag in lag_min..=lag_max {
            let count = len - lag;
            let mut sum = 0.0f32;
            for i in lag..len {
                sum += self.scratch[i] * self.scratch[i - lag];
            }
            self.lag_scores.push(sum / count as f32);
        }

        let max_score = self.lag_scores.iter().copied().fold(0.0f32, f32::max);

        // Shortest lag within tolerance of the peak wins.
        let mut best_lag = 0usize;
        let mut best_score = 0.0f32;
        for (i, &score) in self.lag_scores.iter().enumerate() {
            if score >= max_score * PEAK_TOLERANCE {
                best_lag = lag_min + i;
                best_score = score;
                break;
            }
        }

        let strength = (best_score / energy).clamp(0.0, 1.0);
        if best_lag == 0 || strength < self.config.min_strength {
            if self.has_pattern() {
                log::debug!(
                    "Periodicity lost: strength {:.3} below {:.3}",
                    strength,
                    self.config.min_strength
                );
            }
            self.clear_estimate();
            return;
        }

        let new_period = best_lag as f32 * frame_period_ms;
        if self.period_ms <= 0.0 {
            self.period_ms = new_period;
            self.period_frames = best_lag;
            self.phase = 0.0;
        } else {
            let relative_change = (new_period - self.period_ms).abs() / self.period_ms;
            let blend = self.config.period_blend;
            self.period_ms = self.period_ms * (1.0 - blend) + new_period * blend;
            self.period_frames = best_lag;
            if relative_change > self.config.resync_threshold {
                log::debug!(
                    "Period changed {:.1}%, resyncing phase",
                    relative_change * 100.0
                );
                self.phase = 0.0;
            }
        }
        self.strength = strength;

        log::debug!(
            "Periodicity: {:.1} ms ({:.1} BPM), strength {:.3}",
            self.period_ms,
            self.detected_bpm(),
            self.strength
        );
    }

    fn clear_estimate(&mut self) {
        self.period_ms = 0.0;
        self.period_frames = 0;
        self.strength = 0.0;
        self.phase = 0.0;
    }

    /// True while a periodic pattern is currently detected
    pub fn has_pattern(&self) -> bool {
        self.period_ms > 0.0
    }

    /// Detected tempo in BPM, 0.0 when no pattern is held
    pub fn detected_bpm(&self) -> f32 {
        if self.period_ms > 0.0 {
            60_000.0 / self.period_ms
        } else {
            0.0
        }
    }

    /// Current periodicity estimate, if any
    pub fn estimate(&self) -> Option<PeriodicityEstimate> {
        if self.has_pattern() {
            Some(PeriodicityEstimate {
                period_ms: self.period_ms,
                strength: self.strength,
            })
        } else {
            None
        }
    }

    /// Detected beat period in milliseconds, 0.0 when no pattern is held
    pub fn period_ms(&self) -> f32 {
        self.period_ms
    }

    /// Normalized periodicity strength (0.0-1.0)
    pub fn strength(&self) -> f32 {
        self.strength
    }

    /// Position within the beat cycle (0.0-1.0, 0 = on the beat)
    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Estimate how likely the engine is currently on a beat
    ///
    /// Combines the level of the most recent sample relative to the mean
    /// over the last detected period with a raised-cosine window on the
    /// beat phase, scaled by the periodicity strength. Returns 0.0 while no
    /// pattern is held; the result is always in [0, 1].
    pub fn beat_likelihood(&self) -> f32 {
        if !self.has_pattern() || self.period_frames == 0 {
            return 0.0;
        }

        let window_len = self.period_frames.min(self.history.len());
        if window_len == 0 {
            return 0.0;
        }
        let mut sum = 0.0f32;
        for i in 0..window_len {
            sum += self.history.recent(i).unwrap_or(0.0);
        }
        let mean = sum / window_len as f32;
        let latest = self.history.latest().unwrap_or(0.0);
        let level = (latest / mean.max(EPSILON) / 2.0).clamp(0.0, 1.0);

        let window = 0.5 * (1.0 + (self.phase * std::f32::consts::TAU).cos());

        (self.strength * (0.5 * level + 0.5 * window)).clamp(0.0, 1.0)
    }

    /// Check whether a past frame looks like a beat in hindsight
    ///
    /// Compares the sample `frames_ago` frames back against the average of
    /// its two immediate neighbors; it is confirmed when it exceeds that
    /// average by `ratio`.
    ///
    /// # Arguments
    ///
    /// * `frames_ago` - How many frames back to look (0 = newest)
    /// * `ratio` - Required excess over the neighbor average (e.g. 1.5)
    ///
    /// # Returns
    ///
    /// `false` whenever either neighbor is missing or `ratio` is unusable
    pub fn confirm_past_beat(&self, frames_ago: usize, ratio: f32) -> bool {
        if !ratio.is_finite() || ratio <= 0.0 || frames_ago == 0 {
            return false;
        }

        let newer = match self.history.recent(frames_ago - 1) {
            Some(v) => v,
            None => return false,
        };
        let older = match self.history.recent(frames_ago + 1) {
            Some(v) => v,
            None => return false,
        };
        let sample = match self.history.recent(frames_ago) {
            Some(v) => v,
            None => return false,
        };

        let neighbor_avg = (newer + older) / 2.0;
        sample > neighbor_avg * ratio && sample > EPSILON
    }

    /// Restore the detector to its freshly constructed state
    ///
    /// Idempotent; keeps all buffers allocated.
    pub fn reset(&mut self) {
        self.history.clear();
        self.clear_estimate();
        self.last_update_ms = None;
        self.last_analysis_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_RATE: f32 = 60.0;

    fn detector() -> PeriodicityDetector {
        PeriodicityDetector::new(DetectorConfig::default()).unwrap()
    }

    /// Fill the history with a unit impulse every `spacing` frames
    fn fill_impulse_train(d: &mut PeriodicityDetector, spacing: usize, frames: usize) {
        for i in 0..frames {
            let value = if i % spacing == 0 { 1.0 } else { 0.05 };
            d.add_sample(value);
        }
    }

    #[test]
    fn test_impulse_train_reads_120_bpm() {
        let mut d = detector();
        // 30 frames at 60 Hz = 500 ms = 120 BPM
        fill_impulse_train(&mut d, 30, 256);

        assert!(d.update(5000, FRAME_RATE));
        assert!(
            (d.detected_bpm() - 120.0).abs() < 5.0,
            "Detected BPM should be close to 120, got {:.2}",
            d.detected_bpm()
        );
        assert!(
            d.strength() > 0.5,
            "Strength should be strong for a clean pulse train, got {:.3}",
            d.strength()
        );
    }

    #[test]
    fn test_no_analysis_until_history_full() {
        let mut d = detector();
        fill_impulse_train(&mut d, 30, 100);

        assert!(!d.update(5000, FRAME_RATE));
        assert_eq!(d.detected_bpm(), 0.0);
        assert!(!d.has_pattern());
    }

    #[test]
    fn test_analysis_is_throttled() {
        let mut d = detector();
        fill_impulse_train(&mut d, 30, 256);
        assert!(d.update(5000, FRAME_RATE));
        let first_bpm = d.detected_bpm();

        // Overwrite with a much faster pulse train; nothing may change
        // until the throttle interval has elapsed.
        fill_impulse_train(&mut d, 20, 256);
        assert!(d.update(5500, FRAME_RATE));
        assert_eq!(d.detected_bpm(), first_bpm);

        assert!(d.update(6100, FRAME_RATE));
        assert!(
            d.detected_bpm() > first_bpm + 1.0,
            "Re-analysis should pull the estimate toward the faster train, got {:.2}",
            d.detected_bpm()
        );
    }

    #[test]
    fn test_large_period_change_resyncs_phase() {
        let mut d = detector();
        fill_impulse_train(&mut d, 30, 256);
        assert!(d.update(5000, FRAME_RATE));

        // Drift the phase off zero first.
        d.update(5250, FRAME_RATE);
        assert!(d.phase() > 0.1);

        // 20-frame spacing is a 33% period change: well past the resync
        // threshold, so the phase snaps back to zero.
        fill_impulse_train(&mut d, 20, 256);
        d.update(6100, FRAME_RATE);
        assert_eq!(d.phase(), 0.0);
    }

    #[test]
    fn test_phase_advances_between_analyses() {
        let mut d = detector();
        fill_impulse_train(&mut d, 30, 256);
        assert!(d.update(5000, FRAME_RATE));
        assert_eq!(d.phase(), 0.0);

        // Half a 500 ms beat later the phase sits at 0.5.
        d.update(5250, FRAME_RATE);
        assert!(
            (d.phase() - 0.5).abs() < 0.01,
            "Phase should be ~0.5 half a period later, got {:.3}",
            d.phase()
        );
    }

    #[test]
    fn test_aperiodic_spikes_clear_state() {
        let mut d = detector();
        fill_impulse_train(&mut d, 30, 256);
        assert!(d.update(5000, FRAME_RATE));

        // Accelerando spikes: every gap occurs once, so no lag dominates.
        let mut next = 0usize;
        let mut gap = 20usize;
        for i in 0..256usize {
            let spike = i == next;
            if spike {
                gap += 1;
                next += gap;
            }
            d.add_sample(if spike { 1.0 } else { 0.0 });
        }
        assert!(!d.update(6100, FRAME_RATE));
        assert!(!d.has_pattern());
        assert_eq!(d.strength(), 0.0);
        assert_eq!(d.phase(), 0.0);
    }

    #[test]
    fn test_silence_clears_state() {
        let mut d = detector();
        fill_impulse_train(&mut d, 30, 256);
        assert!(d.update(5000, FRAME_RATE));

        for _ in 0..256 {
            d.add_sample(0.0);
        }
        assert!(!d.update(6100, FRAME_RATE));
        assert!(!d.has_pattern());
    }

    #[test]
    fn test_hostile_samples_do_not_poison_analysis() {
        let mut d = detector();
        for _ in 0..256 {
            d.add_sample(f32::NAN);
            d.add_sample(-3.0);
            d.add_sample(f32::INFINITY);
        }

        assert!(!d.update(5000, FRAME_RATE));
        assert!(!d.has_pattern());
        assert!(d.strength().is_finite());
    }

    #[test]
    fn test_beat_likelihood_peaks_on_the_beat() {
        let mut d = detector();
        fill_impulse_train(&mut d, 30, 256);
        // The train ends 15 frames after its last impulse; push a final
        // impulse so the newest sample sits on a beat.
        for i in 0..30 {
            d.add_sample(if i == 29 { 1.0 } else { 0.05 });
        }
        assert!(d.update(5000, FRAME_RATE));

        let on_beat = d.beat_likelihood();
        assert!(
            on_beat > 0.5,
            "Likelihood at phase 0 with a fresh impulse should be high, got {:.3}",
            on_beat
        );

        // Half a period later with a quiet newest sample.
        d.add_sample(0.0);
        d.update(5250, FRAME_RATE);
        let off_beat = d.beat_likelihood();
        assert!(
            off_beat < on_beat,
            "Off-beat likelihood {:.3} should fall below on-beat {:.3}",
            off_beat,
            on_beat
        );
    }

    #[test]
    fn test_beat_likelihood_zero_without_pattern() {
        let d = detector();
        assert_eq!(d.beat_likelihood(), 0.0);
    }

    #[test]
    fn test_confirm_past_beat() {
        let mut d = detector();
        for value in [0.1f32, 0.1, 1.0, 0.1, 0.1] {
            d.add_sample(value);
        }

        // recent(2) is the 1.0 spike; its neighbors average 0.1.
        assert!(d.confirm_past_beat(2, 1.5));
        assert!(!d.confirm_past_beat(1, 1.5));
        assert!(!d.confirm_past_beat(0, 1.5));
        assert!(!d.confirm_past_beat(4, 1.5), "Oldest sample has no older neighbor");
        assert!(!d.confirm_past_beat(10, 1.5));
        assert!(!d.confirm_past_beat(2, f32::NAN));
        assert!(!d.confirm_past_beat(2, 0.0));
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut d = detector();
        fill_impulse_train(&mut d, 30, 256);
        assert!(d.update(5000, FRAME_RATE));

        d.reset();
        assert!(!d.has_pattern());
        assert_eq!(d.detected_bpm(), 0.0);
        assert_eq!(d.phase(), 0.0);

        let snapshot = format!("{:?}", d);
        d.reset();
        assert_eq!(format!("{:?}", d), snapshot);
    }
}
