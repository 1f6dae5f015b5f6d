//! Phase-locked loop period correction
//!
//! A small PI controller over the beat cycle. Each onset lands at some
//! phase within the current beat; the wrapped phase error drives a
//! proportional term for immediate correction and an integral term that
//! absorbs a steady tempo offset. The caller applies the output as
//! `period_ms *= 1.0 - correction`.

use crate::config::TrackerConfig;

/// PI controller locking the beat grid onto incoming onsets
#[derive(Debug)]
pub struct PllCorrector {
    kp: f32,
    ki: f32,
    integral_limit: f32,
    max_correction: f32,
    error_integral: f32,
}

impl PllCorrector {
    /// Create a corrector with the gains from a validated config
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            kp: config.kp,
            ki: config.ki,
            integral_limit: config.integral_limit,
            max_correction: config.max_correction,
            error_integral: 0.0,
        }
    }

    /// Wrap a beat phase into a signed cycle error in [-0.5, 0.5]
    ///
    /// Positive when the onset leads the next predicted beat, so the
    /// period must shrink; negative when it trails the previous one.
    pub fn phase_error(phase: f32) -> f32 {
        if phase > 0.5 {
            1.0 - phase
        } else {
            -phase
        }
    }

    /// Run one onset through the loop and return the period correction
    ///
    /// The integral is clamped before the output so a long misaligned
    /// stretch cannot wind it up past recovery, and the combined
    /// correction is clamped so a single onset can only move the period
    /// by a bounded fraction.
    pub fn correct(&mut self, phase: f32) -> f32 {
        // A non-finite phase is treated as on-beat rather than allowed to
        // poison the integral.
        let phase = if phase.is_finite() {
            phase.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let error = Self::phase_error(phase);

        self.error_integral =
            (self.error_integral + error).clamp(-self.integral_limit, self.integral_limit);

        let correction = self.kp * error + self.ki * self.error_integral;
        correction.clamp(-self.max_correction, self.max_correction)
    }

    /// Bleed off part of the accumulated integral
    pub fn decay_integral(&mut self, factor: f32) {
        self.error_integral *= factor.clamp(0.0, 1.0);
    }

    /// Current accumulated error integral
    pub fn error_integral(&self) -> f32 {
        self.error_integral
    }

    /// Clear all accumulated state
    pub fn reset(&mut self) {
        self.error_integral = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corrector() -> PllCorrector {
        PllCorrector::new(&TrackerConfig::default())
    }

    #[test]
    fn test_phase_error_wraps_to_half_cycle() {
        assert_eq!(PllCorrector::phase_error(0.0), 0.0);
        assert!((PllCorrector::phase_error(0.25) - (-0.25)).abs() < 1e-6);
        assert!((PllCorrector::phase_error(0.75) - 0.25).abs() < 1e-6);
        assert!((PllCorrector::phase_error(0.99) - 0.01).abs() < 1e-5);
    }

    #[test]
    fn test_leading_onset_shrinks_period() {
        let mut pll = corrector();
        // Onset just before the predicted beat: the real beat is early,
        // so the correction must be positive (period *= 1 - c shrinks).
        let correction = pll.correct(0.9);
        assert!(
            correction > 0.0,
            "Early onset should shrink the period, got {:.4}",
            correction
        );
    }

    #[test]
    fn test_trailing_onset_grows_period() {
        let mut pll = corrector();
        let correction = pll.correct(0.1);
        assert!(
            correction < 0.0,
            "Late onset should grow the period, got {:.4}",
            correction
        );
    }

    #[test]
    fn test_on_beat_onset_is_neutral() {
        let mut pll = corrector();
        assert_eq!(pll.correct(0.0), 0.0);
        assert_eq!(pll.error_integral(), 0.0);
    }

    #[test]
    fn test_correction_is_clamped() {
        let config = TrackerConfig {
            kp: 10.0,
            ..TrackerConfig::default()
        };
        let mut pll = PllCorrector::new(&config);
        let correction = pll.correct(0.5);
        assert!(
            correction.abs() <= config.max_correction + 1e-6,
            "Correction {:.3} exceeds clamp {:.3}",
            correction,
            config.max_correction
        );
    }

    #[test]
    fn test_integral_windup_is_clamped() {
        let mut pll = corrector();
        // A long run of maximally late onsets.
        for _ in 0..100 {
            pll.correct(0.5);
        }
        assert!(
            pll.error_integral().abs() <= 1.0 + 1e-6,
            "Integral wound up to {:.3}",
            pll.error_integral()
        );
    }

    #[test]
    fn test_integral_accumulates_steady_offset() {
        let mut pll = corrector();
        let first = pll.correct(0.9);
        let second = pll.correct(0.9);
        assert!(
            second > first,
            "Repeated offset should grow the correction: {:.4} then {:.4}",
            first,
            second
        );
    }

    #[test]
    fn test_decay_integral() {
        let mut pll = corrector();
        pll.correct(0.9);
        pll.correct(0.9);
        let before = pll.error_integral();
        pll.decay_integral(0.5);
        assert!((pll.error_integral() - before * 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_hostile_phase_is_clamped() {
        let mut pll = corrector();
        let correction = pll.correct(f32::NAN);
        assert!(
            correction.is_finite(),
            "NaN phase must not poison the loop"
        );
        let correction = pll.correct(5.0);
        assert!(correction.is_finite());
    }

    #[test]
    fn test_reset_clears_integral() {
        let mut pll = corrector();
        pll.correct(0.9);
        pll.reset();
        assert_eq!(pll.error_integral(), 0.0);
    }
}
