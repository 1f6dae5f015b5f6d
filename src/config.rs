//! Configuration parameters for the beat tracking engine

use crate::error::ConfigError;
use crate::tracker::OnsetBand;

/// Tempo re-estimation strategy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempoStrategyKind {
    /// Quantized inter-onset interval histogram with octave correction
    Histogram,
    /// Resonating comb filter bank over tempo hypotheses
    CombBank,
}

/// Periodicity detector configuration parameters
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Onset history capacity in frames (default: 256, ~4.3s at 60 Hz)
    pub history_capacity: usize,

    /// Minimum BPM to consider (default: 60.0)
    pub min_bpm: f32,

    /// Maximum BPM to consider (default: 200.0)
    pub max_bpm: f32,

    /// Minimum time between autocorrelation passes in ms (default: 1000)
    pub analysis_interval_ms: u32,

    /// Minimum normalized periodicity strength to accept a period (default: 0.3)
    /// Below this the detector reports no pattern at all
    pub min_strength: f32,

    /// Weight of a new period estimate when blending into the old one (default: 0.2)
    pub period_blend: f32,

    /// Relative period change that forces a phase resync (default: 0.1)
    pub resync_threshold: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 256,
            min_bpm: 60.0,
            max_bpm: 200.0,
            analysis_interval_ms: 1000,
            min_strength: 0.3,
            period_blend: 0.2,
            resync_threshold: 0.1,
        }
    }
}

impl DetectorConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the BPM range is inverted or non-finite, the
    /// history capacity is too small to hold a full lag range, or any
    /// threshold is outside its documented bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity < 8 {
            return Err(ConfigError::InvalidCapacity(format!(
                "History capacity too small: {}",
                self.history_capacity
            )));
        }

        validate_bpm_range(self.min_bpm, self.max_bpm)?;

        if !self.min_strength.is_finite() || !(0.0..=1.0).contains(&self.min_strength) {
            return Err(ConfigError::InvalidParameter(format!(
                "Minimum strength must be in [0, 1], got {:.3}",
                self.min_strength
            )));
        }

        if !self.period_blend.is_finite() || self.period_blend <= 0.0 || self.period_blend > 1.0 {
            return Err(ConfigError::InvalidParameter(format!(
                "Period blend must be in (0, 1], got {:.3}",
                self.period_blend
            )));
        }

        if !self.resync_threshold.is_finite() || self.resync_threshold <= 0.0 {
            return Err(ConfigError::InvalidParameter(format!(
                "Resync threshold must be positive, got {:.3}",
                self.resync_threshold
            )));
        }

        Ok(())
    }
}

/// Phase-locked tracker configuration parameters
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    // Tempo range
    /// Minimum BPM to consider (default: 60.0)
    pub min_bpm: f32,

    /// Maximum BPM to consider (default: 200.0)
    pub max_bpm: f32,

    /// Starting tempo before any evidence arrives (default: 120.0)
    pub initial_bpm: f32,

    // Phase-locked loop
    /// Proportional gain on the wrapped phase error (default: 0.4)
    pub kp: f32,

    /// Integral gain on the accumulated phase error (default: 0.05)
    pub ki: f32,

    /// Proportional gain pulling the beat phase toward each onset (default: 0.5)
    /// Must exceed `kp` or the loop oscillates instead of converging
    pub phase_kp: f32,

    /// Symmetric clamp on the error integral, anti-windup (default: 1.0)
    pub integral_limit: f32,

    /// Symmetric clamp on a single period correction (default: 0.2)
    pub max_correction: f32,

    // Confidence gate
    /// Phase error magnitude below which an onset counts as stable (default: 0.1)
    pub stability_threshold: f32,

    /// Confidence change per aligned/misaligned/missed beat (default: 0.15)
    pub confidence_step: f32,

    /// Confidence needed to activate; deactivation at half of this (default: 0.6)
    pub activation_threshold: f32,

    /// Consecutive stable beats required before activating (default: 4)
    pub min_beats_to_activate: u8,

    /// Missed beats that force deactivation (default: 8)
    pub max_missed_beats: u8,

    // Onset handling
    /// Band whose onsets drive the loop; other bands are secondary evidence
    /// (default: Low)
    pub follow_band: OnsetBand,

    /// Inter-onset interval log capacity (default: 16)
    pub interval_capacity: usize,

    /// Beat-band onsets between tempo re-estimates (default: 8)
    pub estimate_interval_onsets: u8,

    // Tempo re-estimation
    /// Which estimation strategy to run (default: Histogram)
    pub strategy: TempoStrategyKind,

    /// Histogram bin width in ms (default: 25)
    pub bin_width_ms: u16,

    /// Votes a histogram bin needs to win (default: 3)
    pub min_bin_votes: u8,

    /// Candidates below this BPM get the double-tempo check (default: 100.0)
    pub octave_bpm_threshold: f32,

    /// Absolute votes the half-interval bin needs (default: 2)
    pub min_octave_votes: u8,

    /// Half-interval votes as a fraction of the main peak (default: 0.6)
    pub octave_vote_ratio: f32,

    /// Comb bank hypothesis spacing in BPM (default: 2.0)
    pub comb_resolution_bpm: f32,

    /// Comb resonator feedback coefficient, higher is sharper (default: 0.85)
    pub comb_feedback: f32,

    /// Comb energy decay per second (default: 0.5)
    pub comb_decay_rate: f32,

    /// Normalized phase distance inside which an onset feeds a resonator
    /// (default: 0.15)
    pub comb_alignment_tolerance: f32,

    // Lock discipline
    /// Confidence at which the tempo locks (default: 0.8)
    pub lock_threshold: f32,

    /// Confidence below which the lock releases (default: 0.4)
    pub unlock_threshold: f32,

    /// Largest re-estimate step in BPM while locked (default: 2.0)
    pub max_locked_drift_bpm: f32,

    // External guidance
    /// Minimum guidance confidence to consider at all (default: 0.7)
    pub guidance_min_confidence: f32,

    /// Largest relative difference accepted without an octave relation
    /// (default: 0.2)
    pub guidance_max_ratio: f32,

    /// Tolerance around exactly double/half for the octave relation
    /// (default: 0.1)
    pub guidance_octave_tolerance: f32,

    /// Hard cap on the guidance blend weight (default: 0.3)
    pub guidance_blend_cap: f32,

    /// Factor applied to the PLL integral on accepted guidance (default: 0.5)
    pub guidance_integral_decay: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_bpm: 60.0,
            max_bpm: 200.0,
            initial_bpm: 120.0,
            kp: 0.4,
            ki: 0.05,
            phase_kp: 0.5,
            integral_limit: 1.0,
            max_correction: 0.2,
            stability_threshold: 0.1,
            confidence_step: 0.15,
            activation_threshold: 0.6,
            min_beats_to_activate: 4,
            max_missed_beats: 8,
            follow_band: OnsetBand::Low,
            interval_capacity: 16,
            estimate_interval_onsets: 8,
            strategy: TempoStrategyKind::Histogram,
            bin_width_ms: 25,
            min_bin_votes: 3,
            octave_bpm_threshold: 100.0,
            min_octave_votes: 2,
            octave_vote_ratio: 0.6,
            comb_resolution_bpm: 2.0,
            comb_feedback: 0.85,
            comb_decay_rate: 0.5,
            comb_alignment_tolerance: 0.15,
            lock_threshold: 0.8,
            unlock_threshold: 0.4,
            max_locked_drift_bpm: 2.0,
            guidance_min_confidence: 0.7,
            guidance_max_ratio: 0.2,
            guidance_octave_tolerance: 0.1,
            guidance_blend_cap: 0.3,
            guidance_integral_decay: 0.5,
        }
    }
}

impl TrackerConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the BPM range is inverted, the initial tempo
    /// falls outside it, a capacity is zero, or any gain or threshold is
    /// non-finite or out of bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_bpm_range(self.min_bpm, self.max_bpm)?;

        if !self.initial_bpm.is_finite()
            || self.initial_bpm < self.min_bpm
            || self.initial_bpm > self.max_bpm
        {
            return Err(ConfigError::InvalidRange(format!(
                "Initial BPM {:.1} outside [{:.1}, {:.1}]",
                self.initial_bpm, self.min_bpm, self.max_bpm
            )));
        }

        if self.interval_capacity == 0 {
            return Err(ConfigError::InvalidCapacity(
                "Interval capacity must be > 0".to_string(),
            ));
        }

        if self.estimate_interval_onsets == 0 {
            return Err(ConfigError::InvalidParameter(
                "Estimate interval must be > 0 onsets".to_string(),
            ));
        }

        if self.bin_width_ms == 0 {
            return Err(ConfigError::InvalidParameter(
                "Histogram bin width must be > 0 ms".to_string(),
            ));
        }

        for (name, value) in [
            ("kp", self.kp),
            ("ki", self.ki),
            ("integral_limit", self.integral_limit),
            ("max_correction", self.max_correction),
            ("comb_resolution_bpm", self.comb_resolution_bpm),
            ("comb_decay_rate", self.comb_decay_rate),
            ("max_locked_drift_bpm", self.max_locked_drift_bpm),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidParameter(format!(
                    "{} must be finite and non-negative, got {:.3}",
                    name, value
                )));
            }
        }

        if self.comb_resolution_bpm <= 0.0 {
            return Err(ConfigError::InvalidParameter(format!(
                "Comb resolution must be > 0 BPM, got {:.3}",
                self.comb_resolution_bpm
            )));
        }

        for (name, value) in [
            ("phase_kp", self.phase_kp),
            ("stability_threshold", self.stability_threshold),
            ("confidence_step", self.confidence_step),
            ("activation_threshold", self.activation_threshold),
            ("comb_feedback", self.comb_feedback),
            ("comb_alignment_tolerance", self.comb_alignment_tolerance),
            ("lock_threshold", self.lock_threshold),
            ("unlock_threshold", self.unlock_threshold),
            ("guidance_min_confidence", self.guidance_min_confidence),
            ("guidance_max_ratio", self.guidance_max_ratio),
            ("guidance_octave_tolerance", self.guidance_octave_tolerance),
            ("guidance_blend_cap", self.guidance_blend_cap),
            ("guidance_integral_decay", self.guidance_integral_decay),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidParameter(format!(
                    "{} must be in [0, 1], got {:.3}",
                    name, value
                )));
            }
        }

        if self.unlock_threshold > self.lock_threshold {
            return Err(ConfigError::InvalidRange(format!(
                "Unlock threshold {:.2} above lock threshold {:.2}",
                self.unlock_threshold, self.lock_threshold
            )));
        }

        Ok(())
    }
}

/// Engine facade configuration parameters
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Periodicity detector parameters
    pub detector: DetectorConfig,

    /// Phase-locked tracker parameters
    pub tracker: TrackerConfig,

    /// Analysis frame rate in Hz used for the lag conversion (default: 60.0)
    pub frame_rate: f32,

    /// Weight of the tracker confidence in the fused pattern confidence;
    /// the periodicity strength gets the remainder (default: 0.6)
    pub tracker_weight: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            tracker: TrackerConfig::default(),
            frame_rate: 60.0,
            tracker_weight: 0.6,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration, including both nested configs
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` from the first failing check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector.validate()?;
        self.tracker.validate()?;

        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(ConfigError::InvalidParameter(format!(
                "Frame rate must be positive, got {:.1}",
                self.frame_rate
            )));
        }

        if !self.tracker_weight.is_finite() || !(0.0..=1.0).contains(&self.tracker_weight) {
            return Err(ConfigError::InvalidParameter(format!(
                "Tracker weight must be in [0, 1], got {:.3}",
                self.tracker_weight
            )));
        }

        Ok(())
    }
}

fn validate_bpm_range(min_bpm: f32, max_bpm: f32) -> Result<(), ConfigError> {
    if !min_bpm.is_finite() || !max_bpm.is_finite() || min_bpm <= 0.0 || min_bpm >= max_bpm {
        return Err(ConfigError::InvalidRange(format!(
            "Invalid BPM range: [{:.1}, {:.1}]",
            min_bpm, max_bpm
        )));
    }
    Ok(())
}
