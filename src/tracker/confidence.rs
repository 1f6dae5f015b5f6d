//! Hysteretic confidence gate
//!
//! Tracks how well incoming onsets agree with the predicted beat grid and
//! gates the externally visible "music detected" state on that evidence.
//!
//! # State Machine
//!
//! 1. **Inactive -> Active**: confidence has reached the activation
//!    threshold AND enough consecutive stable beats have been seen
//! 2. **Active -> Inactive**: confidence has collapsed below half the
//!    activation threshold OR too many beats were missed in a row
//!
//! The asymmetric thresholds form a hysteresis band so the state does not
//! chatter while the evidence hovers near the activation level.

use crate::config::TrackerConfig;

/// Fraction of the activation threshold below which an active gate drops
const DEACTIVATION_RATIO: f32 = 0.5;

/// Evidence accumulator gating the active state
#[derive(Debug)]
pub struct ConfidenceGate {
    confidence: f32,
    stable_beats: u8,
    missed_beats: u8,
    active: bool,
    confidence_step: f32,
    activation_threshold: f32,
    min_beats_to_activate: u8,
    max_missed_beats: u8,
}

impl ConfidenceGate {
    /// Create a gate with the thresholds from a validated config
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            confidence: 0.0,
            stable_beats: 0,
            missed_beats: 0,
            active: false,
            confidence_step: config.confidence_step,
            activation_threshold: config.activation_threshold,
            min_beats_to_activate: config.min_beats_to_activate,
            max_missed_beats: config.max_missed_beats,
        }
    }

    /// Record an onset that landed close to a predicted beat
    ///
    /// Aligned onsets build confidence, extend the stable streak, and
    /// forgive any accumulated missed beats.
    pub fn record_aligned(&mut self) {
        self.stable_beats = self.stable_beats.saturating_add(1);
        self.missed_beats = 0;
        self.confidence = (self.confidence + self.confidence_step).min(1.0);
    }

    /// Record an onset that landed far from any predicted beat
    ///
    /// The stable streak survives; a single off-grid hit (a fill, a
    /// syncopation) should not erase the accumulated evidence.
    pub fn record_misaligned(&mut self) {
        self.missed_beats = self.missed_beats.saturating_add(1);
        self.confidence = (self.confidence - self.confidence_step).max(0.0);
    }

    /// Record a predicted beat that no onset arrived for
    pub fn record_missed(&mut self) {
        self.missed_beats = self.missed_beats.saturating_add(1);
        self.confidence = (self.confidence - self.confidence_step).max(0.0);
    }

    /// Nudge confidence upward, e.g. after a successful tempo estimate
    pub fn boost(&mut self, amount: f32) {
        if amount.is_finite() && amount > 0.0 {
            self.confidence = (self.confidence + amount).min(1.0);
        }
    }

    /// Evaluate the activation/deactivation transitions
    ///
    /// # Returns
    ///
    /// The active state after evaluation
    pub fn update_state(&mut self) -> bool {
        if self.active {
            let floor = self.activation_threshold * DEACTIVATION_RATIO;
            if self.confidence < floor || self.missed_beats >= self.max_missed_beats {
                log::debug!(
                    "Beat tracking deactivated: confidence {:.2}, {} missed beats",
                    self.confidence,
                    self.missed_beats
                );
                self.active = false;
                // Re-activation must be earned with a fresh stable streak.
                self.stable_beats = 0;
                self.missed_beats = 0;
            }
        } else if self.confidence >= self.activation_threshold
            && self.stable_beats >= self.min_beats_to_activate
        {
            log::debug!(
                "Beat tracking activated: confidence {:.2} after {} stable beats",
                self.confidence,
                self.stable_beats
            );
            self.active = true;
        }
        self.active
    }

    /// Current confidence in [0, 1]
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Consecutive well-aligned onsets seen so far
    pub fn stable_beats(&self) -> u8 {
        self.stable_beats
    }

    /// Missed or misaligned beats since the last aligned onset
    pub fn missed_beats(&self) -> u8 {
        self.missed_beats
    }

    /// Whether the gate currently reports music detected
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Clear all accumulated evidence and deactivate
    pub fn reset(&mut self) {
        self.confidence = 0.0;
        self.stable_beats = 0;
        self.missed_beats = 0;
        self.active = false;
    }
}
