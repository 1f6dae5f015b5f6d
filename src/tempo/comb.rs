//! Comb filter bank tempo estimation
//!
//! Maintains one resonator per tempo hypothesis across the configured BPM
//! range. Each onset scores its alignment against every resonator's
//! predicted beat grid and feeds a one-pole energy accumulator; energy
//! decays with elapsed time, so the hypothesis whose grid keeps matching
//! the incoming onsets ends up carrying the most energy.
//!
//! Detuned hypotheses drift out of phase with their own anchor and stop
//! collecting energy, which is what gives the bank its selectivity. A
//! half-period alias stays aligned forever, so near-ties are resolved
//! toward the longer period.

use super::{BpmCandidate, IntervalHistory, TempoStrategy};
use crate::config::TrackerConfig;

/// Numerical stability epsilon
const EPSILON: f32 = 1e-10;

/// Peak energy below which the bank reports no candidate
const MIN_PEAK_ENERGY: f32 = 0.05;

/// Energy below which a resonator that has scored re-anchors on the
/// next onset
const REARM_ENERGY: f32 = 1e-4;

/// Hypotheses within this fraction of the peak count as tied; the tie
/// goes to the longest period so a half-period alias never wins
const TIE_TOLERANCE: f32 = 0.9;

/// Peak-to-mean energy ratio that maps to full confidence
const FULL_CONTRAST_RATIO: f32 = 4.0;

#[derive(Debug, Clone)]
struct Resonator {
    period_ms: f32,
    energy: f32,
    anchor_ms: u32,
    armed: bool,
    /// Whether this resonator has scored an onset since it was armed;
    /// only a scored resonator may drain out and re-anchor
    scored: bool,
}

/// Resonating comb filter bank over tempo hypotheses
#[derive(Debug)]
pub struct CombFilterBank {
    /// Hypotheses ordered slowest first (longest period at index 0)
    resonators: Vec<Resonator>,
    feedback: f32,
    decay_rate: f32,
    tolerance: f32,
}

impl CombFilterBank {
    /// Create a bank spanning the config's BPM range at its resolution
    pub fn new(config: &TrackerConfig) -> Self {
        let resolution = config.comb_resolution_bpm.max(0.1);
        let count = ((config.max_bpm - config.min_bpm) / resolution).ceil() as usize + 1;
        let mut resonators = Vec::with_capacity(count);

        let mut bpm = config.min_bpm;
        while bpm <= config.max_bpm + EPSILON {
            resonators.push(Resonator {
                period_ms: 60_000.0 / bpm,
                energy: 0.0,
                anchor_ms: 0,
                armed: false,
                scored: false,
            });
            bpm += resolution;
        }

        Self {
            resonators,
            feedback: config.comb_feedback.clamp(0.0, 1.0),
            decay_rate: config.comb_decay_rate.clamp(0.0, 1.0),
            tolerance: config.comb_alignment_tolerance.clamp(0.01, 0.5),
        }
    }

    /// Total number of tempo hypotheses in the bank
    pub fn hypothesis_count(&self) -> usize {
        self.resonators.len()
    }
}

impl TempoStrategy for CombFilterBank {
    fn on_onset(&mut self, timestamp_ms: u32) {
        for resonator in &mut self.resonators {
            if !resonator.armed {
                resonator.anchor_ms = timestamp_ms;
                resonator.armed = true;
                resonator.scored = false;
                continue;
            }

            let elapsed_ms = timestamp_ms.wrapping_sub(resonator.anchor_ms) as f32;
            let position = (elapsed_ms / resonator.period_ms).fract();
            let distance = position.min(1.0 - position);
            let alignment = (1.0 - distance / self.tolerance).max(0.0);

            resonator.energy =
                resonator.energy * self.feedback + alignment * (1.0 - self.feedback);
            resonator.scored = true;
        }
    }

    fn tick(&mut self, dt_seconds: f32) {
        if !dt_seconds.is_finite() || dt_seconds <= 0.0 {
            return;
        }
        let retain = (1.0 - self.decay_rate).powf(dt_seconds);
        for resonator in &mut self.resonators {
            resonator.energy *= retain;
            // A freshly armed resonator carries no energy yet; it keeps
            // its anchor until it has scored at least one onset.
            if resonator.scored && resonator.energy < REARM_ENERGY {
                resonator.energy = 0.0;
                resonator.armed = false;
                resonator.scored = false;
            }
        }
    }

    fn estimate(&mut self, _intervals: &IntervalHistory) -> Option<BpmCandidate> {
        let peak = self
            .resonators
            .iter()
            .map(|r| r.energy)
            .fold(0.0f32, f32::max);
        if peak < MIN_PEAK_ENERGY {
            return None;
        }

        // Slowest-first scan: the first hypothesis inside the tie band is
        // the longest period at that energy level.
        let winner = self
            .resonators
            .iter()
            .find(|r| r.energy >= peak * TIE_TOLERANCE)?;

        let mean = self.resonators.iter().map(|r| r.energy).sum::<f32>()
            / self.resonators.len().max(1) as f32;
        let contrast = peak / mean.max(EPSILON);
        let confidence = ((contrast - 1.0) / (FULL_CONTRAST_RATIO - 1.0)).clamp(0.0, 1.0);

        let bpm = 60_000.0 / winner.period_ms;
        log::debug!(
            "Comb bank estimate: {:.1} BPM, peak energy {:.3}, contrast {:.2}",
            bpm,
            peak,
            contrast
        );

        Some(BpmCandidate { bpm, confidence })
    }

    fn reset(&mut self) {
        for resonator in &mut self.resonators {
            resonator.energy = 0.0;
            resonator.armed = false;
            resonator.scored = false;
            resonator.anchor_ms = 0;
        }
    }
}
