//! Phase-locked beat tracking
//!
//! The tracker owns the live beat grid: a tempo, a phase that advances by
//! wall clock, and a beat counter with edge-triggered subdivision flags.
//! Discrete onset events steer it through three cooperating mechanisms:
//!
//! 1. **Phase-locked loop** ([`PllCorrector`]): each onset's phase error
//!    nudges the beat period, and the phase itself is pulled toward the
//!    onset, so the grid converges onto the music instead of orbiting it
//! 2. **Tempo re-estimation** ([`crate::tempo::TempoStrategy`]): every few
//!    onsets an independent interval-based estimate is blended in, which
//!    recovers from octave errors the loop alone cannot escape
//! 3. **Confidence gate** ([`ConfidenceGate`]): hysteretic activation of
//!    the externally visible "music detected" state
//!
//! All numeric paths clamp their outputs. The tracker never panics and
//! never allocates after construction; time arrives as explicit arguments
//! so tests can run on a simulated clock.

pub mod confidence;
pub mod pll;

pub use confidence::ConfidenceGate;
pub use pll::PllCorrector;

use crate::config::{TempoStrategyKind, TrackerConfig};
use crate::error::ConfigError;
use crate::tempo::comb::CombFilterBank;
use crate::tempo::histogram::HistogramEstimator;
use crate::tempo::{BpmCandidate, IntervalHistory, TempoStrategy};
use serde::{Deserialize, Serialize};

/// Milliseconds per minute, for BPM/period conversions
const MS_PER_MINUTE: f32 = 60_000.0;

/// Phase values above this are treated as a stalled or corrupted clock
const PHASE_CEILING: f32 = 100.0;

/// Largest number of beats a single update may add to the beat counter
const MAX_BEATS_PER_UPDATE: u32 = 10;

/// Weight of a fresh tempo estimate when blended into the running tempo
const ESTIMATE_BLEND: f32 = 0.2;

/// Confidence boost granted by a tempo estimate that agrees with the
/// tracked tempo
const ESTIMATE_CONFIDENCE_BOOST: f32 = 0.05;

/// Largest relative tempo difference at which an estimate counts as
/// agreeing with the tracked tempo
const ESTIMATE_AGREEMENT_RATIO: f32 = 0.1;

/// Consecutive disagreeing estimates that override the locked-drift clamp
const ESTIMATE_ESCAPE_STREAK: u8 = 3;

/// Largest fraction of a beat a single onset may shift the phase
const PHASE_SHIFT_CAP: f32 = 0.125;

/// Scale from guidance confidence to blend weight
const GUIDANCE_WEIGHT_SCALE: f32 = 0.3;

/// Factor of the beat period past which silence counts as a missed beat
const MISSED_BEAT_FACTOR: f32 = 1.5;

/// Frequency band an onset was detected in
///
/// The low band (kick, bass) carries the beat in most material, so the
/// tracker follows one band and treats the other as secondary evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnsetBand {
    /// Low-frequency transients: kick drum, bass hits
    Low,
    /// High-frequency transients: snares, hats, claps
    High,
}

/// A discrete onset event from the upstream onset classifier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnsetEvent {
    /// Millisecond timestamp from the injected clock
    pub timestamp_ms: u32,
    /// Band the onset was classified into
    pub band: OnsetBand,
}

/// Point-in-time view of the tracker state
///
/// The beat flags are edge-triggered: they are only true on the frame the
/// beat landed and clear on the next update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    /// Current tempo estimate
    pub bpm: f32,
    /// Position within the current beat, [0, 1)
    pub phase: f32,
    /// Beats counted since the last reset
    pub beat_number: u32,
    /// A beat boundary was crossed this frame
    pub beat_happened: bool,
    /// Quarter-note flag, true on every beat frame
    pub quarter_note: bool,
    /// Half-note flag, true on every second beat
    pub half_note: bool,
    /// Whole-note flag, true on every fourth beat
    pub whole_note: bool,
    /// Whether the confidence gate currently reports music
    pub active: bool,
    /// Tracking confidence in [0, 1]
    pub confidence: f32,
    /// Consecutive well-aligned onsets
    pub stable_beats: u8,
    /// Missed or misaligned beats since the last aligned onset
    pub missed_beats: u8,
    /// Inter-onset intervals currently held
    pub interval_count: usize,
    /// Mean of the held intervals in ms, if any
    pub interval_mean_ms: Option<f32>,
}

/// Phase-locked tempo and beat-phase tracker
///
/// Driven from a single control loop: [`BeatTracker::update`] once per
/// frame with the elapsed wall-clock time, [`BeatTracker::on_onset`] for
/// each detected onset. Consumers read the tempo, phase, and beat flags
/// between those calls.
#[derive(Debug)]
pub struct BeatTracker {
    config: TrackerConfig,

    // Beat grid
    bpm: f32,
    beat_period_ms: f32,
    phase: f32,
    beat_number: u32,

    // Edge-triggered flags, cleared at the top of every update
    beat_happened: bool,
    quarter_note: bool,
    half_note: bool,
    whole_note: bool,

    // Onset bookkeeping
    last_onset_ms: Option<u32>,
    ms_since_any_onset: f32,
    ms_since_missed_check: f32,
    interval_history: IntervalHistory,
    onsets_since_estimate: u8,
    estimate_disagreements: u8,

    // Steering
    strategy: Box<dyn TempoStrategy>,
    pll: PllCorrector,
    gate: ConfidenceGate,
    tempo_locked: bool,
}

impl BeatTracker {
    /// Create a tracker from a configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Tracker parameters, validated before use
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration fails validation.
    pub fn new(config: TrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let strategy: Box<dyn TempoStrategy> = match config.strategy {
            TempoStrategyKind::Histogram => Box::new(HistogramEstimator::new(&config)),
            TempoStrategyKind::CombBank => Box::new(CombFilterBank::new(&config)),
        };

        let interval_history =
            IntervalHistory::new(config.interval_capacity, config.min_bpm, config.max_bpm);
        let pll = PllCorrector::new(&config);
        let gate = ConfidenceGate::new(&config);
        let bpm = config.initial_bpm;

        Ok(Self {
            bpm,
            beat_period_ms: MS_PER_MINUTE / bpm,
            phase: 0.0,
            beat_number: 0,
            beat_happened: false,
            quarter_note: false,
            half_note: false,
            whole_note: false,
            last_onset_ms: None,
            ms_since_any_onset: 0.0,
            ms_since_missed_check: 0.0,
            interval_history,
            onsets_since_estimate: 0,
            estimate_disagreements: 0,
            strategy,
            pll,
            gate,
            tempo_locked: false,
            config,
        })
    }

    /// Advance the tracker by one frame of elapsed time
    ///
    /// # Arguments
    ///
    /// * `dt_seconds` - Wall-clock seconds since the previous update;
    ///   non-finite or negative values are treated as zero
    ///
    /// # Algorithm
    ///
    /// 1. Clear the previous frame's edge-triggered beat flags
    /// 2. Advance phase by `dt / beat_period`
    /// 3. On crossing 1.0, count the beats (capped so a stalled clock
    ///    cannot corrupt the beat number), wrap the phase, and raise the
    ///    beat and subdivision flags
    /// 4. At most once per beat period, check for prolonged silence and
    ///    record a missed beat if found
    /// 5. Evaluate the activation/deactivation transitions
    pub fn update(&mut self, dt_seconds: f32) {
        self.beat_happened = false;
        self.quarter_note = false;
        self.half_note = false;
        self.whole_note = false;

        let dt_seconds = if dt_seconds.is_finite() && dt_seconds > 0.0 {
            dt_seconds
        } else {
            0.0
        };
        let dt_ms = dt_seconds * 1000.0;

        self.phase += dt_ms / self.beat_period_ms;
        if !self.phase.is_finite() {
            log::warn!("Non-finite beat phase, resetting to 0");
            self.phase = 0.0;
        }

        if self.phase >= 1.0 {
            if self.phase > PHASE_CEILING {
                log::warn!(
                    "Pathological beat phase {:.1}, clamping to {:.0}",
                    self.phase,
                    PHASE_CEILING
                );
                self.phase = PHASE_CEILING;
            }

            let beats_to_add = (self.phase as u32).min(MAX_BEATS_PER_UPDATE);
            self.phase = self.phase.fract();
            self.beat_number = self.beat_number.wrapping_add(beats_to_add);

            self.beat_happened = true;
            self.quarter_note = true;
            self.half_note = self.beat_number % 2 == 0;
            self.whole_note = self.beat_number % 4 == 0;
        }

        self.ms_since_any_onset += dt_ms;
        self.ms_since_missed_check += dt_ms;

        self.strategy.tick(dt_seconds);

        // Silence detection, rate-limited to one check per beat period so
        // a long gap cannot burn through the missed-beat budget in a
        // single frame.
        if self.ms_since_missed_check >= self.beat_period_ms {
            self.ms_since_missed_check = 0.0;
            if self.last_onset_ms.is_some()
                && self.ms_since_any_onset > MISSED_BEAT_FACTOR * self.beat_period_ms
            {
                self.gate.record_missed();
            }
        }

        self.gate.update_state();
        self.update_lock();
    }

    /// Feed a detected onset into the tracker
    ///
    /// Onsets in the followed band steer the loop; onsets in the other
    /// band only refresh the silence timer, since they still prove music
    /// is playing even when they are off the beat grid.
    ///
    /// # Arguments
    ///
    /// * `timestamp_ms` - Onset time from the injected clock
    /// * `band` - Band the onset was classified into
    ///
    /// # Algorithm
    ///
    /// 1. Record the inter-onset interval if it is plausible as a beat
    /// 2. Apply the PI phase correction to the beat period
    /// 3. Classify the onset as aligned or misaligned for the gate
    /// 4. Pull the phase toward the onset: a full re-anchor on a badly
    ///    missed prediction during acquisition, a capped proportional
    ///    nudge otherwise
    /// 5. Every few onsets, run the tempo strategy and blend its estimate
    pub fn on_onset(&mut self, timestamp_ms: u32, band: OnsetBand) {
        self.ms_since_any_onset = 0.0;

        if band != self.config.follow_band {
            return;
        }

        if let Some(previous) = self.last_onset_ms {
            let interval_ms = timestamp_ms.wrapping_sub(previous);
            self.interval_history.record(interval_ms);
        }
        self.last_onset_ms = Some(timestamp_ms);

        self.strategy.on_onset(timestamp_ms);

        // PI correction toward the onset, then re-clamp the tempo and
        // resync the period so the two never disagree.
        let error = PllCorrector::phase_error(self.phase);
        let correction = self.pll.correct(self.phase);
        self.beat_period_ms *= 1.0 - correction;
        self.set_bpm(MS_PER_MINUTE / self.beat_period_ms);

        let aligned = error.abs() < self.config.stability_threshold;
        if aligned {
            self.gate.record_aligned();
        } else {
            self.gate.record_misaligned();
        }

        // Pull the grid toward the onset. Correcting only the period
        // leaves the loop oscillating around the beat instead of settling
        // on it; the phase term damps it. The nudge is capped so an
        // off-grid hit cannot yank an established lock, while a badly
        // missed prediction during acquisition re-anchors the grid
        // outright.
        if !aligned && !self.gate.is_active() {
            self.phase = 0.0;
        } else {
            let offset = if self.phase > 0.5 {
                self.phase - 1.0
            } else {
                self.phase
            };
            let shift =
                (self.config.phase_kp * offset).clamp(-PHASE_SHIFT_CAP, PHASE_SHIFT_CAP);
            self.phase = (self.phase - shift).rem_euclid(1.0);
        }

        self.onsets_since_estimate = self.onsets_since_estimate.saturating_add(1);
        if self.onsets_since_estimate >= self.config.estimate_interval_onsets {
            self.onsets_since_estimate = 0;
            if let Some(candidate) = self.strategy.estimate(&self.interval_history) {
                self.apply_tempo_candidate(candidate);
            }
        }

        self.gate.update_state();
        self.update_lock();
    }

    /// Blend externally supplied tempo guidance into the local estimate
    ///
    /// Guidance from a parallel analysis path (a DJ deck, a second
    /// analyzer) is only trusted within limits: weak or wildly implausible
    /// hints are dropped, and a hint near double or half the local tempo
    /// is folded onto the local octave before blending so agreement about
    /// the pulse is not mistaken for disagreement about the tempo.
    ///
    /// # Arguments
    ///
    /// * `external_bpm` - Suggested tempo
    /// * `confidence` - The external path's confidence in [0, 1]
    pub fn apply_external_guidance(&mut self, external_bpm: f32, confidence: f32) {
        if !external_bpm.is_finite() || !confidence.is_finite() {
            return;
        }
        if confidence < self.config.guidance_min_confidence {
            return;
        }
        // Sanity band: one octave beyond the tracking range on each side,
        // so octave-related hints survive long enough to be folded.
        if external_bpm < self.config.min_bpm * 0.5 || external_bpm > self.config.max_bpm * 2.0 {
            return;
        }

        let mut guided_bpm = external_bpm;
        let relative_diff = (guided_bpm - self.bpm).abs() / self.bpm;
        if relative_diff > self.config.guidance_max_ratio {
            let tolerance = self.config.guidance_octave_tolerance;
            let double = self.bpm * 2.0;
            let half = self.bpm * 0.5;

            if (guided_bpm - double).abs() <= double * tolerance {
                guided_bpm *= 0.5;
            } else if (guided_bpm - half).abs() <= half * tolerance {
                guided_bpm *= 2.0;
            } else {
                log::debug!(
                    "Ignoring unrelated tempo guidance: {:.1} BPM vs local {:.1}",
                    external_bpm,
                    self.bpm
                );
                return;
            }
        }

        let weight = (confidence.clamp(0.0, 1.0) * GUIDANCE_WEIGHT_SCALE)
            .min(self.config.guidance_blend_cap);
        let blended = self.bpm * (1.0 - weight) + guided_bpm * weight;
        self.set_bpm(blended);

        // Soften rather than zero the integral so the next onset does not
        // see a discontinuous correction.
        self.pll.decay_integral(self.config.guidance_integral_decay);

        log::debug!(
            "Applied tempo guidance: {:.1} BPM (folded {:.1}) at weight {:.2} -> {:.1} BPM",
            external_bpm,
            guided_bpm,
            weight,
            self.bpm
        );
    }

    /// Restore the tracker to its freshly constructed state
    pub fn reset(&mut self) {
        self.bpm = self.config.initial_bpm;
        self.beat_period_ms = MS_PER_MINUTE / self.bpm;
        self.phase = 0.0;
        self.beat_number = 0;
        self.beat_happened = false;
        self.quarter_note = false;
        self.half_note = false;
        self.whole_note = false;
        self.last_onset_ms = None;
        self.ms_since_any_onset = 0.0;
        self.ms_since_missed_check = 0.0;
        self.interval_history.clear();
        self.onsets_since_estimate = 0;
        self.estimate_disagreements = 0;
        self.strategy.reset();
        self.pll.reset();
        self.gate.reset();
        self.tempo_locked = false;
    }

    /// Capture the externally visible state
    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            bpm: self.bpm,
            phase: self.phase,
            beat_number: self.beat_number,
            beat_happened: self.beat_happened,
            quarter_note: self.quarter_note,
            half_note: self.half_note,
            whole_note: self.whole_note,
            active: self.gate.is_active(),
            confidence: self.gate.confidence(),
            stable_beats: self.gate.stable_beats(),
            missed_beats: self.gate.missed_beats(),
            interval_count: self.interval_history.len(),
            interval_mean_ms: self.interval_history.mean_ms(),
        }
    }

    /// Current tempo estimate in BPM
    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    /// Current beat period in milliseconds
    pub fn beat_period_ms(&self) -> f32 {
        self.beat_period_ms
    }

    /// Position within the current beat, [0, 1)
    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Beats counted since the last reset
    pub fn beat_number(&self) -> u32 {
        self.beat_number
    }

    /// A beat boundary was crossed on the most recent update
    pub fn beat_happened(&self) -> bool {
        self.beat_happened
    }

    /// Quarter-note flag for the most recent update
    pub fn quarter_note(&self) -> bool {
        self.quarter_note
    }

    /// Half-note flag for the most recent update
    pub fn half_note(&self) -> bool {
        self.half_note
    }

    /// Whole-note flag for the most recent update
    pub fn whole_note(&self) -> bool {
        self.whole_note
    }

    /// Whether the confidence gate currently reports music
    pub fn is_active(&self) -> bool {
        self.gate.is_active()
    }

    /// Tracking confidence in [0, 1]
    pub fn confidence(&self) -> f32 {
        self.gate.confidence()
    }

    /// Whether the tempo is locked and estimates are rate-limited
    pub fn is_tempo_locked(&self) -> bool {
        self.tempo_locked
    }

    /// Blend a strategy estimate into the running tempo
    ///
    /// While locked, the post-blend tempo may only drift a bounded number
    /// of BPM per estimate, which resists spurious octave jumps without
    /// freezing the tempo entirely. A streak of estimates that all
    /// disagree with the locked tempo overrides the clamp: the lock is
    /// then holding a stale tempo, typically a subharmonic, and the
    /// interval evidence wins. Only agreeing estimates boost confidence,
    /// so an estimator cannot talk the gate into trusting a tempo it is
    /// simultaneously contradicting.
    fn apply_tempo_candidate(&mut self, candidate: BpmCandidate) {
        if !candidate.bpm.is_finite() || candidate.bpm <= 0.0 {
            return;
        }

        let relative_diff = (candidate.bpm - self.bpm).abs() / self.bpm;
        let agrees = relative_diff <= ESTIMATE_AGREEMENT_RATIO;
        if agrees {
            self.estimate_disagreements = 0;
        } else {
            self.estimate_disagreements = self.estimate_disagreements.saturating_add(1);
        }

        let mut blended = self.bpm * (1.0 - ESTIMATE_BLEND) + candidate.bpm * ESTIMATE_BLEND;
        if self.tempo_locked {
            if self.estimate_disagreements >= ESTIMATE_ESCAPE_STREAK {
                log::debug!(
                    "Tempo lock overridden after {} disagreeing estimates",
                    self.estimate_disagreements
                );
            } else {
                let drift = self.config.max_locked_drift_bpm;
                blended = blended.clamp(self.bpm - drift, self.bpm + drift);
            }
        }
        self.set_bpm(blended);
        if agrees {
            self.gate.boost(ESTIMATE_CONFIDENCE_BOOST);
        }

        log::debug!(
            "Tempo estimate {:.1} BPM (confidence {:.2}) -> {:.1} BPM{}",
            candidate.bpm,
            candidate.confidence,
            self.bpm,
            if self.tempo_locked { " [locked]" } else { "" }
        );
    }

    /// Clamp a tempo into range and resync the beat period from it
    fn set_bpm(&mut self, bpm: f32) {
        self.bpm = if bpm.is_finite() {
            bpm.clamp(self.config.min_bpm, self.config.max_bpm)
        } else {
            self.config.initial_bpm
        };
        self.beat_period_ms = MS_PER_MINUTE / self.bpm;
    }

    /// Track the lock hysteresis from the gate confidence
    fn update_lock(&mut self) {
        let confidence = self.gate.confidence();
        if confidence >= self.config.lock_threshold {
            self.tempo_locked = true;
        } else if confidence < self.config.unlock_threshold {
            self.tempo_locked = false;
        }
    }
}
