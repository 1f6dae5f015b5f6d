//! Top-level beat tracking engine
//!
//! Glues the two analysis paths together behind one control-loop API:
//!
//! 1. **Buffered path** ([`PeriodicityDetector`]): per-frame onset
//!    strengths, periodically autocorrelated into a tempo and strength
//! 2. **Event path** ([`BeatTracker`]): discrete onset events phase-locked
//!    into a live beat grid with confidence gating
//!
//! The caller owns the clock: every frame it passes the current
//! millisecond timestamp and the engine derives the elapsed time itself,
//! so the whole engine runs deterministically under a simulated clock.
//!
//! # Example
//!
//! ```
//! use ember_dsp::{BeatEngine, EngineConfig, OnsetBand, OnsetEvent};
//!
//! let mut engine = BeatEngine::new(EngineConfig::default())?;
//!
//! // Control loop: one call per analysis frame, plus discrete onsets.
//! engine.process_frame(0.8, 0);
//! engine.process_onset(OnsetEvent {
//!     timestamp_ms: 0,
//!     band: OnsetBand::Low,
//! });
//!
//! let snapshot = engine.snapshot();
//! println!("{:.1} BPM, beat phase {:.2}", snapshot.tracker.bpm, snapshot.tracker.phase);
//! # Ok::<(), ember_dsp::ConfigError>(())
//! ```

use crate::config::EngineConfig;
use crate::error::ConfigError;
use crate::periodicity::PeriodicityDetector;
use crate::tracker::{BeatTracker, OnsetEvent, TrackerSnapshot};
use serde::{Deserialize, Serialize};

/// Combined point-in-time view of both analysis paths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Beat tracker state
    pub tracker: TrackerSnapshot,
    /// Tempo held by the buffered periodicity path, 0.0 when none
    pub detected_bpm: f32,
    /// Normalized periodicity strength (0.0-1.0)
    pub periodicity_strength: f32,
    /// Likelihood that the current frame sits on a beat
    pub beat_likelihood: f32,
    /// Fused confidence across both paths
    pub pattern_confidence: f32,
}

/// Real-time beat tracking engine
///
/// Single-threaded and allocation-free after construction. Drive it from
/// one control loop: [`process_frame`](BeatEngine::process_frame) once per
/// analysis frame, [`process_onset`](BeatEngine::process_onset) per onset
/// event, and read the outputs between calls.
#[derive(Debug)]
pub struct BeatEngine {
    config: EngineConfig,
    detector: PeriodicityDetector,
    tracker: BeatTracker,
    last_frame_ms: Option<u32>,
}

impl BeatEngine {
    /// Create an engine from a configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any part of the configuration fails
    /// validation.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let detector = PeriodicityDetector::new(config.detector.clone())?;
        let tracker = BeatTracker::new(config.tracker.clone())?;
        Ok(Self {
            config,
            detector,
            tracker,
            last_frame_ms: None,
        })
    }

    /// Process one analysis frame
    ///
    /// Feeds the onset strength to the periodicity path and advances the
    /// beat grid by the wall-clock time since the previous frame. The
    /// first frame establishes the clock and advances nothing.
    ///
    /// # Arguments
    ///
    /// * `onset_strength` - Non-negative onset strength for this frame
    /// * `now_ms` - Monotonic millisecond timestamp (wrap-safe)
    pub fn process_frame(&mut self, onset_strength: f32, now_ms: u32) {
        let dt_seconds = match self.last_frame_ms {
            Some(last) => now_ms.wrapping_sub(last) as f32 / 1000.0,
            None => 0.0,
        };
        self.last_frame_ms = Some(now_ms);

        self.detector.add_sample(onset_strength);
        self.detector.update(now_ms, self.config.frame_rate);
        self.tracker.update(dt_seconds);
    }

    /// Feed a discrete onset event to the beat tracker
    pub fn process_onset(&mut self, event: OnsetEvent) {
        self.tracker.on_onset(event.timestamp_ms, event.band);
    }

    /// Blend externally supplied tempo guidance into the tracker
    pub fn apply_external_guidance(&mut self, external_bpm: f32, confidence: f32) {
        self.tracker.apply_external_guidance(external_bpm, confidence);
    }

    /// Fused confidence that a musical pattern is currently present
    ///
    /// While the periodicity path holds a pattern, its strength is blended
    /// with the tracker confidence at the configured weight; otherwise the
    /// tracker confidence stands alone.
    pub fn pattern_confidence(&self) -> f32 {
        let tracker_confidence = self.tracker.confidence();
        if self.detector.has_pattern() {
            let weight = self.config.tracker_weight;
            (weight * tracker_confidence + (1.0 - weight) * self.detector.strength())
                .clamp(0.0, 1.0)
        } else {
            tracker_confidence
        }
    }

    /// Likelihood that the current frame sits on a beat
    pub fn beat_likelihood(&self) -> f32 {
        self.detector.beat_likelihood()
    }

    /// Capture the externally visible state of both paths
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            tracker: self.tracker.snapshot(),
            detected_bpm: self.detector.detected_bpm(),
            periodicity_strength: self.detector.strength(),
            beat_likelihood: self.detector.beat_likelihood(),
            pattern_confidence: self.pattern_confidence(),
        }
    }

    /// Read access to the beat tracker
    pub fn tracker(&self) -> &BeatTracker {
        &self.tracker
    }

    /// Read access to the periodicity detector
    pub fn detector(&self) -> &PeriodicityDetector {
        &self.detector
    }

    /// Restore the engine to its freshly constructed state
    ///
    /// Idempotent; keeps all buffers allocated.
    pub fn reset(&mut self) {
        self.detector.reset();
        self.tracker.reset();
        self.last_frame_ms = None;
    }
}
