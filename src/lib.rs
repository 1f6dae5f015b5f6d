//! # Ember DSP
//!
//! A real-time tempo and beat tracking engine for audio-reactive lighting,
//! turning a stream of onset measurements into a phase-locked beat grid
//! with confidence gating.
//!
//! ## Features
//!
//! - **Periodicity Detection**: throttled autocorrelation over a fixed ring
//!   of per-frame onset strengths
//! - **Phase-Locked Tracking**: PI loop steering tempo and beat phase from
//!   discrete onset events
//! - **Tempo Estimation**: interval histogram or resonating comb filter
//!   bank, both with octave-error handling
//! - **External Guidance**: corroborating tempo hints folded and blended
//!   into the local estimate
//!
//! ## Quick Start
//!
//! ```
//! use ember_dsp::{BeatEngine, EngineConfig, OnsetBand, OnsetEvent};
//!
//! let mut engine = BeatEngine::new(EngineConfig::default())?;
//!
//! // Control loop: one call per analysis frame with the onset strength
//! // and the current clock, plus one call per discrete onset event.
//! for frame in 0u32..120 {
//!     engine.process_frame(0.1, frame * 16);
//! }
//! engine.process_onset(OnsetEvent {
//!     timestamp_ms: 2000,
//!     band: OnsetBand::Low,
//! });
//!
//! let snapshot = engine.snapshot();
//! println!(
//!     "{:.1} BPM, beat phase {:.2}, confidence {:.2}",
//!     snapshot.tracker.bpm, snapshot.tracker.phase, snapshot.pattern_confidence
//! );
//! # Ok::<(), ember_dsp::ConfigError>(())
//! ```
//!
//! ## Architecture
//!
//! Two cooperating analysis paths feed the engine outputs:
//!
//! ```text
//! onset strengths -> PeriodicityDetector (autocorrelation) -> strength, likelihood
//! onset events    -> BeatTracker (PLL + estimator + gate)  -> bpm, phase, beat flags
//! ```
//!
//! Everything is single-threaded and allocation-free after construction;
//! time is injected through method arguments so the whole engine runs
//! deterministically under a simulated clock.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod periodicity;
pub mod ring;
pub mod tempo;
pub mod tracker;

// Re-export main types
pub use config::{DetectorConfig, EngineConfig, TempoStrategyKind, TrackerConfig};
pub use engine::{BeatEngine, EngineSnapshot};
pub use error::ConfigError;
pub use periodicity::{PeriodicityDetector, PeriodicityEstimate};
pub use tempo::{BpmCandidate, IntervalHistory, TempoStrategy};
pub use tracker::{BeatTracker, OnsetBand, OnsetEvent, TrackerSnapshot};
