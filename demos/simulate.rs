//! Example: Simulate a beat tracking session
//!
//! Drives the engine with a synthetic 128 BPM kick pattern on a simulated
//! 50 Hz control loop and prints how the tempo estimate converges from a
//! cold start. Run with `RUST_LOG=debug` to watch the internal decisions.

use ember_dsp::{BeatEngine, EngineConfig, OnsetBand, OnsetEvent};

/// Control-loop frame spacing in ms (50 Hz)
const FRAME_MS: u32 = 20;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::init();

    let mut config = EngineConfig::default();
    config.frame_rate = 50.0;
    config.tracker.initial_bpm = 100.0;
    let mut engine = BeatEngine::new(config)?;

    let session_bpm = 128.0;
    let period_ms = 60_000.0 / session_bpm;

    println!("Simulating a {:.0} BPM session from a cold start at 100 BPM:", session_bpm);

    // 30 seconds of frames; a strength spike plus a low-band onset event
    // lands on every beat, with a quiet noise floor in between.
    let mut now_ms = 0u32;
    let mut next_onset_ms = 0.0f32;
    for frame in 0..1500u32 {
        let onset_due = now_ms as f32 >= next_onset_ms;
        engine.process_frame(if onset_due { 1.0 } else { 0.05 }, now_ms);
        if onset_due {
            engine.process_onset(OnsetEvent {
                timestamp_ms: now_ms,
                band: OnsetBand::Low,
            });
            next_onset_ms += period_ms;
        }

        if frame % 250 == 0 {
            let snapshot = engine.snapshot();
            println!(
                "  t={:>6} ms  bpm={:>6.2}  confidence={:.2}  active={}",
                now_ms, snapshot.tracker.bpm, snapshot.pattern_confidence, snapshot.tracker.active
            );
        }
        now_ms += FRAME_MS;
    }

    // A corroborating analyzer reads the same music an octave up; the
    // tracker folds the hint onto its own octave instead of jumping.
    engine.apply_external_guidance(2.0 * session_bpm, 0.9);

    let snapshot = engine.snapshot();
    println!("Final state after {} ms:", now_ms);
    println!(
        "  BPM: {:.2} (buffered periodicity path: {:.2})",
        snapshot.tracker.bpm, snapshot.detected_bpm
    );
    println!("  Beat number: {}", snapshot.tracker.beat_number);
    println!("  Pattern confidence: {:.2}", snapshot.pattern_confidence);
    println!("  Beat likelihood: {:.2}", snapshot.beat_likelihood);

    Ok(())
}
