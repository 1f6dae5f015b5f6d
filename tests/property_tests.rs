//! Property tests: every output stays bounded under arbitrary call traffic

use ember_dsp::{BeatEngine, EngineConfig, OnsetBand, OnsetEvent};
use proptest::prelude::*;

/// One call against the engine API, with hostile values allowed
#[derive(Debug, Clone)]
enum Call {
    Frame { strength: f32, advance_ms: u16 },
    Onset { low_band: bool, offset_ms: u16 },
    Guidance { bpm: f32, confidence: f32 },
    Reset,
}

fn call_strategy() -> impl Strategy<Value = Call> {
    prop_oneof![
        (any::<f32>(), 0u16..2000).prop_map(|(strength, advance_ms)| Call::Frame {
            strength,
            advance_ms,
        }),
        (any::<bool>(), 0u16..2000).prop_map(|(low_band, offset_ms)| Call::Onset {
            low_band,
            offset_ms,
        }),
        (any::<f32>(), any::<f32>()).prop_map(|(bpm, confidence)| Call::Guidance {
            bpm,
            confidence,
        }),
        Just(Call::Reset),
    ]
}

fn apply_call(engine: &mut BeatEngine, now_ms: &mut u32, call: &Call) {
    match *call {
        Call::Frame {
            strength,
            advance_ms,
        } => {
            *now_ms = now_ms.wrapping_add(advance_ms as u32);
            engine.process_frame(strength, *now_ms);
        }
        Call::Onset {
            low_band,
            offset_ms,
        } => {
            let band = if low_band {
                OnsetBand::Low
            } else {
                OnsetBand::High
            };
            engine.process_onset(OnsetEvent {
                timestamp_ms: now_ms.wrapping_add(offset_ms as u32),
                band,
            });
        }
        Call::Guidance { bpm, confidence } => {
            engine.apply_external_guidance(bpm, confidence);
        }
        Call::Reset => engine.reset(),
    }
}

proptest! {
    /// No sequence of calls, however hostile, may push any output out of
    /// its documented range or produce a non-finite value.
    #[test]
    fn outputs_stay_bounded(calls in prop::collection::vec(call_strategy(), 1..200)) {
        let mut engine = BeatEngine::new(EngineConfig::default()).unwrap();
        let mut now_ms = 0u32;

        for call in &calls {
            apply_call(&mut engine, &mut now_ms, call);

            let snapshot = engine.snapshot();
            prop_assert!(
                (60.0..=200.0).contains(&snapshot.tracker.bpm),
                "BPM {} escaped its range",
                snapshot.tracker.bpm
            );
            prop_assert!(
                snapshot.tracker.phase >= 0.0 && snapshot.tracker.phase < 1.0,
                "Phase {} escaped [0, 1)",
                snapshot.tracker.phase
            );
            prop_assert!((0.0..=1.0).contains(&snapshot.tracker.confidence));
            prop_assert!((0.0..=1.0).contains(&snapshot.pattern_confidence));
            prop_assert!((0.0..=1.0).contains(&snapshot.periodicity_strength));
            prop_assert!((0.0..=1.0).contains(&snapshot.beat_likelihood));
            prop_assert!(snapshot.detected_bpm.is_finite() && snapshot.detected_bpm >= 0.0);
        }
    }

    /// Reset after arbitrary traffic restores the freshly constructed state.
    #[test]
    fn reset_always_restores_initial_state(calls in prop::collection::vec(call_strategy(), 0..100)) {
        let mut engine = BeatEngine::new(EngineConfig::default()).unwrap();
        let baseline = engine.snapshot();
        let mut now_ms = 0u32;

        for call in &calls {
            apply_call(&mut engine, &mut now_ms, call);
        }
        engine.reset();

        prop_assert_eq!(engine.snapshot(), baseline);
    }

    /// Frames alone never move the tempo: only onsets and guidance steer it.
    #[test]
    fn frames_alone_never_move_the_tempo(
        frames in prop::collection::vec((any::<f32>(), 0u16..2000), 1..100)
    ) {
        let mut engine = BeatEngine::new(EngineConfig::default()).unwrap();
        let mut now_ms = 0u32;

        for &(strength, advance_ms) in &frames {
            now_ms = now_ms.wrapping_add(advance_ms as u32);
            engine.process_frame(strength, now_ms);
            prop_assert_eq!(engine.tracker().bpm(), 120.0);
        }
    }

    /// The detector's outputs hold their bounds even when analysis passes
    /// actually run (small history so the buffer fills within the case).
    #[test]
    fn detector_outputs_stay_bounded(
        frames in prop::collection::vec((0.0f32..2.0, 50u16..500), 40..120)
    ) {
        let mut config = EngineConfig::default();
        config.detector.history_capacity = 32;
        config.frame_rate = 10.0;
        let mut engine = BeatEngine::new(config).unwrap();
        let mut now_ms = 0u32;

        for &(strength, advance_ms) in &frames {
            now_ms = now_ms.wrapping_add(advance_ms as u32);
            engine.process_frame(strength, now_ms);

            let snapshot = engine.snapshot();
            prop_assert!((0.0..=1.0).contains(&snapshot.periodicity_strength));
            prop_assert!((0.0..=1.0).contains(&snapshot.beat_likelihood));
            prop_assert!(snapshot.detected_bpm.is_finite() && snapshot.detected_bpm >= 0.0);
            let phase = engine.detector().phase();
            prop_assert!(phase >= 0.0 && phase < 1.0, "Detector phase {} escaped", phase);
        }
    }
}
