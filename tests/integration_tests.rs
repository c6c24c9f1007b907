//! Integration tests for Maestro
//!
//! Notation in, MIDI messages out: parsing, translation, scheduling and
//! dispatch through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use approx::assert_relative_eq;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use maestro::Timeline;
use maestro::{
    compile, notation::apply_effects, parse_hybrid_notation, EffectOptions, GlobalDefaults,
    Maestro, MaestroConfig, MaestroError, ManualTimeline, MidiMessage, NotationError, NotePhase,
    RecordingSink, TimelineKind, TransportState,
};

fn manual_maestro(config: MaestroConfig) -> (Arc<ManualTimeline>, Maestro) {
    let clock = Arc::new(ManualTimeline::new());
    let maestro = Maestro::new(config);
    maestro.initialize_with_timeline(clock.clone());
    (clock, maestro)
}

fn note_on_log(maestro: &Maestro) -> Arc<Mutex<Vec<(u8, f64)>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    maestro.events().on_note(move |phase, note| {
        if phase == NotePhase::On {
            sink.lock().push((note.midi, note.absolute_time));
        }
        Ok(())
    });
    log
}

#[test]
fn test_end_to_end_scenario() {
    let outcome = parse_hybrid_notation("C4:q D4:e E4:h", &GlobalDefaults::default()).unwrap();
    let beats: Vec<f64> = outcome.notes.iter().map(|n| n.duration).collect();
    let times: Vec<f64> = outcome.notes.iter().map(|n| n.absolute_time).collect();
    assert_eq!(beats, vec![1.0, 0.5, 2.0]);
    // Running sum of beats (0, 1, 1.5) at two beats per second. The commonly
    // quoted [0.0, 0.5, 1.0] for this example contradicts the running-sum
    // rule; E4 starts after C4 + D4 = 1.5 beats, so 0.75 is correct.
    assert_eq!(times, vec![0.0, 0.5, 0.75]);
    assert!(outcome.diagnostics.is_empty());

    let score = compile("C4:q D4:e E4:h", &GlobalDefaults::default()).unwrap();
    assert_eq!(score.notes.len(), 3);
    // three notes plus the tempo and time signature events
    assert_eq!(score.metadata.event_count, 5);
    assert_eq!(score.dispatch_count(), 8);
    assert_relative_eq!(score.metadata.total_duration, 1.75);
}

#[test]
fn test_invalid_duration_is_skipped() {
    let outcome = parse_hybrid_notation("C4:q D4:x E4:h", &GlobalDefaults::default()).unwrap();
    let pitches: Vec<&str> = outcome.notes.iter().map(|n| n.pitch.as_str()).collect();
    assert_eq!(pitches, vec!["C4", "E4"]);
    assert_eq!(outcome.diagnostics.len(), 1);
}

#[test]
fn test_invalid_pitch_aborts() {
    let result = parse_hybrid_notation("H4:q", &GlobalDefaults::default());
    assert!(matches!(result, Err(NotationError::InvalidPitch { .. })));
    assert!(compile("C4 | [Xyz]:q", &GlobalDefaults::default()).is_err());
}

#[test]
fn test_effects_without_options_copy_input() {
    let outcome = parse_hybrid_notation("C4:q@0.8 [Am]:h", &GlobalDefaults::default()).unwrap();
    let copy = apply_effects(&outcome.notes, &EffectOptions::default());
    assert_eq!(copy, outcome.notes);
    assert!(!std::ptr::eq(copy.as_ptr(), outcome.notes.as_ptr()));
}

#[test]
fn test_note_on_order_with_overlap() {
    let (clock, maestro) = manual_maestro(MaestroConfig::default());
    let log = note_on_log(&maestro);

    maestro
        .play_notation("V1: C3:w.legato\nV2: C4:e D4:e E4:e")
        .unwrap();
    clock.advance_to(10.0);

    let times: Vec<f64> = log.lock().iter().map(|e| e.1).collect();
    assert_eq!(times.len(), 4);
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(&times[1..], &[0.0, 0.25, 0.5]);
}

#[test]
fn test_cancel_batch_of_ten() {
    let (clock, maestro) = manual_maestro(MaestroConfig::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    maestro.events().on_note(move |_, _| {
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    });

    let id = maestro
        .play_notation("C4 D4 E4 F4 | G4 A4 B4 C5 | D5 E5")
        .unwrap();
    maestro.cancel_playback(&id).unwrap();
    clock.advance_to(60.0);

    assert_eq!(calls.load(Ordering::Relaxed), 0);
    assert_eq!(clock.pending(), 0);
}

#[test]
fn test_sink_receives_wire_messages() {
    let mut config = MaestroConfig::default();
    config.defaults.program = Some(5);
    let (clock, maestro) = manual_maestro(config);
    let sink = Arc::new(RecordingSink::new());
    let _bridge = maestro.attach_sink(sink.clone());

    maestro.play_notation("C4:q@1.0").unwrap();
    clock.advance_to(5.0);

    let messages = sink.messages();
    assert_eq!(
        messages,
        vec![
            MidiMessage::ProgramChange { channel: 1, program: 5 },
            MidiMessage::NoteOn { channel: 1, note: 60, velocity: 127 },
            MidiMessage::NoteOff { channel: 1, note: 60 },
        ]
    );
    assert_eq!(messages[1].to_bytes(), vec![0x90, 60, 127]);
}

#[test]
fn test_pause_holds_then_resumes() {
    let (clock, maestro) = manual_maestro(MaestroConfig::default());
    let log = note_on_log(&maestro);

    maestro.play_notation("C4:q D4:q E4:q").unwrap();
    clock.advance_to(0.25);
    maestro.pause().unwrap();
    let status = maestro.status();
    assert_eq!(status.transport.as_ref().map(|t| t.state), Some(TransportState::Paused));
    assert_relative_eq!(status.transport.map(|t| t.current_time).unwrap(), 0.25);

    clock.advance_to(3.0);
    assert_eq!(log.lock().len(), 1);

    maestro.play().unwrap();
    // D4 is 0.25s of score time away from the paused position
    clock.advance_to(3.2);
    assert_eq!(log.lock().len(), 1);
    clock.advance_to(3.3);
    assert_eq!(log.lock().len(), 2);
    clock.advance_to(10.0);
    let midi: Vec<u8> = log.lock().iter().map(|e| e.0).collect();
    assert_eq!(midi, vec![60, 62, 64]);
}

#[test]
fn test_stop_rewinds_and_cancels() {
    let (clock, maestro) = manual_maestro(MaestroConfig::default());
    let log = note_on_log(&maestro);

    let id = maestro.play_notation("C4:q D4:q E4:q").unwrap();
    clock.advance_to(0.1);
    maestro.stop().unwrap();
    clock.advance_to(5.0);

    assert_eq!(log.lock().len(), 1);
    assert!(!maestro.scheduler().unwrap().is_active(&id));
    let transport = maestro.transport().unwrap();
    assert_eq!(transport.state(), TransportState::Stopped);
    assert_eq!(transport.current_time(), 0.0);
}

#[test]
fn test_config_from_yaml_drives_maestro() {
    let yaml = r#"
latency:
  target-ms: 5.0
  max-burst: 1
defaults:
  bpm: 60
"#;
    let config = MaestroConfig::from_yaml_str(yaml).unwrap();
    let (clock, maestro) = manual_maestro(config);
    let log = note_on_log(&maestro);

    maestro.play_notation("C4 D4").unwrap();
    clock.advance_to(0.5);
    assert_eq!(log.lock().len(), 1);
    clock.advance_to(1.0);
    assert_eq!(log.lock().len(), 2);

    let status = maestro.status();
    assert_eq!(status.transport.map(|t| t.bpm), Some(60.0));
    assert_eq!(status.scheduler.map(|s| s.latency.target_ms), Some(5.0));
}

#[test]
fn test_operations_before_initialize() {
    let maestro = Maestro::new(MaestroConfig::default());
    assert!(matches!(maestro.stop(), Err(MaestroError::NotInitialized)));
    assert!(matches!(maestro.set_bpm(90.0), Err(MaestroError::NotInitialized)));
    // panic is always safe to call
    maestro.panic();
    assert!(!maestro.status().initialized);
}

#[tokio::test]
async fn test_native_backend_plays_to_completion() {
    let mut config = MaestroConfig::default();
    config.timing.prefer_engine = false;
    let maestro = Maestro::new(config);
    maestro.initialize().await.unwrap();
    let sink = Arc::new(RecordingSink::new());
    let _bridge = maestro.attach_sink(sink.clone());

    let id = maestro.play_notation("---\ntempo: 240\n---\nC4:s E4:s G4:s").unwrap();
    maestro.wait_for(&id).await;

    assert_eq!(sink.messages().len(), 6);
    let status = maestro.status();
    assert_eq!(status.timing_backend, Some(TimelineKind::Native));
    assert_eq!(status.scheduler.map(|s| s.active_sessions), Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_engine_backend_plays_to_completion() {
    let maestro = Maestro::new(MaestroConfig::default());
    maestro.initialize().await.unwrap();
    assert_eq!(maestro.status().timing_backend, Some(TimelineKind::Engine));

    let log = note_on_log(&maestro);
    let id = maestro.play_notation("---\ntempo: 240\n---\nC4:s D4:s E4:s F4:s").unwrap();
    maestro.wait_for(&id).await;

    let midi: Vec<u8> = log.lock().iter().map(|e| e.0).collect();
    assert_eq!(midi, vec![60, 62, 64, 65]);
    let latency = maestro.status().scheduler.map(|s| s.latency).unwrap();
    assert_eq!(latency.total_dispatches, 8 + 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fresh_playback_downbeat_is_on_time() {
    let mut config = MaestroConfig::default();
    config.latency.max_burst = Some(1);
    let maestro = Maestro::new(config);
    maestro.initialize().await.unwrap();
    assert_eq!(maestro.status().timing_backend, Some(TimelineKind::Engine));

    let id = maestro.play_notation("[C]:q").unwrap();
    maestro.wait_for(&id).await;

    let latency = maestro.status().scheduler.map(|s| s.latency).unwrap();
    assert_eq!(latency.total_dispatches, 8);
    assert_eq!(latency.late_dispatches, 0);
}
