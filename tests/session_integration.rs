use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use comfortkit::dispatch::ChannelEffectSink;
use comfortkit::events::Channel;
use comfortkit::relief::pacer::PhaseName;
use comfortkit::session::ExpressionSource;
use comfortkit::{
    ActivationReason, Capabilities, ComfortKitConfig, ConfidenceBucket, EffectRequest, Emotion,
    FusionConfig, OverrideMode, RawExpression, ReliefMode, Session, SessionEvent,
    TranscriptFragment, TriggerState,
};
use crossbeam_channel::Receiver;

fn raw(timestamp_ms: u64, probs: &[(Emotion, f32)]) -> RawExpression {
    let mut expressions: HashMap<String, f32> =
        Emotion::ALL.iter().map(|e| (e.label().to_string(), 0.0)).collect();
    for (emotion, p) in probs {
        expressions.insert(emotion.label().to_string(), *p);
    }
    RawExpression {
        timestamp_ms,
        expressions,
    }
}

fn sad_raw(timestamp_ms: u64) -> RawExpression {
    raw(
        timestamp_ms,
        &[
            (Emotion::Neutral, 0.3),
            (Emotion::Happy, 0.1),
            (Emotion::Sad, 0.35),
            (Emotion::Angry, 0.1),
            (Emotion::Fearful, 0.05),
            (Emotion::Disgusted, 0.05),
            (Emotion::Surprised, 0.05),
        ],
    )
}

fn happy_raw(timestamp_ms: u64) -> RawExpression {
    raw(timestamp_ms, &[(Emotion::Happy, 0.9), (Emotion::Neutral, 0.1)])
}

fn full_kit() -> ComfortKitConfig {
    ComfortKitConfig {
        music: Some("Rain / Ocean waves".into()),
        visual: Some("Space / Stars".into()),
        activity: Some("Drawing / Coloring".into()),
        support: Some("Breathing exercise".into()),
        anchor: Some("The beach last summer".into()),
    }
}

fn new_session(
    config: FusionConfig,
) -> (Arc<Session>, Receiver<EffectRequest>, Receiver<SessionEvent>) {
    let (sink, effects) = ChannelEffectSink::new();
    let session = Session::new(config, Arc::new(sink));
    let events = session.subscribe();
    (session, effects, events)
}

fn strict_scoring() -> FusionConfig {
    let mut config = FusionConfig::default();
    config.scoring.moderate_cutoff = 70;
    config
}

fn activations(events: &[SessionEvent]) -> Vec<&SessionEvent> {
    events
        .iter()
        .filter(|e| matches!(e, SessionEvent::Activated { .. }))
        .collect()
}

#[test]
fn sad_window_dispatches_full_kit_once() {
    let (session, effects, events) = new_session(FusionConfig::default());
    session.start_session_with(full_kit(), Capabilities::default(), 0);

    for i in 0..5 {
        session.ingest_expression(&sad_raw(i * 2_000));
    }
    let seen: Vec<_> = events.try_iter().collect();
    let sad_changes = seen
        .iter()
        .filter(|e| **e == SessionEvent::DominantEmotionChanged { emotion: Emotion::Sad })
        .count();
    assert_eq!(sad_changes, 1);
    assert_eq!(
        activations(&seen),
        vec![&SessionEvent::Activated {
            reason: ActivationReason::Emotion,
            kit: full_kit(),
        }]
    );

    let dispatched: Vec<_> = effects.try_iter().collect();
    assert_eq!(
        dispatched,
        vec![
            EffectRequest::PlayAudio {
                asset: "/sounds/rain.mp3".into(),
                looped: false
            },
            EffectRequest::ApplyTheme {
                asset: "/visuals/space.jpg".into()
            },
            EffectRequest::ShowActivityPrompt {
                activity: comfortkit::dispatch::Activity::DrawingColoring,
                message: "Grab some colors and draw something fun!".into(),
            },
            EffectRequest::ShowSupportPrompt {
                support: comfortkit::dispatch::SupportTool::Breathing,
                message: "Inhale deeply... exhale slowly... repeat 5 times.".into(),
            },
            EffectRequest::ShowAnchorReminder {
                text: "Anchor Reminder: The beach last summer".into()
            },
        ]
    );

    // recovery does not re-fire while latched
    for i in 5..10 {
        session.ingest_expression(&happy_raw(i * 2_000));
    }
    let later: Vec<_> = events.try_iter().collect();
    assert!(activations(&later).is_empty());
    assert!(later.contains(&SessionEvent::DominantEmotionChanged {
        emotion: Emotion::Happy
    }));
    assert_eq!(effects.try_iter().count(), 0);
    assert_eq!(session.trigger_state(), TriggerState::Activated);
}

#[test]
fn reset_allows_a_second_dispatch() {
    let (session, effects, events) = new_session(FusionConfig::default());
    session.start_session_with(full_kit(), Capabilities::default(), 0);
    session.ingest_expression(&sad_raw(0));
    assert_eq!(effects.try_iter().count(), 5);

    assert!(session.reset());
    assert_eq!(session.window_len(), 0);
    assert_eq!(session.confidence().bucket, ConfidenceBucket::Analyzing);

    session.ingest_expression(&sad_raw(2_000));
    assert_eq!(effects.try_iter().count(), 5);
    let seen: Vec<_> = events.try_iter().collect();
    assert_eq!(activations(&seen).len(), 2);
}

#[test]
fn concurrent_producers_activate_once() {
    let (session, effects, events) = new_session(strict_scoring());
    session.start_session_with(full_kit(), Capabilities::default(), 0);

    let mut handles = Vec::new();
    for t in 0..4u64 {
        let face = Arc::clone(&session);
        handles.push(std::thread::spawn(move || {
            for i in 0..50 {
                face.ingest_expression(&sad_raw(t * 1_000_000 + i));
            }
        }));
    }
    let speech = Arc::clone(&session);
    handles.push(std::thread::spawn(move || {
        for i in 1..=20u64 {
            speech.ingest_transcript(&TranscriptFragment::incremental(i * 5_000, "um"));
        }
    }));
    for handle in handles {
        handle.join().unwrap();
    }

    let seen: Vec<_> = events.try_iter().collect();
    assert_eq!(activations(&seen).len(), 1);
    assert_eq!(effects.try_iter().count(), 5);
}

#[test]
fn reset_racing_a_producer_never_reactivates_from_stale_window() {
    let (session, _effects, _events) = new_session(FusionConfig::default());
    session.start_session_with(full_kit(), Capabilities::default(), 0);

    for round in 0..2_000u64 {
        let ts = round * 10;
        session.ingest_expression(&raw(ts, &[(Emotion::Sad, 0.9)]));
        assert_eq!(session.trigger_state(), TriggerState::Activated);

        // the all-zero sample only qualifies when averaged with the sad one
        let barrier = Arc::new(std::sync::Barrier::new(2));
        let face = Arc::clone(&session);
        let face_barrier = Arc::clone(&barrier);
        let producer = std::thread::spawn(move || {
            face_barrier.wait();
            face.ingest_expression(&raw(ts + 1, &[]));
        });
        barrier.wait();
        assert!(session.reset());
        producer.join().unwrap();

        assert_eq!(
            session.trigger_state(),
            TriggerState::Idle,
            "stale window re-latched in round {round}"
        );
    }
}

#[test]
fn low_confidence_alone_activates() {
    let (session, _effects, events) = new_session(strict_scoring());
    session.start_session_with(
        ComfortKitConfig::default(),
        Capabilities {
            expression: false,
            transcript: true,
        },
        0,
    );
    for i in 1..=5u64 {
        session.ingest_transcript(&TranscriptFragment::incremental(i * 5_000, "well"));
    }
    let seen: Vec<_> = events.try_iter().collect();
    assert_eq!(
        activations(&seen),
        vec![&SessionEvent::Activated {
            reason: ActivationReason::Confidence,
            kit: ComfortKitConfig::default(),
        }]
    );
}

#[test]
fn missing_transcript_never_counts_as_low() {
    let (session, _effects, events) = new_session(FusionConfig::default());
    session.start_session_with(
        full_kit(),
        Capabilities {
            expression: true,
            transcript: false,
        },
        0,
    );
    for i in 0..5 {
        session.ingest_expression(&happy_raw(i * 2_000));
    }
    assert_eq!(session.confidence().bucket, ConfidenceBucket::Analyzing);
    assert_eq!(session.trigger_state(), TriggerState::Idle);
    let seen: Vec<_> = events.try_iter().collect();
    assert!(seen.contains(&SessionEvent::ChannelDegraded {
        channel: Channel::Transcript,
        reason: "transcript producer unavailable".into(),
    }));
}

#[test]
fn inputs_after_stop_are_dropped() {
    let (session, effects, _events) = new_session(FusionConfig::default());
    session.start_session_with(full_kit(), Capabilities::default(), 0);
    session.stop_session();
    assert_eq!(session.ingest_expression(&sad_raw(0)), None);
    assert_eq!(session.trigger_state(), TriggerState::Idle);
    assert_eq!(effects.try_iter().count(), 0);
}

#[tokio::test(start_paused = true)]
async fn override_switch_cancels_previous_timer() {
    let (session, effects, _events) = new_session(FusionConfig::default());
    session.start_session_with(full_kit(), Capabilities::default(), 0);

    session.set_override(OverrideMode::StressRelief(ReliefMode::Breathing));
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(session.pacer_state(), Some((PhaseName::Inhale, 1)));
    assert_eq!(session.live_timers(), 1);

    session.set_override(OverrideMode::StressRelief(ReliefMode::Bubbles));
    tokio::time::sleep(Duration::from_millis(6_100)).await;
    assert_eq!(session.live_timers(), 1);
    assert_eq!(session.bubble_count(), 5);

    let emitted: Vec<_> = effects.try_iter().collect();
    let cleared = emitted
        .iter()
        .position(|e| *e == EffectRequest::ClearRelief)
        .unwrap();
    assert!(emitted[cleared..]
        .iter()
        .all(|e| !matches!(e, EffectRequest::ShowBreathingPhase { .. })));
}

#[tokio::test(start_paused = true)]
async fn stop_session_leaves_no_timers() {
    let (session, effects, _events) = new_session(FusionConfig::default());
    session.start_session_with(full_kit(), Capabilities::default(), 0);
    session.set_override(OverrideMode::StressRelief(ReliefMode::RepeatAfterMe));
    tokio::time::sleep(Duration::from_millis(5_500)).await;
    let shown: Vec<_> = effects.try_iter().collect();
    assert!(shown
        .iter()
        .any(|e| matches!(e, EffectRequest::ShowAffirmation { index: 1, .. })));

    session.stop_session();
    assert_eq!(
        effects.try_iter().collect::<Vec<_>>(),
        vec![EffectRequest::ClearRelief]
    );
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(session.live_timers(), 0);
    assert_eq!(session.override_mode(), OverrideMode::None);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(effects.try_iter().count(), 0);
}

#[tokio::test(start_paused = true)]
async fn music_override_loops_kit_track_and_stops_on_exit() {
    let (session, effects, _events) = new_session(FusionConfig::default());
    session.start_session_with(full_kit(), Capabilities::default(), 0);
    session.set_override(OverrideMode::StressRelief(ReliefMode::Music));
    assert_eq!(session.live_timers(), 0);
    assert_eq!(
        effects.try_iter().collect::<Vec<_>>(),
        vec![EffectRequest::PlayAudio {
            asset: "/sounds/rain.mp3".into(),
            looped: true
        }]
    );

    session.set_override(OverrideMode::None);
    assert_eq!(
        effects.try_iter().collect::<Vec<_>>(),
        vec![EffectRequest::StopAudio, EffectRequest::ClearRelief]
    );
}

struct ScriptedFace {
    clock: AtomicU64,
}

impl ExpressionSource for ScriptedFace {
    fn poll(&self) -> Option<RawExpression> {
        let ts = self.clock.fetch_add(2_000, Ordering::SeqCst);
        Some(sad_raw(ts))
    }
}

#[tokio::test(start_paused = true)]
async fn sampler_drives_activation_and_stops_with_session() {
    let (session, effects, _events) = new_session(FusionConfig::default());
    session.start_session_with(full_kit(), Capabilities::default(), 0);
    assert!(session.spawn_sampler(Arc::new(ScriptedFace {
        clock: AtomicU64::new(0),
    })));

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(session.trigger_state(), TriggerState::Activated);
    assert_eq!(session.window_len(), 1);
    assert_eq!(effects.try_iter().count(), 5);

    session.stop_session();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(session.live_timers(), 0);
    assert_eq!(session.window_len(), 1);
}
