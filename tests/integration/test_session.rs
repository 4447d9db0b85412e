//! End-to-end tests of a practice session: batch streaming, background
//! prefetch, swapping and settings changes, driven through the public
//! orchestrator API against a scripted generation service.

mod common;

use std::time::Duration;

use common::{orchestrator, wait_for, Script, ScriptedService};
use quantprep_core::{
    Batch, BatchMode, BatchReport, BufferPhase, Difficulty, GenerateOutcome, Language, ModelTier,
    SessionEvent, SessionSnapshot, SettingsPatch, SlotStatus,
};
use quantprep_render::json::JsonGenerator;
use quantprep_render::{MarkdownGenerator, Reveal};
use tokio::sync::broadcast;
use tokio::time::timeout;

fn titles(batch: &Batch) -> Vec<String> {
    batch
        .slots
        .iter()
        .map(|slot| slot.data.title.clone().unwrap_or_default())
        .collect()
}

/// Receives events until one matches `pred`, returning everything seen.
async fn collect_until(
    events: &mut broadcast::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("Timeout waiting for event")
            .expect("Event stream closed");
        let done = pred(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

// ============================================================================
// Batch and Prefetch
// ============================================================================

/// The first set streams in the foreground; the next one is prefetched as
/// soon as it finishes.
#[tokio::test]
async fn test_first_set_streams_then_next_set_prefetches() {
    let service = ScriptedService::new();
    let session = orchestrator(service.clone(), 6);

    let outcome = session.generate().await.unwrap();
    let GenerateOutcome::Completed { report, .. } = outcome else {
        panic!("Expected a foreground batch, got {outcome:?}");
    };
    assert_eq!(
        report,
        BatchReport {
            succeeded: 6,
            failed: 0
        }
    );

    let snapshot = session.snapshot();
    assert_eq!(snapshot.active.slots.len(), 6);
    for slot in &snapshot.active.slots {
        assert_eq!(slot.status, SlotStatus::Succeeded);
        assert_eq!(slot.data.solution.as_deref(), Some("$E[N] = 6$."));
        assert_eq!(
            slot.data.key_takeaway.as_deref(),
            Some("First-step analysis.")
        );
    }

    wait_for(&session, SessionSnapshot::is_buffer_ready).await;
    assert_eq!(service.calls(), 12);
}

/// Showing a ready buffer is instant and starts the following prefetch.
#[tokio::test]
async fn test_swap_shows_buffer_and_refills() {
    let service = ScriptedService::new();
    let session = orchestrator(service.clone(), 6);

    session.generate().await.unwrap();
    wait_for(&session, SessionSnapshot::is_buffer_ready).await;
    let buffered = session.snapshot().buffer.unwrap();

    let outcome = session.generate().await.unwrap();
    assert_eq!(
        outcome,
        GenerateOutcome::Swapped {
            token: buffered.token
        }
    );

    let snapshot = session.snapshot();
    assert_eq!(snapshot.active, buffered);
    assert!(!snapshot.active_loading);
    assert_ne!(snapshot.buffer_phase, BufferPhase::Empty);

    wait_for(&session, SessionSnapshot::is_buffer_ready).await;
    assert_eq!(service.calls(), 18);
}

/// A settings change drops the prefetched set and the refill uses the new
/// settings; the visible set is left alone.
#[tokio::test]
async fn test_settings_change_replaces_prefetched_set() {
    let service = ScriptedService::new();
    let session = orchestrator(service.clone(), 3);

    session.generate().await.unwrap();
    wait_for(&session, SessionSnapshot::is_buffer_ready).await;
    let visible = session.snapshot().active;

    let changed = session.update_settings(&SettingsPatch {
        difficulty: Some(Difficulty::Hard),
        model: Some(ModelTier::Pro),
        ..Default::default()
    });
    assert!(changed);

    wait_for(&session, |s| {
        s.is_buffer_ready()
            && s.buffer
                .as_ref()
                .is_some_and(|b| b.request.difficulty == Difficulty::Hard)
    })
    .await;
    assert_eq!(session.snapshot().active, visible);

    session.generate().await.unwrap();
    let shown = session.snapshot().active;
    assert!(titles(&shown).iter().all(|t| t.starts_with("Hard #")));
    assert!(service
        .models()
        .iter()
        .rev()
        .take(3)
        .all(|m| m == "gemini-3-pro-preview"));
}

/// Picking a preset topic drops a custom topic, so the prefetched set is
/// replaced by one on the preset.
#[tokio::test]
async fn test_preset_topic_replaces_custom_topic_set() {
    let service = ScriptedService::new();
    let session = orchestrator(service.clone(), 3);
    session.update_settings(&SettingsPatch {
        custom_topic: Some("Markov Chains".to_string()),
        ..Default::default()
    });

    session.generate().await.unwrap();
    wait_for(&session, SessionSnapshot::is_buffer_ready).await;
    let stale = session.snapshot().buffer.unwrap();
    assert_eq!(stale.request.effective_topic(), "Markov Chains");

    let mut events = session.subscribe();
    let patch = SettingsPatch::from_key_value("topic", "statistics").unwrap();
    assert!(session.update_settings(&patch));

    let seen = collect_until(&mut events, |e| matches!(e, SessionEvent::BufferDiscarded(_))).await;
    let SessionEvent::BufferDiscarded(discarded) = seen.last().unwrap() else {
        panic!("Expected buffer_discarded");
    };
    assert_eq!(discarded.token, Some(stale.token));
    assert_eq!(session.snapshot().request.effective_topic(), "Statistics");

    wait_for(&session, |s| {
        s.is_buffer_ready()
            && s.buffer
                .as_ref()
                .is_some_and(|b| b.request.effective_topic() == "Statistics")
    })
    .await;
    assert!(service
        .topics()
        .iter()
        .rev()
        .take(3)
        .all(|t| t == "Statistics"));
}

/// Partial failures keep whatever content arrived and still settle the batch.
#[tokio::test]
async fn test_failed_slots_keep_partial_content() {
    let service = ScriptedService::new();
    service.set_script(Script::BreakAfterTitle);
    let session = orchestrator(service.clone(), 4);

    let outcome = session.generate().await.unwrap();
    let GenerateOutcome::Completed { report, .. } = outcome else {
        panic!("Expected a foreground batch, got {outcome:?}");
    };
    assert_eq!(report.failed, 4);

    let snapshot = session.snapshot();
    assert!(snapshot.active.slots.iter().all(|s| s.status.is_failed()));
    assert!(snapshot.active.has_any_title());
    assert!(snapshot
        .last_error
        .as_deref()
        .is_some_and(|e| e.starts_with("All 4 questions failed")));
}

/// When nothing arrives at all the session reports an error and does not
/// prefetch.
#[tokio::test]
async fn test_refused_batch_sets_error_without_prefetch() {
    let service = ScriptedService::new();
    service.set_script(Script::Refuse);
    let session = orchestrator(service.clone(), 2);
    let mut events = session.subscribe();

    session.generate().await.unwrap();
    let seen = collect_until(&mut events, |e| matches!(e, SessionEvent::Error(_))).await;
    let SessionEvent::Error(error) = seen.last().unwrap() else {
        panic!("Expected an error event");
    };
    assert!(error.message.contains("quota exceeded"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = session.snapshot();
    assert_eq!(snapshot.buffer_phase, BufferPhase::Empty);
    assert_eq!(service.calls(), 2);

    // The next attempt clears the error
    service.set_script(Script::Complete);
    session.generate().await.unwrap();
    assert!(session.snapshot().last_error.is_none());
}

/// Only one background batch runs at a time; re-evaluating while it loads
/// starts nothing.
#[tokio::test]
async fn test_single_prefetch_while_loading() {
    let service = ScriptedService::held();
    let session = orchestrator(service.clone(), 2);

    session.begin_generate().unwrap();
    service.release(2);
    wait_for(&session, SessionSnapshot::is_buffer_loading).await;

    for _ in 0..5 {
        assert_eq!(session.evaluate(), None);
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(service.calls(), 4);

    let snapshot = session.snapshot();
    assert!(snapshot.is_buffer_loading());
    assert!(!snapshot.is_buffer_ready());

    service.release(2);
    wait_for(&session, SessionSnapshot::is_buffer_ready).await;
    assert_eq!(service.calls(), 4);
}

// ============================================================================
// Events
// ============================================================================

/// Subscribers see the foreground batch start, its slots stream and settle,
/// and the prefetched set become ready.
#[tokio::test]
async fn test_event_sequence_for_first_set() {
    let service = ScriptedService::new();
    let session = orchestrator(service, 2);
    let mut events = session.subscribe();

    session.begin_generate().unwrap();
    let seen = collect_until(&mut events, |e| matches!(e, SessionEvent::BufferReady(_))).await;

    let SessionEvent::BatchStarted(first) = &seen[0] else {
        panic!("Expected batch_started first, got {:?}", seen[0]);
    };
    assert_eq!(first.mode, BatchMode::Foreground);
    assert_eq!(first.size, 2);

    let settled: Vec<_> = seen
        .iter()
        .filter_map(|e| match e {
            SessionEvent::SlotSettled(p) if p.mode == BatchMode::Foreground => Some(p.slot),
            _ => None,
        })
        .collect();
    assert_eq!(settled.len(), 2);

    assert!(seen.iter().any(|e| matches!(
        e,
        SessionEvent::SlotUpdated(p) if p.mode == BatchMode::Foreground
            && p.data.title.as_deref().is_some_and(|t| t.starts_with("Medium #"))
    )));
    assert!(seen.iter().any(|e| matches!(
        e,
        SessionEvent::BatchCompleted(p) if p.mode == BatchMode::Foreground
    )));
    assert!(seen.iter().any(|e| matches!(
        e,
        SessionEvent::BatchStarted(p) if p.mode == BatchMode::Background
    )));
}

// ============================================================================
// Rendering
// ============================================================================

/// A finished session renders as localized cards and exports as JSON.
#[tokio::test]
async fn test_session_renders_and_exports() {
    let service = ScriptedService::new();
    let session = orchestrator(service, 2);

    session.update_settings(&SettingsPatch {
        language: Some(Language::Chinese),
        ..Default::default()
    });
    session.generate().await.unwrap();
    let snapshot = session.snapshot();

    let generator = MarkdownGenerator::new(snapshot.request.language);
    let markdown = generator.session(&snapshot, &[Reveal::ALL]);
    assert!(markdown.contains("#### 问题 1: Medium #"));
    assert!(markdown.contains("**核心要点**"));
    assert!(markdown.contains("#### 问题 2"));

    let export = JsonGenerator::new(&snapshot.active).export();
    assert_eq!(export.language, Language::Chinese);
    assert_eq!(export.questions.len(), 2);
    assert!(export
        .questions
        .iter()
        .all(|q| q.status == SlotStatus::Succeeded));
}
