use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use loomresearch::channels::Channel;
use loomresearch::channels::errors::ErrorEvent;
use loomresearch::finding::Finding;
use loomresearch::node::NodePartial;
use loomresearch::quality::QualityScores;
use loomresearch::reducers::{AppendFindings, Reducer, ReducerRegistry, ReplaceQuality, UpsertSources};
use loomresearch::source::Source;
use loomresearch::types::ChannelType;

mod common;
use common::*;

/// Local guard prototype mirroring the registry's internal `channel_guard`:
/// reducers should be no-ops when the incoming partial carries nothing for
/// the channel in question.
fn has_findings(partial: &NodePartial) -> bool {
    partial.findings.as_ref().is_some_and(|v| !v.is_empty())
}

#[test]
fn channel_guard_prototype_skips_empty_and_missing() {
    let empty = NodePartial::default();
    assert!(!has_findings(&empty));

    let empty_vec = NodePartial {
        findings: Some(vec![]),
        ..Default::default()
    };
    assert!(!has_findings(&empty_vec));

    let populated = NodePartial {
        findings: Some(vec![Finding::new("f-1", "x", "fixture", 0)]),
        ..Default::default()
    };
    assert!(has_findings(&populated));
}

#[test]
fn append_findings_does_not_bump_version() {
    let mut state = research_state("a");
    let partial = NodePartial {
        findings: Some(vec![Finding::new("f-1", "hello", "fixture", 0)]),
        ..Default::default()
    };

    AppendFindings.apply(&mut state, &partial);

    assert_eq!(state.findings.snapshot().len(), 1);
    // The reducer only mutates the channel's data; bumping the version is
    // the barrier's responsibility, not the reducer's.
    assert_eq!(state.findings.version(), 1);
}

#[test]
fn append_findings_dedups_by_content_key_and_updates_by_id() {
    let mut state = research_state("a");
    state
        .findings
        .get_mut()
        .push(Finding::new("f-1", "same content", "fixture", 0));

    // A second finding with identical content but a different id is a
    // duplicate and should be skipped.
    let dup = NodePartial {
        findings: Some(vec![Finding::new("f-2", "same content", "fixture", 0)]),
        ..Default::default()
    };
    AppendFindings.apply(&mut state, &dup);
    assert_eq!(state.findings.snapshot().len(), 1);

    // A finding sharing an existing id is an in-place update (e.g. the
    // validator writing back an acceptance verdict), not a duplicate.
    let update = NodePartial {
        findings: Some(vec![Finding::new("f-1", "same content", "fixture", 1)]),
        ..Default::default()
    };
    AppendFindings.apply(&mut state, &update);
    assert_eq!(state.findings.snapshot().len(), 1);
    assert_eq!(state.findings.snapshot()[0].iteration, 1);
}

#[test]
fn upsert_sources_replaces_in_place_preserving_position() {
    let mut state = research_state("a");
    state
        .sources
        .get_mut()
        .push(Source::new("https://a.example/", "first", 0));
    state
        .sources
        .get_mut()
        .push(Source::new("https://b.example/", "second", 0));

    let partial = NodePartial {
        sources: Some(vec![Source::new("https://a.example/", "first-updated", 1)]),
        ..Default::default()
    };
    UpsertSources.apply(&mut state, &partial);

    let snap = state.sources.snapshot();
    assert_eq!(snap.len(), 2);
    assert_eq!(snap[0].title, "first-updated");
    assert_eq!(snap[1].title, "second");
}

#[test]
fn replace_quality_overwrites_wholesale() {
    let mut state = research_state("a");
    *state.quality.get_mut() = QualityScores {
        grounding: 0.1,
        relevancy: 0.1,
        precision: 0.1,
        recall: 0.1,
        grounded_quality: 0.1,
        confidence: 0.1,
        composite: 0.1,
    };

    let fresh = QualityScores {
        grounding: 0.9,
        relevancy: 0.8,
        precision: 0.7,
        recall: 0.6,
        grounded_quality: 0.75,
        confidence: 0.85,
        composite: 0.8,
    };
    let partial = NodePartial {
        quality: Some(fresh.clone()),
        ..Default::default()
    };
    ReplaceQuality.apply(&mut state, &partial);

    assert_eq!(state.quality.get().composite, fresh.composite);
    assert_eq!(state.quality.get().grounding, fresh.grounding);
}

#[test]
fn registry_dispatches_to_registered_channel_only() {
    let registry = ReducerRegistry::default();
    let mut state = research_state("a");

    let partial = NodePartial {
        findings: Some(vec![Finding::new("f-1", "x", "fixture", 0)]),
        sources: Some(vec![]),
        ..Default::default()
    };

    registry
        .try_update(ChannelType::Findings, &mut state, &partial)
        .unwrap();
    assert_eq!(state.findings.snapshot().len(), 1);
    // Sources carried an empty vec, so the guard should have skipped it.
    assert!(state.sources.snapshot().is_empty());
}

#[test]
fn registry_apply_all_runs_every_registered_channel() {
    let registry = ReducerRegistry::default();
    let mut state = research_state("a");

    let partial = NodePartial {
        findings: Some(vec![Finding::new("f-1", "x", "fixture", 0)]),
        sources: Some(vec![Source::new("https://a.example/", "a", 0)]),
        errors: Some(vec![ErrorEvent::default()]),
        ..Default::default()
    };

    registry.apply_all(&mut state, &partial).unwrap();

    assert_eq!(state.findings.snapshot().len(), 1);
    assert_eq!(state.sources.snapshot().len(), 1);
    assert_eq!(state.errors.snapshot().len(), 1);
}

#[test]
fn registry_custom_reducer_registration_runs_in_order() {
    let counter = Arc::new(AtomicUsize::new(0));

    #[derive(Clone)]
    struct CountingReducer(Arc<AtomicUsize>);
    impl Reducer for CountingReducer {
        fn apply(&self, _state: &mut loomresearch::state::ResearchState, _update: &NodePartial) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let mut registry = ReducerRegistry::new();
    registry
        .register(ChannelType::Findings, Arc::new(AppendFindings))
        .register(ChannelType::Findings, Arc::new(CountingReducer(counter.clone())));

    let mut state = research_state("a");
    let partial = NodePartial {
        findings: Some(vec![Finding::new("f-1", "x", "fixture", 0)]),
        ..Default::default()
    };
    registry
        .try_update(ChannelType::Findings, &mut state, &partial)
        .unwrap();

    assert_eq!(state.findings.snapshot().len(), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn registry_errors_on_unknown_channel() {
    let registry = ReducerRegistry::new();
    let mut state = research_state("a");
    let partial = NodePartial {
        findings: Some(vec![Finding::new("f-1", "x", "fixture", 0)]),
        ..Default::default()
    };
    let result = registry.try_update(ChannelType::Findings, &mut state, &partial);
    assert!(result.is_err());
}

#[tokio::test]
async fn test_reducer_thread_safety() {
    let registry = Arc::new(ReducerRegistry::default());
    let state = Arc::new(tokio::sync::Mutex::new(research_state("a")));

    let mut handles = Vec::new();
    for i in 0..8 {
        let registry = registry.clone();
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            let partial = NodePartial {
                findings: Some(vec![Finding::new(
                    format!("f-{i}"),
                    format!("content {i}"),
                    "fixture",
                    0,
                )]),
                ..Default::default()
            };
            let mut guard = state.lock().await;
            registry
                .try_update(ChannelType::Findings, &mut guard, &partial)
                .unwrap();
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let final_state = state.lock().await;
    assert_eq!(final_state.findings.snapshot().len(), 8);
}

#[tokio::test]
async fn test_reducer_determinism_under_concurrency() {
    let registry = Arc::new(ReducerRegistry::default());
    let state = Arc::new(tokio::sync::Mutex::new(research_state("a")));

    // Every task writes the same id with identical content; regardless of
    // interleaving the in-place-update path means exactly one survives.
    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            let partial = NodePartial {
                findings: Some(vec![Finding::new("shared", "same content", "fixture", 0)]),
                ..Default::default()
            };
            let mut guard = state.lock().await;
            registry
                .try_update(ChannelType::Findings, &mut guard, &partial)
                .unwrap();
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let final_state = state.lock().await;
    assert_eq!(final_state.findings.snapshot().len(), 1);
}

#[test]
fn test_reducer_channel_isolation() {
    let registry = ReducerRegistry::default();
    let mut state = research_state("a");

    let partial = NodePartial {
        findings: Some(vec![Finding::new("f-1", "x", "fixture", 0)]),
        ..Default::default()
    };
    registry
        .try_update(ChannelType::Findings, &mut state, &partial)
        .unwrap();

    assert_eq!(state.findings.snapshot().len(), 1);
    assert!(state.sources.snapshot().is_empty());
    assert!(state.errors.snapshot().is_empty());
    assert_eq!(state.sources.version(), 1);
    assert_eq!(state.errors.version(), 1);
}
