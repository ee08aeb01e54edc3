use loomresearch::channels::Channel;
use loomresearch::channels::errors::ErrorEvent;
use loomresearch::config::ResearchConfig;
use loomresearch::finding::Finding;
use loomresearch::source::Source;
use loomresearch::state::ResearchState;

fn fresh() -> ResearchState {
    ResearchState::new("thread-1", "what is rust", &ResearchConfig::default())
}

#[test]
fn new_initializes_all_channels_at_version_one() {
    let state = fresh();
    let snap = state.snapshot();

    assert_eq!(snap.query, "what is rust");
    assert_eq!(snap.thread_id, "thread-1");
    assert_eq!(snap.iteration, 0);

    assert!(snap.findings.is_empty());
    assert_eq!(snap.findings_version, 1);
    assert!(snap.sources.is_empty());
    assert_eq!(snap.sources_version, 1);
    assert!(snap.tool_history.is_empty());
    assert_eq!(snap.tool_history_version, 1);
    assert!(snap.gaps.is_empty());
    assert_eq!(snap.gaps_version, 1);
    assert!(snap.errors.is_empty());
    assert_eq!(snap.errors_version, 1);

    assert!(snap.budget.is_some());
    assert_eq!(snap.budget_version, 1);
    assert!(snap.stop.is_none());
    assert_eq!(snap.stop_version, 1);
    assert!(snap.final_answer.is_none());
    assert_eq!(snap.final_answer_version, 1);
    assert!(snap.strategy_context.is_none());
    assert_eq!(snap.strategy_context_version, 1);
}

#[test]
fn snapshot_is_deep_copy() {
    let mut state = fresh();
    let snap = state.snapshot();

    state
        .findings
        .get_mut()
        .push(Finding::new("f-1", "new", "fixture", 0));
    state
        .sources
        .get_mut()
        .push(Source::new("https://a.example/", "a", 0));

    assert!(snap.findings.is_empty());
    assert!(snap.sources.is_empty());
    assert_eq!(state.findings.snapshot().len(), 1);
    assert_eq!(state.sources.snapshot().len(), 1);
}

#[test]
fn clone_is_deep() {
    let mut state = fresh();
    state
        .findings
        .get_mut()
        .push(Finding::new("f-1", "original", "fixture", 0));
    let cloned = state.clone();

    state
        .findings
        .get_mut()
        .push(Finding::new("f-2", "mutated after clone", "fixture", 0));

    assert_eq!(cloned.findings.snapshot().len(), 1);
    assert_eq!(state.findings.snapshot().len(), 2);
    assert_eq!(cloned.findings.snapshot()[0].content, "original");
}

#[test]
fn channels_version_independently() {
    let mut state = fresh();
    state
        .findings
        .get_mut()
        .push(Finding::new("f-1", "x", "fixture", 0));
    state.findings.bump_version();

    assert_eq!(state.findings.version(), 2);
    assert_eq!(state.sources.version(), 1);
    assert_eq!(state.errors.version(), 1);
}

#[test]
fn errors_channel_accumulates_independently_of_findings() {
    let mut state = fresh();
    state.errors.get_mut().push(ErrorEvent::default());
    state.errors.bump_version();

    assert_eq!(state.errors.snapshot().len(), 1);
    assert_eq!(state.errors.version(), 2);
    assert!(state.findings.snapshot().is_empty());
    assert_eq!(state.findings.version(), 1);
}
