use loomresearch::app::App;
use loomresearch::channels::Channel;
use loomresearch::state::ResearchState;
use loomresearch::types::NodeKind;

#[allow(dead_code)]
pub fn assert_edge(app: &App, from: NodeKind, to: NodeKind) {
    let edges = app.edges();
    let outs = edges.get(&from).expect("source node has edges");
    assert!(outs.contains(&to), "expected edge {from:?} -> {to:?}");
}

#[allow(dead_code)]
pub fn assert_finding_contains(state: &ResearchState, needle: &str) {
    let findings = state.findings.snapshot();
    let found = findings.iter().any(|f| f.content.contains(needle));
    assert!(
        found,
        "expected at least one finding containing '{needle}', got: {:?}",
        findings
    );
}

#[allow(dead_code)]
pub fn assert_has_source(state: &ResearchState, url: &str) {
    let sources = state.sources.snapshot();
    assert!(
        sources.iter().any(|s| s.url == url),
        "expected sources to contain '{url}', got: {:?}",
        sources.iter().map(|s| &s.url).collect::<Vec<_>>()
    );
}
