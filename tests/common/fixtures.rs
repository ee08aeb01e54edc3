use loomresearch::config::ResearchConfig;
use loomresearch::state::{ResearchState, ResearchStateSnapshot};

/// A fresh research state for `query`, default config, thread id `"thread-1"`.
pub fn research_state(query: &str) -> ResearchState {
    ResearchState::new("thread-1", query, &ResearchConfig::default())
}

/// Same as [`research_state`] but with an explicit thread id, useful when a
/// test needs several independent sessions.
pub fn research_state_with_thread(thread_id: &str, query: &str) -> ResearchState {
    ResearchState::new(thread_id, query, &ResearchConfig::default())
}

pub fn empty_snapshot() -> ResearchStateSnapshot {
    research_state("").snapshot()
}
