//! Superstep scheduling for concurrent node execution.
//!
//! A [`Scheduler`] drives exactly one superstep: every `NodeKind` currently
//! on the frontier runs concurrently against the same immutable
//! [`ResearchStateSnapshot`], and the caller (the runner) folds their
//! [`NodePartial`] outputs through the barrier merge afterward. `NodeKind::End`
//! never has a registered node and is always skipped.
//!
//! # Examples
//!
//! ```rust,no_run
//! use loomresearch::schedulers::{Scheduler, SchedulerState};
//! use loomresearch::state::ResearchState;
//! use loomresearch::config::ResearchConfig;
//! use loomresearch::types::NodeKind;
//! use rustc_hash::FxHashMap;
//!
//! # async fn example(
//! #     nodes: FxHashMap<NodeKind, std::sync::Arc<dyn loomresearch::node::Node>>,
//! #     emitter: std::sync::Arc<dyn loomresearch::event_bus::EventEmitter>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = Scheduler::new(4);
//! let mut scheduler_state = SchedulerState::default();
//! let state = ResearchState::new("thread-1", "query", &ResearchConfig::default());
//! let snapshot = state.snapshot();
//! let result = scheduler
//!     .superstep(&mut scheduler_state, &nodes, vec![NodeKind::Start], snapshot, 1, emitter)
//!     .await?;
//! println!("ran {} nodes", result.ran_nodes.len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::task::JoinError;

use crate::event_bus::EventEmitter;
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::state::ResearchStateSnapshot;
use crate::types::NodeKind;

/// Per-session scheduler gating state, persisted across steps via checkpoints.
///
/// `versions_seen` is reserved for version-gated re-execution (skip a node
/// whose upstream channels haven't changed since it last ran); the current
/// scheduler always re-runs every frontier node, but the field is threaded
/// through checkpoints so that optimization can land without a storage
/// migration.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    pub versions_seen: FxHashMap<String, FxHashMap<String, u64>>,
}

/// Concurrent executor for one superstep of the graph.
#[derive(Debug, Clone)]
pub struct Scheduler {
    /// Upper bound on concurrently in-flight node tasks. Advisory: tokio's
    /// own multi-threaded runtime does the actual scheduling, this simply
    /// caps how many spawned tasks we allow outstanding at once.
    pub concurrency_limit: usize,
}

/// Outcome of running one superstep, ready for the barrier merge.
pub struct SchedulerStepResult {
    /// Nodes that executed, in deterministic lexicographic order by encoded id.
    pub ran_nodes: Vec<NodeKind>,
    /// Nodes on the frontier that were skipped (End, or unregistered custom ids).
    pub skipped_nodes: Vec<NodeKind>,
    /// Each ran node's output, paired with the node that produced it.
    pub outputs: Vec<(NodeKind, NodePartial)>,
}

/// Errors raised while executing a superstep.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum SchedulerError {
    #[error("node {kind} failed at step {step}: {source}")]
    #[diagnostic(code(loomresearch::scheduler::node_run))]
    NodeRun {
        kind: NodeKind,
        step: u64,
        #[source]
        source: NodeError,
    },

    #[error("scheduler task join error: {0}")]
    #[diagnostic(code(loomresearch::scheduler::join))]
    Join(#[from] JoinError),
}

impl Scheduler {
    /// Create a scheduler with the given concurrency ceiling (clamped to at least 1).
    #[must_use]
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    /// Run every distinct node on `frontier` concurrently against `snapshot`.
    ///
    /// Nodes are deduplicated and sorted lexicographically by their encoded
    /// `NodeKind` before dispatch, so that two runs over the same frontier
    /// always spawn tasks in the same order (wall-clock completion order
    /// may still differ; the barrier merge in [`crate::app::App::apply_barrier`]
    /// is what makes the final state deterministic, not spawn order).
    pub async fn superstep(
        &self,
        scheduler_state: &mut SchedulerState,
        nodes: &FxHashMap<NodeKind, Arc<dyn Node>>,
        frontier: Vec<NodeKind>,
        snapshot: ResearchStateSnapshot,
        step: u64,
        emitter: Arc<dyn EventEmitter>,
    ) -> Result<SchedulerStepResult, SchedulerError> {
        let mut dedup: Vec<NodeKind> = Vec::with_capacity(frontier.len());
        for kind in frontier {
            if !dedup.contains(&kind) {
                dedup.push(kind);
            }
        }
        dedup.sort_by_key(|k| k.encode().to_string());

        let mut ran_nodes = Vec::new();
        let mut skipped_nodes = Vec::new();
        let mut handles: Vec<(NodeKind, tokio::task::JoinHandle<_>)> = Vec::new();

        for kind in dedup {
            if kind.is_end() {
                skipped_nodes.push(kind);
                continue;
            }
            let Some(node) = nodes.get(&kind).cloned() else {
                skipped_nodes.push(kind);
                continue;
            };
            let ctx = NodeContext {
                node_id: kind.encode().to_string(),
                step,
                event_emitter: emitter.clone(),
            };
            let snapshot = snapshot.clone();
            ran_nodes.push(kind.clone());
            handles.push((kind, tokio::spawn(async move { node.run(snapshot, ctx).await })));
        }

        let mut outputs = Vec::with_capacity(handles.len());
        for (kind, handle) in handles {
            let result = handle.await.map_err(SchedulerError::Join)?;
            let partial = result.map_err(|source| SchedulerError::NodeRun {
                kind: kind.clone(),
                step,
                source,
            })?;
            outputs.push((kind, partial));
        }

        scheduler_state
            .versions_seen
            .entry("__runner".to_string())
            .or_default()
            .insert("last_step".to_string(), step);

        Ok(SchedulerStepResult {
            ran_nodes,
            skipped_nodes,
            outputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResearchConfig;
    use crate::event_bus::EventBus;
    use crate::node::NodeError;
    use crate::state::ResearchState;
    use async_trait::async_trait;

    struct EchoNode;

    #[async_trait]
    impl Node for EchoNode {
        async fn run(
            &self,
            _snapshot: ResearchStateSnapshot,
            _ctx: NodeContext,
        ) -> Result<NodePartial, NodeError> {
            Ok(NodePartial::default())
        }
    }

    struct FailNode;

    #[async_trait]
    impl Node for FailNode {
        async fn run(
            &self,
            _snapshot: ResearchStateSnapshot,
            ctx: NodeContext,
        ) -> Result<NodePartial, NodeError> {
            Err(NodeError::ValidationFailed(format!(
                "boom at step {}",
                ctx.step
            )))
        }
    }

    #[tokio::test]
    async fn runs_registered_nodes_and_skips_end() {
        let mut nodes: FxHashMap<NodeKind, Arc<dyn Node>> = FxHashMap::default();
        nodes.insert(NodeKind::Intake, Arc::new(EchoNode));

        let scheduler = Scheduler::new(2);
        let mut scheduler_state = SchedulerState::default();
        let state = ResearchState::new("t1", "q", &ResearchConfig::default());
        let bus = EventBus::default();
        let result = scheduler
            .superstep(
                &mut scheduler_state,
                &nodes,
                vec![NodeKind::Intake, NodeKind::End],
                state.snapshot(),
                1,
                bus.get_emitter(),
            )
            .await
            .expect("superstep succeeds");

        assert_eq!(result.ran_nodes, vec![NodeKind::Intake]);
        assert_eq!(result.skipped_nodes, vec![NodeKind::End]);
        assert_eq!(result.outputs.len(), 1);
        assert!(scheduler_state.versions_seen.contains_key("__runner"));
    }

    #[tokio::test]
    async fn propagates_node_failure_as_scheduler_error() {
        let mut nodes: FxHashMap<NodeKind, Arc<dyn Node>> = FxHashMap::default();
        nodes.insert(NodeKind::Plan, Arc::new(FailNode));

        let scheduler = Scheduler::new(1);
        let mut scheduler_state = SchedulerState::default();
        let state = ResearchState::new("t1", "q", &ResearchConfig::default());
        let bus = EventBus::default();
        let err = scheduler
            .superstep(
                &mut scheduler_state,
                &nodes,
                vec![NodeKind::Plan],
                state.snapshot(),
                3,
                bus.get_emitter(),
            )
            .await
            .expect_err("node failure surfaces");

        match err {
            SchedulerError::NodeRun { kind, step, .. } => {
                assert_eq!(kind, NodeKind::Plan);
                assert_eq!(step, 3);
            }
            other => panic!("expected NodeRun error, got {other:?}"),
        }
    }
}
