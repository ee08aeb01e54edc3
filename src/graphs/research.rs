//! The canonical research graph: `Intake -> Plan -> Dispatch -> Validate ->
//! Score -> Arbitrate -> {Plan | Synthesize | Abort}`.
//!
//! [`build_research_graph`] wires the nine components together behind
//! [`GraphBuilder`], injecting the collaborators ([`ToolExecutor`],
//! [`PermissionGate`], [`ModelCoordinator`]) that live outside this crate.
//! The returned builder still needs runtime configuration (checkpointer,
//! session id) before [`GraphBuilder::compile`].

use std::sync::Arc;

use crate::config::ResearchConfig;
use crate::model::ModelCoordinator;
use crate::nodes::{Abort, Arbitrate, Dispatch, Intake, Plan, Score, Synthesize, Validate};
use crate::stop::StopRecommendation;
use crate::tool::{PermissionGate, ToolExecutor};
use crate::types::NodeKind;

use super::builder::GraphBuilder;
use super::edges::EdgePredicate;

/// Builds the canonical research graph. `config` seeds both `Plan`'s task
/// generation and `Arbitrate`'s stop thresholds, so it's cloned into each.
#[must_use]
pub fn build_research_graph(
    config: ResearchConfig,
    tool_executor: Arc<dyn ToolExecutor>,
    permission_gate: Arc<dyn PermissionGate>,
    model_coordinator: Arc<dyn ModelCoordinator>,
) -> GraphBuilder {
    let enable_debate = config.enable_debate;
    let allow_external = config.allow_external;
    let prefer_local = config.prefer_local;

    GraphBuilder::new()
        .add_node(NodeKind::Intake, Intake)
        .add_node(NodeKind::Plan, Plan::new(config.clone()))
        .add_node(NodeKind::Dispatch, Dispatch::new(tool_executor, permission_gate, allow_external))
        .add_node(NodeKind::Validate, Validate)
        .add_node(NodeKind::Score, Score)
        .add_node(NodeKind::Arbitrate, Arbitrate::new(config))
        .add_node(NodeKind::Synthesize, Synthesize::new(model_coordinator, enable_debate, prefer_local))
        .add_node(NodeKind::Abort, Abort)
        .add_edge(NodeKind::Start, NodeKind::Intake)
        .add_edge(NodeKind::Intake, NodeKind::Plan)
        .add_edge(NodeKind::Plan, NodeKind::Dispatch)
        .add_edge(NodeKind::Dispatch, NodeKind::Validate)
        .add_edge(NodeKind::Validate, NodeKind::Score)
        .add_edge(NodeKind::Score, NodeKind::Arbitrate)
        .add_edge(NodeKind::Synthesize, NodeKind::End)
        .add_edge(NodeKind::Abort, NodeKind::End)
        .add_conditional_edge(NodeKind::Arbitrate, route_after_arbitration())
}

/// Reads the arbiter's `StopDecision` off the snapshot: continue loops back
/// to `Plan`; a hard or soft stop routes to whichever node the decision
/// recommended. A missing decision (the arbiter hasn't run, or raced with a
/// barrier) is treated as "keep going" rather than silently dead-ending.
fn route_after_arbitration() -> EdgePredicate {
    Arc::new(|snapshot| {
        let Some(decision) = snapshot.stop.as_ref() else {
            return vec![NodeKind::Plan.encode()];
        };
        if !decision.should_stop {
            return vec![NodeKind::Plan.encode()];
        }
        let target = match decision.recommendation {
            Some(StopRecommendation::Synthesize) => NodeKind::Synthesize,
            Some(StopRecommendation::Abort) | None => NodeKind::Abort,
        };
        vec![target.encode()]
    })
}
