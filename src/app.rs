use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::channels::Channel;
use crate::node::*;
use crate::reducers::ReducerRegistry;
use crate::runtimes::runner::RunnerError;
use crate::runtimes::{CheckpointerType, RuntimeConfig, SessionInit};
use crate::state::*;
use crate::types::*;
use tracing::instrument;

/// Orchestrates graph execution and applies reducers at barriers.
///
/// `App` is the central coordination point for a research session's graph:
/// - Node graph topology (nodes, edges, conditional routing)
/// - State reduction through configurable reducers
/// - Runtime configuration and checkpointing
///
/// # Examples
///
/// ```rust,no_run
/// use loomresearch::graphs::GraphBuilder;
/// use loomresearch::runtimes::CheckpointerType;
/// use loomresearch::state::ResearchState;
/// use loomresearch::config::ResearchConfig;
/// use loomresearch::types::NodeKind;
/// use loomresearch::node::{Node, NodeContext, NodeError, NodePartial};
/// use async_trait::async_trait;
///
/// # struct MyNode;
/// # #[async_trait]
/// # impl Node for MyNode {
/// #     async fn run(&self, _: loomresearch::state::ResearchStateSnapshot, _: NodeContext) -> Result<NodePartial, NodeError> {
/// #         Ok(NodePartial::default())
/// #     }
/// # }
/// #
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let app = GraphBuilder::new()
///     .add_node(NodeKind::Custom("process".into()), MyNode)
///     .add_edge(NodeKind::Start, NodeKind::Custom("process".into()))
///     .add_edge(NodeKind::Custom("process".into()), NodeKind::End)
///     .compile();
///
/// let initial_state = ResearchState::new("thread-1", "hello", &ResearchConfig::default());
/// let final_state = app.invoke(initial_state).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct App {
    nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    edges: FxHashMap<NodeKind, Vec<NodeKind>>,
    conditional_edges: Vec<crate::graphs::ConditionalEdge>,
    reducer_registry: ReducerRegistry,
    runtime_config: RuntimeConfig,
}

impl App {
    /// Internal (crate) factory to build an App while keeping nodes/edges private.
    pub(crate) fn from_parts(
        nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
        edges: FxHashMap<NodeKind, Vec<NodeKind>>,
        conditional_edges: Vec<crate::graphs::ConditionalEdge>,
        runtime_config: RuntimeConfig,
    ) -> Self {
        Self::from_parts_with_reducers(
            nodes,
            edges,
            conditional_edges,
            runtime_config,
            ReducerRegistry::default(),
        )
    }

    /// Like [`Self::from_parts`], but keeps a builder-supplied reducer
    /// registry instead of always falling back to the default one.
    pub(crate) fn from_parts_with_reducers(
        nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
        edges: FxHashMap<NodeKind, Vec<NodeKind>>,
        conditional_edges: Vec<crate::graphs::ConditionalEdge>,
        runtime_config: RuntimeConfig,
        reducer_registry: ReducerRegistry,
    ) -> Self {
        App {
            nodes,
            edges,
            conditional_edges,
            reducer_registry,
            runtime_config,
        }
    }

    /// Returns a reference to the conditional edges in this graph.
    ///
    /// Conditional edges enable dynamic routing based on runtime state,
    /// allowing workflows to branch based on computed conditions. Predicates
    /// return a String which is interpreted as the next target node:
    /// - "End" and "Start" are recognized as virtual endpoints
    /// - any other string is treated as the name of a custom node
    ///
    /// At runtime, targets are validated before being pushed to the frontier.
    /// Unknown custom targets are skipped with a warning, preserving progress.
    ///
    /// # Returns
    /// A slice of conditional edge specifications.
    #[must_use]
    pub fn conditional_edges(&self) -> &Vec<crate::graphs::ConditionalEdge> {
        &self.conditional_edges
    }

    /// Returns a reference to the nodes registry.
    ///
    /// Provides access to all registered node implementations in the graph.
    /// Nodes are keyed by their `NodeKind` identifier.
    ///
    /// # Returns
    /// A map from `NodeKind` to the corresponding `Node` implementation.
    #[must_use]
    pub fn nodes(&self) -> &FxHashMap<NodeKind, Arc<dyn Node>> {
        &self.nodes
    }

    /// Returns a reference to the unconditional edges in this graph.
    ///
    /// Unconditional edges define the static topology of the workflow graph,
    /// specifying which nodes can transition to which other nodes.
    ///
    /// # Returns
    /// A map from source `NodeKind` to a list of destination `NodeKind`s.
    #[must_use]
    pub fn edges(&self) -> &FxHashMap<NodeKind, Vec<NodeKind>> {
        &self.edges
    }

    /// Returns a reference to the runtime configuration.
    ///
    /// Runtime configuration includes checkpointer settings, session IDs,
    /// and other execution parameters.
    ///
    /// # Returns
    /// The current runtime configuration.
    #[must_use]
    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.runtime_config
    }

    /// Execute the entire workflow until completion or no nodes remain.
    ///
    /// This is the primary entry point for workflow execution. It creates an
    /// `AppRunner`, manages session state, and coordinates execution through
    /// to completion.
    ///
    /// # Parameters
    /// * `initial_state` - The starting state for workflow execution
    ///
    /// # Returns
    /// * `Ok(ResearchState)` - The final state after the session reaches `End`
    /// * `Err(RunnerError)` - If execution fails due to node errors,
    ///   checkpointer issues, or other runtime problems
    ///
    /// # Session Lifecycle
    /// 1. Creates an `AppRunner` with the configured checkpointer
    /// 2. Initializes or resumes a session
    /// 3. Executes supersteps until `End` or an empty frontier
    /// 4. Returns the final accumulated state
    #[instrument(skip(self, initial_state), err)]
    pub async fn invoke(
        &self,
        initial_state: ResearchState,
    ) -> Result<ResearchState, RunnerError> {
        use crate::runtimes::AppRunner;

        // Determine checkpointer type (default to InMemory if none supplied)
        let checkpointer_type = self
            .runtime_config
            .checkpointer
            .clone()
            .unwrap_or(CheckpointerType::InMemory);

        // Create async runner
        let mut runner = AppRunner::new(self.clone(), checkpointer_type).await;

        let session_id = self
            .runtime_config
            .session_id
            .clone()
            .unwrap_or_else(|| "temp_invoke_session".to_string());

        let init_state = runner
            .create_session(session_id.clone(), initial_state)
            .await?;

        if let SessionInit::Resumed { checkpoint_step } = init_state {
            println!(
                "Resuming session '{}' from checkpoint at step {}",
                session_id, checkpoint_step
            );
        }
        runner.run_until_complete(&session_id).await
    }

    /// Merge node outputs and apply state reductions after a superstep.
    ///
    /// This method coordinates the barrier synchronization phase: all node
    /// outputs from a superstep are folded (in `run_ids` order — callers
    /// are expected to have sorted the frontier's node-ids lexicographically
    /// before running them, per the concurrency model) into one
    /// `NodePartial`, then applied to the global state via the registered
    /// reducers. Only channels whose content actually changed have their
    /// version bumped, so a resumed session can tell precisely what a given
    /// checkpoint step touched.
    #[instrument(skip(self, state, run_ids, node_partials), err)]
    pub async fn apply_barrier(
        &self,
        state: &mut ResearchState,
        run_ids: &[NodeKind],
        node_partials: Vec<NodePartial>,
    ) -> Result<Vec<&'static str>, Box<dyn std::error::Error + Send + Sync>> {
        let mut findings_all: Vec<crate::finding::Finding> = Vec::new();
        let mut sources_all: Vec<crate::source::Source> = Vec::new();
        let mut tool_history_all: Vec<crate::tool::ToolCallRecord> = Vec::new();
        let mut errors_all: Vec<crate::channels::errors::ErrorEvent> = Vec::new();
        let mut quality = None;
        let mut saturation = None;
        let mut gaps = None;
        let mut budget = None;
        let mut stop = None;
        let mut final_answer = None;
        let mut strategy_context = None;

        for (i, p) in node_partials.iter().enumerate() {
            let fallback = NodeKind::Custom("?".to_string());
            let nid = run_ids.get(i).unwrap_or(&fallback);

            if let Some(v) = &p.findings {
                if !v.is_empty() {
                    tracing::debug!(node = ?nid, count = v.len(), "node produced findings");
                    findings_all.extend(v.clone());
                }
            }
            if let Some(v) = &p.sources {
                if !v.is_empty() {
                    tracing::debug!(node = ?nid, count = v.len(), "node produced sources");
                    sources_all.extend(v.clone());
                }
            }
            if let Some(v) = &p.tool_history {
                if !v.is_empty() {
                    tracing::debug!(node = ?nid, count = v.len(), "node produced tool history");
                    tool_history_all.extend(v.clone());
                }
            }
            if let Some(v) = &p.errors {
                if !v.is_empty() {
                    tracing::debug!(node = ?nid, count = v.len(), "node produced errors");
                    errors_all.extend(v.clone());
                }
            }
            // Single-writer channels: later partials in the same superstep
            // (there should be at most one writer per channel per superstep)
            // win, mirroring the append channels' in-order fold.
            if p.quality.is_some() {
                quality = p.quality.clone();
            }
            if p.saturation.is_some() {
                saturation = p.saturation.clone();
            }
            if p.gaps.is_some() {
                gaps = p.gaps.clone();
            }
            if p.budget.is_some() {
                budget = p.budget.clone();
            }
            if p.stop.is_some() {
                stop = p.stop.clone();
            }
            if p.final_answer.is_some() {
                final_answer = p.final_answer.clone();
            }
            if p.strategy_context.is_some() {
                strategy_context = p.strategy_context.clone();
            }
        }

        let merged_updates = NodePartial {
            findings: (!findings_all.is_empty()).then_some(findings_all),
            sources: (!sources_all.is_empty()).then_some(sources_all),
            tool_history: (!tool_history_all.is_empty()).then_some(tool_history_all),
            quality,
            saturation,
            gaps,
            budget,
            stop,
            final_answer,
            strategy_context,
            errors: (!errors_all.is_empty()).then_some(errors_all),
            frontier: None,
        };

        macro_rules! before_snapshot {
            ($($field:ident),+ $(,)?) => {
                ($(
                    (state.$field.snapshot(), state.$field.version())
                ),+)
            };
        }
        let (
            (findings_before, findings_ver),
            (sources_before, sources_ver),
            (tool_history_before, tool_history_ver),
            (quality_before, quality_ver),
            (saturation_before, saturation_ver),
            (gaps_before, gaps_ver),
            (budget_before, budget_ver),
            (stop_before, stop_ver),
            (final_answer_before, final_answer_ver),
            (strategy_context_before, strategy_context_ver),
            (errors_before, errors_ver),
        ) = before_snapshot!(
            findings,
            sources,
            tool_history,
            quality,
            saturation,
            gaps,
            budget,
            stop,
            final_answer,
            strategy_context,
            errors
        );

        // Apply reducers (they do NOT bump versions themselves).
        self.reducer_registry.apply_all(&mut *state, &merged_updates)?;

        let mut updated: Vec<&'static str> = Vec::new();
        macro_rules! bump_if_changed {
            ($field:ident, $before:expr, $before_ver:expr, $name:literal) => {
                if state.$field.snapshot() != $before {
                    state.$field.set_version($before_ver.saturating_add(1));
                    updated.push($name);
                }
            };
        }
        bump_if_changed!(findings, findings_before, findings_ver, "findings");
        bump_if_changed!(sources, sources_before, sources_ver, "sources");
        bump_if_changed!(tool_history, tool_history_before, tool_history_ver, "tool_history");
        bump_if_changed!(quality, quality_before, quality_ver, "quality");
        bump_if_changed!(saturation, saturation_before, saturation_ver, "saturation");
        bump_if_changed!(gaps, gaps_before, gaps_ver, "gaps");
        bump_if_changed!(budget, budget_before, budget_ver, "budget");
        bump_if_changed!(stop, stop_before, stop_ver, "stop");
        bump_if_changed!(final_answer, final_answer_before, final_answer_ver, "final_answer");
        bump_if_changed!(
            strategy_context,
            strategy_context_before,
            strategy_context_ver,
            "strategy_context"
        );
        bump_if_changed!(errors, errors_before, errors_ver, "errors");

        if !updated.is_empty() {
            tracing::info!(channels = ?updated, "barrier updated channels");
        }

        Ok(updated)
    }
}
