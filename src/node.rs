//! Node execution framework for the research graph.
//!
//! This module provides the core abstractions for executable graph nodes:
//! the [`Node`] trait, its execution context, the partial state update it
//! returns, and node-level error handling.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::budget::Budget;
use crate::channels::errors::ErrorEvent;
use crate::control::{FrontierCommand, NodeRoute};
use crate::event_bus::{Event, EventEmitter, LLMStreamingEvent};
use crate::finding::Finding;
use crate::gap::Gap;
use crate::quality::{QualityScores, SaturationState};
use crate::source::Source;
use crate::state::ResearchStateSnapshot;
use crate::stop::StopDecision;
use crate::strategy::StrategyContext;
use crate::tool::ToolCallRecord;
use crate::types::NodeKind;
use std::sync::Arc;

// ============================================================================
// Core Trait
// ============================================================================

/// Core trait defining an executable node in the research graph.
///
/// Nodes are pure functions of `(snapshot, ctx) -> NodePartial`: stateless,
/// deterministic given their inputs, and composable into the canonical
/// `Intake -> Plan -> Dispatch -> Validate -> Score -> Arbitrate` cycle.
///
/// # Error Handling
///
/// 1. **Fatal errors**: return `Err(NodeError)` to halt execution.
/// 2. **Recoverable errors**: append to `NodePartial.errors` and return `Ok`.
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(
        &self,
        snapshot: ResearchStateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError>;
}

// ============================================================================
// Execution Context
// ============================================================================

/// Execution context passed to nodes during graph execution.
#[derive(Clone, Debug)]
pub struct NodeContext {
    /// Unique identifier for this node instance.
    pub node_id: String,
    /// Current execution step number.
    pub step: u64,
    /// Channel for emitting events to the graph's event system.
    pub event_emitter: Arc<dyn EventEmitter>,
}

impl NodeContext {
    /// Emit a node-scoped event enriched with this context's metadata.
    pub fn emit(
        &self,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), NodeContextError> {
        self.emit_node(scope, message)
    }

    pub fn emit_node(
        &self,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), NodeContextError> {
        self.emit_event(Event::node_message_with_meta(
            self.node_id.clone(),
            self.step,
            scope,
            message,
        ))
    }

    pub fn emit_diagnostic(
        &self,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), NodeContextError> {
        self.emit_event(Event::diagnostic(scope, message))
    }

    /// Emit an LLM streaming chunk, used by the synthesis node while it
    /// streams the model coordinator's response.
    pub fn emit_llm_chunk(
        &self,
        session_id: Option<String>,
        stream_id: Option<String>,
        chunk: impl Into<String>,
        metadata: Option<FxHashMap<String, serde_json::Value>>,
    ) -> Result<(), NodeContextError> {
        let event = LLMStreamingEvent::chunk_event(
            session_id,
            Some(self.node_id.clone()),
            stream_id,
            chunk,
            metadata.unwrap_or_default(),
        );
        self.emit_event(Event::LLM(event))
    }

    pub fn emit_llm_final(
        &self,
        session_id: Option<String>,
        stream_id: Option<String>,
        chunk: impl Into<String>,
        metadata: Option<FxHashMap<String, serde_json::Value>>,
    ) -> Result<(), NodeContextError> {
        let event = LLMStreamingEvent::final_event(
            session_id,
            Some(self.node_id.clone()),
            stream_id,
            chunk,
            metadata.unwrap_or_default(),
        );
        self.emit_event(Event::LLM(event))
    }

    pub fn emit_llm_error(
        &self,
        session_id: Option<String>,
        stream_id: Option<String>,
        error_message: impl Into<String>,
    ) -> Result<(), NodeContextError> {
        let event = LLMStreamingEvent::error_event(
            session_id,
            Some(self.node_id.clone()),
            stream_id,
            error_message,
        );
        self.emit_event(Event::LLM(event))
    }

    fn emit_event(&self, event: Event) -> Result<(), NodeContextError> {
        self.event_emitter
            .emit(event)
            .map_err(|_| NodeContextError::EventBusUnavailable)
    }
}

// ============================================================================
// State Updates
// ============================================================================

/// Partial state update returned by a node's `run`.
///
/// Every field is optional — a node touches only the channels relevant to
/// its role. The barrier merge in [`crate::app::App::apply_barrier`] folds
/// partials from a superstep in node-id lexicographic order before handing
/// the result to the reducer registry.
#[derive(Clone, Debug, Default)]
pub struct NodePartial {
    /// New findings produced this run, appended and de-duplicated by
    /// content hash (`nodes::dispatch`).
    pub findings: Option<Vec<Finding>>,
    /// New or updated sources, upserted by canonical URL (`nodes::dispatch`).
    pub sources: Option<Vec<Source>>,
    /// Tool call attempts to append to the audit trail (`nodes::dispatch`).
    pub tool_history: Option<Vec<ToolCallRecord>>,
    /// Replacement quality scores for this iteration (`nodes::score`).
    pub quality: Option<QualityScores>,
    /// Replacement saturation signal for this iteration (`nodes::score`).
    pub saturation: Option<SaturationState>,
    /// Gaps identified or re-affirmed this iteration, upserted by id
    /// (`nodes::score`).
    pub gaps: Option<Vec<Gap>>,
    /// Replacement budget ledger, after recording this run's spend
    /// (`nodes::dispatch`).
    pub budget: Option<Budget>,
    /// The arbiter's continue/stop decision for this iteration
    /// (`nodes::arbitrate`).
    pub stop: Option<StopDecision>,
    /// The synthesized final answer, written at most once
    /// (`nodes::synthesize`).
    pub final_answer: Option<String>,
    /// The planner's chosen strategy and task list for the next wave
    /// (`nodes::plan`).
    pub strategy_context: Option<StrategyContext>,
    /// Non-fatal errors to append to the error log.
    pub errors: Option<Vec<ErrorEvent>>,
    /// Frontier commands emitted by the node to influence subsequent routing.
    pub frontier: Option<FrontierCommand>,
}

impl NodePartial {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_findings(mut self, findings: Vec<Finding>) -> Self {
        self.findings = Some(findings);
        self
    }

    #[must_use]
    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = Some(sources);
        self
    }

    #[must_use]
    pub fn with_tool_history(mut self, tool_history: Vec<ToolCallRecord>) -> Self {
        self.tool_history = Some(tool_history);
        self
    }

    #[must_use]
    pub fn with_quality(mut self, quality: QualityScores) -> Self {
        self.quality = Some(quality);
        self
    }

    #[must_use]
    pub fn with_saturation(mut self, saturation: SaturationState) -> Self {
        self.saturation = Some(saturation);
        self
    }

    #[must_use]
    pub fn with_gaps(mut self, gaps: Vec<Gap>) -> Self {
        self.gaps = Some(gaps);
        self
    }

    #[must_use]
    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = Some(budget);
        self
    }

    #[must_use]
    pub fn with_stop(mut self, stop: StopDecision) -> Self {
        self.stop = Some(stop);
        self
    }

    #[must_use]
    pub fn with_final_answer(mut self, final_answer: impl Into<String>) -> Self {
        self.final_answer = Some(final_answer.into());
        self
    }

    #[must_use]
    pub fn with_strategy_context(mut self, strategy_context: StrategyContext) -> Self {
        self.strategy_context = Some(strategy_context);
        self
    }

    #[must_use]
    pub fn with_errors(mut self, errors: Vec<ErrorEvent>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Replace the default frontier with the provided list of targets.
    #[must_use]
    pub fn with_frontier_replace<I>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = NodeKind>,
    {
        let routes = targets.into_iter().map(NodeRoute::from).collect();
        self.frontier = Some(FrontierCommand::Replace(routes));
        self
    }

    /// Append additional targets to the frontier alongside the default routes.
    #[must_use]
    pub fn with_frontier_append<I>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = NodeKind>,
    {
        let routes = targets.into_iter().map(NodeRoute::from).collect();
        self.frontier = Some(FrontierCommand::Append(routes));
        self
    }

    #[must_use]
    pub fn with_frontier_command(mut self, command: FrontierCommand) -> Self {
        self.frontier = Some(command);
        self
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error, Diagnostic)]
pub enum NodeContextError {
    #[error("failed to emit event: event bus unavailable")]
    #[diagnostic(
        code(loomresearch::node::event_bus_unavailable),
        help("The event bus may be disconnected or at capacity. Check session state.")
    )]
    EventBusUnavailable,
}

/// Fatal errors from node execution. For recoverable errors, use
/// `NodePartial.errors` instead.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(loomresearch::node::missing_input),
        help("Check that the previous node produced the required data: {what}.")
    )]
    MissingInput { what: &'static str },

    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(loomresearch::node::provider))]
    Provider {
        provider: &'static str,
        message: String,
    },

    #[error(transparent)]
    #[diagnostic(code(loomresearch::node::serde_json))]
    Serde(#[from] serde_json::Error),

    #[error("validation failed: {0}")]
    #[diagnostic(
        code(loomresearch::node::validation),
        help("Check input data format and required fields.")
    )]
    ValidationFailed(String),

    #[error("event bus error: {0}")]
    #[diagnostic(code(loomresearch::node::event_bus))]
    EventBus(#[from] NodeContextError),
}
