//! Core identifiers for the research graph: node kinds and channel kinds.
//!
//! These are the fundamental domain concepts that define the shape of a
//! research session's state machine, independent of any particular session's
//! data.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a node in the research graph.
///
/// The canonical cycle is `Intake -> Plan -> Dispatch -> Validate -> Score ->
/// Arbitrate -> {Plan | Synthesize | Abort}`. `Custom` exists for graphs that
/// extend the canonical cycle (e.g. inserting a pre-processing step) without
/// requiring a new enum variant upstream.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Virtual entry point. Never implemented or registered directly.
    Start,
    /// Virtual terminal point. Never implemented or registered directly.
    End,
    /// Validates the incoming query and seeds the initial research state.
    Intake,
    /// Strategy selector (C3): chooses breadth/depth/decompose/hybrid and
    /// emits the next wave of tasks.
    Plan,
    /// Tool dispatcher (C4): executes the task DAG against injected tools
    /// under permission and budget gates.
    Dispatch,
    /// Validator (C5): five-layer check over freshly dispatched findings.
    Validate,
    /// Quality scorer (C6): grounded quality, confidence, saturation, gaps.
    Score,
    /// Stopping arbiter (C7): decides continue/stop and why.
    Arbitrate,
    /// Model coordinator-backed synthesis of the final answer.
    Synthesize,
    /// Terminal node reached when the arbiter hard-stops without a usable
    /// answer (e.g. budget exhausted before any finding was validated).
    Abort,
    /// Escape hatch for graphs that insert additional named nodes.
    Custom(String),
}

impl NodeKind {
    /// Persisted string form, used by checkpoint storage and frontier encoding.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            NodeKind::Start => "Start".to_string(),
            NodeKind::End => "End".to_string(),
            NodeKind::Intake => "Intake".to_string(),
            NodeKind::Plan => "Plan".to_string(),
            NodeKind::Dispatch => "Dispatch".to_string(),
            NodeKind::Validate => "Validate".to_string(),
            NodeKind::Score => "Score".to_string(),
            NodeKind::Arbitrate => "Arbitrate".to_string(),
            NodeKind::Synthesize => "Synthesize".to_string(),
            NodeKind::Abort => "Abort".to_string(),
            NodeKind::Custom(s) => format!("Custom:{s}"),
        }
    }

    /// Inverse of [`encode`](Self::encode). Unrecognized strings fall back to
    /// `Custom` for forward compatibility with newer persisted graphs.
    #[must_use]
    pub fn decode(s: &str) -> Self {
        match s {
            "Start" => NodeKind::Start,
            "End" => NodeKind::End,
            "Intake" => NodeKind::Intake,
            "Plan" => NodeKind::Plan,
            "Dispatch" => NodeKind::Dispatch,
            "Validate" => NodeKind::Validate,
            "Score" => NodeKind::Score,
            "Arbitrate" => NodeKind::Arbitrate,
            "Synthesize" => NodeKind::Synthesize,
            "Abort" => NodeKind::Abort,
            other => match other.strip_prefix("Custom:") {
                Some(rest) => NodeKind::Custom(rest.to_string()),
                None => NodeKind::Custom(other.to_string()),
            },
        }
    }

    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }

    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(name) => write!(f, "{}", name),
            other => write!(f, "{}", other.encode()),
        }
    }
}

impl From<&str> for NodeKind {
    fn from(s: &str) -> Self {
        NodeKind::decode(s)
    }
}

/// Identifies a channel of `ResearchState`. Each channel has its own reducer
/// and version counter; see [`crate::reducers`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    /// Append-only findings log, de-duplicated by content hash.
    Findings,
    /// Sources upserted by canonical URL.
    Sources,
    /// Append-only tool call history.
    ToolHistory,
    /// Latest quality scores (replace-on-write).
    Quality,
    /// Latest saturation signal (replace-on-write).
    Saturation,
    /// Open gaps, upserted by gap id.
    Gaps,
    /// Budget ledger (replace-on-write, monotonic spend).
    Budget,
    /// Latest stop decision (replace-on-write).
    Stop,
    /// The synthesized final answer, written at most once per session.
    FinalAnswer,
    /// Strategy context produced by the planner for the dispatcher to consume.
    StrategyContext,
    /// Non-fatal error events.
    Errors,
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Findings => "findings",
            Self::Sources => "sources",
            Self::ToolHistory => "tool_history",
            Self::Quality => "quality",
            Self::Saturation => "saturation",
            Self::Gaps => "gaps",
            Self::Budget => "budget",
            Self::Stop => "stop",
            Self::FinalAnswer => "final_answer",
            Self::StrategyContext => "strategy_context",
            Self::Errors => "errors",
        };
        write!(f, "{s}")
    }
}
