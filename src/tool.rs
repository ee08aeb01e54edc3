//! Tool capability catalog and the injected collaborators the dispatcher
//! (C4, [`crate::nodes::dispatch`]) drives them through.
//!
//! REDESIGN FLAG: tools are a closed, tagged catalog rather than a
//! string-keyed dynamic registry. Adding a tool means adding a variant here,
//! not registering a name at runtime — the dispatcher can match exhaustively
//! and the compiler catches capabilities it doesn't know how to budget.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of capabilities a `ToolExecutor` may be asked to perform.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolCapability {
    WebSearch,
    FetchPage,
    DeepResearch,
    CodeExecution,
    CalculatorOrUnitConversion,
}

impl ToolCapability {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::WebSearch => "web_search",
            Self::FetchPage => "fetch_page",
            Self::DeepResearch => "deep_research",
            Self::CodeExecution => "code_execution",
            Self::CalculatorOrUnitConversion => "calculator",
        }
    }
}

/// One task in the dispatcher's per-wave task DAG.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolTask {
    pub task_id: String,
    pub capability: ToolCapability,
    pub query: String,
    pub depends_on: Vec<String>,
}

/// The outcome of running a single `ToolTask`, before ingestion into findings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub raw_content: String,
    pub source_url: Option<String>,
    pub source_title: Option<String>,
    pub cost_usd: f64,
}

/// A record of one attempted tool call, success or failure, kept in the
/// append-only `tool_history` channel for auditability and resume replay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub task_id: String,
    pub capability: ToolCapability,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: ToolCallOutcome,
    pub cost_usd: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ToolCallOutcome {
    Success,
    Denied { reason: String },
    Failed { message: String },
}

#[derive(Debug, Error, Diagnostic)]
pub enum ToolError {
    #[error("tool execution failed: {0}")]
    #[diagnostic(code(loomresearch::tool::execution))]
    Execution(String),

    #[error("tool call timed out after {0:?}")]
    #[diagnostic(code(loomresearch::tool::timeout))]
    Timeout(std::time::Duration),
}

/// The tool-execution collaborator injected into a session. Never implemented
/// by this crate — concrete web search / browsing / code execution backends
/// live outside its boundary.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, task: &ToolTask) -> Result<ToolOutcome, ToolError>;
}

/// A permission decision for one proposed tool task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Deny { reason: String },
}

/// The permission-gating collaborator. Consulted by the dispatcher before
/// every tool call so that session-level policy (allow-lists, rate limits,
/// human-in-the-loop approval) stays outside this crate's boundary.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn check(&self, task: &ToolTask) -> PermissionDecision;
}

/// A permissive gate that allows everything. Useful as the default for
/// sessions that don't need gating, and in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAllGate;

#[async_trait]
impl PermissionGate for AllowAllGate {
    async fn check(&self, _task: &ToolTask) -> PermissionDecision {
        PermissionDecision::Allow
    }
}
