/*!
Persistence primitives for serializing/deserializing Loomresearch runtime
state and checkpoints (used by the SQLite and Postgres checkpointers and
any future persistent backends).

Design Goals:
- Provide explicit serde-friendly structs decoupled from internal
  in-memory representations.
- Keep conversion logic localized (From / TryFrom impls) so the
  checkpointer code is lean and declarative.
- Allow forward compatibility (unknown NodeKind encodings round-trip
  as `NodeKind::Custom(encoded_string)`).

This module intentionally does NOT perform I/O. It is pure data
transformation and (de)serialization glue.
*/

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    budget::Budget,
    channels::{Channel, errors::ErrorEvent},
    finding::Finding,
    gap::Gap,
    quality::{QualityScores, SaturationState},
    runtimes::checkpointer::Checkpoint,
    source::Source,
    state::ResearchState,
    stop::StopDecision,
    strategy::StrategyContext,
    tool::ToolCallRecord,
    types::NodeKind,
    utils::json_ext::JsonSerializable,
};

/// Blanket implementation of JsonSerializable for all suitable types using PersistenceError.
impl<T> JsonSerializable<PersistenceError> for T
where
    T: serde::Serialize + for<'de> serde::de::DeserializeOwned,
{
    fn to_json_string(&self) -> std::result::Result<String, PersistenceError> {
        serde_json::to_string(self).map_err(|e| PersistenceError::Serde { source: e })
    }

    fn from_json_str(s: &str) -> std::result::Result<Self, PersistenceError> {
        serde_json::from_str(s).map_err(|e| PersistenceError::Serde { source: e })
    }
}

/// An append/collection channel's persisted shape: items plus their version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedVecChannel<T> {
    pub version: u32,
    #[serde(default)]
    pub items: Vec<T>,
}

impl<T> Default for PersistedVecChannel<T> {
    fn default() -> Self {
        Self {
            version: 1,
            items: Vec::new(),
        }
    }
}

/// A single-writer channel's persisted shape: the current value plus its version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedValueChannel<T> {
    pub version: u32,
    pub value: T,
}

/// Complete persisted shape of the eleven-channel [`ResearchState`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedState {
    pub query: String,
    pub thread_id: String,
    pub iteration: u32,
    pub findings: PersistedVecChannel<Finding>,
    pub sources: PersistedVecChannel<Source>,
    pub tool_history: PersistedVecChannel<ToolCallRecord>,
    pub quality: PersistedValueChannel<QualityScores>,
    pub saturation: PersistedValueChannel<SaturationState>,
    pub gaps: PersistedVecChannel<Gap>,
    pub budget: PersistedValueChannel<Option<Budget>>,
    pub stop: PersistedValueChannel<Option<StopDecision>>,
    pub final_answer: PersistedValueChannel<Option<String>>,
    pub strategy_context: PersistedValueChannel<Option<StrategyContext>>,
    #[serde(default)]
    pub errors: PersistedVecChannel<ErrorEvent>,
}

/// Wrapper for the scheduler versions_seen structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedVersionsSeen(pub FxHashMap<String, FxHashMap<String, u64>>);

/// Full persisted checkpoint representation.
/// (Step history tables may store multiple instances of this shape.)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedCheckpoint {
    pub session_id: String,
    pub step: u64,
    pub state: PersistedState,
    /// Frontier encoded as string vector using NodeKind::encode().
    pub frontier: Vec<String>,
    pub versions_seen: PersistedVersionsSeen,
    pub concurrency_limit: usize,
    /// RFC3339 string form of creation time (keeps chrono::DateTime out of serialized shape).
    pub created_at: String,
    /// Nodes that executed in this step, encoded as strings
    #[serde(default)]
    pub ran_nodes: Vec<String>,
    /// Nodes that were skipped in this step, encoded as strings
    #[serde(default)]
    pub skipped_nodes: Vec<String>,
    /// Channels that were updated in this step
    #[serde(default)]
    pub updated_channels: Vec<String>,
}

use miette::Diagnostic;
use thiserror::Error;

/// Bidirectional conversion and serialization errors for persistence models.
#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("missing field: {0}")]
    #[diagnostic(
        code(loomresearch::persistence::missing_field),
        help("Populate the field in the persisted JSON before conversion.")
    )]
    MissingField(&'static str),

    #[error("JSON serialization/deserialization failed: {source}")]
    #[diagnostic(
        code(loomresearch::persistence::serde),
        help("Ensure the JSON structure matches Persisted* types.")
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },

    #[error("persistence error: {0}")]
    #[diagnostic(code(loomresearch::persistence::other))]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/* ---------- ResearchState <-> PersistedState Conversions ---------- */

impl From<&ResearchState> for PersistedState {
    fn from(s: &ResearchState) -> Self {
        PersistedState {
            query: s.query.clone(),
            thread_id: s.thread_id.clone(),
            iteration: s.iteration,
            findings: PersistedVecChannel {
                version: s.findings.version(),
                items: s.findings.snapshot(),
            },
            sources: PersistedVecChannel {
                version: s.sources.version(),
                items: s.sources.snapshot(),
            },
            tool_history: PersistedVecChannel {
                version: s.tool_history.version(),
                items: s.tool_history.snapshot(),
            },
            quality: PersistedValueChannel {
                version: s.quality.version(),
                value: s.quality.snapshot(),
            },
            saturation: PersistedValueChannel {
                version: s.saturation.version(),
                value: s.saturation.snapshot(),
            },
            gaps: PersistedVecChannel {
                version: s.gaps.version(),
                items: s.gaps.snapshot(),
            },
            budget: PersistedValueChannel {
                version: s.budget.version(),
                value: s.budget.snapshot(),
            },
            stop: PersistedValueChannel {
                version: s.stop.version(),
                value: s.stop.snapshot(),
            },
            final_answer: PersistedValueChannel {
                version: s.final_answer.version(),
                value: s.final_answer.snapshot(),
            },
            strategy_context: PersistedValueChannel {
                version: s.strategy_context.version(),
                value: s.strategy_context.snapshot(),
            },
            errors: PersistedVecChannel {
                version: s.errors.version(),
                items: s.errors.snapshot(),
            },
        }
    }
}

impl TryFrom<PersistedState> for ResearchState {
    type Error = PersistenceError;

    fn try_from(p: PersistedState) -> Result<Self> {
        use crate::channels::{
            BudgetChannel, ErrorsChannel, FinalAnswerChannel, FindingsChannel, GapsChannel,
            QualityChannel, SaturationChannel, SourcesChannel, StopChannel,
            StrategyContextChannel, ToolHistoryChannel,
        };
        Ok(ResearchState {
            query: p.query,
            thread_id: p.thread_id,
            iteration: p.iteration,
            findings: FindingsChannel::new(p.findings.items, p.findings.version),
            sources: SourcesChannel::new(p.sources.items, p.sources.version),
            tool_history: ToolHistoryChannel::new(p.tool_history.items, p.tool_history.version),
            quality: QualityChannel::new(p.quality.value, p.quality.version),
            saturation: SaturationChannel::new(p.saturation.value, p.saturation.version),
            gaps: GapsChannel::new(p.gaps.items, p.gaps.version),
            budget: BudgetChannel::new(p.budget.value, p.budget.version),
            stop: StopChannel::new(p.stop.value, p.stop.version),
            final_answer: FinalAnswerChannel::new(p.final_answer.value, p.final_answer.version),
            strategy_context: StrategyContextChannel::new(
                p.strategy_context.value,
                p.strategy_context.version,
            ),
            errors: ErrorsChannel::new(p.errors.items, p.errors.version),
        })
    }
}

/* ---------- versions_seen conversions ---------- */

impl From<&FxHashMap<String, FxHashMap<String, u64>>> for PersistedVersionsSeen {
    fn from(v: &FxHashMap<String, FxHashMap<String, u64>>) -> Self {
        PersistedVersionsSeen(v.clone())
    }
}

impl From<PersistedVersionsSeen> for FxHashMap<String, FxHashMap<String, u64>> {
    fn from(p: PersistedVersionsSeen) -> Self {
        p.0
    }
}

/* ---------- Checkpoint <-> PersistedCheckpoint Conversions ---------- */

impl From<&Checkpoint> for PersistedCheckpoint {
    fn from(cp: &Checkpoint) -> Self {
        PersistedCheckpoint {
            session_id: cp.session_id.clone(),
            step: cp.step,
            state: PersistedState::from(&cp.state),
            frontier: cp.frontier.iter().map(|k| k.encode().to_string()).collect(),
            versions_seen: PersistedVersionsSeen(cp.versions_seen.clone()),
            concurrency_limit: cp.concurrency_limit,
            created_at: cp.created_at.to_rfc3339(),
            ran_nodes: cp.ran_nodes.iter().map(|k| k.encode().to_string()).collect(),
            skipped_nodes: cp
                .skipped_nodes
                .iter()
                .map(|k| k.encode().to_string())
                .collect(),
            updated_channels: cp.updated_channels.clone(),
        }
    }
}

impl TryFrom<PersistedCheckpoint> for Checkpoint {
    type Error = PersistenceError;

    fn try_from(p: PersistedCheckpoint) -> Result<Self> {
        let state = ResearchState::try_from(p.state)?;
        let frontier: Vec<NodeKind> = p.frontier.iter().map(|s| NodeKind::decode(s)).collect();
        let ran_nodes: Vec<NodeKind> = p.ran_nodes.iter().map(|s| NodeKind::decode(s)).collect();
        let skipped_nodes: Vec<NodeKind> = p
            .skipped_nodes
            .iter()
            .map(|s| NodeKind::decode(s))
            .collect();
        let parsed_dt = chrono::DateTime::parse_from_rfc3339(&p.created_at)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now());
        Ok(Checkpoint {
            session_id: p.session_id,
            step: p.step,
            state,
            frontier,
            versions_seen: p.versions_seen.0,
            concurrency_limit: p.concurrency_limit,
            created_at: parsed_dt,
            ran_nodes,
            skipped_nodes,
            updated_channels: p.updated_channels,
        })
    }
}

/* ---------- Convenience JSON helpers (using JsonSerializable trait from utils::json_ext) ---------- */

// Both PersistedState and PersistedCheckpoint automatically implement JsonSerializable
// through the blanket implementation above, providing to_json_string() and from_json_str() methods.
