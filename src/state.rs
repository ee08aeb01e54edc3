//! Versioned state for a research session.
//!
//! # Core Types
//!
//! - [`ResearchState`]: the mutable, per-session container of all channels
//! - [`ResearchStateSnapshot`]: an immutable, cloned view passed to nodes
//!
//! # Channels
//!
//! State is organized into eleven independently versioned channels: findings,
//! sources, tool history, quality, saturation, gaps, budget, stop, final
//! answer, strategy context, and errors. See [`crate::channels`].

use crate::budget::Budget;
use crate::channels::{
    BudgetChannel, Channel, ErrorsChannel, FinalAnswerChannel, FindingsChannel, GapsChannel,
    QualityChannel, SaturationChannel, SourcesChannel, StopChannel, StrategyContextChannel,
    ToolHistoryChannel,
};
use crate::config::ResearchConfig;
use crate::finding::Finding;
use crate::gap::Gap;
use crate::quality::{QualityScores, SaturationState};
use crate::source::Source;
use crate::stop::StopDecision;
use crate::strategy::StrategyContext;
use crate::tool::ToolCallRecord;
use chrono::Utc;

/// The main state container for a research session.
///
/// Each field is an independently versioned [`Channel`]; the barrier merge
/// in [`crate::app::App::apply_barrier`] bumps only the channels a
/// superstep's [`crate::node::NodePartial`]s actually touched.
#[derive(Clone, Debug)]
pub struct ResearchState {
    pub query: String,
    pub thread_id: String,
    pub iteration: u32,
    pub findings: FindingsChannel,
    pub sources: SourcesChannel,
    pub tool_history: ToolHistoryChannel,
    pub quality: QualityChannel,
    pub saturation: SaturationChannel,
    pub gaps: GapsChannel,
    pub budget: BudgetChannel,
    pub stop: StopChannel,
    pub final_answer: FinalAnswerChannel,
    pub strategy_context: StrategyContextChannel,
    pub errors: ErrorsChannel,
}

/// Immutable, cloned view of [`ResearchState`] handed to a node for one run.
#[derive(Clone, Debug)]
pub struct ResearchStateSnapshot {
    pub query: String,
    pub thread_id: String,
    pub iteration: u32,

    pub findings: Vec<Finding>,
    pub findings_version: u32,
    pub sources: Vec<Source>,
    pub sources_version: u32,
    pub tool_history: Vec<ToolCallRecord>,
    pub tool_history_version: u32,
    pub quality: QualityScores,
    pub quality_version: u32,
    pub saturation: SaturationState,
    pub saturation_version: u32,
    pub gaps: Vec<Gap>,
    pub gaps_version: u32,
    pub budget: Option<Budget>,
    pub budget_version: u32,
    pub stop: Option<StopDecision>,
    pub stop_version: u32,
    pub final_answer: Option<String>,
    pub final_answer_version: u32,
    pub strategy_context: Option<StrategyContext>,
    pub strategy_context_version: u32,
    pub errors: Vec<crate::channels::errors::ErrorEvent>,
    pub errors_version: u32,
}

impl ResearchState {
    /// Seeds a fresh session for `query`, with a budget ledger derived from
    /// `config` and a deadline `config.wall_clock_limit` from now.
    #[must_use]
    pub fn new(thread_id: impl Into<String>, query: impl Into<String>, config: &ResearchConfig) -> Self {
        let now = Utc::now();
        let deadline = now + chrono::Duration::from_std(config.wall_clock_limit).unwrap_or(chrono::Duration::max_value());
        let budget = Budget::new(config.cost_cap_usd(), config.external_call_cap(), now, deadline);

        Self {
            query: query.into(),
            thread_id: thread_id.into(),
            iteration: 1,
            findings: FindingsChannel::new(Vec::new(), 1),
            sources: SourcesChannel::new(Vec::new(), 1),
            tool_history: ToolHistoryChannel::new(Vec::new(), 1),
            quality: QualityChannel::new(QualityScores::default(), 1),
            saturation: SaturationChannel::new(SaturationState::default(), 1),
            gaps: GapsChannel::new(Vec::new(), 1),
            budget: BudgetChannel::new(Some(budget), 1),
            stop: StopChannel::new(None, 1),
            final_answer: FinalAnswerChannel::new(None, 1),
            strategy_context: StrategyContextChannel::new(None, 1),
            errors: ErrorsChannel::new(Vec::new(), 1),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> ResearchStateSnapshot {
        ResearchStateSnapshot {
            query: self.query.clone(),
            thread_id: self.thread_id.clone(),
            iteration: self.iteration,
            findings: self.findings.snapshot(),
            findings_version: self.findings.version(),
            sources: self.sources.snapshot(),
            sources_version: self.sources.version(),
            tool_history: self.tool_history.snapshot(),
            tool_history_version: self.tool_history.version(),
            quality: self.quality.snapshot(),
            quality_version: self.quality.version(),
            saturation: self.saturation.snapshot(),
            saturation_version: self.saturation.version(),
            gaps: self.gaps.snapshot(),
            gaps_version: self.gaps.version(),
            budget: self.budget.snapshot(),
            budget_version: self.budget.version(),
            stop: self.stop.snapshot(),
            stop_version: self.stop.version(),
            final_answer: self.final_answer.snapshot(),
            final_answer_version: self.final_answer.version(),
            strategy_context: self.strategy_context.snapshot(),
            strategy_context_version: self.strategy_context.version(),
            errors: self.errors.snapshot(),
            errors_version: self.errors.version(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_seeds_budget_and_empty_channels() {
        let config = ResearchConfig::default();
        let state = ResearchState::new("thread-1", "what is rust", &config);
        let snapshot = state.snapshot();

        assert_eq!(snapshot.iteration, 1);
        assert!(snapshot.findings.is_empty());
        assert!(snapshot.sources.is_empty());
        assert!(snapshot.budget.is_some());
        assert_eq!(snapshot.budget.unwrap().spent_usd, 0.0);
        assert!(snapshot.stop.is_none());
        assert!(snapshot.final_answer.is_none());
    }
}
