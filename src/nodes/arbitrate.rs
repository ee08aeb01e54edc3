//! Stopping arbiter (C7): decides whether the session has done enough, or
//! needs another iteration. Writes only [`StopDecision`] — routing the
//! decision to `Plan`, `Synthesize`, or `Abort` is a conditional edge at
//! graph-construction time, not this node's job.

use async_trait::async_trait;

use crate::config::ResearchConfig;
use crate::gap::GapPriority;
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::quality::SaturationTrend;
use crate::state::ResearchStateSnapshot;
use crate::stop::{StopDecision, StopReason, StopRecommendation};

/// Evaluates hard and soft stop conditions against the current snapshot,
/// spec.md §4.7. `Arbitrate` takes a `ResearchConfig` at construction since
/// every threshold it checks against is a session option, not crate-wide
/// constant.
#[derive(Clone, Debug)]
pub struct Arbitrate {
    config: ResearchConfig,
}

impl Arbitrate {
    #[must_use]
    pub fn new(config: ResearchConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Node for Arbitrate {
    async fn run(
        &self,
        snapshot: ResearchStateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let iteration = super::current_iteration(&snapshot);
        let decision = self.decide(&snapshot, iteration);

        ctx.emit(
            "arbitrate",
            format!(
                "should_stop={} reason={:?} iteration={iteration}",
                decision.should_stop, decision.reason
            ),
        )?;

        Ok(NodePartial::new().with_stop(decision))
    }
}

impl Arbitrate {
    fn decide(&self, snapshot: &ResearchStateSnapshot, iteration: u32) -> StopDecision {
        if let Some(decision) = self.check_hard_stops(snapshot, iteration) {
            return decision;
        }
        if let Some(decision) = self.check_soft_stops(snapshot, iteration) {
            return decision;
        }
        StopDecision::continue_research(iteration, self.next_strategy_rationale(snapshot))
    }

    /// Hard stops short-circuit regardless of quality; checked in the order
    /// spec.md §4.7 lists them.
    fn check_hard_stops(&self, snapshot: &ResearchStateSnapshot, iteration: u32) -> Option<StopDecision> {
        if snapshot.errors.iter().any(|e| e.tags.iter().any(|t| t == "user_cancelled")) {
            return Some(StopDecision::stop(
                StopReason::UserCancelled,
                StopRecommendation::Abort,
                "session was cancelled by its owner",
                iteration,
            ));
        }

        if let Some(budget) = &snapshot.budget {
            if budget.is_cost_exhausted() || budget.is_call_budget_exhausted() {
                return Some(StopDecision::stop(
                    StopReason::Budget,
                    recommendation_with_usable_answer(snapshot),
                    "cost or external-call budget exhausted",
                    iteration,
                ));
            }
            if budget.is_time_exhausted(chrono::Utc::now()) {
                return Some(StopDecision::stop(
                    StopReason::Time,
                    recommendation_with_usable_answer(snapshot),
                    "wall-clock deadline reached",
                    iteration,
                ));
            }
        }

        if iteration >= self.config.max_iterations {
            return Some(StopDecision::stop(
                StopReason::MaxIterations,
                recommendation_with_usable_answer(snapshot),
                format!("reached max_iterations ({})", self.config.max_iterations),
                iteration,
            ));
        }

        if self.has_exhausted_error_budget(snapshot, iteration) {
            return Some(StopDecision::stop(
                StopReason::ErrorBudget,
                recommendation_with_usable_answer(snapshot),
                "two consecutive iterations produced zero accepted findings",
                iteration,
            ));
        }

        None
    }

    /// Soft stops only fire once every hard stop has cleared.
    fn check_soft_stops(&self, snapshot: &ResearchStateSnapshot, iteration: u32) -> Option<StopDecision> {
        let quality = &snapshot.quality;
        let has_unresolved_critical_gap = snapshot.gaps.iter().any(|g| g.priority == GapPriority::Critical);

        let quality_achieved = quality.grounded_quality >= self.config.min_ragas_score
            && quality.confidence >= self.config.min_confidence
            && quality.composite >= self.config.min_quality_score
            && !(self.config.require_critical_gaps_resolved && has_unresolved_critical_gap);
        if quality_achieved {
            return Some(StopDecision::stop(
                StopReason::QualityAchieved,
                StopRecommendation::Synthesize,
                format!("composite quality {:.2} met the configured threshold", quality.composite),
                iteration,
            ));
        }

        let has_unresolved_high_priority_gap =
            snapshot.gaps.iter().any(|g| g.priority >= GapPriority::High);
        if !has_unresolved_high_priority_gap && !snapshot.findings.is_empty() {
            return Some(StopDecision::stop(
                StopReason::GapsResolved,
                StopRecommendation::Synthesize,
                "no open gaps remain at high priority or above",
                iteration,
            ));
        }

        let saturation = &snapshot.saturation;
        if saturation.score >= self.config.saturation_threshold
            && saturation.novelty_rate < self.config.min_novelty_rate
            && saturation.trend == SaturationTrend::Declining
            && iteration >= 3
        {
            return Some(StopDecision::stop(
                StopReason::Saturation,
                recommendation_with_usable_answer(snapshot),
                format!(
                    "saturation {:.2} with novelty rate {:.2} below the floor, trend declining",
                    saturation.score, saturation.novelty_rate
                ),
                iteration,
            ));
        }

        None
    }

    /// spec.md §4.7: two consecutive iterations, including the current one,
    /// with zero newly accepted findings. Needs at least one prior iteration
    /// to compare against, which means at least the second iteration
    /// (iteration is 1-based).
    fn has_exhausted_error_budget(&self, snapshot: &ResearchStateSnapshot, iteration: u32) -> bool {
        if iteration <= 1 {
            return false;
        }
        let accepted_in = |it: u32| {
            snapshot
                .findings
                .iter()
                .any(|f| f.iteration == it && f.accepted == Some(true))
        };
        !accepted_in(iteration) && !accepted_in(iteration - 1)
    }

    fn next_strategy_rationale(&self, snapshot: &ResearchStateSnapshot) -> String {
        match snapshot.gaps.iter().max_by_key(|g| g.priority) {
            Some(gap) => format!("continuing to address {:?} gap: {}", gap.kind, gap.description),
            None => "continuing; quality threshold not yet met".to_string(),
        }
    }
}

/// A session with no accepted findings at all has nothing to synthesize
/// from, so it should abort rather than hand a blank answer to synthesis.
fn recommendation_with_usable_answer(snapshot: &ResearchStateSnapshot) -> StopRecommendation {
    if snapshot.findings.iter().any(|f| f.accepted == Some(true)) {
        StopRecommendation::Synthesize
    } else {
        StopRecommendation::Abort
    }
}
