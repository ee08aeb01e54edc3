//! Stop decisions emitted by the stopping arbiter (C7, [`crate::nodes::arbitrate`]).

use serde::{Deserialize, Serialize};

/// Every reason the arbiter can decide to stop, spec.md §4.7. Hard stops
/// short-circuit regardless of quality; soft stops only fire when no hard
/// stop applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    // Hard stops.
    Budget,
    Time,
    MaxIterations,
    ErrorBudget,
    UserCancelled,
    // Soft stops.
    QualityAchieved,
    Saturation,
    GapsResolved,
}

impl StopReason {
    #[must_use]
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            Self::Budget
                | Self::Time
                | Self::MaxIterations
                | Self::ErrorBudget
                | Self::UserCancelled
        )
    }

    /// The reason's spec.md wire name, used in session stream events and
    /// denormalized session stats.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::Time => "time",
            Self::MaxIterations => "max_iterations",
            Self::ErrorBudget => "error_budget",
            Self::UserCancelled => "user_cancelled",
            Self::QualityAchieved => "quality_achieved",
            Self::Saturation => "saturation",
            Self::GapsResolved => "gaps_resolved",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopRecommendation {
    Synthesize,
    Abort,
}

/// The arbiter's decision for the current iteration, replaced wholesale on
/// every `Arbitrate` node run. `should_stop == false` routes back to `Plan`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StopDecision {
    pub should_stop: bool,
    pub reason: Option<StopReason>,
    pub recommendation: Option<StopRecommendation>,
    /// Human-readable description of the decision: the most promising next
    /// strategy when continuing, or why the session stopped.
    pub rationale: String,
    pub iteration: u32,
}

impl StopDecision {
    #[must_use]
    pub fn continue_research(iteration: u32, rationale: impl Into<String>) -> Self {
        Self {
            should_stop: false,
            reason: None,
            recommendation: None,
            rationale: rationale.into(),
            iteration,
        }
    }

    #[must_use]
    pub fn stop(
        reason: StopReason,
        recommendation: StopRecommendation,
        rationale: impl Into<String>,
        iteration: u32,
    ) -> Self {
        Self {
            should_stop: true,
            reason: Some(reason),
            recommendation: Some(recommendation),
            rationale: rationale.into(),
            iteration,
        }
    }
}
