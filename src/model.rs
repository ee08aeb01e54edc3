//! Model coordinator — client side (C8, [`crate::nodes::synthesize`]).
//!
//! The coordinator is an injected collaborator: this crate never names a
//! concrete inference provider. Synthesis (and the scorer's optional
//! critique pass) consult it through [`ModelCoordinator`], requesting one of
//! five fixed consultation tiers.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::Message;

/// Consultation tiers, spec.md §4.8. Cost ceilings are advisory metadata the
/// permission gate enforces exactly as it does for tool calls — the
/// coordinator itself does not reject calls over the ceiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Trivial,
    Low,
    Medium,
    High,
    Critical,
}

impl Tier {
    /// Cost ceiling per call in USD, spec.md §4.8's table.
    #[must_use]
    pub fn cost_ceiling_usd(&self) -> f64 {
        match self {
            Tier::Trivial | Tier::Low | Tier::Medium => 0.0,
            Tier::High => 0.10,
            Tier::Critical => 0.50,
        }
    }

    /// Whether this tier mandates a multi-model debate (`critical`, unless
    /// `enable_debate` has downgraded it to `high` before selection).
    #[must_use]
    pub fn requires_debate(&self) -> bool {
        matches!(self, Tier::Critical)
    }

    /// Minimum number of model calls spec.md §4.8 requires for this tier.
    #[must_use]
    pub fn min_calls(&self) -> u32 {
        match self {
            Tier::Critical => 3,
            _ => 1,
        }
    }

    /// Selects a tier from the current composite quality, per spec.md §4.8:
    /// `>= 0.9 -> medium`, `>= 0.7 -> low`, `< 0.7 -> high`. `critical` is
    /// never chosen by this rule — it is reserved for explicit operator
    /// escalation or an unresolved conflict gap (see
    /// [`crate::nodes::synthesize`]).
    ///
    /// `prefer_local` lowers both floors, biasing the selection toward
    /// `low`/`medium` (cheaper, local-model-friendly tiers) at quality
    /// levels that would otherwise escalate to `high`.
    #[must_use]
    pub fn select_by_quality(composite_quality: f64, prefer_local: bool) -> Tier {
        let (medium_floor, low_floor) = if prefer_local { (0.75, 0.45) } else { (0.9, 0.7) };
        if composite_quality >= medium_floor {
            Tier::Medium
        } else if composite_quality >= low_floor {
            Tier::Low
        } else {
            Tier::High
        }
    }

    /// Applies `enable_debate = false`'s degrade rule: `critical -> high`.
    #[must_use]
    pub fn degrade_if_debate_disabled(self, enable_debate: bool) -> Tier {
        if !enable_debate && self == Tier::Critical {
            Tier::High
        } else {
            self
        }
    }
}

/// One call's worth of context handed to the coordinator: the rendered
/// prompt plus whatever of the research state the caller decided to include
/// (findings, sources, gaps — rendering is the caller's job, the
/// coordinator consumes opaque text).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsultationRequest {
    pub tier: Tier,
    pub prompt: String,
    pub estimated_cost_usd: f64,
}

impl ConsultationRequest {
    #[must_use]
    pub fn new(tier: Tier, prompt: impl Into<String>) -> Self {
        let estimated_cost_usd = tier.cost_ceiling_usd();
        Self {
            tier,
            prompt: prompt.into(),
            estimated_cost_usd,
        }
    }
}

/// The coordinator's reply to one consultation call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsultationResponse {
    pub text: String,
    pub cost_usd: f64,
    pub provider: String,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ModelCoordinatorError {
    #[error("model coordinator call failed: {0}")]
    #[diagnostic(code(loomresearch::model::call_failed))]
    CallFailed(String),

    #[error("model coordinator call timed out after {0:?}")]
    #[diagnostic(code(loomresearch::model::timeout))]
    Timeout(std::time::Duration),
}

/// The model-inference collaborator injected into a session. Never
/// implemented by this crate; concrete local/external providers live
/// outside its boundary (spec.md §1's "opaque model coordinator").
#[async_trait]
pub trait ModelCoordinator: Send + Sync {
    async fn consult(
        &self,
        request: &ConsultationRequest,
    ) -> Result<ConsultationResponse, ModelCoordinatorError>;
}

/// Outcome of a `critical`-tier debate: spec.md §9 Open Question 3 fixes the
/// contract (a consensus decision plus a dissent record) but leaves the
/// exact consensus strategy to the implementer. This crate uses **majority
/// vote over the individual arguments**: each debate participant's response
/// is a `Message::assistant` turn, and the consensus is whichever response
/// text the majority of participants agree with most closely (measured by
/// the same keyword-Jaccard heuristic the quality scorer already uses);
/// the rest are recorded verbatim as dissent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DebateResult {
    pub consensus: String,
    pub dissent: Vec<Message>,
    pub total_cost_usd: f64,
}

/// Runs a `critical`-tier debate: `min_calls()` independent consultations at
/// the same tier, then majority-vote consensus by pairwise keyword overlap.
/// Ties favor the first response (deterministic, replay-stable).
pub async fn run_debate(
    coordinator: &dyn ModelCoordinator,
    prompt: &str,
) -> Result<DebateResult, ModelCoordinatorError> {
    let tier = Tier::Critical;
    let calls = tier.min_calls().max(1) as usize;
    let mut responses = Vec::with_capacity(calls);
    let mut total_cost_usd = 0.0;
    for _ in 0..calls {
        let request = ConsultationRequest::new(tier, prompt.to_string());
        let response = coordinator.consult(&request).await?;
        total_cost_usd += response.cost_usd;
        responses.push(response.text);
    }

    let winner_idx = majority_index(&responses);
    let consensus = responses[winner_idx].clone();
    let dissent = responses
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != winner_idx)
        .map(|(_, text)| Message::assistant(text))
        .collect();

    Ok(DebateResult {
        consensus,
        dissent,
        total_cost_usd,
    })
}

/// Index of the response with the highest total pairwise keyword overlap
/// against every other response — the one closest to "what most of the
/// panel said".
fn majority_index(responses: &[String]) -> usize {
    let keyword_sets: Vec<std::collections::HashSet<String>> = responses
        .iter()
        .map(|text| {
            text.split_whitespace()
                .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        })
        .collect();

    let mut best_idx = 0;
    let mut best_score = -1.0f64;
    for (i, set_i) in keyword_sets.iter().enumerate() {
        let mut score = 0.0;
        for (j, set_j) in keyword_sets.iter().enumerate() {
            if i == j {
                continue;
            }
            score += jaccard(set_i, set_j);
        }
        if score > best_score {
            best_score = score;
            best_idx = i;
        }
    }
    best_idx
}

fn jaccard(a: &std::collections::HashSet<String>, b: &std::collections::HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 { 0.0 } else { intersection / union }
}

/// A coordinator that always answers with a fixed string at zero cost.
/// Useful as a default for sessions that don't need a real backend, and in
/// tests that only exercise control flow.
#[derive(Clone, Debug, Default)]
pub struct EchoCoordinator;

#[async_trait]
impl ModelCoordinator for EchoCoordinator {
    async fn consult(
        &self,
        request: &ConsultationRequest,
    ) -> Result<ConsultationResponse, ModelCoordinatorError> {
        Ok(ConsultationResponse {
            text: request.prompt.clone(),
            cost_usd: 0.0,
            provider: "echo".to_string(),
        })
    }
}
