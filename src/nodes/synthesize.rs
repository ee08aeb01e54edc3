//! Synthesizer (uses C8, the model coordinator client): renders the final
//! answer from accepted findings at a tier selected by composite quality,
//! escalating to a `critical` debate when warranted.

use std::sync::Arc;

use async_trait::async_trait;

use crate::finding::Finding;
use crate::gap::GapPriority;
use crate::model::{run_debate, ConsultationRequest, ModelCoordinator, Tier};
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::state::ResearchStateSnapshot;

/// Renders the accepted findings into a final answer via the injected
/// [`ModelCoordinator`]. Only reached once the arbiter has recommended
/// `Synthesize`.
pub struct Synthesize {
    coordinator: Arc<dyn ModelCoordinator>,
    enable_debate: bool,
    prefer_local: bool,
}

impl Synthesize {
    #[must_use]
    pub fn new(coordinator: Arc<dyn ModelCoordinator>, enable_debate: bool, prefer_local: bool) -> Self {
        Self { coordinator, enable_debate, prefer_local }
    }
}

#[async_trait]
impl Node for Synthesize {
    async fn run(
        &self,
        snapshot: ResearchStateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let accepted: Vec<&Finding> = snapshot
            .findings
            .iter()
            .filter(|f| f.accepted == Some(true))
            .collect();
        if accepted.is_empty() {
            return Err(NodeError::MissingInput { what: "accepted findings" });
        }

        let has_unresolved_conflict = snapshot.gaps.iter().any(|g| g.priority == GapPriority::Critical);
        let mut tier = Tier::select_by_quality(snapshot.quality.composite, self.prefer_local);
        if has_unresolved_conflict {
            tier = Tier::Critical;
        }
        tier = tier.degrade_if_debate_disabled(self.enable_debate);

        let prompt = render_prompt(&snapshot.query, &accepted);

        let (final_answer, cost_usd) = if tier.requires_debate() {
            let debate = run_debate(self.coordinator.as_ref(), &prompt).await.map_err(|e| {
                NodeError::Provider { provider: "model_coordinator".into(), message: e.to_string() }
            })?;
            (debate.consensus, debate.total_cost_usd)
        } else {
            let request = ConsultationRequest::new(tier, prompt);
            let response = self.coordinator.consult(&request).await.map_err(|e| {
                NodeError::Provider { provider: "model_coordinator".into(), message: e.to_string() }
            })?;
            (response.text, response.cost_usd)
        };

        ctx.emit("synthesize", format!("tier={tier:?} cost_usd={cost_usd:.4}"))?;

        let mut budget = snapshot.budget.clone();
        if let Some(b) = budget.as_mut() {
            b.record_spend(cost_usd, true);
        }

        let mut partial = NodePartial::new().with_final_answer(final_answer);
        if let Some(b) = budget {
            partial = partial.with_budget(b);
        }
        Ok(partial)
    }
}

/// Renders accepted findings, each with its supporting evidence, into a
/// single prompt for the coordinator. Findings are sorted by id for
/// replay-stable prompts.
fn render_prompt(query: &str, findings: &[&Finding]) -> String {
    let mut ordered = findings.to_vec();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));

    let mut body = format!("Research question: {query}\n\nAccepted findings:\n");
    for finding in ordered {
        body.push_str(&format!("- {} (confidence {:.2})\n", finding.content, finding.confidence));
        for evidence in &finding.evidence {
            body.push_str(&format!("  evidence: {evidence}\n"));
        }
    }
    body.push_str("\nSynthesize a single grounded answer citing the findings above.");
    body
}
