//! Terminal node for the hard-stop-without-a-usable-answer path: records why
//! the session ended without producing a synthesized final answer.

use async_trait::async_trait;

use crate::channels::errors::{ErrorEvent, LadderError};
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::state::ResearchStateSnapshot;

#[derive(Clone, Copy, Debug, Default)]
pub struct Abort;

#[async_trait]
impl Node for Abort {
    async fn run(
        &self,
        snapshot: ResearchStateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let rationale = snapshot
            .stop
            .as_ref()
            .map(|s| s.rationale.clone())
            .unwrap_or_else(|| "session aborted with no recorded stop decision".to_string());
        let reason = snapshot.stop.as_ref().and_then(|s| s.reason).map(|r| r.label()).unwrap_or("unknown");

        ctx.emit("abort", format!("reason={reason}: {rationale}"))?;

        let accepted = snapshot.findings.iter().filter(|f| f.accepted == Some(true)).count();
        let summary = format!(
            "No final answer was synthesized. Reason: {reason} ({rationale}). \
             {accepted} finding(s) were accepted before the session stopped."
        );

        let error = ErrorEvent::node("Abort", ctx.step, LadderError::msg(rationale)).with_tag(reason);

        Ok(NodePartial::new()
            .with_final_answer(summary)
            .with_errors(vec![error]))
    }
}
