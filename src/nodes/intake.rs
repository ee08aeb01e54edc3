//! Intake (C1 surface): validates the incoming query before any research
//! wave runs. The rest of the initial state is already seeded by
//! [`crate::state::ResearchState::new`]; this node's only job is to refuse
//! to start on an unusable query.

use async_trait::async_trait;

use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::state::ResearchStateSnapshot;

/// Rejects an empty or whitespace-only query; otherwise a no-op that lets
/// the graph proceed to `Plan`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Intake;

#[async_trait]
impl Node for Intake {
    async fn run(
        &self,
        snapshot: ResearchStateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        if snapshot.query.trim().is_empty() {
            return Err(NodeError::ValidationFailed(
                "query must not be empty".to_string(),
            ));
        }
        ctx.emit("intake", format!("accepted query: {}", snapshot.query))?;
        Ok(NodePartial::new())
    }
}
