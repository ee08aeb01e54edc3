#![allow(dead_code)]

use async_trait::async_trait;
use loomresearch::finding::Finding;
use loomresearch::node::{Node, NodeContext, NodeError, NodePartial};
use loomresearch::state::ResearchStateSnapshot;

/// Appends a single finding on every run; used to exercise barrier merging
/// without pulling in a real dispatcher.
#[derive(Debug, Clone)]
pub struct SimpleFindingNode {
    pub content: &'static str,
}

impl SimpleFindingNode {
    pub fn new(content: &'static str) -> Self {
        Self { content }
    }
}

#[async_trait]
impl Node for SimpleFindingNode {
    async fn run(
        &self,
        snapshot: ResearchStateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let finding = Finding::new(
            format!("f-{}", self.content),
            self.content,
            "fixture",
            snapshot.iteration,
        );
        Ok(NodePartial::new().with_findings(vec![finding]))
    }
}

#[derive(Debug, Clone)]
pub struct NoopNode;

#[async_trait]
impl Node for NoopNode {
    async fn run(
        &self,
        _snapshot: ResearchStateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        Ok(NodePartial::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_finding_node_construction() {
        let _node = SimpleFindingNode::new("hello world");
    }

    #[test]
    fn test_noop_node_construction() {
        let _node = NoopNode;
    }
}
