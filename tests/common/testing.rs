#![allow(dead_code)]

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::json;
use std::sync::Arc;
use tokio::time::{Duration, sleep};

use loomresearch::channels::errors::ErrorEvent;
use loomresearch::finding::Finding;
use loomresearch::node::{Node, NodeContext, NodeError, NodePartial};
use loomresearch::state::ResearchStateSnapshot;
use loomresearch::types::NodeKind;

/// Appends one finding named after `name` and the current step.
#[derive(Debug, Clone)]
pub struct TestNode {
    pub name: &'static str,
}

#[async_trait]
impl Node for TestNode {
    async fn run(
        &self,
        snapshot: ResearchStateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let finding = Finding::new(
            format!("{}-step-{}", self.name, ctx.step),
            format!("ran:{}:step:{}", self.name, ctx.step),
            "fixture",
            snapshot.iteration,
        );
        Ok(NodePartial::new().with_findings(vec![finding]))
    }
}

/// Same as [`TestNode`] but sleeps before returning, for concurrency tests.
#[derive(Debug, Clone)]
pub struct DelayedNode {
    pub name: &'static str,
    pub delay_ms: u64,
}

#[async_trait]
impl Node for DelayedNode {
    async fn run(
        &self,
        snapshot: ResearchStateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        sleep(Duration::from_millis(self.delay_ms)).await;
        let finding = Finding::new(
            format!("{}-step-{}", self.name, ctx.step),
            format!("ran:{}:step:{}", self.name, ctx.step),
            "fixture",
            snapshot.iteration,
        );
        Ok(NodePartial::new().with_findings(vec![finding]))
    }
}

/// Always fails with `NodeError::MissingInput`; used to exercise the
/// runner's error-record path.
#[derive(Debug, Clone)]
pub struct FailingNode {
    pub error_message: &'static str,
}

impl Default for FailingNode {
    fn default() -> Self {
        Self {
            error_message: "test_key",
        }
    }
}

#[async_trait]
impl Node for FailingNode {
    async fn run(
        &self,
        _snapshot: ResearchStateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        Err(NodeError::MissingInput {
            what: self.error_message,
        })
    }
}

/// Appends a finding and, optionally, a non-fatal error record, to exercise
/// multi-channel barrier merges.
#[derive(Debug, Clone)]
pub struct RichNode {
    pub name: &'static str,
    pub produce_error: bool,
}

#[async_trait]
impl Node for RichNode {
    async fn run(
        &self,
        snapshot: ResearchStateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let finding = Finding::new(
            format!("{}-step-{}", self.name, ctx.step),
            format!("{}:step:{}", self.name, ctx.step),
            "fixture",
            snapshot.iteration,
        );
        let mut partial = NodePartial::new().with_findings(vec![finding]);

        if self.produce_error {
            partial = partial.with_errors(vec![ErrorEvent::default()]);
        }
        Ok(partial)
    }
}

pub fn make_test_registry() -> FxHashMap<NodeKind, Arc<dyn Node>> {
    let mut registry = FxHashMap::default();
    registry.insert(
        NodeKind::Custom("A".into()),
        Arc::new(TestNode { name: "A" }) as Arc<dyn Node>,
    );
    registry.insert(
        NodeKind::Custom("B".into()),
        Arc::new(TestNode { name: "B" }) as Arc<dyn Node>,
    );
    registry.insert(
        NodeKind::End,
        Arc::new(TestNode { name: "END" }) as Arc<dyn Node>,
    );
    registry
}

pub fn make_delayed_registry() -> FxHashMap<NodeKind, Arc<dyn Node>> {
    let mut registry = FxHashMap::default();
    registry.insert(
        NodeKind::Custom("A".into()),
        Arc::new(DelayedNode {
            name: "A",
            delay_ms: 30,
        }) as Arc<dyn Node>,
    );
    registry.insert(
        NodeKind::Custom("B".into()),
        Arc::new(DelayedNode {
            name: "B",
            delay_ms: 1,
        }) as Arc<dyn Node>,
    );
    registry
}

pub fn create_test_snapshot(findings_version: u32, sources_version: u32) -> ResearchStateSnapshot {
    let mut snapshot = super::empty_snapshot();
    snapshot.findings_version = findings_version;
    snapshot.sources_version = sources_version;
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_testnode_construction() {
        let node = TestNode { name: "example" };
        let bus = loomresearch::event_bus::EventBus::default();
        let ctx = NodeContext {
            node_id: "test_node".to_string(),
            step: 1,
            event_emitter: bus.get_emitter(),
        };
        let snapshot = create_test_snapshot(1, 1);
        let result = node.run(snapshot, ctx).await;
        assert!(result.is_ok());
    }
}
