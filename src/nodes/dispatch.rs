//! Tool dispatcher (C4): executes the planner's task DAG against the
//! injected [`ToolExecutor`], gated by [`PermissionGate`] and the session
//! budget, then ingests outcomes into findings and sources.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::finding::Finding;
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::source::Source;
use crate::state::ResearchStateSnapshot;
use crate::tool::{
    PermissionDecision, PermissionGate, ToolCallOutcome, ToolCallRecord, ToolCapability, ToolError,
    ToolExecutor, ToolOutcome, ToolTask,
};

const MAX_ATTEMPTS: u32 = 3;

/// Runs one wave of [`ToolTask`]s, respecting their `depends_on` DAG, under
/// the injected tool executor and permission gate.
pub struct Dispatch {
    executor: Arc<dyn ToolExecutor>,
    gate: Arc<dyn PermissionGate>,
    allow_external: bool,
}

impl Dispatch {
    #[must_use]
    pub fn new(executor: Arc<dyn ToolExecutor>, gate: Arc<dyn PermissionGate>, allow_external: bool) -> Self {
        Self { executor, gate, allow_external }
    }
}

/// Capabilities that leave the local/free tier and so consume the
/// session's external-call budget.
fn is_external(capability: &ToolCapability) -> bool {
    !matches!(capability, ToolCapability::CalculatorOrUnitConversion)
}

/// Splits tasks into dependency waves (Kahn's algorithm). Returns `None` if
/// the graph has a cycle or references an unknown task id.
fn wave_order(tasks: &[ToolTask]) -> Option<Vec<Vec<String>>> {
    let ids: HashSet<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
    for task in tasks {
        if task.depends_on.iter().any(|d| !ids.contains(d.as_str())) {
            return None;
        }
    }

    let mut remaining: HashMap<&str, &ToolTask> = tasks.iter().map(|t| (t.task_id.as_str(), t)).collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
        let mut ready: Vec<&str> = remaining
            .values()
            .filter(|t| t.depends_on.iter().all(|d| !remaining.contains_key(d.as_str())))
            .map(|t| t.task_id.as_str())
            .collect();
        if ready.is_empty() {
            return None; // cycle
        }
        ready.sort_unstable();
        for id in &ready {
            remaining.remove(id);
        }
        waves.push(ready.into_iter().map(str::to_string).collect());
    }
    Some(waves)
}

#[async_trait]
impl Node for Dispatch {
    async fn run(
        &self,
        snapshot: ResearchStateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let strategy_context = snapshot
            .strategy_context
            .as_ref()
            .ok_or(NodeError::MissingInput { what: "strategy_context" })?;
        let iteration = strategy_context.iteration;
        let tasks = &strategy_context.tasks;

        let waves = wave_order(tasks)
            .ok_or_else(|| NodeError::ValidationFailed("task dependency graph is cyclic or malformed".into()))?;

        let mut budget = snapshot
            .budget
            .clone()
            .ok_or(NodeError::MissingInput { what: "budget" })?;

        let by_id: HashMap<&str, &ToolTask> = tasks.iter().map(|t| (t.task_id.as_str(), t)).collect();

        let mut records: Vec<(String, ToolCallRecord)> = Vec::new();
        let mut findings: Vec<(String, Finding)> = Vec::new();
        let mut sources: Vec<Source> = Vec::new();

        for wave in waves {
            for task_id in wave {
                let Some(task) = by_id.get(task_id.as_str()) else { continue };
                let external = is_external(&task.capability);

                if external && !self.allow_external {
                    records.push((
                        task_id.clone(),
                        ToolCallRecord {
                            task_id: task_id.clone(),
                            capability: task.capability.clone(),
                            attempt: 0,
                            started_at: Utc::now(),
                            finished_at: Utc::now(),
                            outcome: ToolCallOutcome::Denied { reason: "external tools disabled (allow_external=false)".into() },
                            cost_usd: 0.0,
                        },
                    ));
                    continue;
                }

                if budget.is_cost_exhausted() || (external && budget.is_call_budget_exhausted()) {
                    records.push((
                        task_id.clone(),
                        ToolCallRecord {
                            task_id: task_id.clone(),
                            capability: task.capability.clone(),
                            attempt: 0,
                            started_at: Utc::now(),
                            finished_at: Utc::now(),
                            outcome: ToolCallOutcome::Denied { reason: "budget exhausted".into() },
                            cost_usd: 0.0,
                        },
                    ));
                    continue;
                }

                match self.gate.check(task).await {
                    PermissionDecision::Deny { reason } => {
                        records.push((
                            task_id.clone(),
                            ToolCallRecord {
                                task_id: task_id.clone(),
                                capability: task.capability.clone(),
                                attempt: 0,
                                started_at: Utc::now(),
                                finished_at: Utc::now(),
                                outcome: ToolCallOutcome::Denied { reason },
                                cost_usd: 0.0,
                            },
                        ));
                        continue;
                    }
                    PermissionDecision::Allow => {}
                }

                let (record, outcome) = self.run_with_retries(task, &task_id).await;
                if let Some(outcome) = &outcome {
                    budget.record_spend(outcome.cost_usd, external);
                    ctx.emit(
                        "dispatch",
                        format!("task {task_id} ({}) succeeded", task.capability.label()),
                    )?;
                    let finding_id = format!("{task_id}-finding");
                    let mut finding = Finding::new(finding_id, outcome.raw_content.clone(), task.capability.label(), iteration);
                    if let (Some(url), _) = (&outcome.source_url, &outcome.source_title) {
                        let canonical = crate::source::canonicalize_url(url);
                        finding = finding.with_source_refs(vec![canonical.clone()]).with_confidence(0.6);
                        sources.push(
                            Source::new(url.clone(), outcome.source_title.clone().unwrap_or_default(), iteration)
                                .with_snippet(outcome.raw_content.chars().take(280).collect::<String>())
                                .with_credibility(0.6),
                        );
                    }
                    findings.push((task_id.clone(), finding));
                } else {
                    ctx.emit("dispatch", format!("task {task_id} failed after {MAX_ATTEMPTS} attempts"))?;
                }
                records.push((task_id, record));
            }
        }

        // Deterministic fold: sort every channel's contribution by task id,
        // independent of the (possibly concurrent) completion order above.
        records.sort_by(|a, b| a.0.cmp(&b.0));
        findings.sort_by(|a, b| a.0.cmp(&b.0));

        let tool_history = records.into_iter().map(|(_, r)| r).collect::<Vec<_>>();
        let findings = findings.into_iter().map(|(_, f)| f).collect::<Vec<_>>();

        let mut partial = NodePartial::new().with_tool_history(tool_history).with_budget(budget);
        if !findings.is_empty() {
            partial = partial.with_findings(findings);
        }
        if !sources.is_empty() {
            partial = partial.with_sources(sources);
        }
        Ok(partial)
    }
}

impl Dispatch {
    async fn run_with_retries(&self, task: &ToolTask, task_id: &str) -> (ToolCallRecord, Option<ToolOutcome>) {
        let mut last_message = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            let started_at = Utc::now();
            match self.executor.execute(task).await {
                Ok(outcome) => {
                    let record = ToolCallRecord {
                        task_id: task_id.to_string(),
                        capability: task.capability.clone(),
                        attempt,
                        started_at,
                        finished_at: Utc::now(),
                        outcome: ToolCallOutcome::Success,
                        cost_usd: outcome.cost_usd,
                    };
                    return (record, Some(outcome));
                }
                Err(err) => {
                    last_message = match err {
                        ToolError::Execution(msg) => msg,
                        ToolError::Timeout(d) => format!("timed out after {d:?}"),
                    };
                    if attempt < MAX_ATTEMPTS {
                        let backoff = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
        let record = ToolCallRecord {
            task_id: task_id.to_string(),
            capability: task.capability.clone(),
            attempt: MAX_ATTEMPTS,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            outcome: ToolCallOutcome::Failed { message: last_message },
            cost_usd: 0.0,
        };
        (record, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResearchConfig;
    use crate::event_bus::EventBus;
    use crate::state::ResearchState;
    use crate::strategy::{Strategy, StrategyContext};
    use crate::tool::AllowAllGate;

    struct AlwaysSucceeds;
    #[async_trait]
    impl ToolExecutor for AlwaysSucceeds {
        async fn execute(&self, task: &ToolTask) -> Result<ToolOutcome, ToolError> {
            Ok(ToolOutcome {
                raw_content: format!("result for {}", task.query),
                source_url: Some(format!("https://example.com/{}", task.task_id)),
                source_title: Some("Example".into()),
                cost_usd: 0.01,
            })
        }
    }

    struct AlwaysFails;
    #[async_trait]
    impl ToolExecutor for AlwaysFails {
        async fn execute(&self, _task: &ToolTask) -> Result<ToolOutcome, ToolError> {
            Err(ToolError::Execution("boom".into()))
        }
    }

    fn ctx() -> NodeContext {
        NodeContext {
            node_id: "Dispatch".into(),
            step: 1,
            event_emitter: EventBus::default().get_emitter(),
        }
    }

    fn snapshot_with_tasks(tasks: Vec<ToolTask>) -> ResearchStateSnapshot {
        let config = ResearchConfig::default();
        let state = ResearchState::new("t", "q", &config);
        let mut snapshot = state.snapshot();
        snapshot.strategy_context = Some(StrategyContext::new(Strategy::Breadth, "test", 0, tasks));
        snapshot
    }

    #[tokio::test]
    async fn successful_tasks_produce_findings_and_sources() {
        let tasks = vec![ToolTask {
            task_id: "0-breadth-0".into(),
            capability: ToolCapability::WebSearch,
            query: "rust".into(),
            depends_on: Vec::new(),
        }];
        let dispatch = Dispatch::new(Arc::new(AlwaysSucceeds), Arc::new(AllowAllGate), true);
        let partial = dispatch.run(snapshot_with_tasks(tasks), ctx()).await.unwrap();
        assert_eq!(partial.findings.as_ref().unwrap().len(), 1);
        assert_eq!(partial.sources.as_ref().unwrap().len(), 1);
        assert!(partial.budget.unwrap().spent_usd > 0.0);
    }

    #[tokio::test]
    async fn exhausted_retries_record_failure_without_findings() {
        let tasks = vec![ToolTask {
            task_id: "0-breadth-0".into(),
            capability: ToolCapability::WebSearch,
            query: "rust".into(),
            depends_on: Vec::new(),
        }];
        let dispatch = Dispatch::new(Arc::new(AlwaysFails), Arc::new(AllowAllGate), true);
        let partial = dispatch.run(snapshot_with_tasks(tasks), ctx()).await.unwrap();
        assert!(partial.findings.is_none());
        let history = partial.tool_history.unwrap();
        assert_eq!(history.len(), 1);
        assert!(matches!(history[0].outcome, ToolCallOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn external_tasks_are_denied_when_not_allowed() {
        let tasks = vec![ToolTask {
            task_id: "0-depth-0".into(),
            capability: ToolCapability::DeepResearch,
            query: "rust".into(),
            depends_on: Vec::new(),
        }];
        let dispatch = Dispatch::new(Arc::new(AlwaysSucceeds), Arc::new(AllowAllGate), false);
        let partial = dispatch.run(snapshot_with_tasks(tasks), ctx()).await.unwrap();
        assert!(partial.findings.is_none());
        let history = partial.tool_history.unwrap();
        assert_eq!(history.len(), 1);
        assert!(matches!(&history[0].outcome, ToolCallOutcome::Denied { reason } if reason.contains("allow_external")));
        assert_eq!(partial.budget.unwrap().spent_usd, 0.0);
    }

    #[tokio::test]
    async fn calculator_tasks_still_run_when_external_is_disallowed() {
        let tasks = vec![ToolTask {
            task_id: "0-calc-0".into(),
            capability: ToolCapability::CalculatorOrUnitConversion,
            query: "2+2".into(),
            depends_on: Vec::new(),
        }];
        let dispatch = Dispatch::new(Arc::new(AlwaysSucceeds), Arc::new(AllowAllGate), false);
        let partial = dispatch.run(snapshot_with_tasks(tasks), ctx()).await.unwrap();
        assert_eq!(partial.findings.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn cyclic_dependencies_are_rejected() {
        let tasks = vec![
            ToolTask { task_id: "a".into(), capability: ToolCapability::WebSearch, query: "x".into(), depends_on: vec!["b".into()] },
            ToolTask { task_id: "b".into(), capability: ToolCapability::WebSearch, query: "y".into(), depends_on: vec!["a".into()] },
        ];
        assert!(wave_order(&tasks).is_none());
    }

    #[test]
    fn independent_tasks_share_one_wave() {
        let tasks = vec![
            ToolTask { task_id: "a".into(), capability: ToolCapability::WebSearch, query: "x".into(), depends_on: vec![] },
            ToolTask { task_id: "b".into(), capability: ToolCapability::WebSearch, query: "y".into(), depends_on: vec![] },
        ];
        let waves = wave_order(&tasks).unwrap();
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0], vec!["a".to_string(), "b".to_string()]);
    }
}
