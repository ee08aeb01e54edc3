//! Strategy selector (C3): picks breadth/depth/decompose/hybrid from the
//! currently open gaps and emits the next wave's task list.

use async_trait::async_trait;

use crate::config::ResearchConfig;
use crate::gap::{Gap, GapKind};
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::state::ResearchStateSnapshot;
use crate::strategy::{Strategy, StrategyContext};
use crate::tool::{ToolCapability, ToolTask};

/// Chooses a [`Strategy`] for the upcoming wave and builds its task list.
/// Holds its own copy of [`ResearchConfig`] since `Node::run` receives only
/// the state snapshot, never the session's configuration.
#[derive(Clone, Debug)]
pub struct Plan {
    config: ResearchConfig,
}

impl Plan {
    #[must_use]
    pub fn new(config: ResearchConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Node for Plan {
    async fn run(
        &self,
        snapshot: ResearchStateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let iteration = snapshot
            .strategy_context
            .as_ref()
            .map(|sc| sc.iteration + 1)
            .unwrap_or(1);

        let strategy = select_strategy(&snapshot.gaps, iteration);
        let tasks = build_tasks(strategy, &snapshot.query, &snapshot.gaps, &self.config, iteration);
        let rationale = rationale_for(strategy, &snapshot.gaps);

        ctx.emit(
            "plan",
            format!("iteration {iteration}: {strategy:?} strategy, {} tasks", tasks.len()),
        )?;

        let context = StrategyContext::new(strategy, rationale, iteration, tasks);
        Ok(NodePartial::new().with_strategy_context(context))
    }
}

/// First iteration (1, iteration numbering is 1-based) always decomposes the
/// raw query; afterwards the mix of open gap kinds decides the strategy.
/// Ties favor `Depth`: a single dominant gap kind is more efficiently
/// chased deeper than spread thin.
fn select_strategy(gaps: &[Gap], iteration: u32) -> Strategy {
    if iteration <= 1 || gaps.is_empty() {
        return Strategy::Decompose;
    }

    let breadth_oriented = gaps
        .iter()
        .filter(|g| {
            matches!(
                g.kind,
                GapKind::MissingContext | GapKind::MissingPerspective | GapKind::TemporalGap
            )
        })
        .count();
    let depth_oriented = gaps
        .iter()
        .filter(|g| matches!(g.kind, GapKind::DepthGap | GapKind::IncompleteAnswer))
        .count();
    let distinct_kinds = {
        let mut kinds: Vec<GapKind> = gaps.iter().map(|g| g.kind).collect();
        kinds.sort_by_key(|k| *k as u8);
        kinds.dedup();
        kinds.len()
    };

    if distinct_kinds >= 2 && breadth_oriented > 0 && depth_oriented > 0 {
        Strategy::Hybrid
    } else if breadth_oriented > depth_oriented {
        Strategy::Breadth
    } else {
        Strategy::Depth
    }
}

fn rationale_for(strategy: Strategy, gaps: &[Gap]) -> String {
    if gaps.is_empty() {
        return "no prior findings yet; decomposing the query into independent sub-questions".to_string();
    }
    let summary = gaps
        .iter()
        .map(|g| format!("{:?}", g.kind))
        .collect::<Vec<_>>()
        .join(", ");
    format!("chose {strategy:?} to address open gaps: {summary}")
}

fn build_tasks(
    strategy: Strategy,
    query: &str,
    gaps: &[Gap],
    config: &ResearchConfig,
    iteration: u32,
) -> Vec<ToolTask> {
    match strategy {
        Strategy::Decompose => decompose_tasks(query, config, iteration),
        Strategy::Breadth => breadth_tasks(query, gaps, config, iteration),
        Strategy::Depth => depth_tasks(query, gaps, config, iteration),
        Strategy::Hybrid => {
            let mut tasks = breadth_tasks(query, gaps, config, iteration);
            tasks.extend(depth_tasks(query, gaps, config, iteration));
            tasks
        }
    }
}

fn decompose_tasks(query: &str, config: &ResearchConfig, iteration: u32) -> Vec<ToolTask> {
    let sub_questions: Vec<&str> = query
        .split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let sub_questions = if sub_questions.is_empty() { vec![query] } else { sub_questions };

    sub_questions
        .into_iter()
        .take(config.max_breadth as usize)
        .enumerate()
        .map(|(idx, question)| ToolTask {
            task_id: format!("{iteration}-decompose-{idx}"),
            capability: ToolCapability::WebSearch,
            query: question.to_string(),
            depends_on: Vec::new(),
        })
        .collect()
}

fn breadth_tasks(query: &str, gaps: &[Gap], config: &ResearchConfig, iteration: u32) -> Vec<ToolTask> {
    if gaps.is_empty() {
        return decompose_tasks(query, config, iteration);
    }
    let mut sorted = gaps.to_vec();
    sorted.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
    sorted
        .into_iter()
        .take(config.max_breadth as usize)
        .enumerate()
        .map(|(idx, gap)| ToolTask {
            task_id: format!("{iteration}-breadth-{idx}"),
            capability: ToolCapability::WebSearch,
            query: format!("{query}: {}", gap.description),
            depends_on: Vec::new(),
        })
        .collect()
}

fn depth_tasks(query: &str, gaps: &[Gap], config: &ResearchConfig, iteration: u32) -> Vec<ToolTask> {
    let focus = gaps
        .iter()
        .max_by_key(|g| g.priority)
        .map(|g| g.description.clone())
        .unwrap_or_else(|| query.to_string());

    let mut tasks = Vec::new();
    let depth = config.max_depth.max(1) as usize;
    for idx in 0..depth {
        let task_id = format!("{iteration}-depth-{idx}");
        let depends_on = if idx == 0 {
            Vec::new()
        } else {
            vec![format!("{iteration}-depth-{}", idx - 1)]
        };
        tasks.push(ToolTask {
            task_id,
            capability: ToolCapability::DeepResearch,
            query: format!("{focus} (depth pass {idx})"),
            depends_on,
        });
    }
    tasks
}
