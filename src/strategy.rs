//! Strategy selection output of the planner (C3, [`crate::nodes::plan`]),
//! consumed by the dispatcher to build its task DAG.

use crate::tool::ToolTask;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Many shallow tasks across distinct sub-questions.
    Breadth,
    /// Few tasks pursued in depth against one sub-question.
    Depth,
    /// Split the query into independent sub-questions, each its own task.
    Decompose,
    /// A mix of breadth and depth, chosen when gaps span multiple kinds.
    Hybrid,
}

/// The planner's output for one iteration: the chosen strategy and the
/// concrete tasks it wants dispatched this wave.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategyContext {
    pub strategy: Strategy,
    pub rationale: String,
    pub iteration: u32,
    pub tasks: Vec<ToolTask>,
}

impl StrategyContext {
    #[must_use]
    pub fn new(strategy: Strategy, rationale: impl Into<String>, iteration: u32, tasks: Vec<ToolTask>) -> Self {
        Self {
            strategy,
            rationale: rationale.into(),
            iteration,
            tasks,
        }
    }
}
