//! Knowledge gaps identified by the quality scorer, consumed by the planner.

use serde::{Deserialize, Serialize};

/// The six gap kinds the quality scorer checks for every iteration
/// (spec.md §4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapKind {
    /// A sub-question implied by the query has no supporting findings at all.
    MissingContext,
    /// Two findings contradict on the same canonicalized subject/predicate.
    Conflict,
    /// Findings exist but don't add up to a usable answer yet.
    IncompleteAnswer,
    /// The query implies more than one viewpoint and only one is covered.
    MissingPerspective,
    /// The query references a year range no source falls inside.
    TemporalGap,
    /// Findings are shallow relative to the query's apparent required depth.
    DepthGap,
}

impl GapKind {
    /// Default priority by kind, spec.md §4.6: conflicts are `critical`,
    /// missing context is `high`, everything else defaults to `medium`
    /// unless a detection rule overrides it.
    #[must_use]
    pub fn default_priority(&self) -> GapPriority {
        match self {
            GapKind::Conflict => GapPriority::Critical,
            GapKind::MissingContext => GapPriority::High,
            GapKind::IncompleteAnswer
            | GapKind::MissingPerspective
            | GapKind::TemporalGap
            | GapKind::DepthGap => GapPriority::Medium,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GapPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// A single identified gap. The scorer recomputes and writes the full set
/// of currently-open gaps every iteration (replace-on-write `gaps` channel);
/// the planner reads it to choose the next wave's tasks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub id: String,
    pub kind: GapKind,
    pub description: String,
    pub priority: GapPriority,
    /// Iteration in which this gap was first identified.
    pub since_iteration: u32,
}

impl Gap {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: GapKind, description: impl Into<String>, since_iteration: u32) -> Self {
        Self {
            id: id.into(),
            priority: kind.default_priority(),
            kind,
            description: description.into(),
            since_iteration,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: GapPriority) -> Self {
        self.priority = priority;
        self
    }
}
