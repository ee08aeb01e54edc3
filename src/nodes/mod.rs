//! The canonical node implementations: `Intake -> Plan -> Dispatch ->
//! Validate -> Score -> Arbitrate -> {Plan | Synthesize | Abort}`.
//!
//! Each node is a small, independently constructed [`crate::node::Node`].
//! Nodes that need collaborators injected from outside the crate (tool
//! execution, permission gating, model inference) take them as constructor
//! arguments rather than reaching for a global — see [`dispatch::Dispatch`]
//! and [`synthesize::Synthesize`].

pub mod abort;
pub mod arbitrate;
pub mod dispatch;
pub mod intake;
pub mod plan;
pub mod score;
pub mod synthesize;
pub mod validate;

pub use abort::Abort;
pub use arbitrate::Arbitrate;
pub use dispatch::Dispatch;
pub use intake::Intake;
pub use plan::Plan;
pub use score::Score;
pub use synthesize::Synthesize;
pub use validate::Validate;

/// Reads the current iteration number off the snapshot's strategy context,
/// the planner's last write. `Intake`, run before any `Plan`, has no
/// strategy context yet and is the only node that should see `None` here.
pub(crate) fn current_iteration(snapshot: &crate::state::ResearchStateSnapshot) -> u32 {
    snapshot
        .strategy_context
        .as_ref()
        .map(|sc| sc.iteration)
        .unwrap_or(snapshot.iteration)
}
