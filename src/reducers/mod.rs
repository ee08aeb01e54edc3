mod append;
mod final_answer;
mod reducer_registry;
mod replace;
mod upsert;

pub use append::{AppendErrors, AppendFindings, AppendToolHistory};
pub use final_answer::SetFinalAnswer;
pub use reducer_registry::*;
pub use replace::{ReplaceBudget, ReplaceGaps, ReplaceQuality, ReplaceSaturation, ReplaceStop, ReplaceStrategyContext};
pub use upsert::UpsertSources;

use crate::node::NodePartial;
use crate::state::ResearchState;
use crate::types::ChannelType;
use miette::Diagnostic;
use thiserror::Error;

/// Unified reducer trait: every reducer mutates `ResearchState` using a
/// `NodePartial` delta. One or more reducers may be registered per channel;
/// registered reducers for a channel run in registration order.
pub trait Reducer: Send + Sync {
    fn apply(&self, state: &mut ResearchState, update: &NodePartial);
}

#[derive(Debug, Error, Diagnostic)]
pub enum ReducerError {
    #[error("no reducers registered for channel: {0:?}")]
    #[diagnostic(
        code(loomresearch::reducers::unknown_channel),
        help("Use GraphBuilder::with_reducer() to register a reducer for {0:?}")
    )]
    UnknownChannel(ChannelType),

    #[error("reducer apply failed for channel {channel:?}: {message}")]
    #[diagnostic(
        code(loomresearch::reducers::apply),
        help("Check that your reducer implementation correctly handles the NodePartial structure")
    )]
    Apply {
        channel: ChannelType,
        message: String,
    },
}
