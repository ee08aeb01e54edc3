use super::Reducer;
use crate::channels::Channel;
use crate::node::NodePartial;
use crate::state::ResearchState;

/// Writes the synthesized final answer exactly once per session. A second
/// write is silently ignored rather than overwriting — synthesis only ever
/// runs once, on the path to `End`, so a second write would indicate a
/// routing bug rather than a legitimate update.
#[derive(Debug, Default, Clone, Copy)]
pub struct SetFinalAnswer;

impl Reducer for SetFinalAnswer {
    fn apply(&self, state: &mut ResearchState, update: &NodePartial) {
        if state.final_answer.get().is_some() {
            return;
        }
        if let Some(answer) = &update.final_answer {
            *state.final_answer.get_mut() = Some(answer.clone());
        }
    }
}
