use super::Reducer;
use crate::channels::Channel;
use crate::node::NodePartial;
use crate::state::ResearchState;

/// Upserts sources by canonical URL (invariant iv/P3): a source already
/// present is replaced in place, preserving its original position.
#[derive(Debug, Default, Clone, Copy)]
pub struct UpsertSources;

impl Reducer for UpsertSources {
    fn apply(&self, state: &mut ResearchState, update: &NodePartial) {
        let Some(incoming) = &update.sources else {
            return;
        };
        let channel = state.sources.get_mut();
        for source in incoming {
            match channel.iter_mut().find(|s| s.url == source.url) {
                Some(slot) => *slot = source.clone(),
                None => channel.push(source.clone()),
            }
        }
    }
}
