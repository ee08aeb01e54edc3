use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::{
    node::NodePartial,
    reducers::{
        AppendErrors, AppendFindings, AppendToolHistory, Reducer, ReducerError, ReplaceBudget,
        ReplaceGaps, ReplaceQuality, ReplaceSaturation, ReplaceStop, ReplaceStrategyContext,
        SetFinalAnswer, UpsertSources,
    },
    state::ResearchState,
    types::ChannelType,
};
use tracing::instrument;

#[derive(Clone)]
pub struct ReducerRegistry {
    reducer_map: FxHashMap<ChannelType, Vec<Arc<dyn Reducer>>>,
}

/// Guard that checks whether a `NodePartial` actually has meaningful data
/// for the specified channel, so the registry can skip invoking reducers
/// when there is nothing to do.
fn channel_guard(channel: &ChannelType, partial: &NodePartial) -> bool {
    match channel {
        ChannelType::Findings => partial.findings.as_ref().is_some_and(|v| !v.is_empty()),
        ChannelType::Sources => partial.sources.as_ref().is_some_and(|v| !v.is_empty()),
        ChannelType::ToolHistory => partial.tool_history.as_ref().is_some_and(|v| !v.is_empty()),
        ChannelType::Quality => partial.quality.is_some(),
        ChannelType::Saturation => partial.saturation.is_some(),
        ChannelType::Gaps => partial.gaps.is_some(),
        ChannelType::Budget => partial.budget.is_some(),
        ChannelType::Stop => partial.stop.is_some(),
        ChannelType::FinalAnswer => partial.final_answer.is_some(),
        ChannelType::StrategyContext => partial.strategy_context.is_some(),
        ChannelType::Errors => partial.errors.as_ref().is_some_and(|v| !v.is_empty()),
    }
}

impl Default for ReducerRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry
            .register(ChannelType::Findings, Arc::new(AppendFindings))
            .register(ChannelType::Sources, Arc::new(UpsertSources))
            .register(ChannelType::ToolHistory, Arc::new(AppendToolHistory))
            .register(ChannelType::Quality, Arc::new(ReplaceQuality))
            .register(ChannelType::Saturation, Arc::new(ReplaceSaturation))
            .register(ChannelType::Gaps, Arc::new(ReplaceGaps))
            .register(ChannelType::Budget, Arc::new(ReplaceBudget))
            .register(ChannelType::Stop, Arc::new(ReplaceStop))
            .register(ChannelType::FinalAnswer, Arc::new(SetFinalAnswer))
            .register(ChannelType::StrategyContext, Arc::new(ReplaceStrategyContext))
            .register(ChannelType::Errors, Arc::new(AppendErrors));
        registry
    }
}

impl ReducerRegistry {
    pub fn new() -> Self {
        Self {
            reducer_map: FxHashMap::default(),
        }
    }

    /// Registers a reducer for a specific channel type. Multiple reducers
    /// can be registered for the same channel and run in registration order.
    pub fn register(&mut self, channel: ChannelType, reducer: Arc<dyn Reducer>) -> &mut Self {
        self.reducer_map.entry(channel).or_default().push(reducer);
        self
    }

    #[must_use]
    pub fn with_reducer(mut self, channel: ChannelType, reducer: Arc<dyn Reducer>) -> Self {
        self.register(channel, reducer);
        self
    }

    #[instrument(skip(self, state, to_update), err)]
    pub fn try_update(
        &self,
        channel_type: ChannelType,
        state: &mut ResearchState,
        to_update: &NodePartial,
    ) -> Result<(), ReducerError> {
        if !channel_guard(&channel_type, to_update) {
            return Ok(());
        }

        if let Some(reducers) = self.reducer_map.get(&channel_type) {
            for reducer in reducers {
                reducer.apply(state, to_update);
            }
            Ok(())
        } else {
            Err(ReducerError::UnknownChannel(channel_type))
        }
    }

    #[instrument(skip(self, state, merged_updates), err)]
    pub fn apply_all(
        &self,
        state: &mut ResearchState,
        merged_updates: &NodePartial,
    ) -> Result<(), ReducerError> {
        for channel in self.reducer_map.keys() {
            self.try_update(channel.clone(), state, merged_updates)?;
        }
        Ok(())
    }
}
