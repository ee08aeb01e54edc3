//! Versioned state channels.
//!
//! Each field family of [`crate::state::ResearchState`] lives in its own
//! [`Channel`], independently versioned so the barrier merge step
//! ([`crate::app::App::apply_barrier`]) can tell precisely which channels
//! changed in a superstep without diffing the whole state.

pub mod errors;

pub use errors::{ErrorEvent, ErrorScope, LadderError};

use serde::{Deserialize, Serialize};

/// A single versioned slot of channel data.
///
/// `Channel` is the uniform interface every channel type exposes; reducers
/// and the barrier merge never touch the concrete channel structs directly.
pub trait Channel<T> {
    fn new(data: T, version: u32) -> Self;
    fn get(&self) -> &T;
    fn get_mut(&mut self) -> &mut T;
    fn version(&self) -> u32;
    fn set_version(&mut self, version: u32);

    fn snapshot(&self) -> T
    where
        T: Clone,
    {
        self.get().clone()
    }

    fn bump_version(&mut self) {
        let next = self.version().saturating_add(1);
        self.set_version(next);
    }
}

/// Generic versioned container shared by every channel type in
/// `ResearchState`. Kept separate per-field (rather than one big struct) so
/// each channel can carry its own version counter and its own reducer set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionedChannel<T> {
    data: T,
    version: u32,
}

impl<T> Channel<T> for VersionedChannel<T> {
    fn new(data: T, version: u32) -> Self {
        Self { data, version }
    }

    fn get(&self) -> &T {
        &self.data
    }

    fn get_mut(&mut self) -> &mut T {
        &mut self.data
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}

impl<T: Eq> Eq for VersionedChannel<T> {}

use crate::budget::Budget;
use crate::finding::Finding;
use crate::gap::Gap;
use crate::quality::{QualityScores, SaturationState};
use crate::source::Source;
use crate::stop::StopDecision;
use crate::tool::ToolCallRecord;

pub type FindingsChannel = VersionedChannel<Vec<Finding>>;
pub type SourcesChannel = VersionedChannel<Vec<Source>>;
pub type ToolHistoryChannel = VersionedChannel<Vec<ToolCallRecord>>;
pub type QualityChannel = VersionedChannel<QualityScores>;
pub type SaturationChannel = VersionedChannel<SaturationState>;
pub type GapsChannel = VersionedChannel<Vec<Gap>>;
pub type BudgetChannel = VersionedChannel<Option<Budget>>;
pub type StopChannel = VersionedChannel<Option<StopDecision>>;
pub type FinalAnswerChannel = VersionedChannel<Option<String>>;
pub type StrategyContextChannel = VersionedChannel<Option<crate::strategy::StrategyContext>>;
pub type ErrorsChannel = VersionedChannel<Vec<ErrorEvent>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_round_trips_and_bumps_version() {
        let mut ch: VersionedChannel<Vec<u32>> = VersionedChannel::new(vec![1, 2], 1);
        assert_eq!(ch.version(), 1);
        ch.get_mut().push(3);
        ch.bump_version();
        assert_eq!(ch.snapshot(), vec![1, 2, 3]);
        assert_eq!(ch.version(), 2);
    }
}
