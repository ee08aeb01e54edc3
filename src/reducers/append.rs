use super::Reducer;
use crate::channels::Channel;
use crate::node::NodePartial;
use crate::state::ResearchState;
use std::collections::HashSet;

/// Appends new findings, skipping any whose `content_key()` already exists
/// in the channel, and updates findings in place by id. The latter lets the
/// validator (`nodes::validate`) write back the `accepted` verdict for a
/// finding the dispatcher already appended this session, without that
/// write being mistaken for a fresh duplicate.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppendFindings;

impl Reducer for AppendFindings {
    fn apply(&self, state: &mut ResearchState, update: &NodePartial) {
        let Some(incoming) = &update.findings else {
            return;
        };
        let mut seen: HashSet<String> = state
            .findings
            .get()
            .iter()
            .map(|f| f.content_key())
            .collect();
        let channel = state.findings.get_mut();
        for finding in incoming {
            if let Some(slot) = channel.iter_mut().find(|f| f.id == finding.id) {
                *slot = finding.clone();
                continue;
            }
            let key = finding.content_key();
            if seen.insert(key) {
                channel.push(finding.clone());
            }
        }
    }
}

/// Appends tool call records to the audit trail. Never deduplicated — every
/// attempt, successful or not, is a distinct record.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppendToolHistory;

impl Reducer for AppendToolHistory {
    fn apply(&self, state: &mut ResearchState, update: &NodePartial) {
        if let Some(records) = &update.tool_history {
            state.tool_history.get_mut().extend(records.iter().cloned());
        }
    }
}

/// Appends non-fatal error events.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppendErrors;

impl Reducer for AppendErrors {
    fn apply(&self, state: &mut ResearchState, update: &NodePartial) {
        if let Some(errors) = &update.errors {
            state.errors.get_mut().extend(errors.iter().cloned());
        }
    }
}
