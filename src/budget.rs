//! Budget accounting: the ledger the dispatcher and arbiter both consult.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monotonic spend ledger for a session. `spent_usd` only grows; invariant
/// P1 (testable property) requires `spent_usd + remaining_usd == hard_cap_usd`
/// at every checkpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub spent_usd: f64,
    pub hard_cap_usd: f64,
    pub external_calls_used: u32,
    pub external_calls_cap: u32,
    pub time_started: DateTime<Utc>,
    pub time_deadline: DateTime<Utc>,
}

impl Budget {
    pub fn new(hard_cap_usd: f64, external_calls_cap: u32, time_started: DateTime<Utc>, time_deadline: DateTime<Utc>) -> Self {
        Self {
            spent_usd: 0.0,
            hard_cap_usd,
            external_calls_used: 0,
            external_calls_cap,
            time_started,
            time_deadline,
        }
    }

    #[must_use]
    pub fn remaining_usd(&self) -> f64 {
        (self.hard_cap_usd - self.spent_usd).max(0.0)
    }

    #[must_use]
    pub fn external_calls_remaining(&self) -> u32 {
        self.external_calls_cap.saturating_sub(self.external_calls_used)
    }

    #[must_use]
    pub fn is_cost_exhausted(&self) -> bool {
        self.spent_usd >= self.hard_cap_usd
    }

    #[must_use]
    pub fn is_call_budget_exhausted(&self) -> bool {
        self.external_calls_used >= self.external_calls_cap
    }

    #[must_use]
    pub fn is_time_exhausted(&self, now: DateTime<Utc>) -> bool {
        now >= self.time_deadline
    }

    /// Records a completed tool or model call against the ledger. Spend
    /// never decreases; `is_external` advances `external_calls_used` only
    /// for calls that left the local/free tier (free local calls don't
    /// consume the external-call budget even though they still cost time).
    pub fn record_spend(&mut self, cost_usd: f64, is_external: bool) {
        self.spent_usd += cost_usd.max(0.0);
        if is_external {
            self.external_calls_used = self.external_calls_used.saturating_add(1);
        }
    }
}
