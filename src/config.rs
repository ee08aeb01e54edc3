//! Research session configuration: the recognized option table a session is
//! created with (distinct from [`crate::runtimes::runtime_config::RuntimeConfig`],
//! which governs infrastructure rather than research behavior).

use crate::strategy::Strategy;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

fn default_strategy() -> Strategy {
    Strategy::Hybrid
}

fn default_max_iterations() -> u32 {
    15
}

fn default_max_depth() -> u32 {
    3
}

fn default_max_breadth() -> u32 {
    10
}

fn default_min_quality_score() -> f64 {
    0.70
}

fn default_min_confidence() -> f64 {
    0.70
}

fn default_min_ragas_score() -> f64 {
    0.75
}

fn default_saturation_threshold() -> f64 {
    0.75
}

fn default_min_novelty_rate() -> f64 {
    0.15
}

fn default_max_total_cost_usd() -> f64 {
    2.00
}

fn default_max_external_calls() -> u32 {
    10
}

fn default_wall_clock_limit() -> Duration {
    Duration::from_secs(u64::MAX / 2)
}

/// All recognized options for a research session, exactly the table in the
/// external interfaces specification. Constructed with [`ResearchConfig::default`]
/// and overridden field-by-field, then validated with [`ResearchConfig::validate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    #[serde(default = "default_strategy")]
    pub strategy: Strategy,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_max_breadth")]
    pub max_breadth: u32,
    #[serde(default = "default_min_quality_score")]
    pub min_quality_score: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_min_ragas_score")]
    pub min_ragas_score: f64,
    #[serde(default = "default_saturation_threshold")]
    pub saturation_threshold: f64,
    #[serde(default = "default_min_novelty_rate")]
    pub min_novelty_rate: f64,
    #[serde(default = "default_max_total_cost_usd")]
    pub max_total_cost_usd: f64,
    #[serde(default = "default_max_external_calls")]
    pub max_external_calls: u32,
    /// Optional wall-clock deadline; `unbounded` is represented as a very
    /// large duration rather than `Option` so downstream arithmetic
    /// (`now + wall_clock_limit`) never needs a branch.
    #[serde(default = "default_wall_clock_limit", with = "duration_seconds")]
    pub wall_clock_limit: Duration,
    #[serde(default = "crate::config::default_true")]
    pub prefer_local: bool,
    #[serde(default = "crate::config::default_true")]
    pub allow_external: bool,
    #[serde(default = "crate::config::default_true")]
    pub enable_debate: bool,
    #[serde(default = "crate::config::default_true")]
    pub require_critical_gaps_resolved: bool,
}

fn default_true() -> bool {
    true
}

mod duration_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// `hard_cap_usd`, the one field [`crate::budget::Budget`] needs that is
/// not itself part of `ResearchConfig`'s public naming, is read off
/// `max_total_cost_usd`; kept here so callers only need one type.
impl ResearchConfig {
    #[must_use]
    pub fn cost_cap_usd(&self) -> f64 {
        self.max_total_cost_usd
    }

    #[must_use]
    pub fn external_call_cap(&self) -> u32 {
        self.max_external_calls
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_total_cost_usd < 0.0 {
            return Err(ConfigError::Invalid {
                field: "max_total_cost_usd",
                reason: "must be >= 0".into(),
            });
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                field: "max_iterations",
                reason: "must be >= 1".into(),
            });
        }
        for (field, value) in [
            ("min_quality_score", self.min_quality_score),
            ("min_confidence", self.min_confidence),
            ("min_ragas_score", self.min_ragas_score),
            ("saturation_threshold", self.saturation_threshold),
            ("min_novelty_rate", self.min_novelty_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be in [0.0, 1.0]".into(),
                });
            }
        }
        Ok(())
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            max_iterations: default_max_iterations(),
            max_depth: default_max_depth(),
            max_breadth: default_max_breadth(),
            min_quality_score: default_min_quality_score(),
            min_confidence: default_min_confidence(),
            min_ragas_score: default_min_ragas_score(),
            saturation_threshold: default_saturation_threshold(),
            min_novelty_rate: default_min_novelty_rate(),
            max_total_cost_usd: default_max_total_cost_usd(),
            max_external_calls: default_max_external_calls(),
            wall_clock_limit: default_wall_clock_limit(),
            prefer_local: true,
            allow_external: true,
            enable_debate: true,
            require_critical_gaps_resolved: true,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("invalid config field `{field}`: {reason}")]
    #[diagnostic(code(loomresearch::config::invalid))]
    Invalid {
        field: &'static str,
        reason: String,
    },
}
