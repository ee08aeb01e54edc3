//! Quality scoring types produced by the quality scorer (C6, [`crate::nodes::score`]).

use serde::{Deserialize, Serialize};

/// Grounded-quality and confidence scores for the current iteration's
/// accepted findings, replaced wholesale on every `Score` node run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityScores {
    /// Fraction of finding claims traceable to cited evidence.
    pub grounding: f64,
    /// Topical relevance of findings to the original query.
    pub relevancy: f64,
    /// Fraction of findings that are non-redundant, specific claims.
    pub precision: f64,
    /// Estimated fraction of the answerable query surface covered so far.
    pub recall: f64,
    /// The "grounded quality family" score: an unweighted mean of grounding,
    /// relevancy, precision, and recall, measured against `min_ragas_score`.
    pub grounded_quality: f64,
    /// Six-factor weighted confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Single weighted composite used by the arbiter and the model
    /// coordinator's tier-selection rule: 40% grounded quality, 40%
    /// confidence, 20% `1 - saturation_score`.
    pub composite: f64,
}

impl QualityScores {
    /// Grounded quality is an unweighted mean of the four grounded-quality
    /// metrics. There's no held-out reference answer to compute a true RAGAS
    /// score against, so this is the heuristic stand-in config's
    /// `min_ragas_score` is actually measured against.
    #[must_use]
    pub fn grounded_quality_of(grounding: f64, relevancy: f64, precision: f64, recall: f64) -> f64 {
        (grounding + relevancy + precision + recall) / 4.0
    }

    /// Composite quality, spec.md §4.6: 40% grounded quality, 40%
    /// confidence, 20% `1 - saturation_score`.
    #[must_use]
    pub fn composite_of(grounded_quality: f64, confidence: f64, saturation_score: f64) -> f64 {
        0.4 * grounded_quality + 0.4 * confidence + 0.2 * (1.0 - saturation_score)
    }
}

/// Saturation: is continued research still finding anything new?
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SaturationState {
    /// Composite saturation score in `[0.0, 1.0]`; 1.0 means fully saturated.
    /// Computed as `1 - moving_average(novelty, last 3 iterations)`.
    pub score: f64,
    /// Mean novelty of this iteration's findings: `1 -
    /// max_jaccard_on_normalized_keywords(finding, any prior finding)`.
    pub novelty_rate: f64,
    /// Jaccard-similarity-based repetition rate across recent iterations.
    pub repetition_rate: f64,
    pub trend: SaturationTrend,
    /// Rolling window of up to the last 3 iterations' `novelty_rate`, oldest
    /// first. Carried across iterations (replace-on-write on the whole
    /// struct) so the scorer can compute the moving average and trend
    /// without a dedicated history channel.
    pub recent_novelty: Vec<f64>,
}

impl SaturationState {
    /// Pushes this iteration's novelty onto the rolling window (capped at
    /// the last 3 values), then recomputes `score` and `trend` from it.
    #[must_use]
    pub fn with_novelty(mut self, novelty_rate: f64) -> Self {
        self.novelty_rate = novelty_rate;
        self.recent_novelty.push(novelty_rate);
        if self.recent_novelty.len() > 3 {
            self.recent_novelty.remove(0);
        }
        let mean: f64 = self.recent_novelty.iter().sum::<f64>() / self.recent_novelty.len() as f64;
        self.score = 1.0 - mean;
        self.trend = if self.recent_novelty.len() == 3 && self.recent_novelty.windows(2).all(|w| w[1] <= w[0]) {
            SaturationTrend::Declining
        } else {
            SaturationTrend::Stable
        };
        self
    }
}

/// `declining` if the last three novelty values are strictly non-increasing,
/// else `stable` (spec.md §4.6).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaturationTrend {
    #[default]
    Stable,
    Declining,
}
