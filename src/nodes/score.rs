//! Quality scorer (C6): grounded quality, confidence, saturation, and gap
//! detection, recomputed wholesale on every `Score` run from the accepted
//! findings and sources the current state holds.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::finding::Finding;
use crate::gap::{Gap, GapKind};
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::quality::QualityScores;
use crate::source::Source;
use crate::state::ResearchStateSnapshot;

/// Year range a query implies, when it mentions one (e.g. "2010-2020" or
/// "between 1990 and 2000"). Used by the `temporal_gap` rule.
const MIN_PLAUSIBLE_YEAR: i32 = 1000;
const MAX_PLAUSIBLE_YEAR: i32 = 2999;

#[derive(Clone, Copy, Debug, Default)]
pub struct Score;

#[async_trait]
impl Node for Score {
    async fn run(
        &self,
        snapshot: ResearchStateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let accepted: Vec<&Finding> = snapshot
            .findings
            .iter()
            .filter(|f| f.accepted == Some(true))
            .collect();

        let grounding = grounding_of(&accepted, &snapshot.sources);
        let relevancy = relevancy_of(&accepted, &snapshot.query);
        let precision = precision_of(&accepted, &snapshot.sources);
        let recall = recall_of(&accepted, &snapshot.query);
        let grounded_quality = QualityScores::grounded_quality_of(grounding, relevancy, precision, recall);
        let confidence = confidence_of(&accepted, &snapshot.sources);

        let current_iteration = super::current_iteration(&snapshot);
        let new_findings: Vec<&Finding> = accepted
            .iter()
            .filter(|f| f.iteration == current_iteration)
            .copied()
            .collect();
        let prior_findings: Vec<&Finding> = accepted
            .iter()
            .filter(|f| f.iteration != current_iteration)
            .copied()
            .collect();
        let novelty_rate = novelty_of(&new_findings, &prior_findings);
        let saturation = snapshot.saturation.clone().with_novelty(novelty_rate);

        let composite = QualityScores::composite_of(grounded_quality, confidence, saturation.score);
        let quality = QualityScores {
            grounding,
            relevancy,
            precision,
            recall,
            grounded_quality,
            confidence,
            composite,
        };

        let gaps = detect_gaps(&accepted, &snapshot.query, current_iteration);

        ctx.emit(
            "score",
            format!(
                "composite={composite:.2} confidence={confidence:.2} saturation={:.2} gaps={}",
                saturation.score,
                gaps.len()
            ),
        )?;

        Ok(NodePartial::new()
            .with_quality(quality)
            .with_saturation(saturation)
            .with_gaps(gaps))
    }
}

fn normalize_keywords(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 { 0.0 } else { intersection / union }
}

/// Fraction of accepted findings whose evidence overlaps a source they cite.
fn grounding_of(findings: &[&Finding], sources: &[Source]) -> f64 {
    if findings.is_empty() {
        return 0.0;
    }
    let grounded = findings
        .iter()
        .filter(|f| {
            if f.evidence.is_empty() || f.source_refs.is_empty() {
                return false;
            }
            let cited: HashSet<String> = sources
                .iter()
                .filter(|s| f.source_refs.contains(&s.url))
                .flat_map(|s| normalize_keywords(&s.snippet))
                .collect();
            f.evidence.iter().any(|e| {
                let words = normalize_keywords(e);
                jaccard(&words, &cited) > 0.0
            })
        })
        .count();
    grounded as f64 / findings.len() as f64
}

/// Mean keyword-Jaccard overlap between each finding's content and the
/// original query.
fn relevancy_of(findings: &[&Finding], query: &str) -> f64 {
    if findings.is_empty() {
        return 0.0;
    }
    let query_words = normalize_keywords(query);
    let total: f64 = findings
        .iter()
        .map(|f| jaccard(&normalize_keywords(&f.content), &query_words))
        .sum();
    total / findings.len() as f64
}

/// Fraction of sources that contributed to at least one finding.
fn precision_of(findings: &[&Finding], sources: &[Source]) -> f64 {
    if sources.is_empty() {
        return 0.0;
    }
    let cited: HashSet<&str> = findings.iter().flat_map(|f| f.source_refs.iter().map(String::as_str)).collect();
    let contributing = sources.iter().filter(|s| cited.contains(s.url.as_str())).count();
    contributing as f64 / sources.len() as f64
}

/// Coverage of query facets (the query split into sub-questions, the same
/// way the planner's decompose strategy does) by at least one finding.
fn recall_of(findings: &[&Finding], query: &str) -> f64 {
    let facets: Vec<&str> = query.split([',', ';']).map(str::trim).filter(|s| !s.is_empty()).collect();
    let facets = if facets.is_empty() { vec![query] } else { facets };
    if facets.is_empty() {
        return 0.0;
    }
    let covered = facets
        .iter()
        .filter(|facet| {
            let facet_words = normalize_keywords(facet);
            findings.iter().any(|f| jaccard(&normalize_keywords(&f.content), &facet_words) > 0.0)
        })
        .count();
    covered as f64 / facets.len() as f64
}

/// Six-factor weighted confidence, spec.md §4.6. `model_agreement` and
/// `recency` have no first-class signal at scoring time (a debate result, if
/// any, only exists after synthesis; findings carry no publication date) so
/// both default to a neutral 1.0 — no detected disagreement, nothing stale.
fn confidence_of(findings: &[&Finding], sources: &[Source]) -> f64 {
    if findings.is_empty() {
        return 0.0;
    }
    let cited: HashSet<&str> = findings.iter().flat_map(|f| f.source_refs.iter().map(String::as_str)).collect();
    let cited_sources: Vec<&Source> = sources.iter().filter(|s| cited.contains(s.url.as_str())).collect();

    let source_authority = if cited_sources.is_empty() {
        0.0
    } else {
        cited_sources.iter().map(|s| s.credibility).sum::<f64>() / cited_sources.len() as f64
    };

    let domains: HashSet<String> = cited_sources.iter().map(|s| domain_of(&s.url)).collect();
    let source_diversity = if sources.is_empty() {
        0.0
    } else {
        (domains.len() as f64 / sources.len() as f64).min(1.0)
    };

    let claim_support = findings.iter().filter(|f| !f.evidence.is_empty()).count() as f64 / findings.len() as f64;
    let model_agreement = 1.0;
    let citation_completeness = findings.iter().filter(|f| !f.source_refs.is_empty()).count() as f64 / findings.len() as f64;
    let recency = 1.0;

    0.25 * source_authority
        + 0.15 * source_diversity
        + 0.25 * claim_support
        + 0.20 * model_agreement
        + 0.10 * citation_completeness
        + 0.05 * recency
}

fn domain_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// Mean novelty of this iteration's findings against everything found so
/// far: `1 - max_jaccard_on_normalized_keywords(finding, any prior finding)`.
fn novelty_of(new_findings: &[&Finding], prior_findings: &[&Finding]) -> f64 {
    if new_findings.is_empty() {
        return 0.0;
    }
    if prior_findings.is_empty() {
        return 1.0;
    }
    let prior_sets: Vec<HashSet<String>> = prior_findings.iter().map(|f| normalize_keywords(&f.content)).collect();
    let total: f64 = new_findings
        .iter()
        .map(|f| {
            let words = normalize_keywords(&f.content);
            let max_overlap = prior_sets.iter().map(|p| jaccard(&words, p)).fold(0.0_f64, f64::max);
            1.0 - max_overlap
        })
        .sum();
    total / new_findings.len() as f64
}

/// Detects the six gap kinds, spec.md §4.6. Each rule only ever emits the
/// kinds it's responsible for; priorities come from `GapKind::default_priority`.
fn detect_gaps(findings: &[&Finding], query: &str, iteration: u32) -> Vec<Gap> {
    let mut gaps = Vec::new();

    let facets: Vec<&str> = query.split([',', ';']).map(str::trim).filter(|s| !s.is_empty()).collect();
    let facets = if facets.is_empty() { vec![query] } else { facets };
    for (idx, facet) in facets.iter().enumerate() {
        let facet_words = normalize_keywords(facet);
        let covered = findings.iter().any(|f| jaccard(&normalize_keywords(&f.content), &facet_words) > 0.0);
        if !covered {
            gaps.push(Gap::new(
                format!("missing-context-{idx}"),
                GapKind::MissingContext,
                format!("no findings address: {facet}"),
                iteration,
            ));
        }
    }

    if let Some(conflict) = detect_conflict(findings, iteration) {
        gaps.push(conflict);
    }

    if let Some(years) = query_year_range(query) {
        let in_range = findings.iter().any(|f| mentions_year_in_range(&f.content, years));
        if !in_range {
            gaps.push(Gap::new(
                "temporal-gap-0",
                GapKind::TemporalGap,
                format!("query references {}-{} but no source falls inside it", years.0, years.1),
                iteration,
            ));
        }
    }

    if !findings.is_empty() && findings.iter().all(|f| f.content.split_whitespace().count() < 20) {
        gaps.push(Gap::new(
            "depth-gap-0",
            GapKind::DepthGap,
            "findings are shallow relative to the query's apparent depth",
            iteration,
        ));
    }

    if findings.len() < 2 && !findings.is_empty() {
        gaps.push(Gap::new(
            "incomplete-answer-0",
            GapKind::IncompleteAnswer,
            "too few findings to compose a complete answer",
            iteration,
        ));
    }

    gaps
}

/// A conflict: two findings whose normalized content shares most keywords
/// (same canonicalized subject) but whose polarity differs (one asserts,
/// the other negates).
fn detect_conflict(findings: &[&Finding], iteration: u32) -> Option<Gap> {
    const NEGATORS: [&str; 6] = ["not", "never", "no", "isn't", "doesn't", "cannot"];
    for i in 0..findings.len() {
        for j in (i + 1)..findings.len() {
            let a = findings[i];
            let b = findings[j];
            let words_a = normalize_keywords(&a.content);
            let words_b = normalize_keywords(&b.content);
            if jaccard(&words_a, &words_b) < 0.5 {
                continue;
            }
            let negated_a = NEGATORS.iter().any(|n| words_a.contains(*n));
            let negated_b = NEGATORS.iter().any(|n| words_b.contains(*n));
            if negated_a != negated_b {
                return Some(Gap::new(
                    format!("conflict-{}-{}", a.id, b.id),
                    GapKind::Conflict,
                    format!("findings {} and {} contradict each other", a.id, b.id),
                    iteration,
                ));
            }
        }
    }
    None
}

/// Extracts a year range from the query, e.g. "2010-2020" or "between 1990
/// and 2000". Returns `None` if the query mentions no plausible range.
fn query_year_range(query: &str) -> Option<(i32, i32)> {
    let years: Vec<i32> = query
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|tok| tok.parse::<i32>().ok())
        .filter(|y| (MIN_PLAUSIBLE_YEAR..=MAX_PLAUSIBLE_YEAR).contains(y))
        .collect();
    if years.len() < 2 {
        return None;
    }
    let min = *years.iter().min().unwrap();
    let max = *years.iter().max().unwrap();
    if min == max { None } else { Some((min, max)) }
}

fn mentions_year_in_range(content: &str, range: (i32, i32)) -> bool {
    content
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|tok| tok.parse::<i32>().ok())
        .any(|y| y >= range.0 && y <= range.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResearchConfig;
    use crate::event_bus::EventBus;
    use crate::state::ResearchState;
    use crate::strategy::{Strategy, StrategyContext};

    fn ctx() -> NodeContext {
        NodeContext {
            node_id: "Score".into(),
            step: 1,
            event_emitter: EventBus::default().get_emitter(),
        }
    }

    fn snapshot_with(findings: Vec<Finding>, sources: Vec<Source>, iteration: u32) -> ResearchStateSnapshot {
        let config = ResearchConfig::default();
        let state = ResearchState::new("t", "1177 BC collapse causes, drought effects", &config);
        let mut snapshot = state.snapshot();
        snapshot.findings = findings;
        snapshot.sources = sources;
        snapshot.strategy_context = Some(StrategyContext::new(Strategy::Breadth, "t", iteration, Vec::new()));
        snapshot
    }

    #[tokio::test]
    async fn no_accepted_findings_scores_zero() {
        let partial = Score.run(snapshot_with(vec![], vec![], 0), ctx()).await.unwrap();
        let quality = partial.quality.unwrap();
        assert_eq!(quality.grounding, 0.0);
        assert_eq!(quality.composite, 1.0 - 0.2 * 1.0);
    }

    #[tokio::test]
    async fn novelty_is_full_on_first_ever_findings() {
        let source = Source::new("https://example.com/a", "A", 0).with_snippet("drought caused crop failure");
        let mut finding = Finding::new("f1", "drought caused widespread crop failure across the region", "web_search", 0)
            .with_source_refs(vec![source.url.clone()])
            .with_evidence(vec!["drought caused crop failure".into()]);
        finding.accepted = Some(true);
        let partial = Score.run(snapshot_with(vec![finding], vec![source], 0), ctx()).await.unwrap();
        let saturation = partial.saturation.unwrap();
        assert!((saturation.novelty_rate - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn repeating_the_same_finding_drives_novelty_toward_zero() {
        let content = "drought caused widespread crop failure across the region";
        let mut old = Finding::new("f0", content, "web_search", 0);
        old.accepted = Some(true);
        let mut new = Finding::new("f1", content, "web_search", 1);
        new.accepted = Some(true);
        let partial = Score.run(snapshot_with(vec![old, new], vec![], 1), ctx()).await.unwrap();
        let saturation = partial.saturation.unwrap();
        assert!(saturation.novelty_rate < 0.2);
    }

    #[test]
    fn conflicting_findings_are_flagged_critical() {
        let mut a = Finding::new("f1", "the bridge collapse was caused by structural failure", "web_search", 0);
        a.accepted = Some(true);
        let mut b = Finding::new("f2", "the bridge collapse was not caused by structural failure", "web_search", 0);
        b.accepted = Some(true);
        let refs = vec![&a, &b];
        let gap = detect_conflict(&refs, 0).expect("expected a conflict gap");
        assert_eq!(gap.kind, GapKind::Conflict);
        assert_eq!(gap.priority, crate::gap::GapPriority::Critical);
    }
}
