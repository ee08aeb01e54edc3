//! Validator (C5): five-layer check over findings produced since the last
//! validation pass, in order — shape, format, quality, hallucination, chain —
//! with a reject at any layer short-circuiting the rest for that finding.

use std::collections::HashSet;

use async_trait::async_trait;
use url::Url;

use crate::channels::errors::{ErrorEvent, LadderError};
use crate::finding::Finding;
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::source::Source;
use crate::state::ResearchStateSnapshot;

/// Shortest acceptable finding content, after whitespace normalization.
const MIN_CONTENT_LEN: usize = 15;

/// Minimum fraction of an evidence snippet's keywords that must appear in a
/// cited source for the hallucination layer to accept it when no exact
/// substring match is found.
const EVIDENCE_OVERLAP_THRESHOLD: f64 = 0.5;

/// Five-layer validation pipeline over freshly dispatched findings.
#[derive(Clone, Copy, Debug, Default)]
pub struct Validate;

#[derive(Clone, Debug, PartialEq)]
enum Verdict {
    Accept,
    AcceptWithFlags(Vec<String>),
    Reject(String),
}

#[async_trait]
impl Node for Validate {
    async fn run(
        &self,
        snapshot: ResearchStateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let pending: Vec<&Finding> = snapshot
            .findings
            .iter()
            .filter(|f| f.accepted.is_none())
            .collect();

        if pending.is_empty() {
            return Ok(NodePartial::new());
        }

        // Chain layer needs to know which sibling findings already passed;
        // process in id order so a dependency is judged before anything
        // that might depend on it (dispatch's task-id naming convention
        // keeps dependency ids lexicographically before their dependents).
        let mut ordered = pending;
        ordered.sort_by(|a, b| a.id.cmp(&b.id));

        let mut decided: HashSet<String> = HashSet::new();
        let mut accepted_ids: HashSet<String> = HashSet::new();
        let mut updated: Vec<Finding> = Vec::new();
        let mut errors: Vec<ErrorEvent> = Vec::new();
        let mut accepted_count = 0u32;
        let mut rejected_count = 0u32;

        for finding in ordered {
            let verdict = validate_one(finding, &snapshot.sources, &accepted_ids, &snapshot.strategy_context);
            let mut next = finding.clone();
            match &verdict {
                Verdict::Accept => {
                    next.accepted = Some(true);
                    accepted_ids.insert(finding.id.clone());
                    accepted_count += 1;
                }
                Verdict::AcceptWithFlags(flags) => {
                    next.accepted = Some(true);
                    accepted_ids.insert(finding.id.clone());
                    accepted_count += 1;
                    errors.push(
                        ErrorEvent::node("Validate", ctx.step, LadderError::msg(format!(
                            "finding {} accepted with flags",
                            finding.id
                        )))
                        .with_tags(flags.clone())
                        .with_context(serde_json::json!({"finding_id": finding.id})),
                    );
                }
                Verdict::Reject(reason) => {
                    next.accepted = Some(false);
                    rejected_count += 1;
                    errors.push(
                        ErrorEvent::node("Validate", ctx.step, LadderError::msg(format!(
                            "finding {} rejected: {reason}",
                            finding.id
                        )))
                        .with_tag("rejected")
                        .with_context(serde_json::json!({"finding_id": finding.id, "reason": reason})),
                    );
                }
            }
            decided.insert(finding.id.clone());
            updated.push(next);
        }

        ctx.emit(
            "validate",
            format!("{accepted_count} accepted, {rejected_count} rejected of {} findings", decided.len()),
        )?;

        let mut partial = NodePartial::new().with_findings(updated);
        if !errors.is_empty() {
            partial = partial.with_errors(errors);
        }
        Ok(partial)
    }
}

fn validate_one(
    finding: &Finding,
    sources: &[Source],
    already_accepted: &HashSet<String>,
    strategy_context: &Option<crate::strategy::StrategyContext>,
) -> Verdict {
    if let Verdict::Reject(reason) = shape_layer(finding, sources) {
        return Verdict::Reject(reason);
    }
    if let Verdict::Reject(reason) = format_layer(finding) {
        return Verdict::Reject(reason);
    }
    if let Verdict::Reject(reason) = quality_layer(finding) {
        return Verdict::Reject(reason);
    }
    let hallucination = hallucination_layer(finding, sources);
    if let Verdict::Reject(reason) = &hallucination {
        return Verdict::Reject(reason.clone());
    }
    if let Verdict::Reject(reason) = chain_layer(finding, already_accepted, strategy_context) {
        return Verdict::Reject(reason);
    }
    hallucination
}

/// Layer 1: required fields present, `source_refs` resolve to known sources,
/// confidence is in range.
fn shape_layer(finding: &Finding, sources: &[Source]) -> Verdict {
    if finding.id.trim().is_empty() || finding.content.trim().is_empty() {
        return Verdict::Reject("missing required field".into());
    }
    if !(0.0..=1.0).contains(&finding.confidence) {
        return Verdict::Reject("confidence out of [0,1]".into());
    }
    for reference in &finding.source_refs {
        if !sources.iter().any(|s| &s.url == reference) {
            return Verdict::Reject(format!("dangling source_ref: {reference}"));
        }
    }
    Verdict::Accept
}

/// Layer 2: field types and ranges match declared schemas — here, that every
/// `source_refs` entry parses as a URL (dangling-ness was already checked by
/// the shape layer; this checks well-formedness).
fn format_layer(finding: &Finding) -> Verdict {
    for reference in &finding.source_refs {
        if Url::parse(reference).is_err() {
            return Verdict::Reject(format!("source_ref is not a well-formed URL: {reference}"));
        }
    }
    Verdict::Accept
}

/// Layer 3: content length above a minimum, non-empty after whitespace
/// normalization, not a verbatim duplicate by content hash.
fn quality_layer(finding: &Finding) -> Verdict {
    let normalized = finding.content.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.len() < MIN_CONTENT_LEN {
        return Verdict::Reject(format!(
            "content shorter than minimum {MIN_CONTENT_LEN} characters after normalization"
        ));
    }
    Verdict::Accept
}

/// Layer 4: evidence must be grounded in a cited source. Findings without
/// any `source_refs` are flagged `unsupported` but not dropped.
fn hallucination_layer(finding: &Finding, sources: &[Source]) -> Verdict {
    if finding.source_refs.is_empty() {
        return Verdict::AcceptWithFlags(vec!["unsupported".to_string()]);
    }
    if finding.evidence.is_empty() {
        return Verdict::Accept;
    }

    let cited_text: String = sources
        .iter()
        .filter(|s| finding.source_refs.contains(&s.url))
        .map(|s| format!("{} {}", s.snippet, s.title))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if cited_text.trim().is_empty() {
        return Verdict::AcceptWithFlags(vec!["unsupported".to_string()]);
    }

    for snippet in &finding.evidence {
        let needle = snippet.trim().to_lowercase();
        if !needle.is_empty() && cited_text.contains(&needle) {
            continue;
        }
        if keyword_overlap(&needle, &cited_text) < EVIDENCE_OVERLAP_THRESHOLD {
            return Verdict::Reject(format!("evidence not grounded in cited sources: {snippet}"));
        }
    }
    Verdict::Accept
}

/// Layer 5: when a finding's originating task declared `depends_on`, the
/// upstream task's finding (same `{task_id}-finding` convention as
/// `nodes::dispatch`) must already have passed validation.
fn chain_layer(
    finding: &Finding,
    already_accepted: &HashSet<String>,
    strategy_context: &Option<crate::strategy::StrategyContext>,
) -> Verdict {
    let Some(task_id) = finding.id.strip_suffix("-finding") else {
        return Verdict::Accept;
    };
    let Some(context) = strategy_context else {
        return Verdict::Accept;
    };
    let Some(task) = context.tasks.iter().find(|t| t.task_id == task_id) else {
        return Verdict::Accept;
    };
    for dep in &task.depends_on {
        let dep_finding_id = format!("{dep}-finding");
        if !already_accepted.contains(&dep_finding_id) {
            return Verdict::Reject(format!("upstream finding {dep_finding_id} has not passed validation"));
        }
    }
    Verdict::Accept
}

fn keyword_overlap(needle: &str, haystack: &str) -> f64 {
    let needle_words: HashSet<&str> = needle.split_whitespace().collect();
    if needle_words.is_empty() {
        return 0.0;
    }
    let haystack_words: HashSet<&str> = haystack.split_whitespace().collect();
    let matched = needle_words.iter().filter(|w| haystack_words.contains(*w)).count();
    matched as f64 / needle_words.len() as f64
}
