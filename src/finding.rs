//! The atomic unit of research output.

use serde::{Deserialize, Serialize};

/// A single claim produced by a tool call and attributed to one or more
/// sources. Findings are append-only: once recorded they are never mutated,
/// only superseded by later findings or excluded by the validator (never
/// deleted — the record of what was tried and rejected is itself useful).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub content: String,
    /// Short excerpts backing `content`, quoted from the originating source.
    pub evidence: Vec<String>,
    /// Canonical URLs of the sources this finding is grounded in. Must be a
    /// subset of the session's `sources` channel keys (invariant ii).
    pub source_refs: Vec<String>,
    /// Confidence in `[0.0, 1.0]` assigned at creation time by the tool
    /// dispatcher's ingestion step, before the quality scorer's own
    /// confidence pass.
    pub confidence: f64,
    /// Name of the tool capability that produced this finding.
    pub tool: String,
    /// The iteration in which this finding was produced.
    pub iteration: u32,
    /// Set by the validator; `None` until validation has run at least once.
    pub accepted: Option<bool>,
}

impl Finding {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        tool: impl Into<String>,
        iteration: u32,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            evidence: Vec::new(),
            source_refs: Vec::new(),
            confidence: 0.0,
            tool: tool.into(),
            iteration,
            accepted: None,
        }
    }

    #[must_use]
    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }

    #[must_use]
    pub fn with_source_refs(mut self, source_refs: Vec<String>) -> Self {
        self.source_refs = source_refs;
        self
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Stable de-duplication key (invariant: append-only, deduplicated by
    /// content hash). Two findings with identical tool + content are
    /// considered the same finding even if produced in different iterations.
    #[must_use]
    pub fn content_key(&self) -> String {
        format!("{}::{}", self.tool, self.content.trim())
    }
}
