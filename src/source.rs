//! Sources: the de-duplicated evidence catalog findings are grounded in.

use serde::{Deserialize, Serialize};
use url::Url;

/// A single evidence source, keyed by its canonical URL (invariant iv).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub first_seen_iteration: u32,
    /// Heuristic credibility in `[0.0, 1.0]`, used as an input to the
    /// quality scorer's grounding metric.
    pub credibility: f64,
}

impl Source {
    pub fn new(url: impl Into<String>, title: impl Into<String>, iteration: u32) -> Self {
        Self {
            url: canonicalize_url(&url.into()),
            title: title.into(),
            snippet: String::new(),
            first_seen_iteration: iteration,
            credibility: 0.5,
        }
    }

    #[must_use]
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    #[must_use]
    pub fn with_credibility(mut self, credibility: f64) -> Self {
        self.credibility = credibility.clamp(0.0, 1.0);
        self
    }
}

/// Normalizes a URL for use as a stable de-duplication key: lower-cases the
/// scheme and host, strips a default port, drops a trailing slash-only path,
/// and removes known tracking query parameters. Falls back to a trimmed
/// verbatim string when the input does not parse as a URL at all, so
/// malformed tool output never panics the dispatcher.
#[must_use]
pub fn canonicalize_url(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw.trim()) else {
        return raw.trim().to_string();
    };

    parsed.set_fragment(None);

    let filtered: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if filtered.is_empty() {
        parsed.set_query(None);
    } else {
        let query = filtered
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        parsed.set_query(Some(&query));
    }

    let mut out = parsed.to_string();
    if out.ends_with('/') && parsed.path() == "/" {
        out.pop();
    }
    out.to_lowercase()
}

fn is_tracking_param(key: &str) -> bool {
    matches!(
        key,
        "utm_source" | "utm_medium" | "utm_campaign" | "utm_term" | "utm_content" | "ref" | "fbclid" | "gclid"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tracking_params_and_fragment() {
        let a = canonicalize_url("https://Example.com/Article?utm_source=x&id=7#section-2");
        let b = canonicalize_url("https://example.com/article?id=7");
        assert_eq!(a, b);
    }

    #[test]
    fn non_url_input_is_trimmed_not_panicked() {
        assert_eq!(canonicalize_url("  not a url  "), "not a url");
    }
}
