// Detection results and per-stage diagnostics.

use serde::Serialize;

use super::stage::Stage;
use crate::normalize::mapped::Span;

/// Where a detection verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    Deterministic,
    Model,
    Fallback,
}

/// A single stage hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hit {
    /// The lexicon term, pattern family or fragment that matched.
    pub term: String,
    /// Language of the lexicon entry, when the hit came from one.
    pub language: Option<String>,
    /// Matched characters in the original message.
    pub span: Span,
}

/// Verdict of a detector, plus everything needed to act on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub is_flagged: bool,
    pub matched_terms: Vec<String>,
    pub source: DetectionSource,
    /// First stage that matched.
    pub stage: Option<Stage>,
    /// Language of the first matched lexicon entry.
    pub language: Option<String>,
    /// Spans in the original message, merged and sorted.
    pub spans: Vec<Span>,
}

impl DetectionResult {
    pub fn clean(source: DetectionSource) -> Self {
        Self {
            is_flagged: false,
            matched_terms: Vec::new(),
            source,
            stage: None,
            language: None,
            spans: Vec::new(),
        }
    }

    /// A flagged result built from one stage's hits. Empty hits give a clean
    /// result.
    pub fn from_hits(stage: Stage, hits: &[Hit], source: DetectionSource) -> Self {
        if hits.is_empty() {
            return Self::clean(source);
        }
        let mut matched_terms: Vec<String> = Vec::new();
        for hit in hits {
            if !matched_terms.contains(&hit.term) {
                matched_terms.push(hit.term.clone());
            }
        }
        Self {
            is_flagged: true,
            matched_terms,
            source,
            stage: Some(stage),
            language: hits.iter().find_map(|h| h.language.clone()),
            spans: merge_spans(hits.iter().map(|h| h.span)),
        }
    }

    /// Logical OR of two results. Provenance follows the first flagged side.
    pub fn merge(self, other: DetectionResult) -> DetectionResult {
        let (primary, secondary) = if !self.is_flagged && other.is_flagged {
            (other, self)
        } else {
            (self, other)
        };
        let mut matched_terms = primary.matched_terms;
        for term in secondary.matched_terms {
            if !matched_terms.contains(&term) {
                matched_terms.push(term);
            }
        }
        DetectionResult {
            is_flagged: primary.is_flagged || secondary.is_flagged,
            matched_terms,
            source: primary.source,
            stage: primary.stage.or(secondary.stage),
            language: primary.language.or(secondary.language),
            spans: merge_spans(primary.spans.into_iter().chain(secondary.spans)),
        }
    }
}

/// Sort spans and merge the ones that overlap or touch.
pub fn merge_spans(spans: impl IntoIterator<Item = Span>) -> Vec<Span> {
    let mut spans: Vec<Span> = spans.into_iter().filter(|s| !s.is_empty()).collect();
    spans.sort();
    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}

/// What one stage saw and found, for verbose diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    /// The derived text the stage searched.
    pub view: String,
    pub hits: Vec<Hit>,
    pub elapsed_us: u64,
}

impl StageReport {
    pub fn fired(&self) -> bool {
        !self.hits.is_empty()
    }
}
