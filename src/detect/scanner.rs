// The deterministic evasion detector.
//
// Eight stages, cheapest and most literal first. `scan` stops at the first
// stage that finds anything; `trace` runs all of them and reports what each
// one saw; `locate` collects every span any stage found, for redaction.
//
// Stages that remove separators (joined, normalized) can stitch innocent
// words together: "this hit" becomes "thishit". A hit that crosses a removed
// separator is only accepted when it starts at a word start and either ends
// at a word end or consists of pieces of at most two characters (the
// "f u c k" shape).

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use super::result::{merge_spans, DetectionResult, DetectionSource, Hit, StageReport};
use super::stage::Stage;
use crate::lexicon::patterns::spelling_matches;
use crate::lexicon::store::{CompiledTerm, LexiconStore};
use crate::normalize::mapped::{MappedText, Span};

/// Terms shorter than this are not searched in views that join words.
pub const MIN_JOINED_TERM_CHARS: usize = 4;

/// Distinct fragments needed before the fragment heuristic fires.
pub const FRAGMENT_THRESHOLD: usize = 2;

/// Longest piece allowed in a spaced-out spelling that ends mid-word.
const MAX_SPACED_PIECE: usize = 2;

/// The output of running one stage.
#[derive(Debug, Clone)]
pub struct StageRun {
    pub view: MappedText,
    pub hits: Vec<Hit>,
}

/// Model-free profanity detector over a shared lexicon store.
#[derive(Debug, Clone)]
pub struct EvasionDetector {
    store: Arc<LexiconStore>,
}

impl EvasionDetector {
    pub fn new(store: Arc<LexiconStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &LexiconStore {
        &self.store
    }

    pub fn shared_store(&self) -> Arc<LexiconStore> {
        Arc::clone(&self.store)
    }

    /// Short-circuiting verdict: the first stage with hits decides.
    pub fn scan(&self, text: &str) -> DetectionResult {
        if text.trim().is_empty() {
            return DetectionResult::clean(DetectionSource::Deterministic);
        }
        for stage in Stage::ALL {
            let run = self.run_stage(stage, text);
            if !run.hits.is_empty() {
                debug!(
                    stage = %stage,
                    hits = run.hits.len(),
                    "Deterministic detector flagged message"
                );
                return DetectionResult::from_hits(stage, &run.hits, DetectionSource::Deterministic);
            }
        }
        DetectionResult::clean(DetectionSource::Deterministic)
    }

    /// Run every stage, timing each. The verdict matches `scan`; the spans
    /// are the union over all stages.
    pub fn trace(&self, text: &str) -> (DetectionResult, Vec<StageReport>) {
        let mut reports = Vec::with_capacity(Stage::ALL.len());
        let mut result = DetectionResult::clean(DetectionSource::Deterministic);

        for stage in Stage::ALL {
            let started = Instant::now();
            let run = self.run_stage(stage, text);
            let elapsed_us = started.elapsed().as_micros() as u64;

            if !result.is_flagged && !run.hits.is_empty() {
                result = DetectionResult::from_hits(stage, &run.hits, DetectionSource::Deterministic);
            } else if !run.hits.is_empty() {
                result.spans = merge_spans(
                    result
                        .spans
                        .iter()
                        .copied()
                        .chain(run.hits.iter().map(|h| h.span)),
                );
            }

            reports.push(StageReport {
                stage,
                view: run.view.into_string(),
                hits: run.hits,
                elapsed_us,
            });
        }

        (result, reports)
    }

    /// Every span any stage can find, merged.
    pub fn locate(&self, text: &str) -> Vec<Span> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        merge_spans(
            Stage::ALL
                .iter()
                .flat_map(|stage| self.run_stage(*stage, text).hits)
                .map(|h| h.span),
        )
    }

    /// Run a single stage over `text`.
    pub fn run_stage(&self, stage: Stage, text: &str) -> StageRun {
        let lower = MappedText::identity(text).fold_case();
        let original_len = text.chars().count();

        let (view, hits) = match stage {
            Stage::Direct => {
                let hits = self.substring_hits(&lower, |t| Some(t.lower.as_str()));
                (lower.clone(), hits)
            }
            Stage::WordBoundary => {
                let hits = self.boundary_hits(&lower, |t| &t.boundary);
                (lower.clone(), hits)
            }
            Stage::Joined => {
                let view = self.store.normalizer().light(text);
                let hits = self.joined_hits(&view, original_len, |t| t.light.as_str());
                (view, hits)
            }
            Stage::Substituted => {
                let view = self.store.stage_substitutions().apply(&lower);
                let mut hits = self.substring_hits(&view, |t| Some(t.substituted.as_str()));
                hits.extend(self.boundary_hits(&view, |t| &t.substituted_boundary));
                (view, hits)
            }
            Stage::Normalized => {
                let view = self.store.normalizer().heavy(text);
                let hits = self.joined_hits(&view, original_len, |t| t.heavy.as_str());
                (view, hits)
            }
            Stage::Pattern => {
                let hits = self.pattern_hits(&lower);
                (lower.clone(), hits)
            }
            Stage::Unaccented => {
                let view = lower.strip_diacritics();
                let hits = self.substring_hits(&view, |t| {
                    (t.unaccented.chars().count() >= MIN_JOINED_TERM_CHARS)
                        .then_some(t.unaccented.as_str())
                });
                (view, hits)
            }
            Stage::Fragments => {
                let view = self.store.normalizer().heavy(text);
                let hits = self.fragment_hits(&view);
                (view, hits)
            }
        };

        let hits = self.apply_exceptions(&lower, hits);
        StageRun { view, hits }
    }

    /// Substring hits for non-standalone terms. `form` picks the comparison
    /// form, or None to skip a term.
    fn substring_hits<'a>(
        &'a self,
        view: &MappedText,
        form: impl Fn(&'a CompiledTerm) -> Option<&'a str>,
    ) -> Vec<Hit> {
        let mut hits = Vec::new();
        for term in self.store.terms().iter().filter(|t| !t.is_standalone()) {
            let Some(needle) = form(term) else { continue };
            for span in view.find_all(needle) {
                hits.push(lexicon_hit(term, span));
            }
        }
        hits
    }

    /// Word-boundary hits for every term.
    fn boundary_hits<'a>(
        &'a self,
        view: &MappedText,
        regex: impl Fn(&'a CompiledTerm) -> &'a regex::Regex,
    ) -> Vec<Hit> {
        let mut hits = Vec::new();
        for term in self.store.terms() {
            for m in regex(term).find_iter(view.as_str()) {
                if let Some(span) = view.map_bytes(m.start(), m.end()) {
                    hits.push(lexicon_hit(term, span));
                }
            }
        }
        hits
    }

    /// Substring hits in a view that removed separators. Only terms of at
    /// least MIN_JOINED_TERM_CHARS, and only plausible joins.
    fn joined_hits<'a>(
        &'a self,
        view: &MappedText,
        original_len: usize,
        form: impl Fn(&'a CompiledTerm) -> &'a str,
    ) -> Vec<Hit> {
        let contributing = view.contributing(original_len);
        let mut hits = Vec::new();
        for term in self.store.terms().iter().filter(|t| !t.is_standalone()) {
            let needle = form(term);
            if needle.chars().count() < MIN_JOINED_TERM_CHARS {
                continue;
            }
            for (start, end) in view.find_char_ranges(needle) {
                let Some(span) = view.map_chars(start, end) else { continue };
                if plausible_join(&contributing, span) {
                    hits.push(lexicon_hit(term, span));
                }
            }
        }
        hits
    }

    /// Every match of every pattern family.
    fn pattern_hits(&self, lower: &MappedText) -> Vec<Hit> {
        let mut hits = Vec::new();
        for pattern in self.store.patterns() {
            for m in spelling_matches(&pattern.regex, lower.as_str()) {
                if let Some(span) = lower.map_bytes(m.start(), m.end()) {
                    hits.push(Hit {
                        term: pattern.family.clone(),
                        language: None,
                        span,
                    });
                }
            }
        }
        hits
    }

    /// Fragment heuristic: hits only when enough distinct fragments appear.
    fn fragment_hits(&self, view: &MappedText) -> Vec<Hit> {
        let mut hits = Vec::new();
        let mut distinct = 0;
        for fragment in self.store.fragments() {
            let spans = view.find_all(fragment);
            if spans.is_empty() {
                continue;
            }
            distinct += 1;
            hits.extend(spans.into_iter().map(|span| Hit {
                term: fragment.clone(),
                language: None,
                span,
            }));
        }
        if distinct >= FRAGMENT_THRESHOLD {
            hits
        } else {
            Vec::new()
        }
    }

    /// Drop hits that fall inside an allow-listed phrase for their term.
    /// Only ever removes hits.
    fn apply_exceptions(&self, lower: &MappedText, hits: Vec<Hit>) -> Vec<Hit> {
        hits.into_iter()
            .filter(|hit| {
                let phrases = self.store.exceptions_for(&hit.term);
                let excused = phrases
                    .iter()
                    .flat_map(|p| lower.find_all(p))
                    .any(|allowed| allowed.covers(&hit.span));
                if excused {
                    debug!(term = hit.term, "Match suppressed by context exception");
                }
                !excused
            })
            .collect()
    }
}

fn lexicon_hit(term: &CompiledTerm, span: Span) -> Hit {
    Hit {
        term: term.term().to_string(),
        language: Some(term.language().to_string()),
        span,
    }
}

/// Whether a hit in a separator-free view is a real spelling rather than
/// two innocent words glued together. `contributing[i]` says whether
/// original char `i` survived into the view.
pub fn plausible_join(contributing: &[bool], span: Span) -> bool {
    let inside = &contributing[span.start.min(contributing.len())..span.end.min(contributing.len())];
    if inside.iter().all(|c| *c) {
        return true;
    }

    let starts_at_word = span.start == 0 || !contributing[span.start - 1];
    if !starts_at_word {
        return false;
    }
    let ends_at_word = span.end >= contributing.len() || !contributing[span.end];
    if ends_at_word {
        return true;
    }

    inside
        .split(|c| !*c)
        .filter(|piece| !piece.is_empty())
        .all(|piece| piece.len() <= MAX_SPACED_PIECE)
}
