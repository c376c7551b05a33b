// The compiled, immutable lexicon store.
//
// Every term is precomputed once in each form a detector stage compares
// against (lowercase, lightly normalized, heavily normalized, substituted,
// unaccented) and its word-boundary regexes are compiled up front, so a
// scan is pure lookups over shared read-only data.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use super::data::LexiconData;
use super::patterns::compile_template;
use super::terms;
use crate::normalize::mapped::strip_diacritics;
use crate::normalize::normalizer::Normalizer;
use crate::normalize::substitution::SubstitutionTable;

/// How a lexicon term is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Anywhere, including inside longer words.
    Substring,
    /// Only as a whole word.
    Standalone,
}

/// A literal profane term in one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LexiconEntry {
    pub language: String,
    pub term: String,
    pub mode: MatchMode,
}

/// A lexicon entry with every precomputed comparison form.
#[derive(Debug, Clone)]
pub struct CompiledTerm {
    pub entry: LexiconEntry,
    /// Lowercased term.
    pub lower: String,
    /// Light normalization (substitutions, no whitespace).
    pub light: String,
    /// Heavy normalization.
    pub heavy: String,
    /// Lowercased term under the detector's lighter substitution map.
    pub substituted: String,
    /// Lowercased term with diacritics removed.
    pub unaccented: String,
    /// `\bterm\b` over lowercased text.
    pub boundary: Regex,
    /// `\bterm\b` over substituted text.
    pub substituted_boundary: Regex,
}

impl CompiledTerm {
    pub fn term(&self) -> &str {
        &self.entry.term
    }

    pub fn language(&self) -> &str {
        &self.entry.language
    }

    pub fn is_standalone(&self) -> bool {
        self.entry.mode == MatchMode::Standalone
    }
}

/// A compiled evasion-pattern family.
#[derive(Debug, Clone)]
pub struct EvasionPattern {
    pub family: String,
    pub template: String,
    pub regex: Regex,
}

/// Process-wide, read-only profanity data.
#[derive(Debug)]
pub struct LexiconStore {
    terms: Vec<CompiledTerm>,
    patterns: Vec<EvasionPattern>,
    fragments: Vec<String>,
    exceptions: BTreeMap<String, Vec<String>>,
    normalizer: Normalizer,
    stage_substitutions: SubstitutionTable,
}

fn boundary_regex(term: &str) -> Result<Regex> {
    Regex::new(&format!(r"\b{}\b", regex::escape(term)))
        .with_context(|| format!("Failed to compile boundary regex for {term:?}"))
}

impl LexiconStore {
    /// Compile lexicon data into a store.
    pub fn from_data(data: LexiconData) -> Result<Self> {
        let normalizer = Normalizer::default();
        let stage_substitutions = SubstitutionTable::light();

        let mut terms = Vec::with_capacity(data.term_count());
        for (language, lists) in &data.languages {
            let modes = lists
                .terms
                .iter()
                .map(|t| (t, MatchMode::Substring))
                .chain(lists.standalone.iter().map(|t| (t, MatchMode::Standalone)));

            for (term, mode) in modes {
                let lower = term.trim().to_lowercase();
                if lower.is_empty() {
                    continue;
                }
                let substituted = stage_substitutions.apply_str(&lower);
                terms.push(CompiledTerm {
                    entry: LexiconEntry {
                        language: language.clone(),
                        term: term.trim().to_string(),
                        mode,
                    },
                    light: normalizer.normalize_light(&lower),
                    heavy: normalizer.normalize(&lower),
                    unaccented: strip_diacritics(&lower),
                    boundary: boundary_regex(&lower)?,
                    substituted_boundary: boundary_regex(&substituted)?,
                    substituted,
                    lower,
                });
            }
        }

        let patterns = data
            .patterns
            .iter()
            .map(|spec| {
                Ok(EvasionPattern {
                    family: spec.family.clone(),
                    template: spec.template.clone(),
                    regex: compile_template(&spec.template).with_context(|| {
                        format!("Invalid template for pattern family {}", spec.family)
                    })?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let fragments = data
            .fragments
            .iter()
            .map(|f| normalizer.normalize(f))
            .filter(|f| !f.is_empty())
            .collect();

        let exceptions = data
            .exceptions
            .iter()
            .map(|(term, phrases)| {
                (
                    term.to_lowercase(),
                    phrases.iter().map(|p| p.to_lowercase()).collect(),
                )
            })
            .collect();

        debug!(
            terms = terms.len(),
            patterns = patterns.len(),
            "Compiled lexicon store"
        );

        Ok(Self {
            terms,
            patterns,
            fragments,
            exceptions,
            normalizer,
            stage_substitutions,
        })
    }

    /// The built-in lexicon, compiled fresh.
    pub fn builtin() -> Result<Self> {
        Self::from_data(terms::builtin())
    }

    /// Load a lexicon file (JSON with the `LexiconData` shape).
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = LexiconData::from_file(path)?;
        let store = Self::from_data(data)?;
        info!(
            path = %path.display(),
            terms = store.terms.len(),
            "Loaded lexicon file"
        );
        Ok(store)
    }

    /// The process-wide built-in store. Compiled on first use, shared after.
    pub fn shared() -> Result<Arc<Self>> {
        static SHARED: OnceLock<Arc<LexiconStore>> = OnceLock::new();
        if let Some(store) = SHARED.get() {
            return Ok(Arc::clone(store));
        }
        let store = Arc::new(Self::builtin()?);
        Ok(Arc::clone(SHARED.get_or_init(|| store)))
    }

    /// Pick the store for a configuration: an explicit file if given,
    /// otherwise the shared built-in store.
    pub fn load(path: Option<&Path>) -> Result<Arc<Self>> {
        match path {
            Some(path) => Ok(Arc::new(Self::from_file(path)?)),
            None => Self::shared(),
        }
    }

    pub fn terms(&self) -> &[CompiledTerm] {
        &self.terms
    }

    pub fn patterns(&self) -> &[EvasionPattern] {
        &self.patterns
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// The lighter map used by the detector's substitution stage.
    pub fn stage_substitutions(&self) -> &SubstitutionTable {
        &self.stage_substitutions
    }

    /// Phrases in which `term` (or pattern family) is innocent.
    pub fn exceptions_for(&self, term: &str) -> &[String] {
        self.exceptions
            .get(&term.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn exception_count(&self) -> usize {
        self.exceptions.values().map(Vec::len).sum()
    }

    /// Terms grouped by language tag, in the order they were configured.
    pub fn terms_by_language(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for t in &self.terms {
            grouped.entry(t.language()).or_default().push(t.term());
        }
        grouped
    }

    /// Language tag of the first entry whose term equals `term`.
    pub fn language_of(&self, term: &str) -> Option<&str> {
        let lower = term.to_lowercase();
        self.terms
            .iter()
            .find(|t| t.lower == lower)
            .map(CompiledTerm::language)
    }
}
