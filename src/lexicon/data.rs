// Serializable lexicon configuration.
//
// This is the on-disk shape of a lexicon file and the shape the built-in
// data is expressed in. It is plain data; LexiconStore compiles it.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Terms for one language.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageTerms {
    /// Matched anywhere, including inside longer words.
    #[serde(default)]
    pub terms: Vec<String>,
    /// Short or ambiguous words, matched only at word boundaries.
    #[serde(default)]
    pub standalone: Vec<String>,
}

/// One evasion-pattern family, written as a slot template
/// (see `lexicon::patterns`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub family: String,
    pub template: String,
}

/// The full lexicon configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexiconData {
    /// Keyed by language tag ("en", "vi", ...).
    pub languages: BTreeMap<String, LanguageTerms>,
    #[serde(default)]
    pub patterns: Vec<PatternSpec>,
    /// Short prefixes of known terms for the fragment heuristic.
    #[serde(default)]
    pub fragments: Vec<String>,
    /// Standalone term -> phrases in which that word is innocent.
    #[serde(default)]
    pub exceptions: BTreeMap<String, Vec<String>>,
}

impl LexiconData {
    /// Read a lexicon file (JSON).
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lexicon file {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse lexicon file {}", path.display()))
    }

    pub fn term_count(&self) -> usize {
        self.languages
            .values()
            .map(|l| l.terms.len() + l.standalone.len())
            .sum()
    }
}
