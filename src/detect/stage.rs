// Detector stages, in the order they run.

use std::fmt;

use serde::Serialize;

/// One detection stage. Earlier stages are cheaper and more literal; later
/// stages see through more obfuscation at the cost of precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Raw lowercase substring search.
    Direct,
    /// `\bterm\b` over lowercase text, subject to context exceptions.
    WordBoundary,
    /// Substring search over lightly normalized text (whitespace removed).
    Joined,
    /// Substring and boundary search after the lighter substitution map.
    Substituted,
    /// Substring search over heavily normalized text.
    Normalized,
    /// Evasion-pattern families over lowercase text.
    Pattern,
    /// Substring search over lowercase text with diacritics removed.
    Unaccented,
    /// Two or more distinct suspicious fragments in normalized text.
    Fragments,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Direct,
        Stage::WordBoundary,
        Stage::Joined,
        Stage::Substituted,
        Stage::Normalized,
        Stage::Pattern,
        Stage::Unaccented,
        Stage::Fragments,
    ];

    /// 1-based position in the pipeline.
    pub fn number(self) -> usize {
        Stage::ALL.iter().position(|s| *s == self).unwrap_or(0) + 1
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Direct => "direct substring",
            Stage::WordBoundary => "word boundary",
            Stage::Joined => "whitespace-joined",
            Stage::Substituted => "character substitution",
            Stage::Normalized => "full normalization",
            Stage::Pattern => "evasion pattern",
            Stage::Unaccented => "diacritics stripped",
            Stage::Fragments => "fragment heuristic",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.number(), self.label())
    }
}
