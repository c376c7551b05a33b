// The Normalizer: canonical text for profanity matching.
//
// heavy: lowercase -> collapse repeats -> substitution table -> strip
//        everything that is not alphanumeric
// light: lowercase -> substitution table -> strip whitespace
//
// The heavy variant defeats "fuuuck", "f.u.c.k" and "ƒüçk"-style spellings
// but destroys word boundaries. The light variant keeps punctuation and
// repeated letters for checks where boundaries still matter.

use super::mapped::MappedText;
use super::substitution::SubstitutionTable;

/// Pure, total text normalizer. Never fails; empty in, empty out.
#[derive(Debug, Clone)]
pub struct Normalizer {
    table: SubstitutionTable,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(SubstitutionTable::heavy())
    }
}

impl Normalizer {
    pub fn new(table: SubstitutionTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &SubstitutionTable {
        &self.table
    }

    /// Fully normalized form of `text`.
    pub fn normalize(&self, text: &str) -> String {
        self.heavy(text).into_string()
    }

    /// Lightly normalized form of `text`.
    pub fn normalize_light(&self, text: &str) -> String {
        self.light(text).into_string()
    }

    /// Heavy normalization, keeping the offset map.
    pub fn heavy(&self, text: &str) -> MappedText {
        let folded = MappedText::identity(text).fold_case();
        let collapsed = folded.collapse_repeats();
        self.table.apply(&collapsed).retain(char::is_alphanumeric)
    }

    /// Light normalization, keeping the offset map.
    pub fn light(&self, text: &str) -> MappedText {
        let folded = MappedText::identity(text).fold_case();
        self.table.apply(&folded).retain(|c| !c.is_whitespace())
    }
}
