// Moderation prompt construction.
//
// The prompt spells out every lexicon term (grouped by language), the
// evasion techniques to look through and the exact JSON shape we expect
// back. The user's message is embedded as a JSON string literal so quotes
// and newlines inside it cannot break out of the instructions.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::lexicon::store::LexiconStore;

pub const SYSTEM_PROMPT: &str = "You are a strict multilingual content moderator. \
You answer with a single JSON object and nothing else.";

const EVASION_TECHNIQUES: &[&str] = &[
    "letters replaced by digits or symbols (f@ck, sh1t, $hit, b!tch)",
    "letters separated by spaces, dots or other punctuation (f u c k, f.u.c.k)",
    "repeated letters (fuuuck, shiiit)",
    "look-alike letters from other alphabets (Cyrillic or Greek homoglyphs)",
    "missing or stripped diacritics (dit, lon, cabron)",
    "phonetic respellings (phuck, fuk, biatch)",
    "abbreviations and acronyms (dcm, vcl, clgt, wtf)",
];

pub struct PromptBuilder {
    store: Arc<LexiconStore>,
}

impl PromptBuilder {
    pub fn new(store: Arc<LexiconStore>) -> Self {
        Self { store }
    }

    /// Build the user prompt for one message.
    pub fn build(&self, text: &str) -> String {
        let mut prompt = String::with_capacity(2048 + text.len());

        prompt.push_str(
            "Moderate the message below. Detect profanity, slurs and sexual insults \
             in any language, including deliberately disguised spellings.\n\n",
        );

        prompt.push_str("Known terms by language:\n");
        for (language, terms) in self.store.terms_by_language() {
            let _ = writeln!(prompt, "- {language}: {}", terms.join(", "));
        }

        let families: Vec<&str> = self
            .store
            .patterns()
            .iter()
            .map(|p| p.family.as_str())
            .collect();
        if !families.is_empty() {
            let _ = writeln!(prompt, "Word families to watch for: {}", families.join(", "));
        }

        prompt.push_str("\nEvasion techniques to see through:\n");
        for technique in EVASION_TECHNIQUES {
            let _ = writeln!(prompt, "- {technique}");
        }

        prompt.push_str(
            "\nRules:\n\
             - Replace every offending word with asterisks, one asterisk per character.\n\
             - Keep every other character exactly as it is: spacing, punctuation, casing.\n\
             - Do not rephrase, translate or correct the message.\n\
             - Innocent words that merely contain a term (\"du lịch\", \"Scunthorpe\") stay untouched.\n\
             \nReply with exactly this JSON object:\n\
             {\n  \"original_message\": <the message, copied exactly>,\n  \
             \"moderated_message\": <the message with offending words masked>,\n  \
             \"contains_profanity\": <true|false>,\n  \
             \"was_modified\": <true|false>,\n  \
             \"language\": <ISO 639-1 code or null>,\n  \
             \"detected_terms\": [<offending words as they appear>]\n}\n\n",
        );

        // A JSON string literal escapes quotes, backslashes and control chars.
        let quoted = serde_json::to_string(text).unwrap_or_else(|_| format!("{text:?}"));
        let _ = write!(prompt, "Message: {quoted}");
        prompt
    }
}
