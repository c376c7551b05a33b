// Censoring engine: turns spans into asterisks.
//
// Every masked span becomes a run of asterisks with exactly as many
// characters as it had, so the redacted message keeps its length, its
// punctuation and everything around the offending words.

use crate::detect::result::merge_spans;
use crate::normalize::mapped::Span;

pub const MASK_CHAR: char = '*';

/// Replace every span (char indices into `text`) with asterisks.
/// Spans past the end of the text are clipped; overlapping spans are fine.
pub fn redact(text: &str, spans: &[Span]) -> String {
    if spans.is_empty() {
        return text.to_string();
    }
    let spans = merge_spans(spans.iter().copied());
    let mut out = String::with_capacity(text.len());
    let mut next = spans.iter().peekable();

    for (i, c) in text.chars().enumerate() {
        while next.peek().is_some_and(|s| s.end <= i) {
            next.next();
        }
        match next.peek() {
            Some(span) if span.start <= i && i < span.end => out.push(MASK_CHAR),
            _ => out.push(c),
        }
    }
    out
}

/// Mask the whole message, one asterisk per character.
pub fn mask_all(text: &str) -> String {
    std::iter::repeat(MASK_CHAR)
        .take(text.chars().count())
        .collect()
}

/// True if the text is nothing but mask characters and whitespace.
pub fn is_fully_masked(text: &str) -> bool {
    text.chars().all(|c| c == MASK_CHAR || c.is_whitespace())
}
