// Offset-mapped text.
//
// A MappedText is a derived view of an original message (lowercased,
// collapsed, substituted, stripped...). Alongside the derived characters it
// stores, per derived character, the range of original characters that
// produced it. Searching the view and mapping the hit back gives an exact
// span in the original message.

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// A half-open range of `char` indices into the original message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True if `other` lies entirely inside this span.
    pub fn covers(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    fn union(&self, other: &Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Derived text plus the original-character range behind each derived char.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedText {
    text: String,
    origins: Vec<Span>,
}

impl MappedText {
    /// The identity view: every character maps to itself.
    pub fn identity(input: &str) -> Self {
        let mut mapped = Self::with_capacity(input.len());
        for (i, c) in input.chars().enumerate() {
            mapped.push(c, Span::new(i, i + 1));
        }
        mapped
    }

    fn with_capacity(bytes: usize) -> Self {
        Self {
            text: String::with_capacity(bytes),
            origins: Vec::with_capacity(bytes),
        }
    }

    pub(crate) fn push(&mut self, c: char, origin: Span) {
        self.text.push(c);
        self.origins.push(origin);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    pub fn char_len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    pub(crate) fn chars_with_origins(&self) -> impl Iterator<Item = (char, Span)> + '_ {
        self.text.chars().zip(self.origins.iter().copied())
    }

    /// Map a derived char range `[start, end)` back to an original span.
    pub fn map_chars(&self, start: usize, end: usize) -> Option<Span> {
        if end <= start || end > self.origins.len() {
            return None;
        }
        let first = self.origins[start];
        let last = self.origins[end - 1];
        Some(first.union(&last))
    }

    /// Map a derived byte range (as returned by `str::find` or a regex match)
    /// back to an original span.
    pub fn map_bytes(&self, start: usize, end: usize) -> Option<Span> {
        let (cs, ce) = self.char_range(start, end)?;
        self.map_chars(cs, ce)
    }

    /// Convert a byte range of the derived text into a char range.
    pub fn char_range(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        if start > end
            || end > self.text.len()
            || !self.text.is_char_boundary(start)
            || !self.text.is_char_boundary(end)
        {
            return None;
        }
        let cs = self.text[..start].chars().count();
        let ce = cs + self.text[start..end].chars().count();
        Some((cs, ce))
    }

    /// Every (non-overlapping) occurrence of `needle`, as derived char ranges.
    pub fn find_char_ranges(&self, needle: &str) -> Vec<(usize, usize)> {
        if needle.is_empty() {
            return Vec::new();
        }
        self.text
            .match_indices(needle)
            .filter_map(|(pos, m)| self.char_range(pos, pos + m.len()))
            .collect()
    }

    /// Every occurrence of `needle`, mapped to original spans.
    pub fn find_all(&self, needle: &str) -> Vec<Span> {
        self.find_char_ranges(needle)
            .into_iter()
            .filter_map(|(s, e)| self.map_chars(s, e))
            .collect()
    }

    /// For each of the `original_len` original chars, whether it contributed
    /// at least one character to this view.
    pub fn contributing(&self, original_len: usize) -> Vec<bool> {
        let mut out = vec![false; original_len];
        for origin in &self.origins {
            for slot in out.iter_mut().take(origin.end).skip(origin.start) {
                *slot = true;
            }
        }
        out
    }

    /// Lowercase every character. Characters whose lowercase form expands to
    /// several chars keep the same origin for each of them.
    pub fn fold_case(&self) -> MappedText {
        let mut out = Self::with_capacity(self.text.len());
        for (c, origin) in self.chars_with_origins() {
            for lc in c.to_lowercase() {
                out.push(lc, origin);
            }
        }
        out
    }

    /// Collapse every run of two or more identical characters into one.
    /// The surviving character's origin covers the whole run.
    pub fn collapse_repeats(&self) -> MappedText {
        let mut out = Self::with_capacity(self.text.len());
        let mut last: Option<char> = None;
        for (c, origin) in self.chars_with_origins() {
            if last == Some(c) {
                if let Some(prev) = out.origins.last_mut() {
                    *prev = prev.union(&origin);
                }
                continue;
            }
            out.push(c, origin);
            last = Some(c);
        }
        out
    }

    /// Keep only the characters matching `keep`.
    pub fn retain(&self, keep: impl Fn(char) -> bool) -> MappedText {
        let mut out = Self::with_capacity(self.text.len());
        for (c, origin) in self.chars_with_origins() {
            if keep(c) {
                out.push(c, origin);
            }
        }
        out
    }

    /// Canonical decomposition with combining marks removed.
    pub fn strip_diacritics(&self) -> MappedText {
        let mut out = Self::with_capacity(self.text.len());
        for (c, origin) in self.chars_with_origins() {
            push_without_marks(&mut out, c, origin);
        }
        out
    }
}

pub(crate) fn push_without_marks(out: &mut MappedText, c: char, origin: Span) {
    if c.is_ascii() {
        out.push(c, origin);
        return;
    }
    for d in std::iter::once(c).nfd() {
        if !is_combining_mark(d) {
            out.push(d, origin);
        }
    }
}

/// Remove diacritics from a plain string.
pub fn strip_diacritics(text: &str) -> String {
    MappedText::identity(text).strip_diacritics().into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_maps_each_char_to_itself() {
        let m = MappedText::identity("héllo");
        assert_eq!(m.char_len(), 5);
        assert_eq!(m.map_chars(1, 2), Some(Span::new(1, 2)));
    }

    #[test]
    fn collapse_extends_origin_over_run() {
        let m = MappedText::identity("fuuuck").collapse_repeats();
        assert_eq!(m.as_str(), "fuck");
        // "u" came from chars 1..4
        assert_eq!(m.map_chars(1, 2), Some(Span::new(1, 4)));
        assert_eq!(m.map_chars(0, 4), Some(Span::new(0, 6)));
    }

    #[test]
    fn retain_keeps_offsets_of_survivors() {
        let m = MappedText::identity("f u c k").retain(|c| !c.is_whitespace());
        assert_eq!(m.as_str(), "fuck");
        assert_eq!(m.find_all("fuck"), vec![Span::new(0, 7)]);
    }

    #[test]
    fn map_bytes_handles_multibyte_text() {
        let m = MappedText::identity("đụ du");
        let pos = m.as_str().find("du").unwrap();
        assert_eq!(m.map_bytes(pos, pos + 2), Some(Span::new(3, 5)));
    }

    #[test]
    fn strip_diacritics_removes_marks() {
        assert_eq!(strip_diacritics("cabrón lịch"), "cabron lich");
        // đ has no decomposition and is left alone here
        assert_eq!(strip_diacritics("đ"), "đ");
    }

    #[test]
    fn contributing_marks_dropped_chars() {
        let m = MappedText::identity("a b").retain(|c| c != ' ');
        assert_eq!(m.contributing(3), vec![true, false, true]);
    }

    #[test]
    fn find_all_on_empty_needle_is_empty() {
        assert!(MappedText::identity("abc").find_all("").is_empty());
    }
}
