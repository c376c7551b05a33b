// Confusable-character substitution tables.
//
// A table maps a confusable character or short sequence to its canonical
// Latin letters. Rules are applied longest-key-first so that digraphs like
// "ph" or "vv" win over any single-character rule that could eat half of
// them.

use super::mapped::{push_without_marks, MappedText, Span};

/// Multi-character leetspeak sequences.
const DIGRAPHS: &[(&str, &str)] = &[
    ("ph", "f"),
    ("vv", "w"),
    ("|_|", "u"),
    ("(_)", "u"),
    ("\\/", "v"),
    ("|<", "k"),
    ("|3", "b"),
];

/// Single-character leetspeak and symbol substitutions.
const LEET: &[(&str, &str)] = &[
    ("@", "a"),
    ("4", "a"),
    ("8", "b"),
    ("(", "c"),
    ("3", "e"),
    ("€", "e"),
    ("6", "g"),
    ("9", "g"),
    ("#", "h"),
    ("1", "i"),
    ("!", "i"),
    ("|", "i"),
    ("0", "o"),
    ("$", "s"),
    ("5", "s"),
    ("7", "t"),
    ("+", "t"),
    ("2", "z"),
];

/// Keys that double as ordinary punctuation. They only stand for a letter
/// between two alphanumerics ("sh!t"), never at the edge of a word ("shit!").
const INFIX_ONLY: &[char] = &['!', '|'];

/// Cyrillic and Greek homoglyphs of Latin letters (lowercase forms), plus
/// letters that canonical decomposition leaves alone.
const HOMOGLYPHS: &[(&str, &str)] = &[
    ("а", "a"),
    ("в", "b"),
    ("е", "e"),
    ("ё", "e"),
    ("к", "k"),
    ("м", "m"),
    ("н", "h"),
    ("о", "o"),
    ("р", "p"),
    ("с", "c"),
    ("т", "t"),
    ("у", "y"),
    ("х", "x"),
    ("і", "i"),
    ("ј", "j"),
    ("ѕ", "s"),
    ("α", "a"),
    ("ε", "e"),
    ("ι", "i"),
    ("κ", "k"),
    ("ν", "v"),
    ("ο", "o"),
    ("ρ", "p"),
    ("τ", "t"),
    ("υ", "u"),
    ("đ", "d"),
    ("ð", "d"),
    ("ł", "l"),
    ("ø", "o"),
    ("ß", "ss"),
    ("æ", "ae"),
    ("œ", "oe"),
];

/// The lighter map used by the substitution stage of the detector: common
/// digit and symbol swaps only, no homoglyphs, no diacritic stripping.
const LIGHT: &[(&str, &str)] = &[
    ("@", "a"),
    ("4", "a"),
    ("$", "s"),
    ("5", "s"),
    ("0", "o"),
    ("1", "i"),
    ("!", "i"),
    ("3", "e"),
    ("7", "t"),
];

/// An ordered substitution table.
#[derive(Debug, Clone)]
pub struct SubstitutionTable {
    rules: Vec<(Vec<char>, String)>,
    strip_marks: bool,
}

impl SubstitutionTable {
    /// Build a table from (key, replacement) pairs. Keys are sorted
    /// longest-first; ties keep their given order. Empty keys are ignored.
    pub fn new<K, V>(pairs: impl IntoIterator<Item = (K, V)>, strip_marks: bool) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut rules: Vec<(Vec<char>, String)> = pairs
            .into_iter()
            .map(|(k, v)| (k.as_ref().chars().collect::<Vec<_>>(), v.into()))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { rules, strip_marks }
    }

    /// The Normalizer's table: digraphs, leetspeak, homoglyphs, and
    /// diacritic stripping for anything not covered by a rule.
    pub fn heavy() -> Self {
        Self::new(
            DIGRAPHS
                .iter()
                .chain(LEET.iter())
                .chain(HOMOGLYPHS.iter())
                .copied(),
            true,
        )
    }

    /// The detector's lighter map.
    pub fn light() -> Self {
        Self::new(LIGHT.iter().copied(), false)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply the table to a mapped view. A multi-char key maps its
    /// replacement to the union of the origins it consumed.
    pub fn apply(&self, input: &MappedText) -> MappedText {
        let items: Vec<(char, Span)> = input.chars_with_origins().collect();
        let mut out = MappedText::default();
        let mut i = 0;

        let is_word = |j: usize| items.get(j).is_some_and(|(c, _)| c.is_alphanumeric());

        'outer: while i < items.len() {
            for (key, replacement) in &self.rules {
                let end = i + key.len();
                if end <= items.len() && items[i..end].iter().map(|(c, _)| *c).eq(key.iter().copied()) {
                    if key.len() == 1
                        && INFIX_ONLY.contains(&key[0])
                        && !(i > 0 && is_word(i - 1) && is_word(end))
                    {
                        continue;
                    }
                    let origin = Span::new(items[i].1.start, items[end - 1].1.end);
                    for r in replacement.chars() {
                        out.push(r, origin);
                    }
                    i = end;
                    continue 'outer;
                }
            }

            let (c, origin) = items[i];
            if self.strip_marks {
                push_without_marks(&mut out, c, origin);
            } else {
                out.push(c, origin);
            }
            i += 1;
        }

        out
    }

    /// Apply the table to a plain string.
    pub fn apply_str(&self, text: &str) -> String {
        self.apply(&MappedText::identity(text)).into_string()
    }
}
