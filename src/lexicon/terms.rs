// Built-in lexicon.
//
// Deliberately small and conservative. Terms that are common substrings of
// innocent words ("puta" in "disputa", "merda" across "hammer dance") live
// in the standalone lists and are only matched as whole words. Anything
// that still collides with a real word gets an exception phrase.

use std::collections::BTreeMap;

use super::data::{LanguageTerms, LexiconData, PatternSpec};

const EN_TERMS: &[&str] = &[
    "fuck",
    "fuk",
    "shit",
    "bitch",
    "cunt",
    "asshole",
    "bastard",
    "dickhead",
    "motherfucker",
    "faggot",
    "whore",
    "slut",
    "wanker",
    "bullshit",
];
const EN_STANDALONE: &[&str] = &["ass", "dick", "cum", "fag", "twat", "tits"];

const VI_TERMS: &[&str] = &[
    "địt", "lồn", "cặc", "dcm", "đcm", "vcl", "vkl", "clgt", "dmm", "đmm", "cmm", "đéo",
];
const VI_STANDALONE: &[&str] = &["đụ", "du", "đĩ", "vl"];

const ES_TERMS: &[&str] = &[
    "pendejo",
    "gilipollas",
    "cabrón",
    "maricón",
    "mierda",
    "joder",
    "hijueputa",
    "malparido",
    "chingada",
];
const ES_STANDALONE: &[&str] = &["puta", "puto", "coño", "culo", "verga"];

const PT_TERMS: &[&str] = &["caralho", "arrombado", "filho da puta", "buceta", "cuzão"];
const PT_STANDALONE: &[&str] = &["porra", "merda", "foda"];

/// Families of deliberately obfuscated spellings. Slots are separated by
/// spaces, alternatives by "|", and a trailing "?" makes a slot optional.
const PATTERNS: &[(&str, &str)] = &[
    ("f-word", "f|ph u|v|@|*|0 c|(? k|q"),
    ("s-word", "s|$|5 h i|1|!|y|* t|7"),
    ("b-word", "b|8 i|1|!|* t? c|( h"),
    ("biatch", "b|8 i|1 a|@|4 t? c|( h"),
    ("c-word", "c u|v|* n t|7"),
    ("a-hole", "a|@|4 s|$|5 s|$|5 h o|0 l e|3"),
    ("dcm", "d|đ c|k m"),
    ("vcl", "v c|k l"),
    ("mierda", "m i|1 e|3 r d a|@|4"),
    ("caralho", "c|k a|@|4 r a|@|4 l h o|0"),
];

const FRAGMENTS: &[&str] = &[
    "fuc", "fuk", "fck", "sht", "btch", "biat", "cnt", "dcm", "vcl", "dmm", "cmm",
];

/// Terms (or pattern families) that are innocent inside these phrases.
const EXCEPTIONS: &[(&str, &[&str])] = &[
    (
        "du",
        &[
            "du lịch", "du lich", "du học", "du hoc", "du khách", "du khach", "du kích", "du kich",
            "du xuân", "du xuan", "du ca", "du côn", "du con", "du nhập", "du nhap", "du hành",
            "du hanh", "du dương", "du duong", "du mục", "du muc",
        ],
    ),
    ("dick", &["moby dick"]),
    ("cunt", &["scunthorpe"]),
    ("shit", &["shiite", "shiites", "shiitake", "shiitakes"]),
    ("s-word", &["shiite", "shiites", "shiitake", "shiitakes"]),
];

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// The built-in lexicon data.
pub fn builtin() -> LexiconData {
    let mut languages = BTreeMap::new();
    for (tag, terms, standalone) in [
        ("en", EN_TERMS, EN_STANDALONE),
        ("vi", VI_TERMS, VI_STANDALONE),
        ("es", ES_TERMS, ES_STANDALONE),
        ("pt", PT_TERMS, PT_STANDALONE),
    ] {
        languages.insert(
            tag.to_string(),
            LanguageTerms {
                terms: owned(terms),
                standalone: owned(standalone),
            },
        );
    }

    LexiconData {
        languages,
        patterns: PATTERNS
            .iter()
            .map(|(family, template)| PatternSpec {
                family: family.to_string(),
                template: template.to_string(),
            })
            .collect(),
        fragments: owned(FRAGMENTS),
        exceptions: EXCEPTIONS
            .iter()
            .map(|(term, phrases)| (term.to_string(), owned(phrases)))
            .collect(),
    }
}
