// Unit tests for normalization and censoring.
//
// Tests the Normalizer's heavy and light variants, the offset map that
// carries hits back to original characters, and the censoring engine's
// length-preserving redaction.

use hush::censor::{is_fully_masked, mask_all, redact};
use hush::normalize::mapped::{strip_diacritics, MappedText, Span};
use hush::normalize::normalizer::Normalizer;
use hush::normalize::substitution::SubstitutionTable;

// ============================================================
// Normalizer: heavy variant
// ============================================================

#[test]
fn empty_input_normalizes_to_empty() {
    let n = Normalizer::default();
    assert_eq!(n.normalize(""), "");
    assert_eq!(n.normalize_light(""), "");
}

#[test]
fn repeated_letters_collapse() {
    assert_eq!(Normalizer::default().normalize("FUUUCK"), "fuck");
}

#[test]
fn punctuation_separators_are_removed() {
    assert_eq!(Normalizer::default().normalize("f.u.c.k"), "fuck");
    assert_eq!(Normalizer::default().normalize("s-h-i-t!!"), "shit");
}

#[test]
fn leetspeak_is_canonicalized() {
    let n = Normalizer::default();
    assert_eq!(n.normalize("$h1t"), "shit");
    assert_eq!(n.normalize("phuck"), "fuck");
}

#[test]
fn cyrillic_homoglyph_is_canonicalized() {
    // U+0441 CYRILLIC SMALL LETTER ES looks like Latin c
    assert_eq!(Normalizer::default().normalize("fu\u{0441}k"), "fuck");
}

#[test]
fn diacritics_are_stripped_in_heavy_form() {
    assert_eq!(Normalizer::default().normalize("Cabrón"), "cabron");
}

#[test]
fn heavy_normalization_is_idempotent() {
    let n = Normalizer::default();
    for text in ["Hello, World!", "f@@ck th1s", "lồn", "  spaced   out  "] {
        let once = n.normalize(text);
        assert_eq!(n.normalize(&once), once, "{text:?}");
    }
}

// ============================================================
// Normalizer: light variant
// ============================================================

#[test]
fn light_variant_strips_only_whitespace() {
    let n = Normalizer::default();
    assert_eq!(n.normalize_light("F U C K"), "fuck");
    // repeated letters survive
    assert_eq!(n.normalize_light("fuuuck"), "fuuuck");
    // punctuation survives
    assert_eq!(n.normalize_light("f.u"), "f.u");
}

// ============================================================
// Offset mapping
// ============================================================

#[test]
fn heavy_hit_maps_back_to_original_chars() {
    let text = "you F.U.C.K!";
    let view = Normalizer::default().heavy(text);
    let spans = view.find_all("fuck");
    assert_eq!(spans, vec![Span::new(4, 11)]);
    assert_eq!(redact(text, &spans), "you *******!");
}

#[test]
fn collapsed_run_maps_to_whole_run() {
    let text = "what the fuuuck";
    let view = Normalizer::default().heavy(text);
    assert_eq!(view.find_all("fuck"), vec![Span::new(9, 15)]);
}

#[test]
fn multi_char_key_maps_to_both_chars() {
    let table = SubstitutionTable::heavy();
    let view = table.apply(&MappedText::identity("phuk"));
    assert_eq!(view.as_str(), "fuk");
    assert_eq!(view.find_all("f"), vec![Span::new(0, 2)]);
}

#[test]
fn strip_diacritics_keeps_base_letters() {
    assert_eq!(strip_diacritics("lồn cabrón"), "lon cabron");
    assert_eq!(strip_diacritics("plain"), "plain");
}

// ============================================================
// Censoring engine
// ============================================================

#[test]
fn redaction_preserves_length_and_punctuation() {
    let text = "well, shit!";
    let out = redact(text, &[Span::new(6, 10)]);
    assert_eq!(out, "well, ****!");
    assert_eq!(out.chars().count(), text.chars().count());
}

#[test]
fn full_mask_matches_char_length() {
    let text = "đụ má mày";
    let masked = mask_all(text);
    assert_eq!(masked.chars().count(), text.chars().count());
    assert!(is_fully_masked(&masked));
}
