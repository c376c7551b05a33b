// Text normalization for matching.
//
// Every transformation here carries an offset map back to the characters of
// the original message, so a hit found in normalized text can be redacted in
// the text the user actually wrote.

pub mod mapped;
pub mod normalizer;
pub mod substitution;
