// Lexicon & pattern store: the static word lists every detector shares.
//
// Built once at startup (from the built-in data or a JSON file), then
// shared read-only behind an Arc. Nothing in here is ever mutated after
// construction.

pub mod data;
pub mod patterns;
pub mod store;
pub mod terms;
