// Deterministic evasion detection: the synchronous, model-free half of the
// pipeline. Pure computation over the shared lexicon store.

pub mod result;
pub mod scanner;
pub mod stage;
