// Hush: multilingual profanity moderation
//
// This is the library root. Each module corresponds to one stage of the
// moderation pipeline: text normalization, the shared lexicon, the
// deterministic detector, the external model, the orchestrator that
// reconciles them, and the censoring engine that writes the result.

pub mod censor;
pub mod config;
pub mod detect;
pub mod lexicon;
pub mod model;
pub mod moderation;
pub mod normalize;
pub mod output;
