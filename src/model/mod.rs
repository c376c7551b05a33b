// The external language model: trait-based so the provider can be swapped.
//
// ModerationModel is the only thing the pipeline knows about the model: a
// prompt goes in, free-form text (hopefully JSON) comes out. OpenAiModel
// speaks the chat-completions protocol; NoopModel stands in when no model
// is configured.

pub mod error;
pub mod openai;
pub mod pacer;
pub mod prompt;
pub mod traits;
