// Moderation orchestrator: pre-check, model call, validation, fallback.
//
// The Moderator runs one message through the deterministic detector, asks
// the model, and reconciles the two. Whatever the model does, the result is
// never less strict than the deterministic detector, and every failure ends
// in a conservative, structurally valid response.

pub mod orchestrator;
pub mod policy;
pub mod response;
pub mod retry;
pub mod trace;
pub mod validate;
