// Moderation model trait: the swap-ready abstraction over the external LLM.

use async_trait::async_trait;

use super::error::ModelError;

/// An opaque text-completion call. The reply *should* be JSON but nothing
/// downstream assumes it is. Implementations need not enforce a timeout;
/// the orchestrator does.
#[async_trait]
pub trait ModerationModel: Send + Sync {
    async fn call_model(&self, prompt: &str) -> Result<String, ModelError>;

    /// Short name for logs and traces.
    fn name(&self) -> &str {
        "model"
    }
}

/// Used when no model is configured. Every call fails with `Unavailable`,
/// which sends the orchestrator straight to its fallback path.
pub struct NoopModel;

#[async_trait]
impl ModerationModel for NoopModel {
    async fn call_model(&self, _prompt: &str) -> Result<String, ModelError> {
        Err(ModelError::Unavailable)
    }

    fn name(&self) -> &str {
        "none"
    }
}
