// OpenAI-compatible chat-completions client.
//
// Works against any endpoint speaking the /v1/chat/completions protocol.
// The request asks for a JSON object reply at temperature 0; nothing
// downstream trusts that it actually gets one.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::ModelError;
use super::pacer::RequestPacer;
use super::prompt::SYSTEM_PROMPT;
use super::traits::ModerationModel;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL_NAME: &str = "gpt-4o-mini";

pub struct OpenAiModel {
    client: Client,
    api_url: String,
    api_key: String,
    model_name: String,
    pacer: RequestPacer,
}

impl OpenAiModel {
    pub fn new(
        api_url: String,
        api_key: String,
        model_name: String,
        requests_per_second: f64,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("hush/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for the moderation model")?;

        Ok(Self {
            client,
            api_url,
            api_key,
            model_name,
            pacer: RequestPacer::new(requests_per_second),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn request_for(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model_name.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.0,
            response_format: Some(ResponseFormat {
                kind: "json_object".to_string(),
            }),
        }
    }
}

#[async_trait]
impl ModerationModel for OpenAiModel {
    async fn call_model(&self, prompt: &str) -> Result<String, ModelError> {
        self.pacer.acquire().await?;

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&self.request_for(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = response.text().await.unwrap_or_default();

            if let Some(delay) = retry_after {
                warn!(
                    retry_after_secs = delay.as_secs(),
                    "Model provider asked us to back off"
                );
                self.pacer.defer(delay).await;
            }
            return Err(ModelError::from_status(status.as_u16(), body, retry_after));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Transport(format!("unreadable chat response: {e}")))?;
        let content = extract_content(reply)?;

        debug!(
            model = %self.model_name,
            reply_chars = content.chars().count(),
            "Model replied"
        );
        Ok(content)
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

/// Pull the first choice's text out of a chat response.
pub fn extract_content(response: ChatResponse) -> Result<String, ModelError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ModelError::EmptyReply)
}

/// Retry-After in delay-seconds form. HTTP-date values are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

// --- Chat-completions request/response types ---

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatReplyMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> OpenAiModel {
        OpenAiModel::new(
            DEFAULT_API_URL.to_string(),
            "test-key".to_string(),
            DEFAULT_MODEL_NAME.to_string(),
            0.0,
        )
        .unwrap()
    }

    #[test]
    fn request_asks_for_json_at_temperature_zero() {
        let request = model().request_for("moderate this");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "moderate this");
    }

    #[test]
    fn extracts_first_choice() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"{\"a\":1}"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_content(response).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn empty_or_missing_content_is_empty_reply() {
        let blank: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"  "}}]}"#).unwrap();
        assert!(matches!(extract_content(blank), Err(ModelError::EmptyReply)));

        let none: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(extract_content(none), Err(ModelError::EmptyReply)));

        let null: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(matches!(extract_content(null), Err(ModelError::EmptyReply)));
    }

    #[test]
    fn retry_after_seconds() {
        assert_eq!(parse_retry_after(" 7 "), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }
}
