// Typed moderation records: what callers get back and what the model sends.
//
// The model's reply is parsed into `ModelReply`, a deliberately lenient
// record where every field is optional and common spellings of the field
// names are accepted. The validator then builds a `ModerationResponse` from
// it field by field; the raw reply text is never patched.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::detect::result::DetectionResult;

/// The structurally valid result of moderating one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationResponse {
    /// Always the caller's input, byte for byte.
    pub original_message: String,
    pub moderated_message: String,
    pub was_modified: bool,
    #[serde(default)]
    pub language: Option<String>,
    /// Diagnostics about overrides and corrections.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ModerationResponse {
    /// The input passed through untouched.
    pub fn unchanged(text: &str) -> Self {
        Self::with_moderated(text, text.to_string())
    }

    /// A response for `text` with the given moderated form.
    pub fn with_moderated(text: &str, moderated: String) -> Self {
        Self {
            original_message: text.to_string(),
            was_modified: moderated != text,
            moderated_message: moderated,
            language: None,
            notes: Vec::new(),
        }
    }
}

/// A model reply as far as it could be understood.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ModelReply {
    #[serde(
        default,
        alias = "original",
        alias = "originalMessage",
        alias = "original_text"
    )]
    pub original_message: Option<String>,

    #[serde(
        default,
        alias = "moderated",
        alias = "moderatedMessage",
        alias = "filtered_message",
        alias = "censored_message"
    )]
    pub moderated_message: Option<String>,

    #[serde(
        default,
        alias = "containsProfanity",
        alias = "is_profane",
        alias = "has_profanity",
        deserialize_with = "lenient_bool"
    )]
    pub contains_profanity: Option<bool>,

    #[serde(default, alias = "wasModified", deserialize_with = "lenient_bool")]
    pub was_modified: Option<bool>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub language: Option<String>,

    #[serde(
        default,
        alias = "detectedTerms",
        alias = "matched_terms",
        deserialize_with = "lenient_terms"
    )]
    pub detected_terms: Option<Vec<String>>,
}

impl ModelReply {
    /// Whether the reply carries anything we asked for.
    pub fn has_schema(&self) -> bool {
        self.contains_profanity.is_some()
            || self.was_modified.is_some()
            || self.moderated_message.is_some()
    }

    /// The model's verdict: profane if it said so in either boolean, or,
    /// when it gave neither, if its moderated text differs from the input.
    pub fn verdict(&self, original: &str) -> bool {
        match (self.contains_profanity, self.was_modified) {
            (None, None) => self
                .moderated_message
                .as_deref()
                .is_some_and(|m| m != original),
            (contains, modified) => contains.unwrap_or(false) || modified.unwrap_or(false),
        }
    }
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Bool(b) => Some(b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

fn lenient_terms<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                    _ => None,
                })
                .collect(),
        ),
        Some(Value::String(s)) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    })
}

/// Why no model reply could be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// No model configured, or it refused outright.
    ModelUnavailable,
    /// The provider rate limited us; retries were abandoned.
    RateLimited,
    /// Every attempt failed with a transport error or timeout.
    AttemptsExhausted,
    /// Replies arrived but none could be parsed.
    Unparseable,
    /// The reply echoed a message too different from the input.
    FidelityRejected,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FallbackReason::ModelUnavailable => "model unavailable",
            FallbackReason::RateLimited => "rate limited",
            FallbackReason::AttemptsExhausted => "attempts exhausted",
            FallbackReason::Unparseable => "unparseable reply",
            FallbackReason::FidelityRejected => "echoed message did not match input",
        };
        f.write_str(text)
    }
}

/// How a moderation call was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Blank input, returned as is.
    Empty,
    /// Detect path: the pre-check flagged, the model was not consulted.
    ShortCircuit,
    /// The model's verdict stood.
    ModelTrusted,
    /// The model disagreed with the deterministic detector and was overruled.
    Overridden,
    /// No usable model reply; the conservative path produced the output.
    Fallback(FallbackReason),
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Empty => f.write_str("empty input"),
            Resolution::ShortCircuit => f.write_str("deterministic short circuit"),
            Resolution::ModelTrusted => f.write_str("model trusted"),
            Resolution::Overridden => f.write_str("model overridden"),
            Resolution::Fallback(reason) => write!(f, "fallback ({reason})"),
        }
    }
}

/// Everything one moderation call decided.
#[derive(Debug, Clone, Serialize)]
pub struct ModerationOutcome {
    pub response: ModerationResponse,
    pub contains_profanity: bool,
    pub resolution: Resolution,
    /// The deterministic pre-check for the input.
    pub detection: DetectionResult,
}
