// Response validation and consistency enforcement.
//
// Parsing is a ladder, most literal first: a direct JSON object, a JSON
// envelope carrying the object as a string, a fenced code block, the first
// `{...}` embedded in prose, and finally regex extraction of the verdict
// and moderated text. Whatever comes out is checked against the input
// (fidelity) and against the deterministic detector (override), then
// turned into a typed `ModerationResponse`.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::policy::FallbackPolicy;
use super::response::{FallbackReason, ModelReply, ModerationResponse, Resolution};
use crate::censor::{mask_all, redact};
use crate::detect::result::{merge_spans, DetectionResult, DetectionSource};
use crate::detect::scanner::EvasionDetector;
use crate::normalize::mapped::{MappedText, Span};
use crate::output::truncate_chars;

/// Envelope fields that commonly wrap the real reply.
const ENVELOPE_KEYS: &[&str] = &["text", "content", "response", "output", "result"];

/// Which rung of the parsing ladder produced the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    Direct,
    Envelope,
    Fenced,
    Embedded,
    Extracted,
}

/// Result of comparing the model's echoed original with the true input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fidelity {
    /// Identical to the input.
    Exact,
    /// The reply did not echo the original at all.
    Missing,
    /// One contains the other; corrected.
    Contained,
    /// Close in length but different text; corrected.
    Drifted,
    /// Too different in length; the reply is not about this message.
    Rejected,
}

impl Fidelity {
    pub fn is_rejected(self) -> bool {
        self == Fidelity::Rejected
    }
}

/// Compare an echoed original against the true input.
///
/// With `s`/`l` the shorter/longer char lengths, the echo is close enough
/// when `s * threshold >= l`.
pub fn check_fidelity(echo: Option<&str>, original: &str, threshold: f64) -> Fidelity {
    let Some(echo) = echo else {
        return Fidelity::Missing;
    };
    if echo == original {
        return Fidelity::Exact;
    }

    let a = echo.chars().count();
    let b = original.chars().count();
    let (shorter, longer) = if a <= b { (a, b) } else { (b, a) };
    if (shorter as f64) * threshold < longer as f64 {
        return Fidelity::Rejected;
    }

    if echo.contains(original) || original.contains(echo) {
        Fidelity::Contained
    } else {
        Fidelity::Drifted
    }
}

fn reply_from_value(value: &Value) -> Option<ModelReply> {
    if !value.is_object() {
        return None;
    }
    serde_json::from_value::<ModelReply>(value.clone())
        .ok()
        .filter(ModelReply::has_schema)
}

fn parse_object_str(text: &str) -> Option<ModelReply> {
    serde_json::from_str::<Value>(text.trim())
        .ok()
        .as_ref()
        .and_then(reply_from_value)
}

/// Body of the first fenced code block, without its language tag.
fn strip_fence(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let body_start = match after.find('\n') {
        Some(newline) if !after[..newline].contains('{') => newline + 1,
        _ => 0,
    };
    let body = &after[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    Some(body[..end].trim())
}

/// The outermost `{...}` in the text.
fn embedded_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse text that should contain a reply object, fenced or embedded.
fn parse_structured(text: &str) -> Option<ModelReply> {
    let text = strip_fence(text).unwrap_or(text);
    parse_object_str(text).or_else(|| embedded_object(text).and_then(parse_object_str))
}

/// The wrapped reply inside a JSON envelope, as text.
fn unwrap_envelope(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => {
            for key in ENVELOPE_KEYS {
                match map.get(*key) {
                    Some(Value::String(s)) => return Some(s.clone()),
                    Some(inner @ Value::Object(_)) => return Some(inner.to_string()),
                    _ => {}
                }
            }
            value
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .map(str::to_string)
        }
        _ => None,
    }
}

fn verdict_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)"?\b(contains_profanity|containsprofanity|is_profane|has_profanity|was_modified)\b"?\s*[:=]\s*"?(true|false)\b"#,
        )
        .ok()
    })
    .as_ref()
}

fn string_field_regex(field: &'static str) -> Option<Regex> {
    Regex::new(&format!(r#""{field}"\s*:\s*"((?:[^"\\]|\\.)*)""#)).ok()
}

fn moderated_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| string_field_regex("moderated_message")).as_ref()
}

fn original_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| string_field_regex("original_message")).as_ref()
}

/// Pull a JSON string literal's value out of raw text.
fn extract_string(re: Option<&Regex>, raw: &str) -> Option<String> {
    let caps = re?.captures(raw)?;
    let literal = format!("\"{}\"", caps.get(1)?.as_str());
    serde_json::from_str::<String>(&literal).ok()
}

/// Last rung: regex out whatever fields are recognizable.
fn extract_fields(raw: &str) -> Option<ModelReply> {
    let mut reply = ModelReply::default();
    if let Some(re) = verdict_regex() {
        for caps in re.captures_iter(raw) {
            let field = caps.get(1).map(|m| m.as_str().to_lowercase());
            let value = caps
                .get(2)
                .is_some_and(|m| m.as_str().eq_ignore_ascii_case("true"));
            match field.as_deref() {
                Some("was_modified") => reply.was_modified = reply.was_modified.or(Some(value)),
                Some(_) => {
                    reply.contains_profanity = reply.contains_profanity.or(Some(value));
                }
                None => {}
            }
        }
    }
    reply.moderated_message = extract_string(moderated_regex(), raw);
    reply.original_message = extract_string(original_regex(), raw);
    reply.has_schema().then_some(reply)
}

/// Run the parsing ladder over a raw model reply.
pub fn parse_reply(raw: &str) -> Option<(ModelReply, ParseStrategy)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        if let Some(reply) = reply_from_value(&value) {
            return Some((reply, ParseStrategy::Direct));
        }
        if let Some(reply) = unwrap_envelope(&value).as_deref().and_then(parse_structured) {
            return Some((reply, ParseStrategy::Envelope));
        }
    }

    if let Some(reply) = strip_fence(raw).and_then(parse_object_str) {
        return Some((reply, ParseStrategy::Fenced));
    }
    if let Some(reply) = embedded_object(raw).and_then(parse_object_str) {
        return Some((reply, ParseStrategy::Embedded));
    }
    extract_fields(raw).map(|reply| (reply, ParseStrategy::Extracted))
}

/// A parsed reply that passed the fidelity gate.
#[derive(Debug, Clone)]
pub struct AcceptedReply {
    pub reply: ModelReply,
    pub strategy: ParseStrategy,
    pub fidelity: Fidelity,
}

/// The validator's decision for one message.
#[derive(Debug, Clone)]
pub struct Validated {
    pub response: ModerationResponse,
    pub contains_profanity: bool,
    pub resolution: Resolution,
    pub override_fired: bool,
    pub fidelity: Option<Fidelity>,
    pub strategy: Option<ParseStrategy>,
    /// The verdict as the model (or the fallback path) gave it, before
    /// merging with the deterministic pre-check.
    pub model_detection: DetectionResult,
}

/// Whole-word, case-insensitive occurrences of `term` in `text`.
fn word_occurrences(text: &str, term: &str) -> Vec<Span> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let is_word = |i: usize| chars.get(i).is_some_and(|c| c.is_alphanumeric());

    MappedText::identity(text)
        .fold_case()
        .find_all(&needle)
        .into_iter()
        .filter(|span| (span.start == 0 || !is_word(span.start - 1)) && !is_word(span.end))
        .collect()
}

/// Parses model replies and reconciles them with the deterministic detector.
#[derive(Debug, Clone)]
pub struct Validator {
    detector: EvasionDetector,
    threshold: f64,
    fallback: FallbackPolicy,
}

impl Validator {
    pub fn new(detector: EvasionDetector, threshold: f64, fallback: FallbackPolicy) -> Self {
        Self {
            detector,
            threshold,
            fallback,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        self.fallback
    }

    /// Parse a raw reply and apply the fidelity gate.
    pub fn accept(&self, raw: &str, original: &str) -> Result<AcceptedReply, FallbackReason> {
        let Some((reply, strategy)) = parse_reply(raw) else {
            debug!(
                raw_preview = %truncate_chars(raw, 80),
                "No parsing strategy understood the model reply"
            );
            return Err(FallbackReason::Unparseable);
        };

        let fidelity = check_fidelity(reply.original_message.as_deref(), original, self.threshold);
        match fidelity {
            Fidelity::Rejected => {
                warn!(
                    echoed = %truncate_chars(reply.original_message.as_deref().unwrap_or(""), 60),
                    "Model echoed a different message, rejecting reply"
                );
                return Err(FallbackReason::FidelityRejected);
            }
            Fidelity::Drifted => warn!("Model echo drifted from input, correcting"),
            Fidelity::Contained => debug!("Model echo trimmed or padded, correcting"),
            Fidelity::Exact | Fidelity::Missing => {}
        }

        Ok(AcceptedReply {
            reply,
            strategy,
            fidelity,
        })
    }

    /// Validate one raw reply end to end. Never fails: an unusable reply
    /// produces the conservative fallback.
    pub fn validate(
        &self,
        raw: &str,
        original: &str,
        deterministic: &DetectionResult,
    ) -> Validated {
        match self.accept(raw, original) {
            Ok(accepted) => self.enforce(accepted, original, deterministic),
            Err(reason) => self.fallback(original, deterministic, reason),
        }
    }

    /// Reconcile an accepted reply with the deterministic verdict.
    pub fn enforce(
        &self,
        accepted: AcceptedReply,
        original: &str,
        deterministic: &DetectionResult,
    ) -> Validated {
        let AcceptedReply {
            reply,
            strategy,
            fidelity,
        } = accepted;
        let model_verdict = reply.verdict(original);
        let model_detection = DetectionResult {
            is_flagged: model_verdict,
            matched_terms: reply.detected_terms.clone().unwrap_or_default(),
            source: DetectionSource::Model,
            stage: None,
            language: reply.language.clone(),
            spans: Vec::new(),
        };
        let language = reply.language.clone().or_else(|| deterministic.language.clone());
        let mut notes = Vec::new();
        if matches!(fidelity, Fidelity::Contained | Fidelity::Drifted) {
            notes.push("echoed original corrected to the true input".to_string());
        }

        // Never under-censor: the detector's verdict is a floor.
        if deterministic.is_flagged && !model_verdict {
            warn!(
                terms = ?deterministic.matched_terms,
                stage = ?deterministic.stage.map(|s| s.label()),
                "Model missed profanity the deterministic detector found, overriding"
            );
            notes.push(format!(
                "override: deterministic detector matched {} at {}; model verdict was false",
                deterministic.matched_terms.join(", "),
                deterministic
                    .stage
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unknown stage".to_string()),
            ));
            let mut response = ModerationResponse::with_moderated(original, mask_all(original));
            response.language = language;
            response.notes = notes;
            return Validated {
                response,
                contains_profanity: true,
                resolution: Resolution::Overridden,
                override_fired: true,
                fidelity: Some(fidelity),
                strategy: Some(strategy),
                model_detection,
            };
        }

        if !model_verdict {
            let mut response = ModerationResponse::unchanged(original);
            response.language = language;
            response.notes = notes;
            return Validated {
                response,
                contains_profanity: false,
                resolution: Resolution::ModelTrusted,
                override_fired: false,
                fidelity: Some(fidelity),
                strategy: Some(strategy),
                model_detection,
            };
        }

        let original_len = original.chars().count();
        let moderated = match reply.moderated_message.as_deref() {
            Some(text) if text != original && text.chars().count() == original_len => {
                self.scrub_residual(text, &mut notes)
            }
            _ => {
                notes.push("model text unusable; redacted locally".to_string());
                self.redact_locally(original, reply.detected_terms.as_deref().unwrap_or(&[]))
            }
        };

        let mut response = ModerationResponse::with_moderated(original, moderated);
        response.language = language;
        response.notes = notes;
        Validated {
            response,
            contains_profanity: true,
            resolution: Resolution::ModelTrusted,
            override_fired: false,
            fidelity: Some(fidelity),
            strategy: Some(strategy),
            model_detection,
        }
    }

    /// Re-check the model's own censored text and mask anything it left.
    fn scrub_residual(&self, moderated: &str, notes: &mut Vec<String>) -> String {
        let spans = self.detector.locate(moderated);
        if !spans.is_empty() {
            notes.push("residual profanity in model output redacted".to_string());
            return redact(moderated, &spans);
        }
        if self.detector.scan(moderated).is_flagged {
            notes.push("residual profanity in model output; message masked".to_string());
            return mask_all(moderated);
        }
        moderated.to_string()
    }

    /// Redact what the model named plus what the detector can locate; mask
    /// everything if neither finds a span.
    fn redact_locally(&self, original: &str, detected_terms: &[String]) -> String {
        let spans = merge_spans(
            detected_terms
                .iter()
                .flat_map(|term| word_occurrences(original, term))
                .chain(self.detector.locate(original)),
        );
        if spans.is_empty() {
            mask_all(original)
        } else {
            redact(original, &spans)
        }
    }

    /// The conservative output when no model reply can be used.
    pub fn fallback(
        &self,
        original: &str,
        deterministic: &DetectionResult,
        reason: FallbackReason,
    ) -> Validated {
        let spans = if deterministic.is_flagged {
            self.detector.locate(original)
        } else {
            Vec::new()
        };

        let (moderated, flagged) = if !spans.is_empty() {
            (redact(original, &spans), true)
        } else if deterministic.is_flagged {
            (mask_all(original), true)
        } else {
            match self.fallback {
                FallbackPolicy::Strict => (mask_all(original), true),
                FallbackPolicy::Deterministic => (original.to_string(), false),
            }
        };

        info!(
            reason = %reason,
            flagged,
            policy = %self.fallback,
            "Moderation fell back to deterministic output"
        );

        let mut response = ModerationResponse::with_moderated(original, moderated);
        response.language = deterministic.language.clone();
        response.notes.push(format!("fallback: {reason}"));
        Validated {
            response,
            contains_profanity: flagged,
            resolution: Resolution::Fallback(reason),
            override_fired: false,
            fidelity: None,
            strategy: None,
            model_detection: DetectionResult {
                is_flagged: flagged,
                ..DetectionResult::clean(DetectionSource::Fallback)
            },
        }
    }
}
