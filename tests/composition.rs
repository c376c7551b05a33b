// Composition tests: the whole pipeline against scripted models.
//
// These tests exercise the data flow between modules:
//   Detector -> Prompt -> Model -> Validator -> Censor
// with in-memory models standing in for the external language model. No
// network access; every delay is a few milliseconds.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use hush::detect::result::DetectionSource;
use hush::detect::scanner::EvasionDetector;
use hush::lexicon::store::LexiconStore;
use hush::model::error::ModelError;
use hush::model::pacer::RequestPacer;
use hush::model::traits::{ModerationModel, NoopModel};
use hush::moderation::orchestrator::Moderator;
use hush::moderation::policy::{FallbackPolicy, ModerationSettings};
use hush::moderation::response::{FallbackReason, Resolution};
use hush::moderation::retry::{AttemptStatus, RetryPolicy};
use hush::moderation::validate::Fidelity;

// ============================================================
// Scripted models
// ============================================================

/// Words the well-behaved model knows to mask.
const KNOWN_BAD: &[&str] = &["fuck", "shit", "fuk", "dcm"];

#[derive(Clone, Copy)]
enum Behavior {
    /// Always claims the message is clean, echoing it back unchanged.
    AlwaysFalse,
    /// Replies with prose nobody can parse.
    Garbage,
    /// Never answers in time.
    Timeout,
    /// Always rate limited.
    RateLimited,
    /// Echoes the message with its last character dropped, verdict clean.
    TypoEcho,
    /// Echoes a fixed, unrelated message.
    EchoOf(&'static str),
    /// Masks known words, otherwise reports clean.
    WellBehaved,
}

struct ScriptedModel {
    behavior: Behavior,
    calls: AtomicU32,
}

impl ScriptedModel {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// The message embedded at the end of a moderation prompt.
fn message_from_prompt(prompt: &str) -> String {
    let (_, quoted) = prompt.rsplit_once("Message: ").unwrap();
    serde_json::from_str(quoted).unwrap()
}

fn mask_known(text: &str) -> String {
    text.split(' ')
        .map(|token| {
            let core: String = token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if KNOWN_BAD.contains(&core.as_str()) {
                token
                    .chars()
                    .map(|c| if c.is_alphanumeric() { '*' } else { c })
                    .collect()
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn reply(original: &str, moderated: &str, profane: bool) -> String {
    serde_json::json!({
        "original_message": original,
        "moderated_message": moderated,
        "contains_profanity": profane,
        "was_modified": profane,
        "language": "en",
        "detected_terms": []
    })
    .to_string()
}

#[async_trait]
impl ModerationModel for ScriptedModel {
    async fn call_model(&self, prompt: &str) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = message_from_prompt(prompt);
        match self.behavior {
            Behavior::AlwaysFalse => Ok(reply(&text, &text, false)),
            Behavior::Garbage => Ok("I'd rather not say.".to_string()),
            Behavior::Timeout => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(reply(&text, &text, false))
            }
            Behavior::RateLimited => Err(ModelError::RateLimited {
                retry_after: Some(Duration::from_secs(30)),
            }),
            Behavior::TypoEcho => {
                let mut echo = text.clone();
                echo.pop();
                Ok(reply(&echo, &text, false))
            }
            Behavior::EchoOf(other) => Ok(reply(other, other, false)),
            Behavior::WellBehaved => {
                let masked = mask_known(&text);
                Ok(reply(&text, &masked, masked != text))
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn settings(fallback: FallbackPolicy) -> ModerationSettings {
    ModerationSettings {
        fidelity_threshold: 1.5,
        fallback,
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(50),
        },
    }
}

fn moderator_with(model: Arc<dyn ModerationModel>, fallback: FallbackPolicy) -> Moderator {
    Moderator::new(LexiconStore::shared().unwrap(), model, settings(fallback))
}

fn moderator(behavior: Behavior) -> Moderator {
    moderator_with(ScriptedModel::new(behavior), FallbackPolicy::Strict)
}

fn detector() -> EvasionDetector {
    EvasionDetector::new(LexiconStore::shared().unwrap())
}

const UNRELIABLE: &[Behavior] = &[
    Behavior::AlwaysFalse,
    Behavior::Garbage,
    Behavior::Timeout,
    Behavior::RateLimited,
    Behavior::EchoOf("something else entirely, much longer than the input"),
];

// ============================================================
// Conservatism: the detector is a floor under every model
// ============================================================

#[tokio::test]
async fn flagged_messages_stay_flagged_whatever_the_model_does() {
    let d = detector();
    for behavior in UNRELIABLE {
        let m = moderator(*behavior);
        for text in ["dcm this game", "f@ck you", "what the fuuuck", "s h i t"] {
            assert!(d.scan(text).is_flagged, "precondition: {text:?}");
            assert!(m.contains_profanity(text).await, "{text:?}");

            let outcome = m.moderate(text).await;
            assert!(outcome.contains_profanity, "{text:?}");
            assert!(outcome.response.was_modified, "{text:?}");
            assert!(
                !d.scan(&outcome.response.moderated_message).is_flagged,
                "readable profanity left in {:?}",
                outcome.response.moderated_message
            );
        }
    }
}

#[tokio::test]
async fn dcm_cannot_be_bypassed() {
    for behavior in UNRELIABLE.iter().chain([Behavior::WellBehaved, Behavior::TypoEcho].iter()) {
        let m = moderator(*behavior);
        assert!(m.contains_profanity("dcm this game").await);
        let filtered = m.filter_profanity("dcm this game").await;
        assert!(!filtered.contains("dcm"), "{filtered:?}");
        assert_eq!(filtered.chars().count(), "dcm this game".chars().count());
    }
}

#[tokio::test]
async fn always_false_model_is_overridden_with_full_mask() {
    let (outcome, trace) = moderator(Behavior::AlwaysFalse)
        .moderate_traced("you are a fuk")
        .await;
    assert_eq!(outcome.resolution, Resolution::Overridden);
    assert!(trace.override_fired);
    assert_eq!(outcome.response.moderated_message, "*************");
    assert!(outcome
        .response
        .notes
        .iter()
        .any(|n| n.starts_with("override")));
    assert_eq!(outcome.detection.source, DetectionSource::Deterministic);
}

// ============================================================
// End-to-end scenarios
// ============================================================

#[tokio::test]
async fn unavailable_model_redacts_only_the_offending_word() {
    let m = moderator_with(Arc::new(NoopModel), FallbackPolicy::Strict);
    let outcome = m.moderate("you are a fuk").await;
    assert_eq!(outcome.response.moderated_message, "you are a ***");
    assert!(outcome.contains_profanity);
    assert_eq!(
        outcome.resolution,
        Resolution::Fallback(FallbackReason::ModelUnavailable)
    );
    assert!(m.contains_profanity("you are a fuk").await);
}

#[tokio::test]
async fn clean_message_with_well_behaved_model_is_unchanged() {
    let m = moderator(Behavior::WellBehaved);
    let outcome = m.moderate("hello, how are you?").await;
    assert_eq!(outcome.response.moderated_message, "hello, how are you?");
    assert_eq!(outcome.response.original_message, "hello, how are you?");
    assert!(!outcome.response.was_modified);
    assert!(!outcome.contains_profanity);
    assert_eq!(outcome.resolution, Resolution::ModelTrusted);
    assert!(!m.contains_profanity("hello, how are you?").await);
}

#[tokio::test]
async fn well_behaved_model_text_is_trusted() {
    let outcome = moderator(Behavior::WellBehaved)
        .moderate("well, shit happens")
        .await;
    assert_eq!(outcome.resolution, Resolution::ModelTrusted);
    assert_eq!(outcome.response.moderated_message, "well, **** happens");
}

#[tokio::test]
async fn travel_phrase_passes_end_to_end() {
    let m = moderator(Behavior::WellBehaved);
    assert!(!m.contains_profanity("I love du lịch").await);
    assert_eq!(m.filter_profanity("I love du lịch").await, "I love du lịch");
}

// ============================================================
// Fidelity correction
// ============================================================

#[tokio::test]
async fn typo_echo_is_corrected_to_true_input() {
    let (outcome, trace) = moderator(Behavior::TypoEcho)
        .moderate_traced("hello, how are you?")
        .await;
    assert_eq!(outcome.response.original_message, "hello, how are you?");
    assert_eq!(trace.fidelity, Some(Fidelity::Contained));
    assert_eq!(outcome.resolution, Resolution::ModelTrusted);
    assert!(!outcome.contains_profanity);
}

#[tokio::test]
async fn unrelated_echo_falls_back() {
    let model = ScriptedModel::new(Behavior::EchoOf("hi"));
    let m = moderator_with(model.clone(), FallbackPolicy::Strict);
    let outcome = m.moderate("good morning everyone").await;
    assert_eq!(
        outcome.resolution,
        Resolution::Fallback(FallbackReason::FidelityRejected)
    );
    // strict fallback masks a clean message it could not verify
    assert_eq!(outcome.response.moderated_message, "*********************");
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn deterministic_fallback_passes_clean_text() {
    let m = moderator_with(Arc::new(NoopModel), FallbackPolicy::Deterministic);
    let outcome = m.moderate("good morning everyone").await;
    assert_eq!(outcome.response.moderated_message, "good morning everyone");
    assert!(!outcome.contains_profanity);
}

// ============================================================
// Retry behaviour
// ============================================================

#[tokio::test]
async fn rate_limit_skips_retries() {
    let model = ScriptedModel::new(Behavior::RateLimited);
    let m = moderator_with(model.clone(), FallbackPolicy::Strict);
    let (outcome, trace) = m.moderate_traced("good morning").await;
    assert_eq!(model.calls(), 1);
    assert_eq!(
        outcome.resolution,
        Resolution::Fallback(FallbackReason::RateLimited)
    );
    assert_eq!(trace.attempts[0].status, AttemptStatus::RateLimited);
}

/// A provider behind a request pacer: the first request gets a 429 with a
/// long Retry-After, later ones would succeed.
struct PacedModel {
    pacer: RequestPacer,
    sent: AtomicU32,
}

#[async_trait]
impl ModerationModel for PacedModel {
    async fn call_model(&self, prompt: &str) -> Result<String, ModelError> {
        self.pacer.acquire().await?;
        if self.sent.fetch_add(1, Ordering::SeqCst) == 0 {
            let retry_after = Duration::from_secs(60);
            self.pacer.defer(retry_after).await;
            return Err(ModelError::RateLimited {
                retry_after: Some(retry_after),
            });
        }
        let text = message_from_prompt(prompt);
        Ok(reply(&text, &text, false))
    }
}

#[tokio::test]
async fn retry_after_window_falls_back_without_waiting() {
    let model = Arc::new(PacedModel {
        pacer: RequestPacer::new(0.0),
        sent: AtomicU32::new(0),
    });
    let m = moderator_with(model.clone(), FallbackPolicy::Deterministic);

    let first = m.moderate("good morning").await;
    assert_eq!(first.resolution, Resolution::Fallback(FallbackReason::RateLimited));

    // the attempt fails fast instead of sleeping into the 50ms timeout
    let (second, trace) = m.moderate_traced("good evening").await;
    assert_eq!(second.resolution, Resolution::Fallback(FallbackReason::RateLimited));
    assert_eq!(trace.attempts.len(), 1);
    assert_eq!(trace.attempts[0].status, AttemptStatus::RateLimited);
    assert_eq!(second.response.moderated_message, "good evening");
    // nothing reached the provider during the window
    assert_eq!(model.sent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn timeouts_are_retried_then_fall_back() {
    let (outcome, trace) = moderator(Behavior::Timeout)
        .moderate_traced("you are a fuk")
        .await;
    assert_eq!(trace.attempts.len(), 2);
    assert!(trace
        .attempts
        .iter()
        .all(|a| a.status == AttemptStatus::Timeout));
    assert_eq!(
        outcome.resolution,
        Resolution::Fallback(FallbackReason::AttemptsExhausted)
    );
    assert_eq!(outcome.response.moderated_message, "you are a ***");
}

#[tokio::test]
async fn garbage_replies_are_unparseable() {
    let model = ScriptedModel::new(Behavior::Garbage);
    let m = moderator_with(model.clone(), FallbackPolicy::Strict);
    let outcome = m.moderate("f@ck you").await;
    assert_eq!(
        outcome.resolution,
        Resolution::Fallback(FallbackReason::Unparseable)
    );
    let moderated = &outcome.response.moderated_message;
    assert!(moderated.starts_with("****") && moderated.ends_with(" you"), "{moderated:?}");
    assert_eq!(model.calls(), 2);
}

// ============================================================
// Properties
// ============================================================

#[tokio::test]
async fn redaction_is_idempotent_with_responsive_models() {
    let inputs = [
        "fuck you",
        "f u c k",
        "hello, how are you?",
        "dcm this game",
        "well, shit happens",
        "",
    ];
    for behavior in [Behavior::WellBehaved, Behavior::AlwaysFalse] {
        let m = moderator(behavior);
        for text in inputs {
            let once = m.filter_profanity(text).await;
            let twice = m.filter_profanity(&once).await;
            assert_eq!(once, twice, "{text:?}");
        }
    }
}

#[tokio::test]
async fn redaction_is_idempotent_under_deterministic_fallback() {
    let m = moderator_with(Arc::new(NoopModel), FallbackPolicy::Deterministic);
    for text in ["you are a fuk", "what the fuuuck", "oh f u c k", "plain text"] {
        let once = m.filter_profanity(text).await;
        assert_eq!(m.filter_profanity(&once).await, once, "{text:?}");
    }
}

#[tokio::test]
async fn fallback_output_preserves_length() {
    let m = moderator_with(Arc::new(NoopModel), FallbackPolicy::Strict);
    for text in ["đụ má mày", "good morning", "you are a fuk", "Ünïcödé ok", "f.u.c.k!!"] {
        let out = m.filter_profanity(text).await;
        assert_eq!(out.chars().count(), text.chars().count(), "{text:?} -> {out:?}");
    }
}

#[tokio::test]
async fn blank_input_is_returned_unchanged() {
    let m = moderator(Behavior::Garbage);
    assert_eq!(m.filter_profanity("").await, "");
    assert_eq!(m.filter_profanity("  \n").await, "  \n");
    assert!(!m.contains_profanity("   ").await);
}

#[tokio::test]
async fn concurrent_calls_are_independent() {
    let m = moderator(Behavior::WellBehaved);
    let texts = ["fuck you", "hello there", "dcm this game", "good morning"];
    let results = futures::future::join_all(texts.iter().map(|t| m.moderate(t))).await;
    let flags: Vec<bool> = results.iter().map(|o| o.contains_profanity).collect();
    assert_eq!(flags, vec![true, false, true, false]);
}

// ============================================================
// Verbose trace
// ============================================================

#[tokio::test]
async fn verbose_trace_reports_stages_and_attempts() {
    let trace = moderator(Behavior::WellBehaved)
        .contains_profanity_verbose("hello, how are you?")
        .await;
    assert_eq!(trace.stages.len(), 8);
    assert_eq!(trace.fired_stages().count(), 0);
    assert_eq!(trace.attempts.len(), 1);
    assert_eq!(trace.attempts[0].status, AttemptStatus::Success);
    assert!(!trace.verdict);
    assert!(!trace.override_fired);

    let json = serde_json::to_value(&trace).unwrap();
    assert_eq!(json["resolution"], "model_trusted");
    assert_eq!(json["model"], "scripted");
}

#[tokio::test]
async fn verbose_trace_shows_short_circuit() {
    let model = ScriptedModel::new(Behavior::WellBehaved);
    let m = moderator_with(model.clone(), FallbackPolicy::Strict);
    let trace = m.contains_profanity_verbose("f u c k").await;
    assert!(trace.verdict);
    assert!(trace.short_circuited);
    assert!(trace.fired_stages().count() >= 1);
    assert_eq!(model.calls(), 0);
}
