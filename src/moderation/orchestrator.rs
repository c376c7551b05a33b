// The Moderator: one call per message, no state shared between calls.
//
// Blank input is returned as is. Otherwise the deterministic detector runs
// first and its verdict is kept for the whole call. The detect path stops
// there when the detector flags; the moderate path always asks the model,
// retrying with linear backoff, and hands the reply to the validator. When
// no reply is usable the validator's fallback produces the output.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::policy::ModerationSettings;
use super::response::{ModerationOutcome, ModerationResponse, Resolution};
use super::retry::{run_attempts, AttemptOutcome, RetryPolicy};
use super::trace::ModerationTrace;
use super::validate::{Validated, Validator};
use crate::censor::{mask_all, redact};
use crate::config::Config;
use crate::detect::result::{DetectionResult, DetectionSource};
use crate::detect::scanner::EvasionDetector;
use crate::lexicon::store::LexiconStore;
use crate::model::prompt::PromptBuilder;
use crate::model::traits::ModerationModel;
use crate::output::truncate_chars;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryPoint {
    /// Boolean verdict only; may skip the model.
    Detect,
    /// Redacted text; always consults the model.
    Moderate,
}

pub struct Moderator {
    detector: EvasionDetector,
    validator: Validator,
    prompts: PromptBuilder,
    model: Arc<dyn ModerationModel>,
    retry: RetryPolicy,
}

impl Moderator {
    pub fn new(
        store: Arc<LexiconStore>,
        model: Arc<dyn ModerationModel>,
        settings: ModerationSettings,
    ) -> Self {
        let detector = EvasionDetector::new(Arc::clone(&store));
        let validator = Validator::new(
            detector.clone(),
            settings.fidelity_threshold,
            settings.fallback,
        );
        Self {
            detector,
            validator,
            prompts: PromptBuilder::new(store),
            model,
            retry: settings.retry,
        }
    }

    /// Build from configuration: loads the configured lexicon.
    pub fn from_config(config: &Config, model: Arc<dyn ModerationModel>) -> Result<Self> {
        let store = LexiconStore::load(config.lexicon_path.as_deref())?;
        Ok(Self::new(store, model, config.moderation_settings()))
    }

    pub fn detector(&self) -> &EvasionDetector {
        &self.detector
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Moderate one message: redacted text plus verdict.
    pub async fn moderate(&self, text: &str) -> ModerationOutcome {
        self.run(text, EntryPoint::Moderate, false).await.0
    }

    /// Moderate one message and report every step.
    pub async fn moderate_traced(&self, text: &str) -> (ModerationOutcome, ModerationTrace) {
        self.run(text, EntryPoint::Moderate, true).await
    }

    /// The redacted text. Never fails.
    pub async fn filter_profanity(&self, text: &str) -> String {
        self.moderate(text).await.response.moderated_message
    }

    /// Whether the message contains profanity. Never fails.
    pub async fn contains_profanity(&self, text: &str) -> bool {
        self.run(text, EntryPoint::Detect, false)
            .await
            .0
            .contains_profanity
    }

    /// The detect path with the full stage-by-stage trace.
    pub async fn contains_profanity_verbose(&self, text: &str) -> ModerationTrace {
        self.run(text, EntryPoint::Detect, true).await.1
    }

    async fn run(
        &self,
        text: &str,
        entry: EntryPoint,
        with_stages: bool,
    ) -> (ModerationOutcome, ModerationTrace) {
        let started_at = Utc::now();
        let started = Instant::now();

        let (deterministic, stages) = if with_stages {
            self.detector.trace(text)
        } else {
            (self.detector.scan(text), Vec::new())
        };

        let mut attempts = Vec::new();
        let validated = if text.trim().is_empty() {
            terminal(text, Resolution::Empty, false)
        } else if entry == EntryPoint::Detect && deterministic.is_flagged {
            debug!(
                terms = ?deterministic.matched_terms,
                "Deterministic pre-check flagged, skipping model"
            );
            let spans = self.detector.locate(text);
            let moderated = if spans.is_empty() {
                mask_all(text)
            } else {
                redact(text, &spans)
            };
            let mut validated = terminal(text, Resolution::ShortCircuit, true);
            validated.response = ModerationResponse::with_moderated(text, moderated);
            validated.response.language = deterministic.language.clone();
            validated
        } else {
            let prompt = self.prompts.build(text);
            let (outcome, records) = run_attempts(self.model.as_ref(), &prompt, &self.retry, |raw| {
                self.validator.accept(raw, text)
            })
            .await;
            attempts = records;
            match outcome {
                AttemptOutcome::Success { value, attempts: tried } => {
                    debug!(attempts = tried, "Model reply accepted");
                    self.validator.enforce(value, text, &deterministic)
                }
                AttemptOutcome::Fallback(reason) => {
                    self.validator.fallback(text, &deterministic, reason)
                }
            }
        };

        let Validated {
            response,
            contains_profanity,
            resolution,
            override_fired,
            fidelity,
            strategy,
            model_detection,
        } = validated;

        if override_fired {
            warn!(
                preview = %truncate_chars(text, 40),
                "Deterministic override fired"
            );
        }
        info!(
            resolution = %resolution,
            verdict = contains_profanity,
            modified = response.was_modified,
            "Moderated message"
        );

        let detection = deterministic.clone().merge(model_detection);
        let outcome = ModerationOutcome {
            response: response.clone(),
            contains_profanity,
            resolution,
            detection,
        };
        let trace = ModerationTrace {
            started_at,
            input_chars: text.chars().count(),
            model: self.model.name().to_string(),
            stages,
            short_circuited: resolution == Resolution::ShortCircuit,
            deterministic,
            attempts,
            parse_strategy: strategy,
            fidelity,
            override_fired,
            resolution,
            verdict: contains_profanity,
            response,
            total_ms: started.elapsed().as_millis() as u64,
        };
        (outcome, trace)
    }
}

/// A decision made without the model.
fn terminal(text: &str, resolution: Resolution, flagged: bool) -> Validated {
    Validated {
        response: ModerationResponse::unchanged(text),
        contains_profanity: flagged,
        resolution,
        override_fired: false,
        fidelity: None,
        strategy: None,
        model_detection: DetectionResult::clean(DetectionSource::Deterministic),
    }
}
