use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::model::openai::{DEFAULT_API_URL, DEFAULT_MODEL_NAME};
use crate::moderation::policy::{FallbackPolicy, ModerationSettings, Sensitivity};
use crate::moderation::retry::RetryPolicy;

/// Which moderation model backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelBackend {
    /// Any OpenAI-compatible chat-completions endpoint.
    OpenAi,
    /// No model: the deterministic detector and fallback do all the work.
    None,
}

/// Central configuration loaded from environment variables.
///
/// Secrets come from env vars only. The .env file is loaded automatically
/// at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    pub model_backend: ModelBackend,
    pub api_key: String,
    pub api_url: String,
    pub model_name: String,
    /// Per-attempt model timeout, enforced by the orchestrator.
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Linear backoff base: attempt n waits `backoff * n` before retrying.
    pub backoff: Duration,
    /// Client-side pacing of model requests.
    pub requests_per_second: f64,
    pub sensitivity: Sensitivity,
    /// Fidelity ratio; defaults to the sensitivity's threshold.
    pub fidelity_threshold: f64,
    /// Explicit HUSH_FALLBACK, if set.
    pub fallback: Option<FallbackPolicy>,
    /// Lexicon JSON file. None means the built-in lexicon.
    pub lexicon_path: Option<PathBuf>,
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => match raw.trim().parse::<T>() {
            Ok(value) => Ok(value),
            Err(e) => bail!("{name} has an invalid value {raw:?}: {e}"),
        },
        _ => Ok(default),
    }
}

/// `<config dir>/hush/lexicon.json`, if that file exists.
pub fn default_lexicon_path() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("hush").join("lexicon.json");
    path.is_file().then_some(path)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
            .context("Invalid configuration in environment")
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let api_key = get("HUSH_API_KEY").unwrap_or_default();

        let model_backend = match get("HUSH_MODEL").as_deref().map(str::trim) {
            Some("openai") => ModelBackend::OpenAi,
            Some("none") => ModelBackend::None,
            Some(other) => bail!("HUSH_MODEL has an unknown backend {other:?} (expected openai or none)"),
            None if !api_key.is_empty() => ModelBackend::OpenAi,
            None => ModelBackend::None,
        };

        let sensitivity = match get("HUSH_SENSITIVITY") {
            Some(raw) => raw.parse::<Sensitivity>()?,
            None => Sensitivity::default(),
        };
        let fidelity_threshold =
            parse_var(&lookup, "HUSH_FIDELITY_THRESHOLD", sensitivity.threshold())?;
        if !fidelity_threshold.is_finite() || fidelity_threshold < 1.0 {
            bail!("HUSH_FIDELITY_THRESHOLD must be a ratio of at least 1.0, got {fidelity_threshold}");
        }

        let max_attempts = parse_var(&lookup, "HUSH_MAX_ATTEMPTS", 3u32)?;
        if max_attempts == 0 {
            bail!("HUSH_MAX_ATTEMPTS must be at least 1");
        }
        let timeout_secs = parse_var(&lookup, "HUSH_TIMEOUT_SECS", 15u64)?;
        if timeout_secs == 0 {
            bail!("HUSH_TIMEOUT_SECS must be at least 1");
        }
        let requests_per_second = parse_var(&lookup, "HUSH_REQUESTS_PER_SECOND", 2.0f64)?;
        if !requests_per_second.is_finite() || requests_per_second < 0.0 {
            bail!("HUSH_REQUESTS_PER_SECOND must be a non-negative number");
        }

        let fallback = match get("HUSH_FALLBACK") {
            Some(raw) => Some(raw.parse::<FallbackPolicy>()?),
            None => None,
        };

        let lexicon_path = get("HUSH_LEXICON_PATH")
            .map(PathBuf::from)
            .or_else(default_lexicon_path);

        Ok(Self {
            model_backend,
            api_key,
            api_url: get("HUSH_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            model_name: get("HUSH_MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
            timeout: Duration::from_secs(timeout_secs),
            max_attempts,
            backoff: Duration::from_millis(parse_var(&lookup, "HUSH_BACKOFF_MS", 1000u64)?),
            requests_per_second,
            sensitivity,
            fidelity_threshold,
            fallback,
            lexicon_path,
        })
    }

    /// Check that the model backend has what it needs.
    /// Call this before building an HTTP model client.
    pub fn require_model(&self) -> Result<()> {
        if self.model_backend == ModelBackend::OpenAi && self.api_key.is_empty() {
            bail!(
                "HUSH_API_KEY not set. Add it to your .env file, or set HUSH_MODEL=none\n\
                 to run with the deterministic detector only."
            );
        }
        Ok(())
    }

    /// The fallback policy in effect: the explicit setting, otherwise
    /// strict with a model and deterministic without one.
    pub fn fallback_policy(&self) -> FallbackPolicy {
        self.fallback.unwrap_or(match self.model_backend {
            ModelBackend::OpenAi => FallbackPolicy::Strict,
            ModelBackend::None => FallbackPolicy::Deterministic,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.backoff,
            timeout: self.timeout,
        }
    }

    pub fn moderation_settings(&self) -> ModerationSettings {
        ModerationSettings {
            fidelity_threshold: self.fidelity_threshold,
            fallback: self.fallback_policy(),
            retry: self.retry_policy(),
        }
    }
}
