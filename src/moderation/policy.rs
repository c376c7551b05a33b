// Moderation tuning: sensitivity, fallback policy and retry settings.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::Serialize;

use super::retry::RetryPolicy;

/// How closely a model-echoed original must match the true input.
///
/// The threshold is a length ratio: the longer of the two may be at most
/// `threshold` times the shorter before the echo is considered a different
/// message altogether.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Low,
    #[default]
    Default,
    High,
}

impl Sensitivity {
    pub fn threshold(self) -> f64 {
        match self {
            Sensitivity::Low => 2.0,
            Sensitivity::Default => 1.5,
            Sensitivity::High => 1.2,
        }
    }
}

impl FromStr for Sensitivity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Sensitivity::Low),
            "default" | "" => Ok(Sensitivity::Default),
            "high" => Ok(Sensitivity::High),
            other => bail!("Unknown sensitivity {other:?} (expected low, default or high)"),
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sensitivity::Low => "low",
            Sensitivity::Default => "default",
            Sensitivity::High => "high",
        };
        f.write_str(name)
    }
}

/// What to do with a message the detector considers clean when no model
/// reply is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Mask the whole message and flag it.
    #[default]
    Strict,
    /// Trust the deterministic detector and pass the message through.
    Deterministic,
}

impl FromStr for FallbackPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(FallbackPolicy::Strict),
            "deterministic" => Ok(FallbackPolicy::Deterministic),
            other => bail!("Unknown fallback policy {other:?} (expected strict or deterministic)"),
        }
    }
}

impl fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackPolicy::Strict => f.write_str("strict"),
            FallbackPolicy::Deterministic => f.write_str("deterministic"),
        }
    }
}

/// Everything the orchestrator needs besides the lexicon and the model.
#[derive(Debug, Clone)]
pub struct ModerationSettings {
    pub fidelity_threshold: f64,
    pub fallback: FallbackPolicy,
    pub retry: RetryPolicy,
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            fidelity_threshold: Sensitivity::Default.threshold(),
            fallback: FallbackPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}
