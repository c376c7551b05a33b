// Verbose diagnostics for one moderation call.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::response::{ModerationResponse, Resolution};
use super::retry::AttemptRecord;
use super::validate::{Fidelity, ParseStrategy};
use crate::detect::result::{DetectionResult, StageReport};

/// Everything that happened while moderating one message: what each
/// detector stage saw, every model attempt, how the reply was parsed and
/// whether an override fired.
#[derive(Debug, Clone, Serialize)]
pub struct ModerationTrace {
    pub started_at: DateTime<Utc>,
    pub input_chars: usize,
    pub model: String,
    pub stages: Vec<StageReport>,
    pub deterministic: DetectionResult,
    pub short_circuited: bool,
    pub attempts: Vec<AttemptRecord>,
    pub parse_strategy: Option<ParseStrategy>,
    pub fidelity: Option<Fidelity>,
    pub override_fired: bool,
    pub resolution: Resolution,
    pub verdict: bool,
    pub response: ModerationResponse,
    pub total_ms: u64,
}

impl ModerationTrace {
    /// Stages that found something.
    pub fn fired_stages(&self) -> impl Iterator<Item = &StageReport> {
        self.stages.iter().filter(|s| s.fired())
    }
}
