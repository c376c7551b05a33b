// Model attempts with linear backoff, as an explicit state machine.
//
//   Attempting(n) ──ok──────────────────────────────▶ Done
//        │ transient error / timeout / bad reply
//        ├── n < max ──▶ Retrying(n) ──sleep base×n──▶ Attempting(n+1)
//        └── n = max ──▶ Fallback
//   rate limit or unavailable ────────────────────────▶ Fallback
//
// The orchestrator enforces its own timeout around every call. Sleeps are
// plain tokio sleeps, so dropping the moderation future cancels them.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use super::response::FallbackReason;
use crate::model::error::ModelError;
use crate::model::traits::ModerationModel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Backoff after attempt n is `base_delay * n`.
    pub base_delay: Duration,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt that follows failed attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    Timeout,
    RateLimited,
    Unavailable,
    Error,
    /// A reply arrived but could not be accepted.
    Rejected,
}

/// One model attempt, for the verbose trace.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub status: AttemptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub elapsed_ms: u64,
}

/// How the attempt loop ended.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success { value: T, attempts: u32 },
    Fallback(FallbackReason),
}

enum State<T> {
    Attempting(u32),
    Retrying { after: u32 },
    Fallback(FallbackReason),
    Done { value: T, attempts: u32 },
}

fn status_of(err: &ModelError) -> AttemptStatus {
    match err {
        ModelError::Timeout(_) => AttemptStatus::Timeout,
        ModelError::RateLimited { .. } => AttemptStatus::RateLimited,
        ModelError::Unavailable => AttemptStatus::Unavailable,
        _ => AttemptStatus::Error,
    }
}

fn next_after_failure<T>(attempt: u32, max: u32, reason: FallbackReason) -> State<T> {
    if attempt < max {
        State::Retrying { after: attempt }
    } else {
        State::Fallback(reason)
    }
}

/// Call the model until `accept` takes a reply, the attempts run out, or
/// the failure is one that retrying cannot fix.
pub async fn run_attempts<T, F>(
    model: &dyn ModerationModel,
    prompt: &str,
    policy: &RetryPolicy,
    mut accept: F,
) -> (AttemptOutcome<T>, Vec<AttemptRecord>)
where
    F: FnMut(&str) -> Result<T, FallbackReason>,
{
    let max = policy.max_attempts.max(1);
    let mut records = Vec::new();
    let mut state = State::Attempting(1);

    loop {
        state = match state {
            State::Attempting(attempt) => {
                let started = Instant::now();
                let result = tokio::time::timeout(policy.timeout, model.call_model(prompt))
                    .await
                    .unwrap_or_else(|_| Err(ModelError::Timeout(policy.timeout)));
                let elapsed_ms = started.elapsed().as_millis() as u64;

                match result {
                    Ok(raw) => match accept(&raw) {
                        Ok(value) => {
                            records.push(AttemptRecord {
                                attempt,
                                status: AttemptStatus::Success,
                                detail: None,
                                elapsed_ms,
                            });
                            State::Done {
                                value,
                                attempts: attempt,
                            }
                        }
                        Err(reason) => {
                            warn!(attempt, reason = %reason, "Model reply rejected");
                            records.push(AttemptRecord {
                                attempt,
                                status: AttemptStatus::Rejected,
                                detail: Some(reason.to_string()),
                                elapsed_ms,
                            });
                            next_after_failure(attempt, max, reason)
                        }
                    },
                    Err(err) => {
                        records.push(AttemptRecord {
                            attempt,
                            status: status_of(&err),
                            detail: Some(err.to_string()),
                            elapsed_ms,
                        });
                        if err.is_rate_limit() {
                            warn!(attempt, "Model rate limited, abandoning retries");
                            State::Fallback(FallbackReason::RateLimited)
                        } else if !err.is_retryable() {
                            debug!(attempt, error = %err, "Model unavailable");
                            State::Fallback(FallbackReason::ModelUnavailable)
                        } else {
                            warn!(attempt, error = %err, "Model call failed");
                            next_after_failure(attempt, max, FallbackReason::AttemptsExhausted)
                        }
                    }
                }
            }
            State::Retrying { after } => {
                let delay = policy.delay_for(after);
                debug!(
                    attempt = after + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before retry"
                );
                tokio::time::sleep(delay).await;
                State::Attempting(after + 1)
            }
            State::Fallback(reason) => return (AttemptOutcome::Fallback(reason), records),
            State::Done { value, attempts } => {
                return (AttemptOutcome::Success { value, attempts }, records)
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;

    #[derive(Clone, Copy)]
    enum Step {
        Reply(&'static str),
        Transport,
        RateLimited,
        Unavailable,
    }

    /// Replies from a script, one per call; the last entry repeats.
    struct Scripted {
        script: Vec<Step>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(script: Vec<Step>) -> Self {
            Self {
                script,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModerationModel for Scripted {
        async fn call_model(&self, _prompt: &str) -> Result<String, ModelError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.script[n.min(self.script.len() - 1)] {
                Step::Reply(reply) => Ok(reply.to_string()),
                Step::Transport => Err(ModelError::Transport("reset".to_string())),
                Step::RateLimited => Err(ModelError::RateLimited { retry_after: None }),
                Step::Unavailable => Err(ModelError::Unavailable),
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(200),
        }
    }

    fn accept_ok(raw: &str) -> Result<String, FallbackReason> {
        if raw == "ok" {
            Ok(raw.to_string())
        } else {
            Err(FallbackReason::Unparseable)
        }
    }

    #[test]
    fn backoff_is_linear() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(250),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(3), Duration::from_millis(750));
    }

    #[tokio::test]
    async fn transient_error_then_success() {
        let model = Scripted::new(vec![Step::Transport, Step::Reply("ok")]);
        let (outcome, records) = run_attempts(&model, "p", &fast_policy(3), accept_ok).await;
        assert!(matches!(outcome, AttemptOutcome::Success { attempts: 2, .. }));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, AttemptStatus::Error);
        assert_eq!(records[1].status, AttemptStatus::Success);
    }

    #[tokio::test]
    async fn rate_limit_aborts_immediately() {
        let model = Scripted::new(vec![Step::RateLimited]);
        let (outcome, records) = run_attempts(&model, "p", &fast_policy(5), accept_ok).await;
        assert!(matches!(
            outcome,
            AttemptOutcome::Fallback(FallbackReason::RateLimited)
        ));
        assert_eq!(model.calls(), 1);
        assert_eq!(records[0].status, AttemptStatus::RateLimited);
    }

    #[tokio::test]
    async fn malformed_replies_exhaust_attempts() {
        let model = Scripted::new(vec![Step::Reply("garbage")]);
        let (outcome, records) = run_attempts(&model, "p", &fast_policy(3), accept_ok).await;
        assert!(matches!(
            outcome,
            AttemptOutcome::Fallback(FallbackReason::Unparseable)
        ));
        assert_eq!(model.calls(), 3);
        assert!(records.iter().all(|r| r.status == AttemptStatus::Rejected));
    }

    #[tokio::test]
    async fn unavailable_skips_retries() {
        let model = Scripted::new(vec![Step::Unavailable]);
        let (outcome, _) = run_attempts(&model, "p", &fast_policy(3), accept_ok).await;
        assert!(matches!(
            outcome,
            AttemptOutcome::Fallback(FallbackReason::ModelUnavailable)
        ));
        assert_eq!(model.calls(), 1);
    }

    struct Slow;

    #[async_trait]
    impl ModerationModel for Slow {
        async fn call_model(&self, _prompt: &str) -> Result<String, ModelError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("ok".to_string())
        }
    }

    #[tokio::test]
    async fn timeouts_are_enforced_and_retried() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(20),
        };
        let (outcome, records) = run_attempts(&Slow, "p", &policy, accept_ok).await;
        assert!(matches!(
            outcome,
            AttemptOutcome::Fallback(FallbackReason::AttemptsExhausted)
        ));
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.status == AttemptStatus::Timeout));
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let model = Scripted::new(vec![Step::Reply("ok")]);
        let (outcome, _) = run_attempts(&model, "p", &fast_policy(0), accept_ok).await;
        assert!(matches!(outcome, AttemptOutcome::Success { attempts: 1, .. }));
    }
}
