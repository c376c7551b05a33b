// Request pacing for the model provider.
//
// Hands out request slots at most `requests_per_second` apart. Each caller
// reserves its slot under the lock and sleeps after releasing it, so
// concurrent moderation calls queue up without holding the lock across an
// await. After a 429 with Retry-After the provider is off limits until that
// moment: callers get `RateLimited` straight away instead of sleeping
// through the caller's timeout.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use super::error::ModelError;

#[derive(Clone)]
pub struct RequestPacer {
    inner: Arc<Mutex<PacerState>>,
}

struct PacerState {
    /// Minimum time between request starts.
    interval: Duration,
    /// Earliest instant the next request may start.
    next_slot: Option<Instant>,
    /// Set by a Retry-After; no request may start before it.
    deferred_until: Option<Instant>,
}

impl RequestPacer {
    /// A pacer allowing `requests_per_second` requests per second.
    /// Zero, negative or non-finite rates disable pacing, and so does a
    /// rate so small that its interval does not fit in a `Duration`.
    pub fn new(requests_per_second: f64) -> Self {
        let interval = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            Duration::try_from_secs_f64(1.0 / requests_per_second).unwrap_or_else(|_| {
                warn!(requests_per_second, "Request rate too small to pace, pacing disabled");
                Duration::ZERO
            })
        } else {
            Duration::ZERO
        };
        Self {
            inner: Arc::new(Mutex::new(PacerState {
                interval,
                next_slot: None,
                deferred_until: None,
            })),
        }
    }

    /// Wait for this caller's slot. Fails with `RateLimited` without
    /// waiting while a Retry-After deferral is in force.
    pub async fn acquire(&self) -> Result<(), ModelError> {
        let wait = {
            let mut state = self.inner.lock().await;
            let now = Instant::now();
            if let Some(until) = state.deferred_until {
                if until > now {
                    let remaining = until - now;
                    debug!(
                        remaining_ms = remaining.as_millis() as u64,
                        "Provider still rate limited, not sending"
                    );
                    return Err(ModelError::RateLimited {
                        retry_after: Some(remaining),
                    });
                }
                state.deferred_until = None;
            }
            let slot = match state.next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            state.next_slot = Some(slot + state.interval);
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "Pacing model request");
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }

    /// Refuse requests for at least `delay` from now.
    pub async fn defer(&self, delay: Duration) {
        let mut state = self.inner.lock().await;
        let Some(until) = Instant::now().checked_add(delay) else {
            return;
        };
        if state.deferred_until.map_or(true, |current| current < until) {
            state.deferred_until = Some(until);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_request_is_immediate() {
        let pacer = RequestPacer::new(1.0);
        let start = Instant::now();
        pacer.acquire().await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn second_request_waits_for_interval() {
        let pacer = RequestPacer::new(10.0); // 100ms apart
        pacer.acquire().await.unwrap();
        let start = Instant::now();
        pacer.acquire().await.unwrap();
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(80),
            "Expected ~100ms delay, got {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn zero_rate_disables_pacing() {
        let pacer = RequestPacer::new(0.0);
        let start = Instant::now();
        for _ in 0..20 {
            pacer.acquire().await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn vanishing_rate_disables_pacing_instead_of_panicking() {
        for rate in [1e-30, f64::MIN_POSITIVE] {
            let pacer = RequestPacer::new(rate);
            let start = Instant::now();
            pacer.acquire().await.unwrap();
            pacer.acquire().await.unwrap();
            assert!(start.elapsed() < Duration::from_millis(50), "rate {rate}");
        }
    }

    #[tokio::test]
    async fn deferral_fails_fast_then_expires() {
        let pacer = RequestPacer::new(0.0);
        pacer.defer(Duration::from_millis(100)).await;

        let start = Instant::now();
        let err = pacer.acquire().await.unwrap_err();
        assert!(start.elapsed() < Duration::from_millis(50));
        match err {
            ModelError::RateLimited { retry_after } => {
                assert!(retry_after.is_some_and(|d| d <= Duration::from_millis(100)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(pacer.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn shorter_deferral_does_not_shorten_a_longer_one() {
        let pacer = RequestPacer::new(0.0);
        pacer.defer(Duration::from_secs(60)).await;
        pacer.defer(Duration::from_millis(1)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(pacer.acquire().await.is_err());
    }
}
