//! Bounded retry with linear backoff.
//!
//! Each attempt is caught and logged here; only exhaustion or a fatal error
//! leaves the loop. Backoff between attempts is `2 * attempt` units, scaled
//! up for rate limiting and upstream faults.

use crate::error::{EnrichError, EnrichResult};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Retry knobs, stored in the workspace config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_unit_ms: u64,
    pub rate_limit_multiplier: u32,
    pub upstream_multiplier: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit_ms: 1000,
            rate_limit_multiplier: 4,
            upstream_multiplier: 2,
        }
    }
}

/// Blocking sleep, swappable in tests.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// What an attempt knows about its place in the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptContext {
    /// 1-based.
    pub attempt: u32,
    pub max_attempts: u32,
    /// Error message from the previous attempt.
    pub previous_error: Option<String>,
}

impl AttemptContext {
    pub fn is_retry(&self) -> bool {
        self.attempt > 1
    }

    pub fn is_last(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// One finished attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub error: Option<String>,
    pub duration: Duration,
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Attempt(u32),
    Fallback,
}

/// A value produced by an attempt or by the fallback.
#[derive(Debug)]
pub struct Resolved<T> {
    pub value: T,
    pub resolution: Resolution,
    pub history: Vec<AttemptRecord>,
}

impl<T> Resolved<T> {
    pub fn attempts(&self) -> u32 {
        u32::try_from(self.history.len()).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    settings: RetrySettings,
}

impl RetryPolicy {
    pub fn new(settings: RetrySettings) -> Self {
        Self { settings }
    }

    pub fn max_attempts(&self) -> u32 {
        self.settings.max_attempts.max(1)
    }

    /// Sleep before the attempt that follows a failure on `attempt`.
    pub fn backoff_after(&self, attempt: u32, error: &EnrichError) -> Duration {
        let multiplier = error.backoff_multiplier(
            self.settings.rate_limit_multiplier,
            self.settings.upstream_multiplier,
        );
        let units = 2u64
            .saturating_mul(u64::from(attempt))
            .saturating_mul(u64::from(multiplier.max(1)));
        Duration::from_millis(self.settings.backoff_unit_ms.saturating_mul(units))
    }

    /// Run attempts until one succeeds; exhaustion is an error.
    pub fn run<T>(
        &self,
        label: &str,
        sleeper: &dyn Sleeper,
        attempt_fn: impl FnMut(&AttemptContext) -> EnrichResult<T>,
    ) -> EnrichResult<Resolved<T>> {
        match self.drive(label, sleeper, attempt_fn)? {
            Ok(resolved) => Ok(resolved),
            Err((history, last_error)) => Err(EnrichError::RetriesExhausted {
                phase: label.to_string(),
                attempts: u32::try_from(history.len()).unwrap_or(u32::MAX),
                last_error,
            }),
        }
    }

    /// Run attempts, and invoke `fallback` exactly once if all of them fail.
    ///
    /// Fatal errors still propagate without calling the fallback.
    pub fn run_with_fallback<T>(
        &self,
        label: &str,
        sleeper: &dyn Sleeper,
        attempt_fn: impl FnMut(&AttemptContext) -> EnrichResult<T>,
        fallback: impl FnOnce(&str) -> EnrichResult<T>,
    ) -> EnrichResult<Resolved<T>> {
        match self.drive(label, sleeper, attempt_fn)? {
            Ok(resolved) => Ok(resolved),
            Err((history, last_error)) => {
                tracing::warn!(
                    label,
                    attempts = history.len(),
                    last_error = %last_error,
                    "retries exhausted; synthesizing fallback"
                );
                let value = fallback(&last_error)?;
                Ok(Resolved {
                    value,
                    resolution: Resolution::Fallback,
                    history,
                })
            }
        }
    }

    /// Inner loop. `Ok(Err(..))` means exhausted; `Err(..)` means fatal.
    #[allow(clippy::type_complexity)]
    fn drive<T>(
        &self,
        label: &str,
        sleeper: &dyn Sleeper,
        mut attempt_fn: impl FnMut(&AttemptContext) -> EnrichResult<T>,
    ) -> EnrichResult<Result<Resolved<T>, (Vec<AttemptRecord>, String)>> {
        let max_attempts = self.max_attempts();
        let mut history = Vec::new();
        let mut previous_error: Option<String> = None;

        for attempt in 1..=max_attempts {
            let ctx = AttemptContext {
                attempt,
                max_attempts,
                previous_error: previous_error.clone(),
            };
            let start = Instant::now();
            match attempt_fn(&ctx) {
                Ok(value) => {
                    history.push(AttemptRecord {
                        attempt,
                        error: None,
                        duration: start.elapsed(),
                    });
                    if attempt > 1 {
                        tracing::info!(label, attempt, "retry succeeded");
                    }
                    return Ok(Ok(Resolved {
                        value,
                        resolution: Resolution::Attempt(attempt),
                        history,
                    }));
                }
                Err(err) => {
                    let message = err.to_string();
                    history.push(AttemptRecord {
                        attempt,
                        error: Some(message.clone()),
                        duration: start.elapsed(),
                    });
                    tracing::warn!(label, attempt, max_attempts, error = %message, "attempt failed");
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    if attempt < max_attempts {
                        sleeper.sleep(self.backoff_after(attempt, &err));
                    }
                    previous_error = Some(message);
                }
            }
        }

        let last_error = previous_error.unwrap_or_else(|| "unknown error".to_string());
        Ok(Err((history, last_error)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use std::cell::Cell;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper {
        naps: Mutex<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.naps.lock().unwrap().push(duration);
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(RetrySettings {
            backoff_unit_ms: 10,
            ..RetrySettings::default()
        })
    }

    #[test]
    fn succeeds_after_k_failures_with_k_plus_one_attempts() {
        for k in 0..3u32 {
            let sleeper = RecordingSleeper::default();
            let calls = Cell::new(0u32);
            let resolved = policy()
                .run("test", &sleeper, |ctx| {
                    calls.set(calls.get() + 1);
                    if ctx.attempt <= k {
                        Err(EnrichError::parse("bad"))
                    } else {
                        Ok(ctx.attempt)
                    }
                })
                .expect("resolved");
            assert_eq!(resolved.value, k + 1);
            assert_eq!(resolved.attempts(), k + 1);
            assert_eq!(resolved.resolution, Resolution::Attempt(k + 1));
            assert_eq!(calls.get(), k + 1);
            assert_eq!(sleeper.naps.lock().unwrap().len(), k as usize);
        }
    }

    #[test]
    fn always_failing_invokes_fallback_exactly_once() {
        let sleeper = RecordingSleeper::default();
        let fallback_calls = Cell::new(0u32);
        let resolved = policy()
            .run_with_fallback(
                "test",
                &sleeper,
                |_| -> EnrichResult<&str> { Err(EnrichError::parse("never")) },
                |last| {
                    fallback_calls.set(fallback_calls.get() + 1);
                    assert!(last.contains("never"));
                    Ok("fallback")
                },
            )
            .expect("resolved");
        assert_eq!(resolved.value, "fallback");
        assert_eq!(resolved.resolution, Resolution::Fallback);
        assert_eq!(resolved.attempts(), 3);
        assert_eq!(fallback_calls.get(), 1);
    }

    #[test]
    fn exhaustion_without_fallback_is_an_error() {
        let sleeper = RecordingSleeper::default();
        let err = policy()
            .run("repair", &sleeper, |_| -> EnrichResult<()> {
                Err(EnrichError::parse("nope"))
            })
            .unwrap_err();
        match err {
            EnrichError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn backoff_is_linear_and_longer_for_rate_limits() {
        let sleeper = RecordingSleeper::default();
        let _ = policy().run("test", &sleeper, |ctx| -> EnrichResult<()> {
            if ctx.attempt == 1 {
                Err(LlmError::RateLimited("429".to_string()).into())
            } else {
                Err(EnrichError::parse("bad"))
            }
        });
        let naps = sleeper.naps.lock().unwrap().clone();
        // attempt 1: 10ms * 2 * 1 * 4; attempt 2: 10ms * 2 * 2
        assert_eq!(naps, vec![Duration::from_millis(80), Duration::from_millis(40)]);
    }

    #[test]
    fn fatal_error_stops_without_fallback() {
        let sleeper = RecordingSleeper::default();
        let calls = Cell::new(0u32);
        let err = policy()
            .run_with_fallback(
                "test",
                &sleeper,
                |_| -> EnrichResult<()> {
                    calls.set(calls.get() + 1);
                    Err(LlmError::Unauthorized("bad key".to_string()).into())
                },
                |_| panic!("fallback must not run"),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            EnrichError::UpstreamApiError(LlmError::Unauthorized(_))
        ));
        assert_eq!(calls.get(), 1);
        assert!(sleeper.naps.lock().unwrap().is_empty());
    }

    #[test]
    fn previous_error_is_threaded_into_next_attempt() {
        let sleeper = RecordingSleeper::default();
        let resolved = policy()
            .run("test", &sleeper, |ctx| {
                if ctx.attempt == 1 {
                    assert!(ctx.previous_error.is_none());
                    Err(EnrichError::parse("missing braces"))
                } else {
                    Ok(ctx.previous_error.clone())
                }
            })
            .expect("resolved");
        assert!(resolved.value.unwrap().contains("missing braces"));
    }
}
