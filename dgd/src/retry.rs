//! Retry execution with exponential backoff
//!
//! All retry scheduling for generation calls lives here. The wrapped
//! operation makes exactly one attempt per invocation; this executor
//! decides, through classification, whether another attempt is worth
//! scheduling and how long to wait.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::classify::{ErrorKind, classify};
use crate::config::RetryConfig;
use crate::llm::GenerationError;

/// A value produced by [`RetryExecutor::execute`], with the attempts
/// it took to get there
#[derive(Debug)]
pub struct RetrySuccess<T> {
    pub value: T,
    /// Total attempts made, including the first
    pub attempts: u32,
}

/// A generation failure that survived retrying
#[derive(Debug, Error)]
#[error("{message} (kind: {kind}, attempts: {attempts})")]
pub struct RetryError {
    /// Classified failure kind of the last attempt
    pub kind: ErrorKind,
    /// Total attempts made, including the first
    pub attempts: u32,
    /// User-facing message from classification
    pub message: String,
    /// Raw fault of the last attempt
    #[source]
    pub source: GenerationError,
}

/// Counters across all operations run through one executor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryStats {
    /// Individual attempts, including first tries
    pub attempts: u64,

    /// Attempts scheduled beyond an operation's first try
    pub retries: u64,

    /// Operations that succeeded only after retrying
    pub retry_successes: u64,

    /// Operations that failed with the retry budget spent
    pub exhausted: u64,

    /// Operations that failed on a non-retryable classification
    pub non_retryable: u64,

    /// Every failed attempt, by classified kind
    pub failures_by_kind: HashMap<ErrorKind, u64>,
}

/// Runs operations under the configured retry policy
#[derive(Debug)]
pub struct RetryExecutor {
    policy: RetryConfig,
    stats: Mutex<RetryStats>,
}

impl RetryExecutor {
    pub fn new(policy: RetryConfig) -> Self {
        Self {
            policy,
            stats: Mutex::new(RetryStats::default()),
        }
    }

    /// Run `op` until it succeeds, fails unretryably, or exhausts the
    /// retry budget
    ///
    /// A policy with `max_retries` N allows N+1 attempts in total. Only
    /// failures classified retryable are attempted again.
    pub async fn execute<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<RetrySuccess<T>, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        let mut attempts = 0u32;

        loop {
            self.stats.lock().await.attempts += 1;

            match op().await {
                Ok(value) => {
                    if attempts > 0 {
                        self.stats.lock().await.retry_successes += 1;
                        debug!(op = op_name, attempts = attempts + 1, "execute: succeeded after retrying");
                    }
                    return Ok(RetrySuccess {
                        value,
                        attempts: attempts + 1,
                    });
                }
                Err(error) => {
                    attempts += 1;
                    let classification = classify(&error);

                    let mut stats = self.stats.lock().await;
                    *stats.failures_by_kind.entry(classification.kind).or_insert(0) += 1;

                    if !classification.retryable || attempts > self.policy.max_retries {
                        if classification.retryable {
                            stats.exhausted += 1;
                        } else {
                            stats.non_retryable += 1;
                        }
                        drop(stats);

                        warn!(
                            op = op_name,
                            attempts,
                            kind = %classification.kind,
                            error = %error,
                            "execute: giving up"
                        );
                        return Err(RetryError {
                            kind: classification.kind,
                            attempts,
                            message: classification.message,
                            source: error,
                        });
                    }

                    stats.retries += 1;
                    drop(stats);

                    let delay = self.delay_for(attempts - 1);
                    warn!(
                        op = op_name,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        kind = %classification.kind,
                        "execute: retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn delay_for(&self, retry_index: u32) -> Duration {
        apply_jitter(backoff_delay(&self.policy, retry_index), self.policy.jitter_range)
    }

    /// Snapshot of the counters
    pub async fn stats(&self) -> RetryStats {
        self.stats.lock().await.clone()
    }
}

/// Deterministic backoff before retry number `retry_index` (0-based):
/// exponential growth capped at the ceiling, jitter applied afterwards
fn backoff_delay(policy: &RetryConfig, retry_index: u32) -> Duration {
    Duration::from_millis(policy.base_delay_ms)
        .mul_f64(policy.backoff_multiplier.powi(retry_index as i32))
        .min(Duration::from_millis(policy.max_delay_ms))
}

fn apply_jitter(delay: Duration, jitter_range: f64) -> Duration {
    if jitter_range <= 0.0 {
        return delay;
    }
    let factor = 1.0 + rand::rng().random_range(-jitter_range..=jitter_range);
    delay.mul_f64(factor.max(0.0))
}

/// Canned substitute payload for a named operation
///
/// Whether a failure deserves the fallback (only auth and rate-limit
/// classifications do) is the caller's decision, not this function's.
/// The payload always passes validation.
pub fn fallback_payload(op_name: &str, context: &str) -> Option<String> {
    match op_name {
        "generate_diagram" => {
            let label = if context.trim().is_empty() {
                "Requested diagram".to_string()
            } else {
                sanitize_label(context)
            };
            Some(format!(
                "flowchart TD\n  A[{label}] --> B[Generation temporarily unavailable]\n  B --> C[Please try again shortly]"
            ))
        }
        _ => None,
    }
}

/// Keep fallback labels inside one bracket pair: printable text only,
/// truncated, with bracket characters dropped
fn sanitize_label(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '(' | ')' | '{' | '}' | '|' | '\n' | '\r'))
        .collect();
    let cleaned = cleaned.trim();
    let truncated: String = cleaned.chars().take(60).collect();
    if truncated.is_empty() {
        "Requested diagram".to_string()
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
            jitter_range: 0.0,
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let executor = RetryExecutor::new(fast_policy());
        let result: Result<RetrySuccess<u32>, _> = executor.execute("op", || async { Ok(7) }).await;

        let success = result.unwrap();
        assert_eq!(success.value, 7);
        assert_eq!(success.attempts, 1);
        let stats = executor.stats().await;
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.retries, 0);
        assert_eq!(stats.retry_successes, 0);
        assert!(stats.failures_by_kind.is_empty());
    }

    #[tokio::test]
    async fn test_retryable_failure_then_success() {
        let executor = RetryExecutor::new(fast_policy());
        let calls = AtomicU32::new(0);

        let result = executor
            .execute("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(GenerationError::Timeout(Duration::from_secs(1)))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        let success = result.unwrap();
        assert_eq!(success.value, "done");
        assert_eq!(success.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let stats = executor.stats().await;
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.retry_successes, 1);
        assert_eq!(stats.exhausted, 0);
        assert_eq!(stats.failures_by_kind.get(&ErrorKind::Timeout), Some(&2));
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let executor = RetryExecutor::new(fast_policy());
        let calls = AtomicU32::new(0);

        let result: Result<RetrySuccess<()>, _> = executor
            .execute("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(GenerationError::Api {
                        status: 401,
                        message: "bad key".to_string(),
                    })
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Auth);
        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = executor.stats().await;
        assert_eq!(stats.non_retryable, 1);
        assert_eq!(stats.exhausted, 0);
        assert_eq!(stats.failures_by_kind.get(&ErrorKind::Auth), Some(&1));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_reports_attempts() {
        let executor = RetryExecutor::new(fast_policy());
        let calls = AtomicU32::new(0);

        let result: Result<RetrySuccess<()>, _> = executor
            .execute("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GenerationError::Timeout(Duration::from_secs(1))) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        // max_retries 3 allows 4 attempts in total
        assert_eq!(err.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(err.to_string().contains("attempts: 4"));

        let stats = executor.stats().await;
        assert_eq!(stats.attempts, 4);
        assert_eq!(stats.retries, 3);
        assert_eq!(stats.exhausted, 1);
        assert_eq!(stats.non_retryable, 0);
        assert_eq!(stats.failures_by_kind.get(&ErrorKind::Timeout), Some(&4));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryConfig {
            max_retries: 4,
            base_delay_ms: 100,
            max_delay_ms: 300,
            backoff_multiplier: 2.0,
            jitter_range: 0.25,
        };

        assert_eq!(backoff_delay(&policy, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(&policy, 1), Duration::from_millis(200));
        // capped at the ceiling from the third retry on
        assert_eq!(backoff_delay(&policy, 2), Duration::from_millis(300));
        assert_eq!(backoff_delay(&policy, 3), Duration::from_millis(300));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let delay = Duration::from_millis(1_000);
        for _ in 0..100 {
            let jittered = apply_jitter(delay, 0.25);
            assert!(jittered >= Duration::from_millis(750));
            assert!(jittered <= Duration::from_millis(1_250));
        }
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let delay = Duration::from_millis(500);
        assert_eq!(apply_jitter(delay, 0.0), delay);
    }

    #[test]
    fn test_fallback_known_operation_only() {
        assert!(fallback_payload("generate_diagram", "login flow").is_some());
        assert!(fallback_payload("render_layout", "login flow").is_none());
        assert!(fallback_payload("", "login flow").is_none());
    }

    #[test]
    fn test_fallback_payload_is_valid_diagram() {
        let payload = fallback_payload("generate_diagram", "user [login] flow").unwrap();
        let result = diagramscript::Validator::default().validate(&payload, None);
        assert!(result.is_valid, "fallback must validate: {:?}", result.issues);
        assert!(!payload.contains("[login]"));
    }
}
