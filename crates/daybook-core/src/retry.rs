//! Retry and write-verification primitives for the eventually-consistent
//! record store.
//!
//! The remote store's writes may not be immediately visible to subsequent
//! reads, so mutations run under [`with_retry`] and deletions are confirmed
//! with [`verify_deletion`]. Backoff is deterministic exponential with a
//! cap and no jitter.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::Result;

/// Backoff and budget configuration for a retried operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryOptions {
    /// Extra attempts after the first (an operation runs at most
    /// `max_retries + 1` times; a verification runs at most `max_retries`
    /// checks).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(2000),
            backoff_factor: 2.0,
        }
    }
}

impl RetryOptions {
    /// Budget used for the delete call itself.
    pub fn for_delete() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
            ..Self::default()
        }
    }

    /// Budget used when polling to confirm a deletion propagated.
    pub fn for_deletion_check() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(1000),
            backoff_factor: 1.5,
        }
    }
}

/// Delay before retry `attempt` (zero-based): `min(base * factor^attempt, max)`.
pub fn backoff_delay(opts: &RetryOptions, attempt: u32) -> Duration {
    let scaled = opts.base_delay.as_secs_f64() * opts.backoff_factor.powi(attempt as i32);
    Duration::from_secs_f64(scaled.min(opts.max_delay.as_secs_f64()))
}

/// Run `operation` up to `max_retries + 1` times, sleeping the backoff
/// delay between attempts.
///
/// The error from the final failing attempt is returned unchanged so
/// callers can still match on its variant. Retryability is the caller's
/// decision: non-retryable conditions should be handled before reaching
/// for this function.
pub async fn with_retry<T, F, Fut>(mut operation: F, opts: RetryOptions) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < opts.max_retries => {
                let delay = backoff_delay(&opts, attempt);
                debug!(
                    attempt,
                    max_retries = opts.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Outcome of a single deletion-verification probe.
///
/// A tri-state rather than a bare bool: a probe that fails for an
/// unrelated reason (say, a network error on the verification read) must
/// not be mistaken for a confirmed deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionCheck {
    /// The deleted state was observed (read came back empty/not-found).
    Deleted,
    /// The record is still visible.
    Present,
    /// The probe could not determine either way.
    Inconclusive,
}

/// Poll `check` up to `max_retries` times until it reports
/// [`DeletionCheck::Deleted`].
///
/// Each probe is preceded by the backoff delay (front-loaded: the store
/// needs time to propagate before the first look is worth taking).
/// Returns `true` on confirmation, `false` when the budget is exhausted
/// without one. Exhaustion is not an error; the caller decides whether it
/// is a warning or a hard failure.
pub async fn verify_deletion<F, Fut>(mut check: F, opts: RetryOptions) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DeletionCheck>,
{
    for attempt in 0..opts.max_retries {
        tokio::time::sleep(backoff_delay(&opts, attempt)).await;
        match check().await {
            DeletionCheck::Deleted => return true,
            outcome => {
                trace!(attempt, ?outcome, "deletion not yet confirmed");
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_backoff_delay_exponential_with_cap() {
        let opts = RetryOptions::default();
        assert_eq!(backoff_delay(&opts, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(&opts, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(&opts, 2), Duration::from_millis(400));
        // 100 * 2^6 = 6400 > 2000 cap
        assert_eq!(backoff_delay(&opts, 6), Duration::from_millis(2000));
    }

    #[test]
    fn test_backoff_delay_deletion_check_preset() {
        let opts = RetryOptions::for_deletion_check();
        assert_eq!(backoff_delay(&opts, 0), Duration::from_millis(200));
        assert_eq!(backoff_delay(&opts, 1), Duration::from_millis(300));
        assert_eq!(backoff_delay(&opts, 2), Duration::from_millis(450));
        // 200 * 1.5^5 = 1518.75 > 1000 cap
        assert_eq!(backoff_delay(&opts, 5), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_succeeds_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Error>(42)
                }
            },
            RetryOptions::default(),
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_recovers_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::Transport("flaky".into()))
                    } else {
                        Ok(7)
                    }
                }
            },
            RetryOptions::default(),
        )
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_exhaustion_surfaces_original_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let opts = RetryOptions {
            max_retries: 2,
            ..RetryOptions::default()
        };
        let result: Result<()> = with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Internal("boom".into()))
                }
            },
            opts,
        )
        .await;
        // 3 total invocations, original error intact
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(Error::Internal(msg)) => assert_eq!(msg, "boom"),
            other => panic!("expected Internal(boom), got {:?}", other.err()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_deletion_converges_with_exact_call_count() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let confirmed = verify_deletion(
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        DeletionCheck::Present
                    } else {
                        DeletionCheck::Deleted
                    }
                }
            },
            RetryOptions::for_deletion_check(),
        )
        .await;
        assert!(confirmed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_deletion_exhaustion_returns_false() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let opts = RetryOptions::for_deletion_check();
        let confirmed = verify_deletion(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    DeletionCheck::Present
                }
            },
            opts,
        )
        .await;
        assert!(!confirmed);
        assert_eq!(calls.load(Ordering::SeqCst), opts.max_retries);
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_deletion_inconclusive_is_not_confirmation() {
        let confirmed = verify_deletion(
            || async { DeletionCheck::Inconclusive },
            RetryOptions {
                max_retries: 2,
                ..RetryOptions::for_deletion_check()
            },
        )
        .await;
        assert!(!confirmed);
    }
}
