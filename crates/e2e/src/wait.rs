//! Condition waits with hard upper bounds
//!
//! These replace fixed sleeps: a wait returns as soon as its condition holds
//! and fails once its budget is spent.

use std::future::Future;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::{PollPolicy, SettlePolicy};
use crate::error::{E2eError, E2eResult};

/// Poll `probe` until it yields `Some`, or fail with `Timeout` after the budget.
///
/// Probe errors are returned immediately.
pub async fn poll_until<T, F, Fut>(what: &str, policy: &PollPolicy, mut probe: F) -> E2eResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<Option<T>>>,
{
    let deadline = Instant::now() + policy.timeout();
    let mut attempts = 0usize;

    loop {
        attempts += 1;
        if let Some(value) = probe().await? {
            debug!("{} ready after {} attempt(s)", what, attempts);
            return Ok(value);
        }

        if Instant::now() + policy.poll_interval() > deadline {
            return Err(E2eError::timeout(format!(
                "{} ({} attempts in {} ms)",
                what, attempts, policy.timeout_ms
            )));
        }
        sleep(policy.poll_interval()).await;
    }
}

/// Read `read` until it returns the same non-empty text `stable_reads` times in a row.
///
/// The returned text is the last read, untouched. Output that stays empty for
/// the whole budget settles to `""`; only output that keeps changing times out.
pub async fn until_stable<F, Fut>(what: &str, policy: &SettlePolicy, mut read: F) -> E2eResult<String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<String>>,
{
    let deadline = Instant::now() + policy.timeout();
    let required = policy.stable_reads.max(1);

    sleep(policy.initial_delay()).await;

    let mut last: Option<String> = None;
    let mut streak = 0usize;
    let mut empty_streak = 0usize;
    let mut reads = 0usize;

    loop {
        let current = read().await?;
        reads += 1;

        if current.is_empty() {
            streak = 0;
            empty_streak += 1;
        } else if last.as_deref() == Some(current.as_str()) {
            streak += 1;
            empty_streak = 0;
        } else {
            streak = 1;
            empty_streak = 0;
        }

        if streak >= required {
            debug!("{} settled after {} read(s)", what, reads);
            return Ok(current);
        }
        last = Some(current);

        if Instant::now() + policy.poll_interval() > deadline {
            if empty_streak >= required {
                debug!("{} stayed empty for {} read(s)", what, reads);
                return Ok(String::new());
            }
            return Err(E2eError::timeout(format!(
                "{} to settle ({} reads in {} ms, last: {:?})",
                what,
                reads,
                policy.timeout_ms,
                last.unwrap_or_default()
            )));
        }
        sleep(policy.poll_interval()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_settle(stable_reads: usize, timeout_ms: u64) -> SettlePolicy {
        SettlePolicy {
            initial_delay_ms: 0,
            poll_interval_ms: 1,
            stable_reads,
            timeout_ms,
        }
    }

    #[tokio::test]
    async fn test_poll_until_returns_first_value() {
        let calls = AtomicUsize::new(0);
        let policy = PollPolicy {
            poll_interval_ms: 1,
            timeout_ms: 1_000,
        };

        let value = poll_until("counter", &policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok((n >= 3).then_some(n)) }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let policy = PollPolicy {
            poll_interval_ms: 1,
            timeout_ms: 20,
        };
        let err = poll_until("never", &policy, || async { Ok(None::<()>) })
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::Timeout { stage: None, what } if what.starts_with("never")));
    }

    #[tokio::test]
    async fn test_until_stable_waits_for_value_to_stop_changing() {
        let reads = ["", "", "ම", "මම", "මම හෙට", "මම හෙට", "මම හෙට"];
        let calls = AtomicUsize::new(0);

        let text = until_stable("output", &fast_settle(2, 1_000), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            let value = reads[n.min(reads.len() - 1)].to_string();
            async move { Ok(value) }
        })
        .await
        .unwrap();

        assert_eq!(text, "මම හෙට");
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_until_stable_keeps_whitespace() {
        let text = until_stable("output", &fast_settle(2, 1_000), || async {
            Ok("a   b ".to_string())
        })
        .await
        .unwrap();
        assert_eq!(text, "a   b ");
    }

    #[tokio::test]
    async fn test_until_stable_empty_output_settles_to_empty() {
        let text = until_stable("output", &fast_settle(2, 20), || async { Ok(String::new()) })
            .await
            .unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_until_stable_changing_output_times_out() {
        let calls = AtomicUsize::new(0);
        let err = until_stable("output", &fast_settle(2, 20), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(format!("මම {n}")) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, E2eError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_until_stable_late_empty_read_is_not_settled() {
        // Text seen earlier, then blank only at the very end.
        let calls = AtomicUsize::new(0);
        let err = until_stable("output", &fast_settle(3, 20), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(if n % 2 == 0 { format!("ම{n}") } else { String::new() }) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, E2eError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_until_stable_propagates_read_errors() {
        let err = until_stable("output", &fast_settle(2, 1_000), || async {
            Err(E2eError::driver(crate::error::Stage::ReadOutput, "gone"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, E2eError::Driver { .. }));
    }
}
