//! The generic polling primitive.

use crate::error::{ConvergeError, Result, TimeoutError};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tracing::debug;

/// Default interval between polls.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// One poll's verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation<T> {
    /// The predicate holds; the wait returns `T`.
    Ready(T),
    /// Not yet; the string is what was seen, kept for the timeout report.
    Pending(String),
}

/// Description and bounds of a single wait. Built per call, then dropped.
#[derive(Debug, Clone)]
pub struct ConvergenceQuery {
    description: String,
    node: String,
    interval: Duration,
    timeout: Duration,
}

impl ConvergenceQuery {
    pub fn new(description: impl Into<String>, timeout: Duration) -> Self {
        Self {
            description: description.into(),
            node: "cluster".to_string(),
            interval: DEFAULT_INTERVAL,
            timeout,
        }
    }

    /// Names the node (or nodes) the predicate reads.
    pub fn on(mut self, node: impl Into<String>) -> Self {
        self.node = node.into();
        self
    }

    /// Sets the poll interval. Zero is bumped to one millisecond.
    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Polls `probe` until it reports [`Observation::Ready`] or the deadline passes.
///
/// The first poll runs immediately. After a pending poll the engine sleeps for
/// the interval, clipped so the last poll lands on the deadline. Each poll is
/// itself bounded by the remaining time, so a stalled node cannot hold the
/// wait past its deadline. Transient RPC errors are recorded as the last
/// observation and polling continues; any other error is returned as is.
pub async fn await_condition<T, F, Fut>(query: &ConvergenceQuery, mut probe: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation<T>>>,
{
    let start = Instant::now();
    let deadline = start + query.timeout;
    let mut attempts: u32 = 0;
    let mut last_observed;

    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, probe()).await {
            Ok(Ok(Observation::Ready(value))) => {
                debug!(
                    node = %query.node,
                    wait = %query.description,
                    attempts,
                    elapsed = ?start.elapsed(),
                    "condition satisfied"
                );
                return Ok(value);
            }
            Ok(Ok(Observation::Pending(seen))) => last_observed = seen,
            Ok(Err(ConvergeError::Rpc(err))) if err.is_transient() => {
                last_observed = format!("{} error: {}", err.kind, err.message);
            }
            Ok(Err(err)) => return Err(err),
            Err(_) => last_observed = "poll exceeded deadline".to_string(),
        }

        let now = Instant::now();
        if now >= deadline {
            let elapsed = now - start;
            debug!(
                node = %query.node,
                wait = %query.description,
                attempts,
                ?elapsed,
                last = %last_observed,
                "condition timed out"
            );
            return Err(TimeoutError {
                description: query.description.clone(),
                node: query.node.clone(),
                elapsed,
                attempts,
                last_observed,
            }
            .into());
        }

        sleep(query.interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainharness_rpc::{RpcError, RpcErrorKind};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn query(timeout_ms: u64, interval_ms: u64) -> ConvergenceQuery {
        ConvergenceQuery::new("test predicate", Duration::from_millis(timeout_ms))
            .on("node0")
            .every(Duration::from_millis(interval_ms))
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_true_returns_without_sleeping() {
        let start = Instant::now();
        let value = await_condition(&query(5_000, 500), || async {
            Ok::<_, ConvergeError>(Observation::Ready(42))
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_true_times_out_at_deadline() {
        let polls = AtomicU32::new(0);
        let start = Instant::now();

        let err = await_condition(&query(5_000, 500), || {
            let n = polls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok::<_, ConvergeError>(Observation::<()>::Pending(format!("poll {n}"))) }
        })
        .await
        .unwrap_err();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(5_000));
        assert!(elapsed < Duration::from_millis(5_500));

        let ConvergeError::Timeout(timeout) = err else {
            panic!("expected timeout, got {err:?}");
        };
        // Polls at 0, 0.5, ..., 5.0 seconds
        assert_eq!(timeout.attempts, 11);
        assert_eq!(polls.load(Ordering::SeqCst), 11);
        assert_eq!(timeout.last_observed, "poll 11");
        assert_eq!(timeout.node, "node0");
        assert_eq!(timeout.description, "test predicate");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_poll_is_cut_at_deadline() {
        let start = Instant::now();
        let err = await_condition(&query(2_000, 500), || async {
            sleep(Duration::from_secs(30)).await;
            Ok::<_, ConvergeError>(Observation::<()>::Pending("slow".to_string()))
        })
        .await
        .unwrap_err();

        assert_eq!(start.elapsed(), Duration::from_millis(2_000));
        let ConvergeError::Timeout(timeout) = err else {
            panic!("expected timeout, got {err:?}");
        };
        assert_eq!(timeout.attempts, 1);
        assert_eq!(timeout.elapsed, Duration::from_millis(2_000));
        assert_eq!(timeout.last_observed, "poll exceeded deadline");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_poll_keeps_its_answer_within_deadline() {
        let start = Instant::now();
        let value = await_condition(&query(2_000, 500), || async {
            sleep(Duration::from_millis(1_500)).await;
            Ok::<_, ConvergeError>(Observation::Ready("late"))
        })
        .await
        .unwrap();

        assert_eq!(value, "late");
        assert_eq!(start.elapsed(), Duration::from_millis(1_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_poll_is_clipped_to_deadline() {
        let start = Instant::now();
        let err = await_condition(&query(1_200, 500), || async {
            Ok::<_, ConvergeError>(Observation::<()>::Pending("no".to_string()))
        })
        .await
        .unwrap_err();

        // Polls at 0, 0.5, 1.0, 1.2
        assert_eq!(start.elapsed(), Duration::from_millis(1_200));
        assert!(matches!(err, ConvergeError::Timeout(ref t) if t.attempts == 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_becomes_true_after_a_few_polls() {
        let polls = AtomicU32::new(0);
        let value = await_condition(&query(10_000, 100), || {
            let n = polls.fetch_add(1, Ordering::SeqCst);
            async move {
                let observation = if n >= 3 {
                    Observation::Ready(n)
                } else {
                    Observation::Pending(n.to_string())
                };
                Ok::<_, ConvergeError>(observation)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_swallowed() {
        let polls = AtomicU32::new(0);
        let value = await_condition(&query(10_000, 100), || {
            let n = polls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ConvergeError::from(RpcError::new(
                        RpcErrorKind::Unavailable,
                        None,
                        "connection refused",
                        "getblockcount",
                        "node0",
                    )))
                } else {
                    Ok(Observation::Ready("up"))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "up");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_last_transient_error() {
        let err = await_condition(&query(1_000, 250), || async {
            Err::<Observation<()>, _>(ConvergeError::from(RpcError::from_application(
                -5,
                "Transaction not in mempool",
                "getmempoolentry",
                "node1",
            )))
        })
        .await
        .unwrap_err();

        let observed = err.last_observed().unwrap();
        assert!(observed.contains("not-found"));
        assert!(observed.contains("not in mempool"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_errors_propagate_immediately() {
        let polls = AtomicU32::new(0);
        let start = Instant::now();
        let err = await_condition(&query(10_000, 100), || {
            polls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<Observation<()>, _>(ConvergeError::from(RpcError::from_application(
                    -1,
                    "Secure messaging is disabled.",
                    "smsgsend",
                    "node1",
                )))
            }
        })
        .await
        .unwrap_err();

        assert_eq!(polls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(matches!(
            err,
            ConvergeError::Rpc(ref e) if e.kind == RpcErrorKind::FeatureDisabled
        ));
    }

    #[test]
    fn test_zero_interval_is_bumped() {
        let q = ConvergenceQuery::new("x", Duration::from_secs(1)).every(Duration::ZERO);
        assert_eq!(q.interval(), Duration::from_millis(1));
    }
}
