//! Bounded stability waiting.
//!
//! One timer-driven loop shared by every context implementation: probe on a
//! fixed interval, stop at the first definite answer, and report
//! `TimedOut` instead of failing when the deadline passes.

use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::context::Stability;
use crate::error::Result;

/// A single stability check against a context.
pub(crate) trait StabilityProbe {
    /// `None` while the context is still loading.
    async fn poll_stable(&mut self) -> Result<Option<Stability>>;
}

/// Probe every `interval` until stable or `timeout` elapses.
///
/// The first probe runs immediately. Probe errors end the wait.
pub(crate) async fn wait_until_stable<P: StabilityProbe>(
    probe: &mut P,
    timeout: Duration,
    interval: Duration,
) -> Result<Stability> {
    match tokio::time::timeout(timeout, poll_until_stable(probe, interval)).await {
        Ok(result) => result,
        Err(_) => Ok(Stability::TimedOut),
    }
}

async fn poll_until_stable<P: StabilityProbe>(
    probe: &mut P,
    interval: Duration,
) -> Result<Stability> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Some(stability) = probe.poll_stable().await? {
            return Ok(stability);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SsrError;

    struct CountingProbe {
        calls: u32,
        stable_after: Option<u32>,
        result: Stability,
    }

    impl StabilityProbe for CountingProbe {
        async fn poll_stable(&mut self) -> Result<Option<Stability>> {
            self.calls += 1;
            Ok(match self.stable_after {
                Some(n) if self.calls >= n => Some(self.result),
                _ => None,
            })
        }
    }

    struct FailingProbe;

    impl StabilityProbe for FailingProbe {
        async fn poll_stable(&mut self) -> Result<Option<Stability>> {
            Err(SsrError::ContextClosed)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_probe_runs_immediately() {
        let mut probe = CountingProbe {
            calls: 0,
            stable_after: Some(1),
            result: Stability::Stable,
        };
        let start = tokio::time::Instant::now();
        let result = wait_until_stable(&mut probe, Duration::from_secs(1), Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(result, Stability::Stable);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_interval_until_stable() {
        let mut probe = CountingProbe {
            calls: 0,
            stable_after: Some(4),
            result: Stability::Completed,
        };
        let start = tokio::time::Instant::now();
        let result = wait_until_stable(&mut probe, Duration::from_secs(1), Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(result, Stability::Completed);
        assert_eq!(probe.calls, 4);
        assert_eq!(start.elapsed(), Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_without_error() {
        let mut probe = CountingProbe {
            calls: 0,
            stable_after: None,
            result: Stability::Stable,
        };
        let result = wait_until_stable(&mut probe, Duration::from_millis(200), Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(result, Stability::TimedOut);
        assert!(probe.calls >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_ends_wait() {
        let result =
            wait_until_stable(&mut FailingProbe, Duration::from_secs(1), Duration::from_millis(50))
                .await;
        assert!(matches!(result, Err(SsrError::ContextClosed)));
    }
}
