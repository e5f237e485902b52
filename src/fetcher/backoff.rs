//! Retry/backoff controller
//!
//! Drives one strategy through the attempt state machine:
//!
//! | Attempt result | Next state |
//! |----------------|------------|
//! | Non-empty payload | Succeeded |
//! | TransientBlock / Unknown, attempts left | Retrying (sleep, then Attempting) |
//! | TransientBlock / Unknown, no attempts left | Exhausted |
//! | ContentAbsent | TerminalFailure |
//! | Cancellation at any suspension point | Cancelled |
//!
//! Sleeps grow geometrically from `initial_delay` by `multiplier`, are capped
//! at `ceiling`, and are scaled by a uniform jitter factor.

use crate::config::FetchConfig;
use crate::fetcher::strategy::{FailureKind, FetchStrategy, StrategyError, Transcript};
use crate::state::AttemptState;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Backoff parameters for one strategy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum attempts per strategy, including the first
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    /// Upper bound for a single pre-jitter delay
    pub ceiling: Duration,
    pub jitter_min: f64,
    pub jitter_max: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            multiplier: config.backoff_multiplier,
            ceiling: Duration::from_millis(config.backoff_ceiling_ms),
            jitter_min: config.jitter_min,
            jitter_max: config.jitter_max,
        }
    }

    /// Disables jitter, so every delay equals its pre-jitter value
    pub fn without_jitter(mut self) -> Self {
        self.jitter_min = 1.0;
        self.jitter_max = 1.0;
        self
    }

    /// Pre-jitter delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let ceiling = self.ceiling.as_millis() as f64;
        if !millis.is_finite() || millis >= ceiling {
            self.ceiling
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    /// Upper bound on total pre-jitter sleep for one strategy
    ///
    /// Sum of `delay_for(i)` for `i < max_attempts`; without the ceiling this
    /// is `initial * (multiplier^max_attempts - 1) / (multiplier - 1)`.
    pub fn max_total_delay(&self) -> Duration {
        (0..self.max_attempts).map(|i| self.delay_for(i)).sum()
    }

    /// Scales `delay` by a uniform factor in `[jitter_min, jitter_max]`
    ///
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn jittered(&self, delay: Duration) -> Duration {
        let factor = if self.jitter_min >= self.jitter_max {
            self.jitter_min
        } else {
            rand::rng().random_range(self.jitter_min..=self.jitter_max)
        };
        Duration::try_from_secs_f64(delay.as_secs_f64() * factor.max(0.0))
            .unwrap_or(Duration::MAX)
    }
}

/// Where the controller sleeps between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeping on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How an attempt sequence ended
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Succeeded(Transcript),
    Failed(StrategyError),
    Cancelled,
}

/// Result of driving one strategy to a terminal state
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptReport {
    pub outcome: AttemptOutcome,
    pub final_state: AttemptState,
    pub attempts: u32,
    /// Total time slept between attempts
    pub slept: Duration,
}

/// Runs strategies under a [`RetryPolicy`]
#[derive(Clone)]
pub struct RetryController {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Drives `strategy` for `item_id` until it succeeds, fails terminally,
    /// exhausts its attempts, or `cancel` fires
    pub async fn run(
        &self,
        strategy: &dyn FetchStrategy,
        item_id: &str,
        languages: &[String],
        cancel: &CancellationToken,
    ) -> AttemptReport {
        let mut run = Run {
            state: AttemptState::Idle,
            attempts: 0,
            slept: Duration::ZERO,
        };

        loop {
            if cancel.is_cancelled() {
                return run.finish(AttemptOutcome::Cancelled, AttemptState::Cancelled);
            }

            run.enter(AttemptState::Attempting);
            run.attempts += 1;

            let result = tokio::select! {
                result = strategy.attempt_fetch(item_id, languages) => result,
                _ = cancel.cancelled() => {
                    return run.finish(AttemptOutcome::Cancelled, AttemptState::Cancelled);
                }
            };

            let error = match result {
                Ok(transcript) if !transcript.text.trim().is_empty() => {
                    tracing::debug!(
                        item_id,
                        strategy = strategy.name(),
                        attempt = run.attempts,
                        "Attempt succeeded"
                    );
                    return run.finish(AttemptOutcome::Succeeded(transcript), AttemptState::Succeeded);
                }
                Ok(_) => StrategyError::unknown("empty payload"),
                Err(error) => error,
            };

            match error.kind {
                FailureKind::ContentAbsent => {
                    tracing::info!(
                        item_id,
                        strategy = strategy.name(),
                        attempt = run.attempts,
                        error = %error.message,
                        "Content absent"
                    );
                    return run.finish(AttemptOutcome::Failed(error), AttemptState::TerminalFailure);
                }
                FailureKind::TransientBlock => {
                    tracing::warn!(
                        item_id,
                        strategy = strategy.name(),
                        attempt = run.attempts,
                        kind = "block",
                        error = %error.message,
                        "Attempt blocked"
                    );
                }
                FailureKind::Unknown => {
                    tracing::warn!(
                        item_id,
                        strategy = strategy.name(),
                        attempt = run.attempts,
                        kind = "unknown",
                        error = %error.message,
                        "Attempt failed"
                    );
                }
            }

            if run.attempts >= self.policy.max_attempts {
                return run.finish(AttemptOutcome::Failed(error), AttemptState::Exhausted);
            }

            run.enter(AttemptState::Retrying);
            let delay = self
                .policy
                .jittered(self.policy.delay_for(run.attempts - 1));

            if cancel.is_cancelled() {
                return run.finish(AttemptOutcome::Cancelled, AttemptState::Cancelled);
            }

            tracing::debug!(
                item_id,
                strategy = strategy.name(),
                delay_ms = delay.as_millis() as u64,
                "Backing off"
            );
            tokio::select! {
                _ = self.sleeper.sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return run.finish(AttemptOutcome::Cancelled, AttemptState::Cancelled);
                }
            }
            run.slept += delay;
        }
    }
}

struct Run {
    state: AttemptState,
    attempts: u32,
    slept: Duration,
}

impl Run {
    fn enter(&mut self, next: AttemptState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }

    fn finish(mut self, outcome: AttemptOutcome, state: AttemptState) -> AttemptReport {
        self.enter(state);
        AttemptReport {
            outcome,
            final_state: self.state,
            attempts: self.attempts,
            slept: self.slept,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::strategy::StrategyKind;
    use crate::state::TranscriptSource;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    /// Fails with `error` for the first `failures` calls, then succeeds
    struct Flaky {
        failures: u32,
        error: StrategyError,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32, error: StrategyError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl FetchStrategy for Flaky {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Direct
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn attempt_fetch(&self, _: &str, _: &[String]) -> Result<Transcript, StrategyError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok(Transcript {
                    text: "hello".to_string(),
                    source: TranscriptSource::Manual,
                    language: "en".to_string(),
                })
            }
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(5),
            multiplier: 2.0,
            ceiling: Duration::from_secs(60),
            jitter_min: 1.0,
            jitter_max: 1.0,
        }
    }

    fn controller() -> (RetryController, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        (RetryController::with_sleeper(policy(), sleeper.clone()), sleeper)
    }

    #[test]
    fn test_delay_schedule_and_bound() {
        let policy = policy();
        assert_eq!(policy.delay_for(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for(10), Duration::from_secs(60));
        assert_eq!(policy.max_total_delay(), Duration::from_secs(35));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let policy = RetryPolicy {
            jitter_min: 0.8,
            jitter_max: 1.2,
            ..policy()
        };
        for _ in 0..100 {
            let d = policy.jittered(Duration::from_secs(10));
            assert!(d >= Duration::from_secs(8) && d <= Duration::from_secs(12));
        }
    }

    #[test]
    fn test_jitter_saturates_instead_of_overflowing() {
        let policy = RetryPolicy {
            jitter_min: 10.0,
            jitter_max: 10.0,
            ..policy()
        };
        assert_eq!(policy.jittered(Duration::MAX), Duration::MAX);
        assert_eq!(policy.jittered(Duration::from_secs(3)), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_immediate_success() {
        let (controller, sleeper) = controller();
        let strategy = Flaky::new(0, StrategyError::blocked("429"));
        let report = controller
            .run(&strategy, "v1", &[], &CancellationToken::new())
            .await;

        assert_eq!(report.final_state, AttemptState::Succeeded);
        assert_eq!(report.attempts, 1);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_block_then_success() {
        let (controller, sleeper) = controller();
        let strategy = Flaky::new(2, StrategyError::blocked("429"));
        let report = controller
            .run(&strategy, "v1", &[], &CancellationToken::new())
            .await;

        assert_eq!(report.final_state, AttemptState::Succeeded);
        assert_eq!(report.attempts, 3);
        assert_eq!(
            *sleeper.delays.lock().unwrap(),
            vec![Duration::from_secs(5), Duration::from_secs(10)]
        );
        assert_eq!(report.slept, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_exhaustion_respects_bound() {
        let (controller, sleeper) = controller();
        let strategy = Flaky::new(u32::MAX, StrategyError::unknown("HTTP 502"));
        let report = controller
            .run(&strategy, "v1", &[], &CancellationToken::new())
            .await;

        assert_eq!(report.final_state, AttemptState::Exhausted);
        assert_eq!(report.attempts, 3);
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 3);
        let total: Duration = sleeper.delays.lock().unwrap().iter().sum();
        assert!(total <= controller.policy().max_total_delay());
        assert!(matches!(report.outcome, AttemptOutcome::Failed(e) if e.kind == FailureKind::Unknown));
    }

    #[tokio::test]
    async fn test_absence_is_never_retried() {
        let (controller, sleeper) = controller();
        let strategy = Flaky::new(u32::MAX, StrategyError::absent("no captions"));
        let report = controller
            .run(&strategy, "v1", &[], &CancellationToken::new())
            .await;

        assert_eq!(report.final_state, AttemptState::TerminalFailure);
        assert_eq!(report.attempts, 1);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let (controller, _) = controller();
        let strategy = Flaky::new(0, StrategyError::blocked("429"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = controller.run(&strategy, "v1", &[], &cancel).await;
        assert_eq!(report.final_state, AttemptState::Cancelled);
        assert_eq!(report.outcome, AttemptOutcome::Cancelled);
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_during_backoff_sleep() {
        struct CancellingSleeper(CancellationToken);

        #[async_trait]
        impl Sleeper for CancellingSleeper {
            async fn sleep(&self, _duration: Duration) {
                self.0.cancel();
                std::future::pending::<()>().await;
            }
        }

        let cancel = CancellationToken::new();
        let controller =
            RetryController::with_sleeper(policy(), Arc::new(CancellingSleeper(cancel.clone())));
        let strategy = Flaky::new(u32::MAX, StrategyError::blocked("429"));

        let report = controller.run(&strategy, "v1", &[], &cancel).await;
        assert_eq!(report.final_state, AttemptState::Cancelled);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.slept, Duration::ZERO);
    }
}
