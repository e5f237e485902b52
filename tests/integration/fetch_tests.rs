//! Fetch chain and retry controller behavior with scripted strategies

use crate::common::{languages, transcript, RecordingSleeper, Scripted};
use antenna::fetcher::{
    FetchChain, FetchOutcome, FetchStrategy, RetryController, RetryPolicy, Sleeper,
    StrategyError, StrategyKind,
};
use antenna::state::AttemptState;
use antenna::TranscriptSource;
use async_trait::async_trait;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn controller(sleeper: Arc<RecordingSleeper>) -> RetryController {
    RetryController::with_sleeper(RetryPolicy::default().without_jitter(), sleeper)
}

#[tokio::test]
async fn test_chain_falls_through_after_exhausting_each_strategy() {
    let sleeper = Arc::new(RecordingSleeper::default());
    let a = Scripted::always(StrategyKind::ScrapingBee, Err(StrategyError::blocked("HTTP 429")));
    let b = Scripted::always(
        StrategyKind::ScrapeNinja,
        Ok(transcript("hello", TranscriptSource::ProxyScraped)),
    );
    let c = Scripted::always(StrategyKind::Direct, Err(StrategyError::unknown("unused")));
    let (a_calls, b_calls, c_calls) = (a.counter(), b.counter(), c.counter());

    let chain = FetchChain::new(
        vec![Box::new(a), Box::new(b), Box::new(c)],
        controller(sleeper.clone()),
    );
    let outcome = chain
        .fetch("v1", &languages(), &CancellationToken::new())
        .await;

    match outcome {
        FetchOutcome::Fetched(t) => {
            assert_eq!(t.text, "hello");
            assert_eq!(t.source, TranscriptSource::ProxyScraped);
        }
        other => panic!("expected a transcript, got {:?}", other),
    }
    assert_eq!(a_calls.load(Ordering::SeqCst), 3);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    assert_eq!(c_calls.load(Ordering::SeqCst), 0);

    // Two sleeps between three attempts of the first strategy
    assert_eq!(
        *sleeper.slept.lock().unwrap(),
        vec![Duration::from_secs(5), Duration::from_secs(10)]
    );
}

#[tokio::test]
async fn test_content_absent_short_circuits_the_chain() {
    let sleeper = Arc::new(RecordingSleeper::default());
    let a = Scripted::always(StrategyKind::ScrapingBee, Err(StrategyError::absent("no captions")));
    let b = Scripted::always(
        StrategyKind::Direct,
        Ok(transcript("never", TranscriptSource::Manual)),
    );
    let (a_calls, b_calls) = (a.counter(), b.counter());

    let chain = FetchChain::new(vec![Box::new(a), Box::new(b)], controller(sleeper.clone()));
    let outcome = chain
        .fetch("v1", &languages(), &CancellationToken::new())
        .await;

    assert!(matches!(outcome, FetchOutcome::Absent { terminal: true, .. }));
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    assert!(sleeper.slept.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_all_strategies_failing_is_not_terminal() {
    let sleeper = Arc::new(RecordingSleeper::default());
    let chain = FetchChain::new(
        vec![
            Box::new(Scripted::always(
                StrategyKind::Firecrawl,
                Err(StrategyError::unknown("HTTP 500")),
            )),
            Box::new(Scripted::always(
                StrategyKind::Direct,
                Err(StrategyError::blocked("HTTP 429")),
            )),
        ],
        controller(sleeper),
    );

    match chain.fetch("v1", &languages(), &CancellationToken::new()).await {
        FetchOutcome::Absent {
            last_error: Some(error),
            terminal: false,
        } => assert_eq!(error.message, "HTTP 429"),
        other => panic!("expected a non-terminal failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_total_backoff_stays_within_bound() {
    let sleeper = Arc::new(RecordingSleeper::default());
    let policy = RetryPolicy::default();
    let bound = policy.max_total_delay().mul_f64(policy.jitter_max);
    assert_eq!(policy.max_total_delay(), Duration::from_secs(35));

    let controller = RetryController::with_sleeper(policy, sleeper.clone());
    let strategy = Scripted::always(StrategyKind::Direct, Err(StrategyError::blocked("HTTP 429")));
    let report = controller
        .run(&strategy, "v1", &languages(), &CancellationToken::new())
        .await;

    assert_eq!(report.final_state, AttemptState::Exhausted);
    assert_eq!(report.attempts, 3);
    let total: Duration = sleeper.slept.lock().unwrap().iter().sum();
    assert_eq!(total, report.slept);
    assert!(total <= bound, "slept {:?}, bound {:?}", total, bound);
}

#[tokio::test]
async fn test_empty_payload_is_retried() {
    let sleeper = Arc::new(RecordingSleeper::default());
    let strategy = Scripted::new(
        StrategyKind::Direct,
        vec![
            Ok(transcript("   ", TranscriptSource::Manual)),
            Ok(transcript("hello", TranscriptSource::Manual)),
        ],
    );

    let report = controller(sleeper)
        .run(&strategy, "v1", &languages(), &CancellationToken::new())
        .await;
    assert_eq!(report.final_state, AttemptState::Succeeded);
    assert_eq!(report.attempts, 2);
}

/// Cancels the token the first time the controller sleeps
struct CancelOnSleep(CancellationToken);

#[async_trait]
impl Sleeper for CancelOnSleep {
    async fn sleep(&self, _duration: Duration) {
        self.0.cancel();
        std::future::pending::<()>().await;
    }
}

#[tokio::test]
async fn test_cancellation_during_backoff_stops_the_chain() {
    let cancel = CancellationToken::new();
    let first = Scripted::always(StrategyKind::ScrapingBee, Err(StrategyError::blocked("HTTP 429")));
    let second = Scripted::always(
        StrategyKind::Direct,
        Ok(transcript("hello", TranscriptSource::Manual)),
    );
    let (first_calls, second_calls) = (first.counter(), second.counter());

    let chain = FetchChain::new(
        vec![Box::new(first), Box::new(second)],
        RetryController::with_sleeper(
            RetryPolicy::default().without_jitter(),
            Arc::new(CancelOnSleep(cancel.clone())),
        ),
    );

    let outcome = chain.fetch("v1", &languages(), &cancel).await;
    assert!(matches!(outcome, FetchOutcome::Cancelled));
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unconfigured_strategies_are_skipped() {
    struct Unconfigured;

    #[async_trait]
    impl FetchStrategy for Unconfigured {
        fn kind(&self) -> StrategyKind {
            StrategyKind::ScrapingBee
        }

        fn is_configured(&self) -> bool {
            false
        }

        async fn attempt_fetch(
            &self,
            _: &str,
            _: &[String],
        ) -> Result<antenna::Transcript, StrategyError> {
            panic!("unconfigured strategy must not be attempted");
        }
    }

    let chain = FetchChain::new(
        vec![
            Box::new(Unconfigured),
            Box::new(Scripted::always(
                StrategyKind::Direct,
                Ok(transcript("hello", TranscriptSource::Manual)),
            )),
        ],
        controller(Arc::new(RecordingSleeper::default())),
    );

    assert_eq!(chain.configured(), vec![StrategyKind::Direct]);
    let outcome = chain
        .fetch("v1", &languages(), &CancellationToken::new())
        .await;
    assert!(outcome.is_fetched());
}
