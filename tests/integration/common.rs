//! Shared fakes for the integration tests

use antenna::fetcher::{FetchStrategy, Sleeper, StrategyError, StrategyKind, Transcript};
use antenna::TranscriptSource;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A strategy that replays a fixed script of results, then repeats the last
pub struct Scripted {
    kind: StrategyKind,
    script: Mutex<VecDeque<Result<Transcript, StrategyError>>>,
    last: Mutex<Option<Result<Transcript, StrategyError>>>,
    pub calls: Arc<AtomicU32>,
}

impl Scripted {
    pub fn new(kind: StrategyKind, script: Vec<Result<Transcript, StrategyError>>) -> Self {
        Self {
            kind,
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn always(kind: StrategyKind, result: Result<Transcript, StrategyError>) -> Self {
        Self::new(kind, vec![result])
    }

    pub fn counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl FetchStrategy for Scripted {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn attempt_fetch(
        &self,
        _item_id: &str,
        _languages: &[String],
    ) -> Result<Transcript, StrategyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => {
                *self.last.lock().unwrap() = Some(result.clone());
                result
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Err(StrategyError::unknown("script empty"))),
        }
    }
}

/// Records requested sleeps without waiting
#[derive(Default)]
pub struct RecordingSleeper {
    pub slept: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

pub fn transcript(text: &str, source: TranscriptSource) -> Transcript {
    Transcript {
        text: text.to_string(),
        source,
        language: "en".to_string(),
    }
}

pub fn languages() -> Vec<String> {
    vec!["en".to_string()]
}
