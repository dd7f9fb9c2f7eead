#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use batch_consumer::{Reader, ReaderError, ReaderStats, Record};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use tokio_util::sync::CancellationToken;

pub const TOPIC: &str = "events";

/// Record n lives on partition n at offset n, like the broker in these tests.
pub fn record(n: usize) -> Record {
    Record::new(TOPIC, n as i32, n as i64)
}

pub fn fatal_fetch_error() -> ReaderError {
    ReaderError::Kafka(KafkaError::MessageConsumptionFatal(
        RDKafkaErrorCode::Fatal,
    ))
}

/// Cancel a fresh token after `after`, in place of a context with a deadline.
pub fn cancel_after(after: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        child.cancel();
    });
    token
}

#[derive(Default)]
struct State {
    fetches: AtomicUsize,
    closes: AtomicUsize,
    commits: Mutex<Vec<Vec<Record>>>,
}

/// An in-memory reader producing `record(1)`, `record(2)`, ... one millisecond apart.
#[derive(Clone)]
pub struct ScriptedReader {
    state: Arc<State>,
    fail_after: Option<usize>,
}

impl ScriptedReader {
    pub fn new() -> Self {
        Self {
            state: Arc::new(State::default()),
            fail_after: None,
        }
    }

    /// Fail every fetch after the first `fetches` succeeded.
    pub fn failing_after(fetches: usize) -> Self {
        Self {
            fail_after: Some(fetches),
            ..Self::new()
        }
    }

    pub fn fetches(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> Vec<Vec<Record>> {
        self.state.commits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reader for ScriptedReader {
    async fn fetch_message(&self) -> Result<Record, ReaderError> {
        tokio::time::sleep(Duration::from_millis(1)).await;

        let done = self.state.fetches.load(Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| done >= limit) {
            return Err(fatal_fetch_error());
        }

        let n = self.state.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(record(n))
    }

    async fn commit_messages(&self, records: &[Record]) -> Result<(), ReaderError> {
        self.state.commits.lock().unwrap().push(records.to_vec());
        Ok(())
    }

    fn close(&self) -> Result<(), ReaderError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stats(&self) -> ReaderStats {
        ReaderStats {
            messages: self.fetches() as u64,
            commits: self.state.commits.lock().unwrap().len() as u64,
            ..Default::default()
        }
    }
}
