use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::batcher::Batcher;
use crate::config::Settings;
use crate::error::{CommitError, ConsumerError, ReaderError};
use crate::health::HealthCheckTimer;
use crate::metrics_consts::{
    BATCH_SIZE, BATCH_WAIT_DURATION_MS, COMMIT_ERRORS, FETCH_ERRORS, READER_CLOSE_ERRORS,
    RECORDS_COMMITTED, RECORDS_FETCHED, UNCOMMITTED_RECORDS, UNKNOWN_COMMITS,
};
use crate::reader::{Reader, ReaderStats};
use crate::record::{Offset, Record};

/// What a commit did to the uncommitted set, before the broker was asked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalCommit {
    /// Records that were outstanding and are now removed.
    pub acknowledged: usize,
    /// Offsets that were never handed out (or already committed).
    pub unknown: Vec<Offset>,
    /// This commit emptied the uncommitted set and opened the gate for the next batch.
    pub batch_completed: bool,
}

/// Drives the fetch loop and makes sure a batch is only handed out once the
/// previous one has been fully committed.
///
/// Kafka acknowledges through offsets (similar to TCP sequence numbers), so
/// committing an offset commits everything before it on the partition. Handing
/// out more records while some of the last batch are still being processed
/// would let a later commit acknowledge records that were never processed.
pub struct OffsetManager<R> {
    reader: R,
    incoming: mpsc::Sender<Record>,
    batcher: Batcher,
    uncommitted: Mutex<HashMap<Offset, i64>>,
    // holds one permit exactly while no batch is in flight
    uncommitted_empty: Semaphore,
    health_check_timer: HealthCheckTimer,
    fetching: AtomicBool,
}

impl<R: Reader> OffsetManager<R> {
    pub fn new(reader: R, settings: &Settings) -> Self {
        let (incoming, input) = mpsc::channel(settings.batch_size());

        Self {
            reader,
            incoming,
            batcher: Batcher::new(input, settings.batch_size(), settings.batch_timeout()),
            uncommitted: Mutex::new(HashMap::new()),
            uncommitted_empty: Semaphore::new(1),
            health_check_timer: HealthCheckTimer::new(settings.healthcheck_timeout.0),
            fetching: AtomicBool::new(false),
        }
    }

    /// Fetch records and push them to the batcher until the reader fails or
    /// `shutdown` is cancelled. The reader is closed on the way out.
    pub async fn start(&self, shutdown: CancellationToken) -> Result<(), ConsumerError> {
        let result = self.fetch_loop(&shutdown).await;

        // a close error is logged by flush and must not hide why the loop stopped
        drop(self.flush());

        result
    }

    async fn fetch_loop(&self, shutdown: &CancellationToken) -> Result<(), ConsumerError> {
        loop {
            debug!("fetching a message");

            // while we are fetching we can't get unhealthy, the wait is outside our control
            self.fetching.store(true, Ordering::SeqCst);
            let fetched = tokio::select! {
                _ = shutdown.cancelled() => None,
                fetched = self.reader.fetch_message() => Some(fetched),
            };
            self.health_check_timer.mark_healthy();
            self.fetching.store(false, Ordering::SeqCst);

            let record = match fetched {
                None => return Err(ConsumerError::Cancelled),
                Some(Ok(record)) => record,
                Some(Err(e)) => {
                    error!("failed to fetch a message: {}", e);
                    metrics::counter!(FETCH_ERRORS).increment(1);
                    return Err(ConsumerError::Fetch(e));
                }
            };

            debug!(
                partition = record.partition,
                offset = record.offset,
                key = ?record.key_str(),
                "fetched a message"
            );
            metrics::counter!(RECORDS_FETCHED).increment(1);

            tokio::select! {
                _ = shutdown.cancelled() => return Err(ConsumerError::Cancelled),
                sent = self.incoming.send(record) => {
                    // the receiver lives in our own batcher
                    if sent.is_err() {
                        return Err(ConsumerError::Cancelled);
                    }
                }
            }
        }
    }

    /// Hand out the next batch, waiting until the previous one is committed.
    ///
    /// Returns an empty batch if `shutdown` fires first, including while the
    /// previous batch is still outstanding.
    pub async fn batch(&self, shutdown: &CancellationToken) -> Vec<Record> {
        debug!("compiling batch");
        let waiting = Instant::now();

        let batch = tokio::select! {
            _ = shutdown.cancelled() => return Vec::new(),
            permit = self.uncommitted_empty.acquire() => {
                match permit {
                    // returned through add_permits once the batch is committed
                    Ok(permit) => permit.forget(),
                    Err(_) => return Vec::new(),
                }
                self.batcher.get(shutdown).await
            }
        };

        let mut uncommitted = self.uncommitted.lock().await;

        if batch.is_empty() {
            // nothing in flight, so nothing will ever commit and release the gate
            self.uncommitted_empty.add_permits(1);
            return batch;
        }

        for record in &batch {
            uncommitted.insert(record.offset(), record.offset);
        }

        metrics::histogram!(BATCH_SIZE).record(batch.len() as f64);
        metrics::histogram!(BATCH_WAIT_DURATION_MS).record(waiting.elapsed().as_millis() as f64);
        metrics::gauge!(UNCOMMITTED_RECORDS).set(uncommitted.len() as f64);
        debug!(batch_size = batch.len(), "compiled batch");

        batch
    }

    /// Acknowledge records, releasing the next batch once nothing is outstanding.
    ///
    /// The records are always forwarded to the reader as given, partial commits
    /// included. The uncommitted set is updated before the broker answers and is
    /// not restored if the broker commit fails.
    pub async fn commit(&self, records: &[Record]) -> Result<LocalCommit, CommitError> {
        debug!(batch_size = records.len(), "committing offsets");

        let local = {
            let mut uncommitted = self.uncommitted.lock().await;
            let was_outstanding = !uncommitted.is_empty();
            let mut local = LocalCommit::default();

            for record in records {
                let key = record.offset();
                if uncommitted.remove(&key).is_some() {
                    local.acknowledged += 1;
                    continue;
                }

                error!(
                    partition = record.partition,
                    offset = record.offset,
                    key = ?record.key_str(),
                    "failed to commit message: commit unknown message"
                );
                metrics::counter!(UNKNOWN_COMMITS).increment(1);
                local.unknown.push(key);
            }

            if was_outstanding && uncommitted.is_empty() {
                local.batch_completed = true;
                self.uncommitted_empty.add_permits(1);
            }
            metrics::gauge!(UNCOMMITTED_RECORDS).set(uncommitted.len() as f64);

            local
        };

        match self.reader.commit_messages(records).await {
            Ok(()) => {
                metrics::counter!(RECORDS_COMMITTED).increment(records.len() as u64);
                debug!(batch_size = records.len(), "committed offsets");
                Ok(local)
            }
            Err(source) => {
                error!("failed to commit offsets: {}", source);
                metrics::counter!(COMMIT_ERRORS).increment(1);
                Err(CommitError { local, source })
            }
        }
    }

    /// Close the reader.
    pub fn flush(&self) -> Result<(), ReaderError> {
        info!("flushing messages");

        if let Err(e) = self.reader.close() {
            error!("failed to flush messages: {}", e);
            metrics::counter!(READER_CLOSE_ERRORS).increment(1);
            return Err(e);
        }

        info!("flushed messages");
        Ok(())
    }

    pub fn is_healthy(&self) -> bool {
        self.health_check_timer.is_healthy() || self.fetching.load(Ordering::SeqCst)
    }

    /// Number of records handed out and not yet committed.
    pub async fn uncommitted(&self) -> usize {
        self.uncommitted.lock().await.len()
    }

    pub fn stats(&self) -> ReaderStats {
        self.reader.stats()
    }
}
