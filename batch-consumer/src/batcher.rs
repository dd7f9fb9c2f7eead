use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::MIN_BATCH_TIMEOUT;
use crate::record::Record;

/// Groups records from the incoming channel into batches bounded by size and time.
pub struct Batcher {
    input: Mutex<mpsc::Receiver<Record>>,
    batch_size: usize,
    batch_timeout: Duration,
}

impl Batcher {
    pub fn new(input: mpsc::Receiver<Record>, batch_size: usize, batch_timeout: Duration) -> Self {
        Self {
            input: Mutex::new(input),
            batch_size: batch_size.max(1),
            batch_timeout: batch_timeout.max(MIN_BATCH_TIMEOUT),
        }
    }

    /// Collect the next batch.
    ///
    /// Returns once `batch_size` distinct records arrived, or a tick of the batch
    /// timeout finds a non-empty batch, or `shutdown` is cancelled, or the input
    /// closed. A tick with nothing collected keeps waiting. A record whose offset
    /// was already seen during this call is dropped.
    pub async fn get(&self, shutdown: &CancellationToken) -> Vec<Record> {
        let mut input = self.input.lock().await;
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut seen = HashSet::with_capacity(self.batch_size);

        let mut ticker = time::interval_at(
            time::Instant::now() + self.batch_timeout,
            self.batch_timeout,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return batch,
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        debug!(batch_size = batch.len(), "batch timeout reached");
                        return batch;
                    }
                }
                received = input.recv() => {
                    let Some(record) = received else {
                        return batch;
                    };

                    if !seen.insert(record.offset()) {
                        debug!(
                            partition = record.partition,
                            offset = record.offset,
                            "dropping duplicate record from batch"
                        );
                        continue;
                    }

                    batch.push(record);
                    if batch.len() >= self.batch_size {
                        return batch;
                    }
                }
            }
        }
    }
}
