use std::sync::Arc;

use batch_consumer::{Consumer, ConsumerError, Reader, Record};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const RECORDS_PROCESSED: &str = "batch_worker_records_processed_total";
const RECORD_SIZE_BYTES: &str = "batch_worker_record_size_bytes";

/// Drain the consumer's data channel and acknowledge what was handled.
///
/// Everything received since the last commit is committed together as soon as
/// the channel has nothing more ready, which is at the latest when the consumer
/// waits for the current batch to be committed. A failed commit stops
/// processing, which drops `data` and stops the consumer's delivery too.
pub async fn process<R: Reader + 'static>(
    consumer: Arc<Consumer<R>>,
    mut data: mpsc::Receiver<Record>,
    shutdown: CancellationToken,
) -> Result<(), ConsumerError> {
    let mut pending = Vec::new();

    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => None,
            received = data.recv() => received,
        };
        let Some(record) = received else {
            return Ok(());
        };

        handle(&record);
        pending.push(record);

        while let Ok(record) = data.try_recv() {
            handle(&record);
            pending.push(record);
        }

        consumer.commit(&pending).await?;
        pending.clear();
    }
}

fn handle(record: &Record) {
    debug!(
        topic = record.topic,
        partition = record.partition,
        offset = record.offset,
        key = ?record.key_str(),
        "processing record"
    );

    metrics::counter!(RECORDS_PROCESSED).increment(1);
    metrics::histogram!(RECORD_SIZE_BYTES).record(record.size() as f64);
}
