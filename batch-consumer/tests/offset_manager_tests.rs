use std::sync::Arc;
use std::time::Duration;

use batch_consumer::config::Settings;
use batch_consumer::{ConsumerError, OffsetManager, ReaderError, Record};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

mod common;
use common::{cancel_after, record, ScriptedReader};

struct Running {
    manager: Arc<OffsetManager<ScriptedReader>>,
    shutdown: CancellationToken,
    fetcher: JoinHandle<Result<(), ConsumerError>>,
}

impl Running {
    fn start(reader: ScriptedReader, batch_size: usize) -> Self {
        let settings = Settings::new(batch_size, Duration::from_secs(1));
        let manager = Arc::new(OffsetManager::new(reader, &settings));
        let shutdown = CancellationToken::new();

        let fetcher = tokio::spawn({
            let manager = manager.clone();
            let shutdown = shutdown.clone();
            async move { manager.start(shutdown).await }
        });

        Self {
            manager,
            shutdown,
            fetcher,
        }
    }

    /// Ask for a batch, giving up after one second like a caller with a deadline.
    async fn batch(&self) -> Vec<Record> {
        self.manager.batch(&cancel_after(Duration::from_secs(1))).await
    }

    async fn stop(self) -> Result<(), ConsumerError> {
        self.shutdown.cancel();
        self.fetcher.await.unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn not_committing_blocks_the_next_batch() {
    let reader = ScriptedReader::new();
    let running = Running::start(reader.clone(), 2);

    assert_eq!(running.batch().await, vec![record(1), record(2)]);

    // previous batch was not committed
    assert_eq!(running.batch().await, Vec::<Record>::new());

    assert!(matches!(running.stop().await, Err(ConsumerError::Cancelled)));
    assert_eq!(reader.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn partial_commit_blocks_the_next_batch() {
    let reader = ScriptedReader::new();
    let running = Running::start(reader.clone(), 2);

    assert_eq!(running.batch().await, vec![record(1), record(2)]);

    let local = running.manager.commit(&[record(1)]).await.unwrap();
    assert_eq!(local.acknowledged, 1);
    assert!(!local.batch_completed);

    assert_eq!(running.batch().await, Vec::<Record>::new());

    // completing the batch releases the records fetched in the meantime
    let local = running.manager.commit(&[record(2)]).await.unwrap();
    assert!(local.batch_completed);
    assert_eq!(running.batch().await, vec![record(3), record(4)]);

    drop(running.stop().await);
    assert_eq!(reader.commits(), vec![vec![record(1)], vec![record(2)]]);
    assert_eq!(reader.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn double_commit_completes_the_batch() {
    let reader = ScriptedReader::new();
    let running = Running::start(reader.clone(), 2);

    assert_eq!(running.batch().await, vec![record(1), record(2)]);

    running.manager.commit(&[record(1)]).await.unwrap();
    let local = running
        .manager
        .commit(&[record(1), record(2)])
        .await
        .unwrap();
    assert_eq!(local.acknowledged, 1);
    assert_eq!(local.unknown, vec![record(1).offset()]);

    assert_eq!(running.batch().await, vec![record(3), record(4)]);

    drop(running.stop().await);
    assert_eq!(
        reader.commits(),
        vec![vec![record(1)], vec![record(1), record(2)]]
    );
}

#[tokio::test(start_paused = true)]
async fn full_commit_releases_exactly_the_next_records() {
    let reader = ScriptedReader::new();
    let running = Running::start(reader.clone(), 2);

    assert_eq!(running.batch().await, vec![record(1), record(2)]);

    running.manager.commit(&[record(1)]).await.unwrap();
    running.manager.commit(&[record(2)]).await.unwrap();
    assert_eq!(running.manager.uncommitted().await, 0);

    assert_eq!(running.batch().await, vec![record(3), record(4)]);
    assert_eq!(running.manager.uncommitted().await, 2);

    // nothing committed since, so nothing more is handed out
    assert_eq!(running.batch().await, Vec::<Record>::new());

    drop(running.stop().await);
    assert_eq!(reader.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn full_incoming_channel_stops_fetching() {
    let reader = ScriptedReader::new();
    let running = Running::start(reader.clone(), 2);

    tokio::time::sleep(Duration::from_secs(5)).await;

    // two records queued for the batcher, the third waiting to be queued
    assert_eq!(reader.fetches(), 3);

    assert_eq!(running.batch().await, vec![record(1), record(2)]);
    running
        .manager
        .commit(&[record(1), record(2)])
        .await
        .unwrap();
    assert_eq!(running.batch().await, vec![record(3), record(4)]);

    drop(running.stop().await);
}

#[tokio::test(start_paused = true)]
async fn fetch_error_stops_the_loop() {
    let reader = ScriptedReader::failing_after(0);
    let settings = Settings::new(2, Duration::from_secs(1));
    let manager = OffsetManager::new(reader.clone(), &settings);

    let result = manager.start(CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(ConsumerError::Fetch(ReaderError::Kafka(_)))
    ));
    assert_eq!(reader.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn batch_timeout_flushes_a_partial_batch() {
    let reader = ScriptedReader::failing_after(3);
    let settings = Settings::new(10, Duration::from_secs(1));
    let manager = Arc::new(OffsetManager::new(reader.clone(), &settings));

    let fetcher = tokio::spawn({
        let manager = manager.clone();
        async move { manager.start(CancellationToken::new()).await }
    });

    let batch = manager.batch(&CancellationToken::new()).await;
    assert_eq!(batch, vec![record(1), record(2), record(3)]);

    assert!(matches!(
        fetcher.await.unwrap(),
        Err(ConsumerError::Fetch(_))
    ));
    assert_eq!(reader.closes(), 1);
}
