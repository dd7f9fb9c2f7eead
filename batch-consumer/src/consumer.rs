use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Settings;
use crate::error::{CommitError, ConsumerError};
use crate::offset_manager::{LocalCommit, OffsetManager};
use crate::reader::{Reader, ReaderStats};
use crate::record::Record;

/// Streams records batch by batch from a `Reader` to the application.
///
/// A consumer runs once: after `run` returns, the reader is closed and a new
/// consumer has to be created.
pub struct Consumer<R> {
    manager: Arc<OffsetManager<R>>,
    data_tx: mpsc::Sender<Record>,
    data_rx: Mutex<Option<mpsc::Receiver<Record>>>,
}

impl<R: Reader + 'static> Consumer<R> {
    pub fn new(reader: R, settings: &Settings) -> Self {
        let (data_tx, data_rx) = mpsc::channel(1);

        Self {
            manager: Arc::new(OffsetManager::new(reader, settings)),
            data_tx,
            data_rx: Mutex::new(Some(data_rx)),
        }
    }

    /// The receiving end of the record stream. Only the first call gets it.
    pub fn data(&self) -> Option<mpsc::Receiver<Record>> {
        match self.data_rx.lock() {
            Ok(mut data_rx) => data_rx.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Run the fetch loop in the background and forward every batch on `data`
    /// until `shutdown` is cancelled or fetching fails.
    ///
    /// A failing fetch loop stops delivery and its error is returned. A clean
    /// shutdown returns `Ok`.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ConsumerError> {
        info!("starting batch consumer");

        let token = shutdown.child_token();
        // the fetch task outlives a dropped `run` future unless its token is cancelled
        let _cancel_on_drop = token.clone().drop_guard();
        let mut fetcher = tokio::spawn({
            let manager = self.manager.clone();
            let token = token.clone();
            async move { manager.start(token).await }
        });

        let delivered = tokio::select! {
            fetched = &mut fetcher => {
                token.cancel();
                return stopped(fetched?);
            }
            delivered = self.deliver(&token) => delivered,
        };

        token.cancel();
        let fetched = stopped(fetcher.await?);

        info!("stopped batch consumer");
        delivered.and(fetched)
    }

    async fn deliver(&self, token: &CancellationToken) -> Result<(), ConsumerError> {
        while !token.is_cancelled() {
            let batch = self.manager.batch(token).await;

            for record in batch {
                tokio::select! {
                    _ = token.cancelled() => return Ok(()),
                    sent = self.data_tx.send(record) => {
                        if sent.is_err() {
                            error!("data receiver dropped, stopping delivery");
                            return Err(ConsumerError::DataClosed);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    pub async fn commit(&self, records: &[Record]) -> Result<LocalCommit, CommitError> {
        self.manager.commit(records).await
    }

    pub fn is_healthy(&self) -> bool {
        self.manager.is_healthy()
    }

    pub fn stats(&self) -> ReaderStats {
        self.manager.stats()
    }
}

/// A cancelled fetch loop is a clean shutdown.
fn stopped(fetched: Result<(), ConsumerError>) -> Result<(), ConsumerError> {
    match fetched {
        Err(ConsumerError::Cancelled) => Ok(()),
        other => other,
    }
}
