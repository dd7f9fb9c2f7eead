use rdkafka::error::KafkaError;
use thiserror::Error;
use tokio::task::JoinError;

use crate::offset_manager::LocalCommit;

/// Errors surfaced by a `Reader` implementation.
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("reader is closed")]
    Closed,
    #[error("commit task failed: {0}")]
    Join(#[from] JoinError),
}

/// A broker commit failed after the uncommitted set was already updated.
///
/// The local removal (and the gate release, if the batch completed) is not
/// rolled back, so `local` describes state that is ahead of the broker.
#[derive(Error, Debug)]
#[error("failed to commit to the broker: {source}")]
pub struct CommitError {
    pub local: LocalCommit,
    #[source]
    pub source: ReaderError,
}

/// Enumeration of errors that stop a running consumer.
#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("failed to fetch a message: {0}")]
    Fetch(#[source] ReaderError),
    #[error("consumer was cancelled")]
    Cancelled,
    #[error("data receiver was dropped")]
    DataClosed,
    #[error("fetch task failed: {0}")]
    Task(#[from] JoinError),
    #[error(transparent)]
    Commit(#[from] CommitError),
}
