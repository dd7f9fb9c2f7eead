//! Batched consumption on top of a partitioned, offset-addressed log.
//!
//! Committing an offset on Kafka acknowledges every record up to it on that
//! partition, so this crate only hands out a new batch once every record of the
//! previous one has been committed. Fetching keeps running in the background,
//! bounded by the incoming channel.
pub mod batcher;
pub mod config;
pub mod consumer;
pub mod error;
pub mod health;
pub mod kafka_reader;
pub mod metrics_consts;
pub mod offset_manager;
pub mod reader;
pub mod record;

pub use consumer::Consumer;
pub use error::{CommitError, ConsumerError, ReaderError};
pub use offset_manager::{LocalCommit, OffsetManager};
pub use reader::{Reader, ReaderStats};
pub use record::{Header, Offset, Record};
