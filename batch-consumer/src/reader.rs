use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::error::ReaderError;
use crate::record::Record;

/// Counters a reader keeps about its connection to the broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub messages: u64,
    pub bytes: u64,
    pub commits: u64,
    pub errors: u64,
    /// Records behind the high watermark, summed over assigned partitions.
    pub lag: i64,
}

/// The narrow view of a broker client the offset manager needs.
///
/// `fetch_message` is raced against cancellation, so implementations must be
/// cancel-safe: dropping the future must not lose a record.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Reader: Send + Sync {
    /// Wait for the next record.
    async fn fetch_message(&self) -> Result<Record, ReaderError>;

    /// Acknowledge records. Commits are cumulative per partition on the broker.
    async fn commit_messages(&self, records: &[Record]) -> Result<(), ReaderError>;

    fn close(&self) -> Result<(), ReaderError>;

    fn stats(&self) -> ReaderStats;
}
