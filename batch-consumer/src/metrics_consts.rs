pub const RECORDS_FETCHED: &str = "batch_consumer_records_fetched_total";
pub const FETCH_ERRORS: &str = "batch_consumer_fetch_errors_total";
pub const BATCH_SIZE: &str = "batch_consumer_batch_size";
pub const BATCH_WAIT_DURATION_MS: &str = "batch_consumer_batch_wait_duration_ms";
pub const UNCOMMITTED_RECORDS: &str = "batch_consumer_uncommitted_records";
pub const RECORDS_COMMITTED: &str = "batch_consumer_records_committed_total";
pub const UNKNOWN_COMMITS: &str = "batch_consumer_unknown_commits_total";
pub const COMMIT_ERRORS: &str = "batch_consumer_commit_errors_total";
pub const READER_CLOSE_ERRORS: &str = "batch_consumer_reader_close_errors_total";
pub const CONSUMER_LAG: &str = "batch_consumer_kafka_lag";
pub const BROKER_RX_ERRORS: &str = "batch_consumer_kafka_broker_rx_errors_total";
