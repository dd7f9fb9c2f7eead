use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

/// Batches are never flushed more often than this, a smaller timeout would
/// only make the batcher spin.
pub const MIN_BATCH_TIMEOUT: time::Duration = time::Duration::from_secs(1);

#[derive(Envconfig, Clone, Debug)]
pub struct Settings {
    /// Maximum number of records per batch, also the capacity of the incoming channel.
    #[envconfig(default = "100")]
    pub batch_size: usize,

    /// Flush a non-empty batch after this long, in milliseconds.
    #[envconfig(default = "1000")]
    pub batch_timeout: EnvMsDuration,

    /// How long the consumer stays healthy without fetching a record.
    #[envconfig(default = "300000")]
    pub healthcheck_timeout: EnvMsDuration,
}

impl Settings {
    pub fn new(batch_size: usize, batch_timeout: time::Duration) -> Self {
        Self {
            batch_size,
            batch_timeout: EnvMsDuration(batch_timeout),
            healthcheck_timeout: EnvMsDuration(time::Duration::from_secs(300)),
        }
    }

    /// Zero would leave us without an incoming channel.
    pub fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    pub fn batch_timeout(&self) -> time::Duration {
        self.batch_timeout.0.max(MIN_BATCH_TIMEOUT)
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct KafkaConfig {
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    pub kafka_consumer_group: String,

    pub kafka_consumer_topic: String,

    // We default to "earliest" for this, but if you're bringing up a new service, you probably want "latest"
    #[envconfig(default = "earliest")]
    pub kafka_consumer_offset_reset: String, // earliest, latest

    #[envconfig(default = "10000")]
    pub kafka_session_timeout_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}
