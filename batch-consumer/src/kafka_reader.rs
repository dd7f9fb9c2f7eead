use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use metrics::{counter, gauge};
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, StreamConsumer};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::{ClientConfig, ClientContext, TopicPartitionList};
use tracing::{debug, info, warn};

use crate::config::KafkaConfig;
use crate::error::ReaderError;
use crate::metrics_consts::{BROKER_RX_ERRORS, CONSUMER_LAG};
use crate::reader::{Reader, ReaderStats};
use crate::record::Record;

/// Receives librdkafka callbacks and keeps the numbers behind `ReaderStats`.
pub struct ReaderContext {
    topic: String,
    lag: AtomicI64,
}

impl ClientContext for ReaderContext {
    fn stats(&self, stats: rdkafka::Statistics) {
        let lag: i64 = stats
            .topics
            .get(&self.topic)
            .map(|topic| {
                topic
                    .partitions
                    .values()
                    // librdkafka reports -1 for partitions it has no position for
                    .filter(|partition| partition.consumer_lag >= 0)
                    .map(|partition| partition.consumer_lag)
                    .sum()
            })
            .unwrap_or_default();

        self.lag.store(lag, Ordering::Relaxed);
        gauge!(CONSUMER_LAG, "topic" => self.topic.clone()).set(lag as f64);

        for (_, broker) in stats.brokers {
            counter!(BROKER_RX_ERRORS, "broker" => broker.nodeid.to_string()).absolute(broker.rxerrs);
        }
    }
}

impl ConsumerContext for ReaderContext {
    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        match result {
            Ok(()) => debug!("committed offsets: {:?}", offsets),
            Err(e) => warn!("failed to commit offsets {:?}: {}", offsets, e),
        }
    }
}

/// A `Reader` over a single topic, backed by an rdkafka `StreamConsumer`.
///
/// Offsets are only ever committed explicitly through `commit_messages`.
pub struct KafkaReader {
    consumer: Arc<StreamConsumer<ReaderContext>>,
    closed: AtomicBool,
    messages: AtomicU64,
    bytes: AtomicU64,
    commits: AtomicU64,
    errors: AtomicU64,
}

impl KafkaReader {
    pub fn new(config: &KafkaConfig) -> Result<Self, KafkaError> {
        info!(
            topic = config.kafka_consumer_topic,
            group_id = config.kafka_consumer_group,
            "connecting to Kafka brokers at {}...",
            config.kafka_hosts
        );

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("group.id", &config.kafka_consumer_group)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", &config.kafka_consumer_offset_reset)
            .set(
                "session.timeout.ms",
                config.kafka_session_timeout_ms.to_string(),
            );

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        debug!("rdkafka configuration: {:?}", client_config);
        let context = ReaderContext {
            topic: config.kafka_consumer_topic.clone(),
            lag: AtomicI64::new(0),
        };
        let consumer: StreamConsumer<ReaderContext> =
            client_config.create_with_context(context)?;
        consumer.subscribe(&[config.kafka_consumer_topic.as_str()])?;

        Ok(Self {
            consumer: Arc::new(consumer),
            closed: AtomicBool::new(false),
            messages: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl Reader for KafkaReader {
    async fn fetch_message(&self) -> Result<Record, ReaderError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ReaderError::Closed);
        }

        match self.consumer.recv().await {
            Ok(message) => {
                let record = Record::from(&message);
                self.messages.fetch_add(1, Ordering::Relaxed);
                self.bytes
                    .fetch_add(record.size() as u64, Ordering::Relaxed);
                Ok(record)
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                Err(e.into())
            }
        }
    }

    async fn commit_messages(&self, records: &[Record]) -> Result<(), ReaderError> {
        let offsets = commit_offsets(records);
        if offsets.is_empty() {
            return Ok(());
        }

        let mut tpl = TopicPartitionList::new();
        for ((topic, partition), next) in &offsets {
            tpl.add_partition_offset(topic, *partition, rdkafka::Offset::Offset(*next))?;
        }

        // synchronous commits block the calling thread until the broker answers
        let consumer = self.consumer.clone();
        let committed = tokio::task::spawn_blocking(move || consumer.commit(&tpl, CommitMode::Sync))
            .await?;

        match committed {
            Ok(()) => {
                self.commits.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                Err(e.into())
            }
        }
    }

    fn close(&self) -> Result<(), ReaderError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ReaderError::Closed);
        }

        self.consumer.unsubscribe();
        info!("closed kafka reader");
        Ok(())
    }

    fn stats(&self) -> ReaderStats {
        ReaderStats {
            messages: self.messages.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            lag: self.consumer.context().lag.load(Ordering::Relaxed),
        }
    }
}

/// Kafka stores the next offset to read, so a commit covering `records` is the
/// highest offset seen per topic partition, plus one.
fn commit_offsets(records: &[Record]) -> HashMap<(String, i32), i64> {
    let mut offsets: HashMap<(String, i32), i64> = HashMap::new();

    for record in records {
        let next = record.offset + 1;
        offsets
            .entry((record.topic.clone(), record.partition))
            .and_modify(|offset| *offset = (*offset).max(next))
            .or_insert(next);
    }

    if offsets.len() < records.len() {
        debug!(
            records = records.len(),
            partitions = offsets.len(),
            "collapsed commit to the highest offset per partition"
        );
    }

    offsets
}
