//! rdkafka implementation of the broker seam

use async_trait::async_trait;
use futures::FutureExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::topic_partition_list::TopicPartitionList;
use rdkafka::Offset;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::broker::{BrokerConsumer, BrokerRecord, SeekTarget, TopicPartition};
use crate::config::KafkaSettings;
use crate::error::{SinkError, SinkResult};

/// Upper bound of records returned by one poll
pub const DEFAULT_MAX_POLL_RECORDS: usize = 500;

const SEEK_TIMEOUT: Duration = Duration::from_secs(10);
const ASSIGNMENT_CHECK_INTERVAL: Duration = Duration::from_millis(200);

fn to_record(message: &BorrowedMessage<'_>) -> BrokerRecord {
    let headers = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|header| (header.key.to_string(), header.value.map(<[u8]>::to_vec)))
                .collect()
        })
        .unwrap_or_default();

    BrokerRecord {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(<[u8]>::to_vec),
        value: message.payload().map(<[u8]>::to_vec),
        headers,
        timestamp: message.timestamp().to_millis(),
    }
}

pub struct KafkaBrokerConsumer {
    consumer: StreamConsumer,
    /// Records received while waiting for an assignment
    pending: VecDeque<BrokerRecord>,
    max_poll_records: usize,
}

impl KafkaBrokerConsumer {
    pub fn new(settings: &KafkaSettings) -> SinkResult<Self> {
        let consumer: StreamConsumer = settings.consumer_config().create()?;

        info!(
            brokers = %settings.bootstrap_servers,
            group_id = %settings.group_id,
            auto_commit = settings.enable_auto_commit,
            "Kafka sink consumer created"
        );

        Ok(Self {
            consumer,
            pending: VecDeque::new(),
            max_poll_records: DEFAULT_MAX_POLL_RECORDS,
        })
    }

    pub fn with_max_poll_records(mut self, max_poll_records: usize) -> Self {
        self.max_poll_records = max_poll_records.max(1);
        self
    }
}

#[async_trait]
impl BrokerConsumer for KafkaBrokerConsumer {
    fn subscribe(&mut self, topics: &[String]) -> SinkResult<()> {
        let topics: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer.subscribe(&topics)?;
        info!(topics = ?topics, "Subscribed to topics");
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> SinkResult<Vec<BrokerRecord>> {
        let mut records: Vec<BrokerRecord> = self.pending.drain(..).collect();

        if records.is_empty() {
            match tokio::time::timeout(timeout, self.consumer.recv()).await {
                Ok(message) => records.push(to_record(&message?)),
                Err(_) => return Ok(records),
            }
        }

        // Drain whatever is already buffered without waiting again
        while records.len() < self.max_poll_records {
            match self.consumer.recv().now_or_never() {
                Some(message) => records.push(to_record(&message?)),
                None => break,
            }
        }

        debug!(count = records.len(), "Polled records");
        Ok(records)
    }

    async fn prepare_assignment(
        &mut self,
        partitions: &[TopicPartition],
        timeout: Duration,
    ) -> SinkResult<()> {
        let deadline = Instant::now() + timeout;

        loop {
            let (assigned, missing) = {
                let assignment = self.consumer.assignment()?;
                let missing: Vec<String> = partitions
                    .iter()
                    .filter(|tp| assignment.find_partition(&tp.topic, tp.partition).is_none())
                    .map(ToString::to_string)
                    .collect();
                (assignment.count(), missing)
            };

            if missing.is_empty() {
                debug!(assigned, "Prepared partition assignment");
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(SinkError::InvalidState(format!(
                    "partitions [{}] not assigned within {:?}",
                    missing.join(", "),
                    timeout
                )));
            }

            // recv serves the rebalance callbacks; keep what it returns
            let wait = (deadline - now).min(ASSIGNMENT_CHECK_INTERVAL);
            if let Ok(message) = tokio::time::timeout(wait, self.consumer.recv()).await {
                self.pending.push_back(to_record(&message?));
            }
        }
    }

    fn seek(&mut self, partition: &TopicPartition, target: SeekTarget) -> SinkResult<()> {
        let offset = match target {
            SeekTarget::Beginning => Offset::Beginning,
            SeekTarget::End => Offset::End,
            SeekTarget::Offset(offset) => Offset::Offset(offset),
        };

        self.consumer
            .seek(&partition.topic, partition.partition, offset, SEEK_TIMEOUT)?;
        // Buffered records of a seeked partition would be replayed out of order
        self.pending
            .retain(|record| record.topic_partition() != *partition);

        info!(partition = %partition, target = ?target, "Seeked partition");
        Ok(())
    }

    fn commit_sync(&mut self, positions: &BTreeMap<TopicPartition, i64>) -> SinkResult<()> {
        if positions.is_empty() {
            return Ok(());
        }

        let mut tpl = TopicPartitionList::new();
        for (tp, position) in positions {
            tpl.add_partition_offset(&tp.topic, tp.partition, Offset::Offset(*position))?;
        }

        self.consumer.commit(&tpl, CommitMode::Sync)?;
        debug!(partitions = positions.len(), "Committed offsets");
        Ok(())
    }

    fn close(&mut self) {
        self.consumer.unsubscribe();
        self.pending.clear();
        info!("Kafka sink consumer closed");
    }
}
