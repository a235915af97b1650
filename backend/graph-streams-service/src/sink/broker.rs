//! Broker consumer seam
//!
//! The sink consumer only talks to the broker through [`BrokerConsumer`];
//! [`super::kafka::KafkaBrokerConsumer`] is the production implementation.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::SinkResult;

/// Owned copy of one polled record
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub headers: Vec<(String, Option<Vec<u8>>)>,
    /// Broker timestamp in milliseconds, when the record carries one
    pub timestamp: Option<i64>,
}

impl BrokerRecord {
    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(&self.topic, self.partition)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// Where a partition-aware read starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekTarget {
    Beginning,
    End,
    Offset(i64),
}

impl SeekTarget {
    pub const BEGINNING_SENTINEL: i64 = -1;
    pub const END_SENTINEL: i64 = -2;

    /// `-1` is the beginning, `-2` the end; other negatives are invalid.
    pub fn from_offset(offset: i64) -> Option<Self> {
        match offset {
            Self::BEGINNING_SENTINEL => Some(SeekTarget::Beginning),
            Self::END_SENTINEL => Some(SeekTarget::End),
            n if n >= 0 => Some(SeekTarget::Offset(n)),
            _ => None,
        }
    }
}

#[async_trait]
pub trait BrokerConsumer: Send + Sync {
    fn subscribe(&mut self, topics: &[String]) -> SinkResult<()>;

    /// Records available within `timeout`, possibly none
    async fn poll(&mut self, timeout: Duration) -> SinkResult<Vec<BrokerRecord>>;

    /// Drive the group protocol until every one of `partitions` is assigned
    /// so they can be seeked, failing once `timeout` elapses. Records
    /// received meanwhile must not be lost.
    async fn prepare_assignment(
        &mut self,
        partitions: &[TopicPartition],
        timeout: Duration,
    ) -> SinkResult<()>;

    fn seek(&mut self, partition: &TopicPartition, target: SeekTarget) -> SinkResult<()>;

    /// Synchronously commit positions, i.e. the next offset to consume
    fn commit_sync(&mut self, positions: &BTreeMap<TopicPartition, i64>) -> SinkResult<()>;

    fn close(&mut self);
}
