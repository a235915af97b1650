//! In-memory broker, writer, dead letter queue and clock for sink tests

#![allow(dead_code)]

use async_trait::async_trait;
use graph_streams_service::error::{SinkError, SinkResult};
use graph_streams_service::sink::{
    BrokerConsumer, BrokerRecord, DlqRecord, DlqSender, SeekTarget, SinkEntity, SinkWriter,
    Sleeper, TopicPartition,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Broker replaying scripted polls and recording every call
#[derive(Default)]
pub struct ScriptedBroker {
    pub polls: VecDeque<Vec<BrokerRecord>>,
    pub subscribed: Vec<String>,
    pub prepared: Vec<Vec<TopicPartition>>,
    pub seeks: Vec<(TopicPartition, SeekTarget)>,
    pub commits: Vec<BTreeMap<TopicPartition, i64>>,
    pub closed: usize,
    /// Partitions are never assigned
    pub unassigned: bool,
}

impl ScriptedBroker {
    pub fn with_polls(polls: Vec<Vec<BrokerRecord>>) -> Self {
        Self {
            polls: polls.into(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl BrokerConsumer for ScriptedBroker {
    fn subscribe(&mut self, topics: &[String]) -> SinkResult<()> {
        self.subscribed = topics.to_vec();
        Ok(())
    }

    async fn poll(&mut self, _timeout: Duration) -> SinkResult<Vec<BrokerRecord>> {
        Ok(self.polls.pop_front().unwrap_or_default())
    }

    async fn prepare_assignment(
        &mut self,
        partitions: &[TopicPartition],
        _timeout: Duration,
    ) -> SinkResult<()> {
        self.prepared.push(partitions.to_vec());
        if self.unassigned {
            return Err(SinkError::InvalidState(
                "partitions not assigned".to_string(),
            ));
        }
        Ok(())
    }

    fn seek(&mut self, partition: &TopicPartition, target: SeekTarget) -> SinkResult<()> {
        self.seeks.push((partition.clone(), target));
        Ok(())
    }

    fn commit_sync(&mut self, positions: &BTreeMap<TopicPartition, i64>) -> SinkResult<()> {
        self.commits.push(positions.clone());
        Ok(())
    }

    fn close(&mut self) {
        self.closed += 1;
    }
}

/// Writer failing its first `failures` calls
pub struct FlakyWriter {
    failures: usize,
    pub calls: AtomicUsize,
    pub written: Mutex<Vec<(String, Vec<SinkEntity>)>>,
}

impl FlakyWriter {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SinkWriter for FlakyWriter {
    async fn write(&self, topic: &str, entities: &[SinkEntity]) -> anyhow::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            anyhow::bail!("Neo.TransientError.Transaction.DeadlockDetected");
        }
        self.written
            .lock()
            .unwrap()
            .push((topic.to_string(), entities.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingDlq {
    pub records: Mutex<Vec<DlqRecord>>,
    pub closed: AtomicUsize,
    pub fail: bool,
}

impl RecordingDlq {
    pub fn records(&self) -> Vec<DlqRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl DlqSender for RecordingDlq {
    async fn send(&self, record: DlqRecord) -> SinkResult<()> {
        if self.fail {
            return Err(SinkError::Dlq("dead letter topic unavailable".to_string()));
        }
        self.records.lock().unwrap().push(record);
        Ok(())
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records requested backoffs instead of sleeping
#[derive(Default)]
pub struct RecordingSleeper {
    pub sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

pub fn record(topic: &str, partition: i32, offset: i64, value: &str) -> BrokerRecord {
    BrokerRecord {
        topic: topic.to_string(),
        partition,
        offset,
        key: Some(format!("\"key-{}\"", offset).into_bytes()),
        value: Some(value.as_bytes().to_vec()),
        headers: vec![("origin".to_string(), Some(b"test".to_vec()))],
        timestamp: Some(1_700_000_000_000),
    }
}

pub fn person(topic: &str, partition: i32, offset: i64) -> BrokerRecord {
    record(
        topic,
        partition,
        offset,
        &format!("{{\"id\":{},\"name\":\"p{}\"}}", offset, offset),
    )
}
