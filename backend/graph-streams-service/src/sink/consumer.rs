//! Sink consumer
//!
//! Polls records, hands them to the write callback grouped by topic (or by
//! explicit partition), retries failed groups forever while dead-lettering
//! every failed attempt, and commits positions when commit is manual.
//!
//! ```text
//! Created --start--> Subscribed --read--> Running
//!                                  \--read_partitions (first call)--> SeekPending --> Running
//! any state --stop--> Stopped
//! ```

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::broker::{BrokerConsumer, BrokerRecord, TopicPartition};
use super::dlq::{DlqRecord, DlqSender, ErrorReporting};
use super::entity::SinkEntity;
use super::retry::{RetryDecision, RetryPolicy, RetryTracker, Sleeper, TokioSleeper};
use super::topic_config::TopicPartitionConfig;
use crate::error::{SinkError, SinkResult};
use crate::metrics::StreamsMetrics;

pub const DEFAULT_ASSIGNMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Write callback receiving one decoded group
#[async_trait]
pub trait SinkWriter: Send + Sync {
    async fn write(&self, topic: &str, entities: &[SinkEntity]) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStrategy {
    /// The client commits in the background
    Auto,
    /// Positions are committed synchronously after each successful read
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Created,
    Subscribed,
    Running,
    SeekPending,
    Stopped,
}

pub struct SinkConsumer<B: BrokerConsumer> {
    broker: B,
    state: ConsumerState,
    topics: BTreeSet<String>,
    commit_strategy: CommitStrategy,
    dlq: Option<Arc<dyn DlqSender>>,
    error_reporting: ErrorReporting,
    retry_policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    poll_timeout: Duration,
    assignment_timeout: Duration,
    metrics: Option<StreamsMetrics>,
    is_seek_set: bool,
    /// Highest consumed offset per partition, manual commit only
    topic_partition_offsets: BTreeMap<TopicPartition, i64>,
}

impl<B: BrokerConsumer> SinkConsumer<B> {
    pub fn new(broker: B, commit_strategy: CommitStrategy) -> Self {
        Self {
            broker,
            state: ConsumerState::Created,
            topics: BTreeSet::new(),
            commit_strategy,
            dlq: None,
            error_reporting: ErrorReporting::default(),
            retry_policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            poll_timeout: Duration::from_millis(100),
            assignment_timeout: DEFAULT_ASSIGNMENT_TIMEOUT,
            metrics: None,
            is_seek_set: false,
            topic_partition_offsets: BTreeMap::new(),
        }
    }

    pub fn with_dlq_sender(mut self, dlq: Arc<dyn DlqSender>) -> Self {
        self.dlq = Some(dlq);
        self
    }

    pub fn with_error_reporting(mut self, error_reporting: ErrorReporting) -> Self {
        self.error_reporting = error_reporting;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Upper bound for the group join before the first seek
    pub fn with_assignment_timeout(mut self, assignment_timeout: Duration) -> Self {
        self.assignment_timeout = assignment_timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: StreamsMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the subscription. Only valid before `start`.
    pub fn with_topics<I, S>(&mut self, topics: I) -> SinkResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.state != ConsumerState::Created {
            return Err(SinkError::InvalidState(format!(
                "topics can only be set before start, consumer is {:?}",
                self.state
            )));
        }

        self.topics = topics.into_iter().map(Into::into).collect();
        Ok(())
    }

    /// Subscribe to the configured topics. A consumer without topics stays
    /// idle.
    pub fn start(&mut self) -> SinkResult<()> {
        if self.state != ConsumerState::Created {
            return Err(SinkError::InvalidState(format!(
                "cannot start a consumer that is {:?}",
                self.state
            )));
        }

        if self.topics.is_empty() {
            info!("No topics configured for the sink, consumer stays idle");
            return Ok(());
        }

        let topics: Vec<String> = self.topics.iter().cloned().collect();
        self.broker.subscribe(&topics)?;
        self.state = ConsumerState::Subscribed;

        info!(topics = ?topics, commit = ?self.commit_strategy, "Sink consumer started");
        Ok(())
    }

    /// One poll cycle, records grouped by topic
    pub async fn read(&mut self, writer: &dyn SinkWriter) -> SinkResult<()> {
        if !self.ensure_readable()? {
            return Ok(());
        }

        let records = self.broker.poll(self.poll_timeout).await?;
        self.state = ConsumerState::Running;
        if records.is_empty() {
            return Ok(());
        }

        self.dispatch_by_topic(&records, writer, true).await
    }

    /// One poll cycle over an explicit partition set.
    ///
    /// The first call seeks every listed partition; later calls keep reading
    /// from wherever the consumer is, whatever offsets they carry. Records of
    /// partitions outside the set are not dispatched. An empty set reads the
    /// whole subscription by topic.
    pub async fn read_partitions(
        &mut self,
        config: &TopicPartitionConfig,
        writer: &dyn SinkWriter,
    ) -> SinkResult<()> {
        if !self.ensure_readable()? {
            return Ok(());
        }

        let targets = config.seek_targets()?;

        if !self.is_seek_set {
            if !targets.is_empty() {
                self.state = ConsumerState::SeekPending;
                let partitions: Vec<TopicPartition> =
                    targets.iter().map(|(partition, _)| partition.clone()).collect();
                self.broker
                    .prepare_assignment(&partitions, self.assignment_timeout)
                    .await?;
                for (partition, target) in &targets {
                    self.broker.seek(partition, *target)?;
                }
            }
            self.is_seek_set = true;
        }

        let records = self.broker.poll(self.poll_timeout).await?;
        self.state = ConsumerState::Running;
        if records.is_empty() {
            return Ok(());
        }

        // No explicit partitions: plain read, commit flag still applies
        if targets.is_empty() {
            return self.dispatch_by_topic(&records, writer, config.commit).await;
        }

        let wanted = config.topic_partitions();
        let mut groups: BTreeMap<TopicPartition, Vec<&BrokerRecord>> = BTreeMap::new();
        for record in &records {
            let partition = record.topic_partition();
            if wanted.contains(&partition) {
                groups.entry(partition).or_default().push(record);
            }
        }

        let skipped = records.len() - groups.values().map(Vec::len).sum::<usize>();
        if skipped > 0 {
            debug!(skipped, "Ignored records outside the requested partitions");
        }

        for (partition, group) in &groups {
            self.dispatch(&partition.topic, group, writer).await?;
        }

        if self.commit_strategy == CommitStrategy::Manual {
            let consumed: Vec<&BrokerRecord> = groups.values().flatten().copied().collect();
            self.commit(&consumed, config.commit)?;
        }

        Ok(())
    }

    /// Close the broker connection and the dead letter sender. Idempotent.
    pub fn stop(&mut self) {
        if self.state == ConsumerState::Stopped {
            return;
        }

        self.broker.close();
        if let Some(dlq) = &self.dlq {
            dlq.close();
        }
        self.state = ConsumerState::Stopped;
        info!("Sink consumer stopped");
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn topics(&self) -> &BTreeSet<String> {
        &self.topics
    }

    pub fn commit_strategy(&self) -> CommitStrategy {
        self.commit_strategy
    }

    pub fn is_seek_set(&self) -> bool {
        self.is_seek_set
    }

    pub fn topic_partition_offsets(&self) -> &BTreeMap<TopicPartition, i64> {
        &self.topic_partition_offsets
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Dispatch `records` grouped by topic, then commit them when manual.
    async fn dispatch_by_topic(
        &mut self,
        records: &[BrokerRecord],
        writer: &dyn SinkWriter,
        commit: bool,
    ) -> SinkResult<()> {
        let mut groups: BTreeMap<&str, Vec<&BrokerRecord>> = BTreeMap::new();
        for record in records {
            groups.entry(record.topic.as_str()).or_default().push(record);
        }

        for (topic, group) in &groups {
            self.dispatch(topic, group, writer).await?;
        }

        if self.commit_strategy == CommitStrategy::Manual {
            let consumed: Vec<&BrokerRecord> = records.iter().collect();
            self.commit(&consumed, commit)?;
        }

        Ok(())
    }

    /// `Ok(false)` when there is nothing to read from yet
    fn ensure_readable(&self) -> SinkResult<bool> {
        match self.state {
            ConsumerState::Created => {
                debug!("Sink consumer has no subscription, skipping read");
                Ok(false)
            }
            ConsumerState::Stopped => Err(SinkError::InvalidState(
                "cannot read from a stopped consumer".to_string(),
            )),
            ConsumerState::Subscribed | ConsumerState::Running | ConsumerState::SeekPending => {
                Ok(true)
            }
        }
    }

    /// Decode and write one group, retrying until the writer succeeds.
    ///
    /// Only dead letter and broker failures escape.
    async fn dispatch(
        &self,
        topic: &str,
        records: &[&BrokerRecord],
        writer: &dyn SinkWriter,
    ) -> SinkResult<()> {
        let mut entities = Vec::with_capacity(records.len());
        let mut decoded = Vec::with_capacity(records.len());

        for record in records {
            match SinkEntity::decode(record) {
                Ok(entity) => {
                    entities.push(entity);
                    decoded.push(*record);
                }
                Err(e) => {
                    warn!(
                        topic = %record.topic,
                        partition = record.partition,
                        offset = record.offset,
                        error = %e,
                        "Failed to decode record"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.sink_decode_failures.inc();
                    }
                    self.dead_letter(record, &e).await?;
                }
            }
        }

        if entities.is_empty() {
            return Ok(());
        }

        let mut retry = RetryTracker::new(self.retry_policy.clone());
        loop {
            retry.begin_attempt();

            match writer.write(topic, &entities).await {
                Ok(()) => {
                    retry.record_success();
                    if let Some(metrics) = &self.metrics {
                        metrics.sink_batches.inc();
                    }
                    debug!(topic = %topic, count = entities.len(), "Wrote record group");
                    return Ok(());
                }
                Err(e) => {
                    let error = SinkError::Write(e);
                    if let Some(metrics) = &self.metrics {
                        metrics.sink_write_failures.inc();
                    }

                    for record in &decoded {
                        self.dead_letter(record, &error).await?;
                    }

                    if let RetryDecision::Backoff(backoff) = retry.record_failure() {
                        warn!(
                            topic = %topic,
                            failures = retry.failures(),
                            error = %error,
                            "Record group keeps failing, backing off for {:?}",
                            backoff
                        );
                        self.sleeper.sleep(backoff).await;
                    }
                }
            }
        }
    }

    async fn dead_letter(&self, record: &BrokerRecord, error: &SinkError) -> SinkResult<()> {
        let dlq_record = DlqRecord::new(record, error);
        self.error_reporting.report(&dlq_record);

        match &self.dlq {
            Some(dlq) => {
                dlq.send(dlq_record).await?;
                if let Some(metrics) = &self.metrics {
                    metrics.sink_dlq_records.inc();
                }
            }
            None => {
                error!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    error = %error,
                    "Sink record failed and no dead letter queue is configured"
                );
            }
        }

        Ok(())
    }

    /// Track the highest offset of each touched partition and, if asked,
    /// commit their positions.
    fn commit(&mut self, consumed: &[&BrokerRecord], commit: bool) -> SinkResult<()> {
        let mut touched: BTreeMap<TopicPartition, i64> = BTreeMap::new();
        for record in consumed {
            let highest = touched.entry(record.topic_partition()).or_insert(record.offset);
            *highest = (*highest).max(record.offset);
        }

        for (partition, offset) in &touched {
            self.topic_partition_offsets
                .insert(partition.clone(), *offset);
        }

        if !commit || touched.is_empty() {
            return Ok(());
        }

        let positions: BTreeMap<TopicPartition, i64> = touched
            .into_iter()
            .map(|(partition, offset)| (partition, offset + 1))
            .collect();
        self.broker.commit_sync(&positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::broker::SeekTarget;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedBroker {
        polls: VecDeque<Vec<BrokerRecord>>,
        subscribed: Vec<String>,
        seeks: Vec<(TopicPartition, SeekTarget)>,
        commits: Vec<BTreeMap<TopicPartition, i64>>,
        closed: usize,
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
            _partitions: &[TopicPartition],
            _timeout: Duration,
        ) -> SinkResult<()> {
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

    struct CountingWriter {
        calls: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl SinkWriter for CountingWriter {
        async fn write(&self, topic: &str, entities: &[SinkEntity]) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push((topic.to_string(), entities.len()));
            Ok(())
        }
    }

    fn record(topic: &str, partition: i32, offset: i64) -> BrokerRecord {
        BrokerRecord {
            topic: topic.to_string(),
            partition,
            offset,
            key: None,
            value: Some(format!("{{\"offset\":{}}}", offset).into_bytes()),
            headers: Vec::new(),
            timestamp: None,
        }
    }

    fn writer() -> CountingWriter {
        CountingWriter {
            calls: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_start_without_topics_stays_idle() {
        let mut consumer = SinkConsumer::new(ScriptedBroker::default(), CommitStrategy::Auto);

        consumer.start().unwrap();
        assert_eq!(consumer.state(), ConsumerState::Created);
        assert!(consumer.broker().subscribed.is_empty());

        let writer = writer();
        consumer.read(&writer).await.unwrap();
        assert!(writer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_topics_cannot_change_after_start() {
        let mut consumer = SinkConsumer::new(ScriptedBroker::default(), CommitStrategy::Auto);
        consumer.with_topics(["people"]).unwrap();
        consumer.start().unwrap();

        assert_eq!(consumer.state(), ConsumerState::Subscribed);
        assert_eq!(consumer.broker().subscribed, vec!["people".to_string()]);
        assert!(matches!(
            consumer.with_topics(["other"]),
            Err(SinkError::InvalidState(_))
        ));
        assert!(consumer.start().is_err());
    }

    #[tokio::test]
    async fn test_read_groups_by_topic() {
        let mut broker = ScriptedBroker::default();
        broker.polls.push_back(vec![
            record("people", 0, 1),
            record("places", 0, 7),
            record("people", 1, 3),
        ]);
        let mut consumer = SinkConsumer::new(broker, CommitStrategy::Auto);
        consumer.with_topics(["people", "places"]).unwrap();
        consumer.start().unwrap();

        let writer = writer();
        consumer.read(&writer).await.unwrap();

        assert_eq!(consumer.state(), ConsumerState::Running);
        assert_eq!(
            *writer.calls.lock().unwrap(),
            vec![("people".to_string(), 2), ("places".to_string(), 1)]
        );
        assert!(consumer.broker().commits.is_empty());
        assert!(consumer.topic_partition_offsets().is_empty());
    }

    #[tokio::test]
    async fn test_manual_commit_writes_next_position() {
        let mut broker = ScriptedBroker::default();
        broker.polls.push_back(vec![
            record("people", 0, 4),
            record("people", 0, 5),
            record("people", 2, 10),
        ]);
        let mut consumer = SinkConsumer::new(broker, CommitStrategy::Manual);
        consumer.with_topics(["people"]).unwrap();
        consumer.start().unwrap();

        consumer.read(&writer()).await.unwrap();

        let commits = &consumer.broker().commits;
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0][&TopicPartition::new("people", 0)], 6);
        assert_eq!(commits[0][&TopicPartition::new("people", 2)], 11);
        assert_eq!(
            consumer.topic_partition_offsets()[&TopicPartition::new("people", 0)],
            5
        );
    }

    #[tokio::test]
    async fn test_empty_poll_commits_nothing() {
        let mut consumer = SinkConsumer::new(ScriptedBroker::default(), CommitStrategy::Manual);
        consumer.with_topics(["people"]).unwrap();
        consumer.start().unwrap();

        consumer.read(&writer()).await.unwrap();

        assert!(consumer.broker().commits.is_empty());
        assert_eq!(consumer.state(), ConsumerState::Running);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_safe_before_start() {
        let mut consumer = SinkConsumer::new(ScriptedBroker::default(), CommitStrategy::Auto);

        consumer.stop();
        consumer.stop();

        assert_eq!(consumer.state(), ConsumerState::Stopped);
        assert_eq!(consumer.broker().closed, 1);
        assert!(consumer.read(&writer()).await.is_err());
    }
}
