//! Sink pipeline: broker records back into the graph

pub mod broker;
pub mod consumer;
pub mod dlq;
pub mod entity;
pub mod kafka;
pub mod retry;
pub mod topic_config;

pub use broker::{BrokerConsumer, BrokerRecord, SeekTarget, TopicPartition};
pub use consumer::{CommitStrategy, ConsumerState, SinkConsumer, SinkWriter};
pub use dlq::{DlqRecord, DlqSender, DlqSettings, ErrorReporting, KafkaDlqSender};
pub use entity::SinkEntity;
pub use kafka::KafkaBrokerConsumer;
pub use retry::{RetryPolicy, RetryState, RetryTracker, Sleeper, TokioSleeper};
pub use topic_config::{PartitionOffset, TopicPartitionConfig};
