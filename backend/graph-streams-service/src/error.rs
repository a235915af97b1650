//! Error types for the streams service

use rdkafka::error::KafkaError;
use streams_routing::RoutingError;
use thiserror::Error;

use crate::config::ConfigError;

pub type SinkResult<T> = Result<T, SinkError>;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    #[error("Failed to decode record {topic}-{partition}@{offset}: {source}")]
    Decode {
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("Write failed: {0:#}")]
    Write(anyhow::Error),

    #[error("Failed to send record to dead letter queue: {0}")]
    Dlq(String),

    #[error("Failed to publish record: {0}")]
    Publish(String),

    #[error("Writable instance check failed: {0:#}")]
    WritableCheck(anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid consumer state: {0}")]
    InvalidState(String),
}

impl SinkError {
    /// Stable class name reported in dead letter records
    pub fn class_name(&self) -> &'static str {
        match self {
            SinkError::Kafka(_) => "KafkaError",
            SinkError::Decode { .. } => "DecodeError",
            SinkError::Write(_) => "WriteError",
            SinkError::Dlq(_) => "DlqError",
            SinkError::Publish(_) => "PublishError",
            SinkError::WritableCheck(_) => "WritableCheckError",
            SinkError::Config(_) => "ConfigurationError",
            SinkError::Routing(_) => "RoutingError",
            SinkError::Serialization(_) => "SerializationError",
            SinkError::InvalidState(_) => "InvalidStateError",
        }
    }
}
