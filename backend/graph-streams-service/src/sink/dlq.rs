//! Dead letter queue
//!
//! Records that cannot be decoded, and every record of a group whose write
//! failed, are forwarded here with the error that caused it.

use async_trait::async_trait;
use chrono::Utc;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use serde::{Serialize, Serializer};
use std::time::Duration;
use tracing::{debug, error, warn};

use super::broker::BrokerRecord;
use crate::config::KafkaSettings;
use crate::error::{SinkError, SinkResult};

pub const DEFAULT_CONTEXT_HEADER_PREFIX: &str = "__streams.errors.";

const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

fn bytes_as_text<S: Serializer>(
    bytes: &Option<Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match bytes {
        Some(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
        None => serializer.serialize_none(),
    }
}

/// Failed record envelope.
///
/// The serialized form is the logical record for logging and inspection
/// tools. [`KafkaDlqSender`] does not send it: the dead letter record keeps
/// the original key, value and headers, and the error context only travels
/// as headers when `context_headers` is enabled.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqRecord {
    pub original_topic: String,
    pub partition: i32,
    pub offset: i64,
    #[serde(serialize_with = "bytes_as_text")]
    pub key: Option<Vec<u8>>,
    #[serde(serialize_with = "bytes_as_text")]
    pub value: Option<Vec<u8>>,
    #[serde(skip)]
    pub headers: Vec<(String, Option<Vec<u8>>)>,
    pub error_class: String,
    pub error_message: String,
    /// Failure time in milliseconds
    pub timestamp: i64,
}

impl DlqRecord {
    pub fn new(record: &BrokerRecord, error: &SinkError) -> Self {
        Self {
            original_topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
            key: record.key.clone(),
            value: record.value.clone(),
            headers: record.headers.clone(),
            error_class: error.class_name().to_string(),
            error_message: error.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Error context headers, each key prefixed with `prefix`
    pub fn context_headers(&self, prefix: &str) -> Vec<(String, String)> {
        vec![
            (format!("{prefix}topic"), self.original_topic.clone()),
            (format!("{prefix}partition"), self.partition.to_string()),
            (format!("{prefix}offset"), self.offset.to_string()),
            (
                format!("{prefix}exception.class.name"),
                self.error_class.clone(),
            ),
            (
                format!("{prefix}exception.message"),
                self.error_message.clone(),
            ),
            (format!("{prefix}timestamp"), self.timestamp.to_string()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlqSettings {
    pub topic: String,
    pub context_headers: bool,
    pub header_prefix: String,
}

/// Error logging of failed records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorReporting {
    pub log_errors: bool,
    /// Also log key and value
    pub log_messages: bool,
}

impl ErrorReporting {
    pub fn report(&self, record: &DlqRecord) {
        if !self.log_errors {
            return;
        }

        if self.log_messages {
            error!(
                topic = %record.original_topic,
                partition = record.partition,
                offset = record.offset,
                error_class = %record.error_class,
                key = ?record.key.as_deref().map(String::from_utf8_lossy),
                value = ?record.value.as_deref().map(String::from_utf8_lossy),
                "Sink record failed: {}",
                record.error_message
            );
        } else {
            error!(
                topic = %record.original_topic,
                partition = record.partition,
                offset = record.offset,
                error_class = %record.error_class,
                "Sink record failed: {}",
                record.error_message
            );
        }
    }
}

#[async_trait]
pub trait DlqSender: Send + Sync {
    async fn send(&self, record: DlqRecord) -> SinkResult<()>;

    fn close(&self);
}

/// Dead letter sender over a Kafka producer.
///
/// The original key, value and headers are forwarded unchanged.
pub struct KafkaDlqSender {
    producer: FutureProducer,
    settings: DlqSettings,
}

impl KafkaDlqSender {
    pub fn new(kafka: &KafkaSettings, settings: DlqSettings) -> SinkResult<Self> {
        let producer: FutureProducer = kafka
            .client_config()
            .set("message.timeout.ms", "30000")
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .create()?;

        Ok(Self { producer, settings })
    }

    fn headers(&self, record: &DlqRecord) -> OwnedHeaders {
        let mut headers = OwnedHeaders::new();
        for (key, value) in &record.headers {
            headers = headers.insert(Header {
                key: key.as_str(),
                value: value.as_deref(),
            });
        }

        if self.settings.context_headers {
            for (key, value) in record.context_headers(&self.settings.header_prefix) {
                headers = headers.insert(Header {
                    key: key.as_str(),
                    value: Some(value.as_bytes()),
                });
            }
        }

        headers
    }
}

#[async_trait]
impl DlqSender for KafkaDlqSender {
    async fn send(&self, record: DlqRecord) -> SinkResult<()> {
        let mut kafka_record = FutureRecord::<[u8], [u8]>::to(&self.settings.topic)
            .headers(self.headers(&record));
        if let Some(key) = record.key.as_deref() {
            kafka_record = kafka_record.key(key);
        }
        if let Some(value) = record.value.as_deref() {
            kafka_record = kafka_record.payload(value);
        }

        let (partition, offset) = self
            .producer
            .send(kafka_record, SEND_TIMEOUT)
            .await
            .map_err(|(e, _)| SinkError::Dlq(format!("Kafka send error: {}", e)))?;

        debug!(
            dlq_topic = %self.settings.topic,
            partition = partition,
            offset = offset,
            original_topic = %record.original_topic,
            original_offset = record.offset,
            "Sent record to dead letter queue"
        );

        Ok(())
    }

    fn close(&self) {
        if let Err(e) = self.producer.flush(FLUSH_TIMEOUT) {
            warn!("Failed to flush dead letter producer: {}", e);
        }
    }
}
