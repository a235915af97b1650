use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use std::time::Duration;
use streams_routing::{RoutingTable, TransactionEvent};
use tracing::{debug, warn};

use crate::config::KafkaSettings;
use crate::error::{SinkError, SinkResult};
use crate::metrics::StreamsMetrics;

const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends one serialized record to a topic
#[async_trait]
pub trait RecordPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> SinkResult<()>;
}

pub struct KafkaRecordPublisher {
    producer: FutureProducer,
}

impl KafkaRecordPublisher {
    pub fn new(kafka: &KafkaSettings) -> SinkResult<Self> {
        let producer: FutureProducer = kafka
            .client_config()
            .set("message.timeout.ms", "30000")
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .create()?;

        Ok(Self { producer })
    }

    pub fn flush(&self) {
        if let Err(e) = self.producer.flush(FLUSH_TIMEOUT) {
            warn!("Failed to flush source producer: {}", e);
        }
    }
}

#[async_trait]
impl RecordPublisher for KafkaRecordPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> SinkResult<()> {
        let record = FutureRecord::<str, [u8]>::to(topic)
            .key(key)
            .payload(payload);

        let (partition, offset) = self
            .producer
            .send(record, SEND_TIMEOUT)
            .await
            .map_err(|(e, _)| SinkError::Publish(format!("Kafka send error: {}", e)))?;

        debug!(
            topic = %topic,
            partition = partition,
            offset = offset,
            "Published transaction event"
        );
        Ok(())
    }
}

/// Projects transaction events through the routing table and publishes one
/// copy per destination topic, keyed by entity id.
///
/// Library entry point of the source side: the change-capture component that
/// observes committed transactions owns the event stream and hands each event
/// to [`RoutedEventPublisher::publish`]. The service binary only consumes.
pub struct RoutedEventPublisher<P: RecordPublisher> {
    table: RoutingTable,
    publisher: P,
    metrics: Option<StreamsMetrics>,
}

impl<P: RecordPublisher> RoutedEventPublisher<P> {
    pub fn new(table: RoutingTable, publisher: P) -> Self {
        Self {
            table,
            publisher,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: StreamsMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Publish `event` to every matching topic, returning how many copies
    /// were sent. Stops at the first failed send.
    pub async fn publish(&self, event: &TransactionEvent) -> SinkResult<usize> {
        let routed = self.table.route(event)?;
        let key = event.payload.id();

        for (topic, projected) in &routed {
            let payload = serde_json::to_vec(projected)?;
            self.publisher.publish(topic, key, &payload).await?;

            if let Some(metrics) = &self.metrics {
                metrics.source_records_published.inc();
            }
        }

        if routed.is_empty() {
            debug!(
                tx_id = event.meta.tx_id,
                entity = %event.payload.entity_type(),
                "Transaction event matched no route"
            );
        }

        Ok(routed.len())
    }
}
