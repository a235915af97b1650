use prometheus::{IntCounter, Opts, Registry};
use tracing::warn;

/// Counters of the sink and source pipelines
#[derive(Clone)]
pub struct StreamsMetrics {
    pub sink_batches: IntCounter,
    pub sink_write_failures: IntCounter,
    pub sink_dlq_records: IntCounter,
    pub sink_decode_failures: IntCounter,
    pub source_records_published: IntCounter,
}

impl StreamsMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            sink_batches: IntCounter::with_opts(Opts::new(
                "streams_sink_batches_total",
                "Number of record groups written to the graph",
            ))?,
            sink_write_failures: IntCounter::with_opts(Opts::new(
                "streams_sink_write_failures_total",
                "Number of failed write attempts of a record group",
            ))?,
            sink_dlq_records: IntCounter::with_opts(Opts::new(
                "streams_sink_dlq_records_total",
                "Number of records sent to the dead letter queue",
            ))?,
            sink_decode_failures: IntCounter::with_opts(Opts::new(
                "streams_sink_decode_failures_total",
                "Number of records that could not be decoded",
            ))?,
            source_records_published: IntCounter::with_opts(Opts::new(
                "streams_source_records_published_total",
                "Number of routed transaction events published",
            ))?,
        })
    }

    /// Register every counter. Failures are logged and skipped.
    pub fn register(&self, registry: &Registry) {
        for metric in [
            Box::new(self.sink_batches.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(self.sink_write_failures.clone()),
            Box::new(self.sink_dlq_records.clone()),
            Box::new(self.sink_decode_failures.clone()),
            Box::new(self.source_records_published.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register streams metric: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_twice_is_not_fatal() {
        let registry = Registry::new();
        let metrics = StreamsMetrics::new().unwrap();

        metrics.register(&registry);
        metrics.register(&registry);
        metrics.sink_batches.inc();

        let families = registry.gather();
        assert_eq!(families.len(), 5);
        assert!(families
            .iter()
            .any(|f| f.get_name() == "streams_sink_batches_total"));
    }
}
