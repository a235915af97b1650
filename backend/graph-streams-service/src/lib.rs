//! Graph streams service
//!
//! Moves graph change events between Neo4j and Kafka:
//! - the source side routes committed transaction events to topics through
//!   a [`streams_routing::RoutingTable`]
//! - the sink side consumes topics and writes each record group back into
//!   the graph with a per-topic Cypher template, with unbounded retry and a
//!   dead letter queue

pub mod config;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod sink;
pub mod source;
pub mod writer;

pub use config::{ConfigError, StreamsConfig};
pub use driver::{SinkDriver, WriteAvailability};
pub use error::{SinkError, SinkResult};
pub use metrics::StreamsMetrics;
