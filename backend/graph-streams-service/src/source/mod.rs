//! Source side: routing committed graph changes to broker topics

pub mod publisher;

pub use publisher::{KafkaRecordPublisher, RecordPublisher, RoutedEventPublisher};
