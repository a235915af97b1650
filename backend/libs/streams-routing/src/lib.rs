//! Streams routing library
//!
//! Routes captured graph transaction events to broker topics.
//!
//! A routing pattern is bound to a topic and names which node labels (or which
//! relationship type) go there and which properties they keep:
//!
//! ```text
//! streams.source.topic.nodes.people          = Person{name,-age}
//! streams.source.topic.nodes.everything      = *
//! streams.source.topic.relationships.knows   = KNOWS{@since}
//! ```
//!
//! - `name` keeps only listed properties, `-age` drops listed properties
//! - `@since` only routes entities carrying `since`, without projecting it
//! - `*` routes every entity of the kind with all its properties
//!
//! # Usage
//!
//! ```ignore
//! use streams_routing::RoutingTable;
//!
//! let table = RoutingTable::from_properties(&properties)?;
//! for (topic, event) in table.route(&event)? {
//!     publisher.publish(&topic, &event).await?;
//! }
//! ```

pub mod error;
pub mod event;
pub mod pattern;
pub mod projector;
pub mod routing;
pub mod table;
pub mod topic;

pub use error::{RoutingError, RoutingResult};
pub use event::{
    Constraint, ConstraintType, EntityType, Meta, NodeChange, NodePayload, OperationType, Payload,
    Properties, RelationshipChange, RelationshipNodeChange, RelationshipPayload, Schema,
    TransactionEvent,
};
pub use projector::{is_applicable, prepare_event, project};
pub use routing::{
    NodeRoutingConfiguration, RelationshipRoutingConfiguration, RoutingConfiguration,
    RoutingConfigurationFactory, RoutingProperties,
};
pub use table::{RoutingTable, NODE_ROUTING_PREFIX, RELATIONSHIP_ROUTING_PREFIX};
pub use topic::{validate_topic, MAX_TOPIC_NAME_LENGTH};
