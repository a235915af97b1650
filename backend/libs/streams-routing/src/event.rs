//! Transaction event model
//!
//! Shape of the change events produced by the graph capture layer. Every
//! committed transaction yields one [`TransactionEvent`] per touched node or
//! relationship; routing only ever rewrites the `properties` maps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Property map of a node or relationship.
pub type Properties = Map<String, Value>;

/// Kind of mutation captured in a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Created,
    Updated,
    Deleted,
}

/// Graph entity kind carried by a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Node,
    Relationship,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::Node => write!(f, "node"),
            EntityType::Relationship => write!(f, "relationship"),
        }
    }
}

/// Transaction metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    /// Commit timestamp in milliseconds
    pub timestamp: i64,
    pub username: String,
    pub tx_id: i64,
    /// Position of this event within its transaction
    pub tx_event_id: i32,
    pub tx_events_count: i32,
    pub operation: OperationType,
    #[serde(default)]
    pub source: Map<String, Value>,
}

/// State of a node on one side of the change
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeChange {
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    #[serde(default)]
    pub properties: Option<Properties>,
}

/// State of a relationship on one side of the change
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RelationshipChange {
    #[serde(default)]
    pub properties: Option<Properties>,
}

/// Endpoint of a relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipNodeChange {
    pub id: String,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    /// Key properties identifying the endpoint
    #[serde(default)]
    pub ids: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePayload {
    pub id: String,
    pub before: Option<NodeChange>,
    pub after: Option<NodeChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipPayload {
    pub id: String,
    pub start: RelationshipNodeChange,
    pub end: RelationshipNodeChange,
    pub before: Option<RelationshipChange>,
    pub after: Option<RelationshipChange>,
    /// Relationship type
    pub label: String,
}

/// Entity payload, tagged by `type` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Payload {
    Node(NodePayload),
    Relationship(RelationshipPayload),
}

impl Payload {
    pub fn id(&self) -> &str {
        match self {
            Payload::Node(node) => &node.id,
            Payload::Relationship(rel) => &rel.id,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            Payload::Node(_) => EntityType::Node,
            Payload::Relationship(_) => EntityType::Relationship,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintType {
    Unique,
    NodePropertyExists,
    RelationshipPropertyExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub label: Option<String>,
    pub properties: BTreeSet<String>,
    #[serde(rename = "type")]
    pub kind: ConstraintType,
}

/// Property types and constraints of the entity at capture time
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

/// One captured change of one graph entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub meta: Meta,
    pub payload: Payload,
    #[serde(default)]
    pub schema: Schema,
}

impl TransactionEvent {
    pub fn operation(&self) -> OperationType {
        self.meta.operation
    }
}

/// Side of a change that decides label/type membership.
///
/// Deletes only carry a meaningful `before`; every other operation is judged
/// on `after`, falling back to `before` when `after` is missing.
fn authoritative_side<'a, T>(
    operation: OperationType,
    before: &'a Option<T>,
    after: &'a Option<T>,
) -> Option<&'a T> {
    match operation {
        OperationType::Deleted => before.as_ref().or(after.as_ref()),
        OperationType::Created | OperationType::Updated => after.as_ref().or(before.as_ref()),
    }
}

impl NodePayload {
    pub fn authoritative(&self, operation: OperationType) -> Option<&NodeChange> {
        authoritative_side(operation, &self.before, &self.after)
    }
}

impl RelationshipPayload {
    pub fn authoritative(&self, operation: OperationType) -> Option<&RelationshipChange> {
        authoritative_side(operation, &self.before, &self.after)
    }
}
