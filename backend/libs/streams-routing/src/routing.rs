//! Routing configurations
//!
//! A routing configuration binds one entity selector (node labels or a
//! relationship type) and one property filter to a destination topic. They
//! are built once, when the routing table is loaded, and never mutated.

use crate::error::RoutingResult;
use crate::event::{EntityType, Properties};
use crate::pattern;

/// Property selection of a routing configuration.
///
/// `include` and `exclude` drive projection; `filter` only gates
/// applicability and never changes what is projected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutingProperties {
    pub all: bool,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub filter: Vec<String>,
}

impl RoutingProperties {
    /// Selection keeping every property with no existence filter
    pub fn everything() -> Self {
        Self {
            all: true,
            ..Self::default()
        }
    }

    /// Narrow a property map. `include` wins over `exclude`.
    pub fn project(&self, properties: &Properties) -> Properties {
        if self.all {
            return properties.clone();
        }

        if !self.include.is_empty() {
            return properties
                .iter()
                .filter(|(key, _)| self.include.iter().any(|k| k == *key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
        }

        if !self.exclude.is_empty() {
            return properties
                .iter()
                .filter(|(key, _)| !self.exclude.iter().any(|k| k == *key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
        }

        properties.clone()
    }

    /// Existence filter: every filter key must be present.
    ///
    /// An absent property map only passes when there is no filter.
    pub fn admits(&self, properties: Option<&Properties>) -> bool {
        if self.filter.is_empty() {
            return true;
        }

        match properties {
            Some(properties) => self.filter.iter().all(|key| properties.contains_key(key)),
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRoutingConfiguration {
    pub topic: String,
    /// Labels a node must carry, all of them. Empty matches every node.
    pub labels: Vec<String>,
    pub properties: RoutingProperties,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipRoutingConfiguration {
    pub topic: String,
    /// Relationship type. Empty matches every relationship.
    pub name: String,
    pub properties: RoutingProperties,
}

/// Routing rule for one selector clause of a pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingConfiguration {
    Node(NodeRoutingConfiguration),
    Relationship(RelationshipRoutingConfiguration),
}

impl RoutingConfiguration {
    pub fn topic(&self) -> &str {
        match self {
            RoutingConfiguration::Node(config) => &config.topic,
            RoutingConfiguration::Relationship(config) => &config.topic,
        }
    }

    pub fn properties(&self) -> &RoutingProperties {
        match self {
            RoutingConfiguration::Node(config) => &config.properties,
            RoutingConfiguration::Relationship(config) => &config.properties,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            RoutingConfiguration::Node(_) => EntityType::Node,
            RoutingConfiguration::Relationship(_) => EntityType::Relationship,
        }
    }
}

/// Builds routing configurations from topic patterns
pub struct RoutingConfigurationFactory;

impl RoutingConfigurationFactory {
    /// Parse `pattern` into one configuration per clause, all bound to `topic`.
    ///
    /// The topic name is validated before the pattern is looked at.
    pub fn get_routing_configuration(
        topic: &str,
        pattern: &str,
        kind: EntityType,
    ) -> RoutingResult<Vec<RoutingConfiguration>> {
        let clauses = pattern::parse(topic, pattern, kind)?;

        let configurations = clauses
            .into_iter()
            .map(|clause| match kind {
                EntityType::Node => RoutingConfiguration::Node(NodeRoutingConfiguration {
                    topic: topic.to_string(),
                    labels: clause.selector,
                    properties: clause.properties,
                }),
                EntityType::Relationship => {
                    RoutingConfiguration::Relationship(RelationshipRoutingConfiguration {
                        topic: topic.to_string(),
                        name: clause.selector.into_iter().next().unwrap_or_default(),
                        properties: clause.properties,
                    })
                }
            })
            .collect();

        Ok(configurations)
    }
}
