//! Routing table built from configuration properties

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::error::RoutingResult;
use crate::event::{EntityType, TransactionEvent};
use crate::projector::prepare_event;
use crate::routing::{RoutingConfiguration, RoutingConfigurationFactory};

/// Property prefix of node routing patterns, followed by the topic name
pub const NODE_ROUTING_PREFIX: &str = "streams.source.topic.nodes.";
/// Property prefix of relationship routing patterns, followed by the topic name
pub const RELATIONSHIP_ROUTING_PREFIX: &str = "streams.source.topic.relationships.";

/// All routing configurations of the source side, split by entity kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    nodes: Vec<RoutingConfiguration>,
    relationships: Vec<RoutingConfiguration>,
}

impl RoutingTable {
    /// Build the table from flat properties.
    ///
    /// Keys are visited in sorted order so configuration order, and with it
    /// same-topic resolution, is deterministic. The first invalid pattern or
    /// topic aborts the load.
    pub fn from_properties(properties: &BTreeMap<String, String>) -> RoutingResult<Self> {
        let mut table = Self::default();

        for (key, pattern) in properties {
            if let Some(topic) = key.strip_prefix(NODE_ROUTING_PREFIX) {
                table.nodes.extend(RoutingConfigurationFactory::get_routing_configuration(
                    topic,
                    pattern,
                    EntityType::Node,
                )?);
                debug!(topic = %topic, pattern = %pattern, "Loaded node routing");
            } else if let Some(topic) = key.strip_prefix(RELATIONSHIP_ROUTING_PREFIX) {
                table.relationships.extend(
                    RoutingConfigurationFactory::get_routing_configuration(
                        topic,
                        pattern,
                        EntityType::Relationship,
                    )?,
                );
                debug!(topic = %topic, pattern = %pattern, "Loaded relationship routing");
            }
        }

        info!(
            node_routes = table.nodes.len(),
            relationship_routes = table.relationships.len(),
            "Routing table loaded"
        );

        Ok(table)
    }

    /// Route one event to its projected per-topic copies
    pub fn route(
        &self,
        event: &TransactionEvent,
    ) -> RoutingResult<BTreeMap<String, TransactionEvent>> {
        prepare_event(event, self.configurations(event.payload.entity_type()))
    }

    pub fn configurations(&self, kind: EntityType) -> &[RoutingConfiguration] {
        match kind {
            EntityType::Node => &self.nodes,
            EntityType::Relationship => &self.relationships,
        }
    }

    /// Every destination topic of the table
    pub fn topics(&self) -> BTreeSet<String> {
        self.nodes
            .iter()
            .chain(self.relationships.iter())
            .map(|config| config.topic().to_string())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RoutingError;

    fn properties(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_properties_splits_by_kind() {
        let table = RoutingTable::from_properties(&properties(&[
            ("streams.source.topic.nodes.people", "Person{name}"),
            ("streams.source.topic.nodes.everything", "*"),
            ("streams.source.topic.relationships.knows", "KNOWS{@since}"),
            ("streams.sink.enabled", "true"),
        ]))
        .unwrap();

        assert_eq!(table.configurations(EntityType::Node).len(), 2);
        assert_eq!(table.configurations(EntityType::Relationship).len(), 1);
        assert_eq!(
            table.topics().into_iter().collect::<Vec<_>>(),
            vec!["everything", "knows", "people"]
        );
    }

    #[test]
    fn test_invalid_pattern_aborts_load() {
        let err = RoutingTable::from_properties(&properties(&[(
            "streams.source.topic.relationships.rels",
            "KNOWS:LIKES",
        )]))
        .unwrap_err();

        assert!(err.is_configuration_error());
        assert!(matches!(err, RoutingError::PatternSyntax { .. }));
    }

    #[test]
    fn test_empty_table() {
        let table = RoutingTable::from_properties(&BTreeMap::new()).unwrap();
        assert!(table.is_empty());
        assert!(table.topics().is_empty());
    }
}
