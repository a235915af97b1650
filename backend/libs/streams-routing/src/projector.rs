//! Event filter and projector
//!
//! Decides which routing configurations apply to a transaction event and
//! produces the per-topic copies with narrowed property maps.

use std::collections::BTreeMap;

use crate::error::{RoutingError, RoutingResult};
use crate::event::{Payload, Properties, TransactionEvent};
use crate::routing::{RoutingConfiguration, RoutingProperties};

/// Check whether `config` routes `event`.
pub fn is_applicable(config: &RoutingConfiguration, event: &TransactionEvent) -> bool {
    let operation = event.operation();

    match (config, &event.payload) {
        (RoutingConfiguration::Node(config), Payload::Node(node)) => {
            let side = node.authoritative(operation);

            let labels: &[String] = side
                .and_then(|change| change.labels.as_deref())
                .unwrap_or(&[]);
            let has_labels = config
                .labels
                .iter()
                .all(|label| labels.iter().any(|l| l == label));

            has_labels
                && config
                    .properties
                    .admits(side.and_then(|change| change.properties.as_ref()))
        }
        (RoutingConfiguration::Relationship(config), Payload::Relationship(rel)) => {
            let matches_type = config.name.is_empty() || config.name == rel.label;

            matches_type
                && config.properties.admits(
                    rel.authoritative(operation)
                        .and_then(|change| change.properties.as_ref()),
                )
        }
        _ => false,
    }
}

fn project_side(properties: &mut Option<Properties>, selection: &RoutingProperties) {
    if let Some(props) = properties.as_mut() {
        *props = selection.project(props);
    }
}

/// Copy `event` with `before` and `after` properties narrowed by `config`.
///
/// Applicability is not checked here; only the entity kind is.
pub fn project(
    config: &RoutingConfiguration,
    event: &TransactionEvent,
) -> RoutingResult<TransactionEvent> {
    if config.entity_type() != event.payload.entity_type() {
        return Err(RoutingError::EntityKindMismatch {
            topic: config.topic().to_string(),
            expected: config.entity_type(),
            found: event.payload.entity_type(),
        });
    }

    let selection = config.properties();
    let mut projected = event.clone();

    match &mut projected.payload {
        Payload::Node(node) => {
            if let Some(before) = node.before.as_mut() {
                project_side(&mut before.properties, selection);
            }
            if let Some(after) = node.after.as_mut() {
                project_side(&mut after.properties, selection);
            }
        }
        Payload::Relationship(rel) => {
            if let Some(before) = rel.before.as_mut() {
                project_side(&mut before.properties, selection);
            }
            if let Some(after) = rel.after.as_mut() {
                project_side(&mut after.properties, selection);
            }
        }
    }

    Ok(projected)
}

/// Route `event` through `configs`, one projected copy per destination topic.
///
/// When several applicable configurations share a topic, the last one wins.
pub fn prepare_event(
    event: &TransactionEvent,
    configs: &[RoutingConfiguration],
) -> RoutingResult<BTreeMap<String, TransactionEvent>> {
    let mut routed = BTreeMap::new();

    for config in configs.iter().filter(|config| is_applicable(config, event)) {
        routed.insert(config.topic().to_string(), project(config, event)?);
    }

    Ok(routed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EntityType, Meta, NodeChange, NodePayload, OperationType, Schema};
    use crate::routing::RoutingConfigurationFactory;
    use serde_json::json;

    fn node_event(
        operation: OperationType,
        before: Option<NodeChange>,
        after: Option<NodeChange>,
    ) -> TransactionEvent {
        TransactionEvent {
            meta: Meta {
                timestamp: 0,
                username: "neo4j".to_string(),
                tx_id: 1,
                tx_event_id: 0,
                tx_events_count: 1,
                operation,
                source: Default::default(),
            },
            payload: Payload::Node(NodePayload {
                id: "0".to_string(),
                before,
                after,
            }),
            schema: Schema::default(),
        }
    }

    fn change(labels: &[&str], properties: serde_json::Value) -> NodeChange {
        NodeChange {
            labels: Some(labels.iter().map(|l| l.to_string()).collect()),
            properties: properties.as_object().cloned(),
        }
    }

    fn configs(topic: &str, pattern: &str) -> Vec<RoutingConfiguration> {
        RoutingConfigurationFactory::get_routing_configuration(topic, pattern, EntityType::Node)
            .unwrap()
    }

    #[test]
    fn test_node_requires_every_selector_label() {
        let event = node_event(
            OperationType::Created,
            None,
            Some(change(&["Person"], json!({"name": "A"}))),
        );

        assert!(is_applicable(&configs("t", "Person")[0], &event));
        assert!(!is_applicable(&configs("t", "Person:Employee")[0], &event));
        assert!(is_applicable(&configs("t", "*")[0], &event));
    }

    #[test]
    fn test_deleted_event_uses_before_labels() {
        let event = node_event(
            OperationType::Deleted,
            Some(change(&["Person"], json!({"name": "A"}))),
            None,
        );

        let routed = prepare_event(&event, &configs("people", "Person{name}")).unwrap();
        assert!(routed.contains_key("people"));
    }

    #[test]
    fn test_projection_keeps_absent_sides_absent() {
        let event = node_event(
            OperationType::Created,
            None,
            Some(change(&["Person"], json!({"name": "A", "age": 3}))),
        );

        let projected = project(&configs("people", "Person{-age}")[0], &event).unwrap();
        match projected.payload {
            Payload::Node(node) => {
                assert!(node.before.is_none());
                let after = node.after.unwrap().properties.unwrap();
                assert_eq!(serde_json::Value::Object(after), json!({"name": "A"}));
            }
            _ => panic!("Expected node payload"),
        }
    }

    #[test]
    fn test_same_topic_last_configuration_wins() {
        let event = node_event(
            OperationType::Updated,
            None,
            Some(change(&["Person"], json!({"name": "A", "age": 3}))),
        );

        let routed =
            prepare_event(&event, &configs("people", "Person{name};Person{age}")).unwrap();
        let payload = serde_json::to_value(&routed["people"].payload).unwrap();
        assert_eq!(payload["after"]["properties"], json!({"age": 3}));
    }

    #[test]
    fn test_project_rejects_other_entity_kind() {
        let rel_config = RoutingConfigurationFactory::get_routing_configuration(
            "knows",
            "KNOWS",
            EntityType::Relationship,
        )
        .unwrap();
        let event = node_event(OperationType::Created, None, Some(NodeChange::default()));

        assert!(!is_applicable(&rel_config[0], &event));
        let err = project(&rel_config[0], &event).unwrap_err();
        assert!(matches!(err, RoutingError::EntityKindMismatch { .. }));
        assert!(prepare_event(&event, &rel_config).unwrap().is_empty());
    }
}
