//! Error types for the routing library.

use thiserror::Error;

use crate::event::EntityType;

/// Result type alias for routing operations.
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Errors raised while building routing configurations or projecting events.
///
/// `PatternSyntax` and `InvalidTopic` are configuration errors: a routing
/// table that fails to load must abort startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// A pattern clause does not follow the `SELECTOR{PROP_LIST}` grammar
    #[error("The pattern {pattern} for topic {topic} is invalid: {reason}")]
    PatternSyntax {
        pattern: String,
        topic: String,
        reason: String,
    },

    /// Topic name violates the broker naming rules
    #[error("Invalid topic name '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: String },

    /// A configuration was asked to project an event of the other entity kind
    #[error("Routing configuration for topic {topic} expects {expected} events, got {found}")]
    EntityKindMismatch {
        topic: String,
        expected: EntityType,
        found: EntityType,
    },
}

impl RoutingError {
    /// Check if this error must reject a configuration load
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            RoutingError::PatternSyntax { .. } | RoutingError::InvalidTopic { .. }
        )
    }
}
