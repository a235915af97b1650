//! Broker topic name rules

use crate::error::{RoutingError, RoutingResult};

/// Longest topic name the broker accepts
pub const MAX_TOPIC_NAME_LENGTH: usize = 249;

fn is_legal_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'
}

/// Validate a topic name before any pattern bound to it is parsed.
pub fn validate_topic(topic: &str) -> RoutingResult<()> {
    let reason = if topic.is_empty() {
        Some("topic name is empty".to_string())
    } else if topic == "." || topic == ".." {
        Some("topic name cannot be '.' or '..'".to_string())
    } else if topic.len() > MAX_TOPIC_NAME_LENGTH {
        Some(format!(
            "topic name is longer than {} characters",
            MAX_TOPIC_NAME_LENGTH
        ))
    } else {
        topic
            .chars()
            .find(|c| !is_legal_char(*c))
            .map(|c| format!("illegal character '{}', allowed are ASCII alphanumerics, '.', '_' and '-'", c))
    };

    match reason {
        Some(reason) => Err(RoutingError::InvalidTopic {
            topic: topic.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_topics() {
        for topic in ["people", "graph.nodes", "my_topic-1", "A.b_C-d"] {
            assert!(validate_topic(topic).is_ok(), "{} should be valid", topic);
        }
    }

    #[test]
    fn test_invalid_topics() {
        let too_long = "t".repeat(MAX_TOPIC_NAME_LENGTH + 1);
        for topic in ["", ".", "..", "with space", "semi;colon", too_long.as_str()] {
            let err = validate_topic(topic).unwrap_err();
            assert!(err.is_configuration_error());
        }
    }

    #[test]
    fn test_max_length_is_inclusive() {
        let topic = "t".repeat(MAX_TOPIC_NAME_LENGTH);
        assert!(validate_topic(&topic).is_ok());
    }
}
