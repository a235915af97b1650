use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::broker::{SeekTarget, TopicPartition};
use crate::config::ConfigError;

fn default_commit() -> bool {
    true
}

/// Start position of one partition in a partition-aware read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionOffset {
    pub topic: String,
    pub partition: i32,
    /// `-1` beginning, `-2` end, otherwise the exact offset
    pub offset: i64,
}

/// Input of a partition-aware read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicPartitionConfig {
    #[serde(default = "default_commit")]
    pub commit: bool,
    #[serde(default)]
    pub partitions: Vec<PartitionOffset>,
}

impl Default for TopicPartitionConfig {
    fn default() -> Self {
        Self {
            commit: default_commit(),
            partitions: Vec::new(),
        }
    }
}

impl TopicPartitionConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::InvalidValue {
            key: "partitions".to_string(),
            value: json.to_string(),
            reason: e.to_string(),
        })?;
        config.seek_targets()?;
        Ok(config)
    }

    /// Seek target per configured partition, rejecting unknown sentinels
    pub fn seek_targets(&self) -> Result<Vec<(TopicPartition, SeekTarget)>, ConfigError> {
        self.partitions
            .iter()
            .map(|p| {
                SeekTarget::from_offset(p.offset)
                    .map(|target| (TopicPartition::new(&p.topic, p.partition), target))
                    .ok_or_else(|| ConfigError::InvalidValue {
                        key: format!("{}-{}.offset", p.topic, p.partition),
                        value: p.offset.to_string(),
                        reason: "offset must be -1 (beginning), -2 (end) or >= 0".to_string(),
                    })
            })
            .collect()
    }

    pub fn topic_partitions(&self) -> BTreeSet<TopicPartition> {
        self.partitions
            .iter()
            .map(|p| TopicPartition::new(&p.topic, p.partition))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_defaults_to_true() {
        let config = TopicPartitionConfig::from_json(
            r#"{"partitions": [{"topic": "people", "partition": 0, "offset": -1}]}"#,
        )
        .unwrap();

        assert!(config.commit);
        assert_eq!(
            config.seek_targets().unwrap(),
            vec![(TopicPartition::new("people", 0), SeekTarget::Beginning)]
        );
    }

    #[test]
    fn test_explicit_offsets() {
        let config = TopicPartitionConfig::from_json(
            r#"{"commit": false, "partitions": [
                {"topic": "people", "partition": 0, "offset": 10},
                {"topic": "people", "partition": 1, "offset": -2}
            ]}"#,
        )
        .unwrap();

        assert!(!config.commit);
        assert_eq!(config.topic_partitions().len(), 2);
        assert_eq!(config.seek_targets().unwrap()[1].1, SeekTarget::End);
    }

    #[test]
    fn test_unknown_negative_offset_is_rejected() {
        let err = TopicPartitionConfig::from_json(
            r#"{"partitions": [{"topic": "people", "partition": 0, "offset": -7}]}"#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        assert!(TopicPartitionConfig::from_json("{\"partitions\": 3}").is_err());
    }
}
