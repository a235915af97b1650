use serde::Serialize;
use serde_json::Value;

use super::broker::BrokerRecord;
use crate::error::{SinkError, SinkResult};

/// Decoded record handed to the write callback.
///
/// Absent or empty bytes decode to `None`, so a tombstone has `value: None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SinkEntity {
    pub key: Option<Value>,
    pub value: Option<Value>,
}

impl SinkEntity {
    pub fn decode(record: &BrokerRecord) -> SinkResult<Self> {
        let decode = |bytes: &Option<Vec<u8>>| -> SinkResult<Option<Value>> {
            match bytes.as_deref() {
                None | Some([]) => Ok(None),
                Some(bytes) => {
                    serde_json::from_slice(bytes)
                        .map(Some)
                        .map_err(|source| SinkError::Decode {
                            topic: record.topic.clone(),
                            partition: record.partition,
                            offset: record.offset,
                            source,
                        })
                }
            }
        };

        Ok(Self {
            key: decode(&record.key)?,
            value: decode(&record.value)?,
        })
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(key: Option<&str>, value: Option<&str>) -> BrokerRecord {
        BrokerRecord {
            topic: "people".to_string(),
            partition: 0,
            offset: 5,
            key: key.map(|k| k.as_bytes().to_vec()),
            value: value.map(|v| v.as_bytes().to_vec()),
            headers: Vec::new(),
            timestamp: None,
        }
    }

    #[test]
    fn test_decode_key_and_value() {
        let entity = SinkEntity::decode(&record(Some("42"), Some(r#"{"name":"A"}"#))).unwrap();

        assert_eq!(entity.key, Some(json!(42)));
        assert_eq!(entity.value, Some(json!({"name": "A"})));
        assert!(!entity.is_tombstone());
    }

    #[test]
    fn test_missing_value_is_tombstone() {
        let entity = SinkEntity::decode(&record(Some("\"k\""), None)).unwrap();
        assert!(entity.is_tombstone());

        let entity = SinkEntity::decode(&record(None, Some(""))).unwrap();
        assert!(entity.key.is_none());
        assert!(entity.is_tombstone());
    }

    #[test]
    fn test_invalid_json_is_decode_error() {
        let err = SinkEntity::decode(&record(None, Some("{not json"))).unwrap_err();

        match err {
            SinkError::Decode {
                topic,
                partition,
                offset,
                ..
            } => {
                assert_eq!(topic, "people");
                assert_eq!(partition, 0);
                assert_eq!(offset, 5);
            }
            other => panic!("Unexpected error {:?}", other),
        }
    }
}
