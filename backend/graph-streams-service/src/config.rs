//! Service configuration
//!
//! Everything is read into one flat property map first. Environment variables
//! prefixed `STREAMS_`, `KAFKA_` or `NEO4J_` map to property keys by
//! lowercasing, turning `__` into `_` and `_` into `.`:
//!
//! ```text
//! KAFKA_BOOTSTRAP_SERVERS                  -> kafka.bootstrap.servers
//! STREAMS_SINK_ENABLED                     -> streams.sink.enabled
//! STREAMS_SINK_TOPIC_CYPHER_Person__Events -> streams.sink.topic.cypher.Person_Events
//! ```
//!
//! Topic suffixes of routing and template keys keep their case.

use rdkafka::ClientConfig;
use std::collections::BTreeMap;
use std::time::Duration;
use streams_routing::{RoutingError, RoutingTable};
use thiserror::Error;

use crate::sink::consumer::CommitStrategy;
use crate::sink::dlq::{DlqSettings, ErrorReporting, DEFAULT_CONTEXT_HEADER_PREFIX};

pub const KAFKA_PREFIX: &str = "kafka.";
pub const SINK_TEMPLATE_PREFIX: &str = "streams.sink.topic.cypher.";

const ENV_PREFIXES: [&str; 3] = ["STREAMS_", "KAFKA_", "NEO4J_"];
const CASE_PRESERVING_PREFIXES: [(&str, &str); 3] = [
    ("STREAMS_SINK_TOPIC_CYPHER_", SINK_TEMPLATE_PREFIX),
    ("STREAMS_SOURCE_TOPIC_NODES_", streams_routing::NODE_ROUTING_PREFIX),
    (
        "STREAMS_SOURCE_TOPIC_RELATIONSHIPS_",
        streams_routing::RELATIONSHIP_ROUTING_PREFIX,
    ),
];

const KAFKA_BOOTSTRAP_SERVERS: &str = "kafka.bootstrap.servers";
const KAFKA_GROUP_ID: &str = "kafka.group.id";
const KAFKA_AUTO_OFFSET_RESET: &str = "kafka.auto.offset.reset";
const KAFKA_ENABLE_AUTO_COMMIT: &str = "kafka.enable.auto.commit";

const SINK_ENABLED: &str = "streams.sink.enabled";
const SINK_POLL_INTERVAL: &str = "streams.sink.poll.interval";
const DLQ_TOPIC: &str = "streams.sink.errors.deadletterqueue.topic.name";
const DLQ_CONTEXT_HEADERS: &str = "streams.sink.errors.deadletterqueue.context.headers.enable";
const DLQ_CONTEXT_HEADER_PREFIX: &str =
    "streams.sink.errors.deadletterqueue.context.headers.prefix";
const ERRORS_LOG_ENABLE: &str = "streams.sink.errors.log.enable";
const ERRORS_LOG_MESSAGES: &str = "streams.sink.errors.log.include.messages";
const CHECK_WRITEABLE_INTERVAL: &str = "streams.check.writeable.instance.interval";
const SOURCE_ENABLED: &str = "streams.source.enabled";

const NEO4J_URI: &str = "neo4j.uri";
const NEO4J_USER: &str = "neo4j.user";
const NEO4J_PASSWORD: &str = "neo4j.password";
const NEO4J_DATABASE: &str = "neo4j.database";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Routing(#[from] RoutingError),
}

#[derive(Debug, Clone)]
pub struct KafkaSettings {
    pub bootstrap_servers: String,
    pub group_id: String,
    pub auto_offset_reset: String,
    pub enable_auto_commit: bool,
    /// Remaining `kafka.*` properties, prefix stripped
    pub extra: BTreeMap<String, String>,
}

impl KafkaSettings {
    /// Client configuration shared by consumers and producers
    pub fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new();
        client.set("bootstrap.servers", &self.bootstrap_servers);
        for (key, value) in &self.extra {
            client.set(key, value);
        }
        client
    }

    /// Consumer configuration: group, offset reset and commit mode on top of
    /// the shared client settings
    pub fn consumer_config(&self) -> ClientConfig {
        let mut client = self.client_config();
        client
            .set("group.id", &self.group_id)
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("enable.auto.commit", self.enable_auto_commit.to_string())
            .set("enable.partition.eof", "false");
        client
    }

    pub fn commit_strategy(&self) -> CommitStrategy {
        if self.enable_auto_commit {
            CommitStrategy::Auto
        } else {
            CommitStrategy::Manual
        }
    }
}

#[derive(Debug, Clone)]
pub struct SinkSettings {
    pub enabled: bool,
    /// Cypher template per subscribed topic
    pub templates: BTreeMap<String, String>,
    pub poll_interval: Duration,
    pub dlq: Option<DlqSettings>,
    pub error_reporting: ErrorReporting,
    pub check_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub enabled: bool,
    pub routing: RoutingTable,
}

#[derive(Debug, Clone)]
pub struct Neo4jSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct StreamsConfig {
    pub kafka: KafkaSettings,
    pub sink: SinkSettings,
    pub source: SourceSettings,
    pub neo4j: Neo4jSettings,
}

impl StreamsConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let properties: BTreeMap<String, String> = std::env::vars()
            .filter_map(|(key, value)| env_key_to_property(&key).map(|key| (key, value)))
            .collect();

        Self::from_properties(&properties)
    }

    pub fn from_properties(properties: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str, default: &str| -> String {
            properties
                .get(key)
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        let kafka = KafkaSettings {
            bootstrap_servers: get(KAFKA_BOOTSTRAP_SERVERS, "localhost:9092"),
            group_id: get(KAFKA_GROUP_ID, "neo4j"),
            auto_offset_reset: get(KAFKA_AUTO_OFFSET_RESET, "earliest"),
            enable_auto_commit: parse_bool(properties, KAFKA_ENABLE_AUTO_COMMIT, true)?,
            extra: properties
                .iter()
                .filter(|(key, _)| {
                    ![
                        KAFKA_BOOTSTRAP_SERVERS,
                        KAFKA_GROUP_ID,
                        KAFKA_AUTO_OFFSET_RESET,
                        KAFKA_ENABLE_AUTO_COMMIT,
                    ]
                    .contains(&key.as_str())
                })
                .filter_map(|(key, value)| {
                    key.strip_prefix(KAFKA_PREFIX)
                        .map(|key| (key.to_string(), value.clone()))
                })
                .collect(),
        };

        let dlq_topic = get(DLQ_TOPIC, "");
        let dlq = if dlq_topic.trim().is_empty() {
            None
        } else {
            streams_routing::validate_topic(&dlq_topic)?;
            Some(DlqSettings {
                topic: dlq_topic,
                context_headers: parse_bool(properties, DLQ_CONTEXT_HEADERS, false)?,
                header_prefix: get(DLQ_CONTEXT_HEADER_PREFIX, DEFAULT_CONTEXT_HEADER_PREFIX),
            })
        };

        let templates = properties
            .iter()
            .filter_map(|(key, template)| {
                key.strip_prefix(SINK_TEMPLATE_PREFIX)
                    .map(|topic| (topic.to_string(), template.clone()))
            })
            .collect::<BTreeMap<_, _>>();
        for topic in templates.keys() {
            streams_routing::validate_topic(topic)?;
        }

        let sink = SinkSettings {
            enabled: parse_bool(properties, SINK_ENABLED, true)?,
            templates,
            poll_interval: parse_millis(properties, SINK_POLL_INTERVAL, 100)?,
            dlq,
            error_reporting: ErrorReporting {
                log_errors: parse_bool(properties, ERRORS_LOG_ENABLE, false)?,
                log_messages: parse_bool(properties, ERRORS_LOG_MESSAGES, false)?,
            },
            check_interval: parse_millis(properties, CHECK_WRITEABLE_INTERVAL, 300_000)?,
        };

        let source = SourceSettings {
            enabled: parse_bool(properties, SOURCE_ENABLED, true)?,
            routing: RoutingTable::from_properties(properties)?,
        };

        let neo4j = Neo4jSettings {
            uri: get(NEO4J_URI, "bolt://localhost:7687"),
            user: get(NEO4J_USER, "neo4j"),
            password: get(NEO4J_PASSWORD, ""),
            database: get(NEO4J_DATABASE, "neo4j"),
        };

        Ok(Self {
            kafka,
            sink,
            source,
            neo4j,
        })
    }
}

/// Map an environment variable name to its property key.
///
/// Returns `None` for variables outside the recognised prefixes.
pub fn env_key_to_property(key: &str) -> Option<String> {
    let upper = key.to_ascii_uppercase();
    if !ENV_PREFIXES.iter().any(|prefix| upper.starts_with(prefix)) {
        return None;
    }

    for (env_prefix, property_prefix) in CASE_PRESERVING_PREFIXES {
        if upper.starts_with(env_prefix) && key.len() > env_prefix.len() {
            let suffix = translate_segments(&key[env_prefix.len()..], false);
            return Some(format!("{}{}", property_prefix, suffix));
        }
    }

    Some(translate_segments(key, true))
}

fn translate_segments(input: &str, lowercase: bool) -> String {
    input
        .split("__")
        .map(|segment| {
            let segment = segment.replace('_', ".");
            if lowercase {
                segment.to_lowercase()
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("_")
}

fn parse_bool(
    properties: &BTreeMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match properties.get(key) {
        None => Ok(default),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.clone(),
                reason: "expected true or false".to_string(),
            }),
        },
    }
}

fn parse_millis(
    properties: &BTreeMap<String, String>,
    key: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    match properties.get(key) {
        None => Ok(Duration::from_millis(default)),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.clone(),
                reason: e.to_string(),
            }),
    }
}
