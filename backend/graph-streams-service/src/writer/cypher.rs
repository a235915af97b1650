use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use neo4rs::{
    query, BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString,
    BoltType, ConfigBuilder, Graph,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::Neo4jSettings;
use crate::driver::WriteAvailability;
use crate::sink::{SinkEntity, SinkWriter};

const SYSTEM_DATABASE: &str = "system";

async fn connect(settings: &Neo4jSettings, database: &str) -> Result<Graph> {
    let config = ConfigBuilder::default()
        .uri(settings.uri.as_str())
        .user(settings.user.as_str())
        .password(settings.password.as_str())
        .db(database)
        .build()
        .context("Invalid Neo4j configuration")?;

    Graph::connect(config)
        .await
        .with_context(|| format!("Failed to connect to Neo4j database {}", database))
}

/// Convert a decoded JSON value to a Bolt parameter
pub fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(BoltInteger::new(i)),
            None => BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or(f64::NAN))),
        },
        Value::String(s) => BoltType::String(BoltString::new(s)),
        Value::Array(items) => BoltType::List(BoltList {
            value: items.iter().map(json_to_bolt).collect(),
        }),
        Value::Object(map) => BoltType::Map(BoltMap {
            value: map
                .iter()
                .map(|(k, v)| (BoltString::new(k), json_to_bolt(v)))
                .collect(),
        }),
    }
}

/// Writes each group with the Cypher template configured for its topic.
///
/// The template sees one record value at a time as `event`.
pub struct CypherTemplateWriter {
    graph: Arc<Graph>,
    templates: BTreeMap<String, String>,
}

impl CypherTemplateWriter {
    pub fn new(graph: Arc<Graph>, templates: BTreeMap<String, String>) -> Self {
        Self { graph, templates }
    }

    pub async fn connect(
        settings: &Neo4jSettings,
        templates: BTreeMap<String, String>,
    ) -> Result<Self> {
        let graph = connect(settings, &settings.database).await?;
        Ok(Self::new(Arc::new(graph), templates))
    }

    /// Topics with a template, i.e. the sink subscription
    pub fn topics(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    pub fn statement(template: &str) -> String {
        format!("UNWIND $events AS event {}", template.trim())
    }
}

#[async_trait]
impl SinkWriter for CypherTemplateWriter {
    async fn write(&self, topic: &str, entities: &[SinkEntity]) -> Result<()> {
        let template = self
            .templates
            .get(topic)
            .ok_or_else(|| anyhow!("No Cypher template configured for topic {}", topic))?;

        let events: Vec<BoltType> = entities
            .iter()
            .map(|entity| json_to_bolt(entity.value.as_ref().unwrap_or(&Value::Null)))
            .collect();

        let statement = query(&Self::statement(template))
            .param("events", BoltType::List(BoltList { value: events }));

        self.graph.run(statement).await.with_context(|| {
            format!(
                "Failed to write {} events for topic {}",
                entities.len(),
                topic
            )
        })?;

        debug!(topic = %topic, count = entities.len(), "Executed Cypher template");
        Ok(())
    }
}

/// Asks the `system` database whether the configured database has a writer
/// on this instance.
pub struct Neo4jWriteAvailability {
    system: Graph,
    database: String,
}

impl Neo4jWriteAvailability {
    pub async fn connect(settings: &Neo4jSettings) -> Result<Self> {
        Ok(Self {
            system: connect(settings, SYSTEM_DATABASE).await?,
            database: settings.database.clone(),
        })
    }
}

#[async_trait]
impl WriteAvailability for Neo4jWriteAvailability {
    async fn is_writable(&self) -> Result<bool> {
        let mut result = self
            .system
            .execute(
                query("SHOW DATABASES YIELD name, writer WHERE name = $name RETURN writer")
                    .param("name", self.database.as_str()),
            )
            .await
            .context("Writable instance check failed")?;

        let mut writable = false;
        while let Some(row) = result.next().await? {
            writable |= row.get::<bool>("writer").unwrap_or(false);
        }

        Ok(writable)
    }
}
