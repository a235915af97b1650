use anyhow::{Context, Result};
use graph_streams_service::config::StreamsConfig;
use graph_streams_service::driver::SinkDriver;
use graph_streams_service::metrics::StreamsMetrics;
use graph_streams_service::sink::{DlqSender, KafkaBrokerConsumer, KafkaDlqSender, SinkConsumer};
use graph_streams_service::writer::{CypherTemplateWriter, Neo4jWriteAvailability};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "graph_streams_service=info,streams_routing=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Graph Streams Service");

    dotenvy::dotenv().ok();
    let config = match StreamsConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e).context("Failed to load configuration");
        }
    };

    info!(
        "Configuration loaded: brokers = {}, Neo4j URI = {}, sink = {}, source = {}",
        config.kafka.bootstrap_servers,
        config.neo4j.uri,
        config.sink.enabled,
        config.source.enabled
    );

    let metrics = StreamsMetrics::new().context("Failed to create metrics")?;
    metrics.register(prometheus::default_registry());

    if config.source.enabled {
        info!(
            topics = ?config.source.routing.topics(),
            "Source routing configured"
        );
    }

    if !config.sink.enabled || config.sink.templates.is_empty() {
        warn!("Sink disabled or no Cypher templates configured, nothing to consume");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let writer = CypherTemplateWriter::connect(&config.neo4j, config.sink.templates.clone())
        .await
        .context("Failed to create Cypher template writer")?;
    let availability = Neo4jWriteAvailability::connect(&config.neo4j)
        .await
        .context("Failed to create writable instance check")?;
    info!("Connected to Neo4j at {}", config.neo4j.uri);

    let broker = KafkaBrokerConsumer::new(&config.kafka).context("Failed to create consumer")?;
    let mut consumer = SinkConsumer::new(broker, config.kafka.commit_strategy())
        .with_error_reporting(config.sink.error_reporting.clone())
        .with_poll_timeout(config.sink.poll_interval)
        .with_metrics(metrics.clone());

    if let Some(dlq) = config.sink.dlq.clone() {
        info!(topic = %dlq.topic, "Dead letter queue enabled");
        if !dlq.context_headers {
            warn!(
                "Dead letter context headers disabled, records are forwarded without error details"
            );
        }
        let sender: Arc<dyn DlqSender> = Arc::new(
            KafkaDlqSender::new(&config.kafka, dlq).context("Failed to create DLQ producer")?,
        );
        consumer = consumer.with_dlq_sender(sender);
    }

    consumer.with_topics(writer.topics())?;
    consumer.start()?;

    let driver = SinkDriver::new(
        consumer,
        Arc::new(writer),
        Arc::new(availability),
        config.sink.check_interval,
    );
    let mut handle = tokio::spawn(driver.run(shutdown_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Sink driver failed during shutdown: {}", e),
                Err(e) => error!("Sink driver task panicked: {}", e),
            }
        }
        result = &mut handle => {
            match result {
                Ok(Ok(())) => info!("Sink driver finished"),
                Ok(Err(e)) => {
                    error!("Sink driver stopped: {}", e);
                    return Err(e.into());
                }
                Err(e) => return Err(e).context("Sink driver task panicked"),
            }
        }
    }

    info!("Graph Streams Service stopped");
    Ok(())
}
