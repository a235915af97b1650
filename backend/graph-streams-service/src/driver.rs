//! Outer sink loop
//!
//! Reads while the graph instance accepts writes, idles for the check
//! interval while it does not. Any error escaping a read stops the consumer
//! and ends the loop; restarting is left to the process supervisor.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::{SinkError, SinkResult};
use crate::sink::{BrokerConsumer, SinkConsumer, SinkWriter};

/// Whether this graph instance currently accepts writes
#[async_trait]
pub trait WriteAvailability: Send + Sync {
    async fn is_writable(&self) -> anyhow::Result<bool>;
}

enum Flow {
    Continue,
    Stop,
}

pub struct SinkDriver<B: BrokerConsumer> {
    consumer: SinkConsumer<B>,
    writer: Arc<dyn SinkWriter>,
    availability: Arc<dyn WriteAvailability>,
    check_interval: Duration,
}

impl<B: BrokerConsumer> SinkDriver<B> {
    pub fn new(
        consumer: SinkConsumer<B>,
        writer: Arc<dyn SinkWriter>,
        availability: Arc<dyn WriteAvailability>,
        check_interval: Duration,
    ) -> Self {
        Self {
            consumer,
            writer,
            availability,
            check_interval,
        }
    }

    /// Run until `shutdown` turns true or a fatal error occurs.
    ///
    /// Shutdown is only observed between reads and during the idle wait.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SinkResult<()> {
        info!(
            check_interval = ?self.check_interval,
            "Sink driver started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.step(&mut shutdown).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(e) => {
                    error!(error = %e, "Sink driver stopped on fatal error");
                    self.consumer.stop();
                    return Err(e);
                }
            }
        }

        self.consumer.stop();
        info!("Sink driver shut down");
        Ok(())
    }

    async fn step(&mut self, shutdown: &mut watch::Receiver<bool>) -> SinkResult<Flow> {
        let writable = self
            .availability
            .is_writable()
            .await
            .map_err(SinkError::WritableCheck)?;

        if writable {
            self.consumer.read(self.writer.as_ref()).await?;
            return Ok(Flow::Continue);
        }

        debug!(
            interval = ?self.check_interval,
            "Instance is not writable, waiting"
        );

        tokio::select! {
            _ = tokio::time::sleep(self.check_interval) => Ok(Flow::Continue),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    Ok(Flow::Stop)
                } else {
                    Ok(Flow::Continue)
                }
            }
        }
    }
}
