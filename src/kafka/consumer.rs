use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message as KafkaMessage;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::ChatMessage;

const MAX_RECV_RETRIES: u32 = 5;

/// Receives every record the group assigns to this instance, at least once.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: ChatMessage) -> AppResult<()>;
}

pub struct BusConsumer {
    consumer: StreamConsumer,
    topic: String,
    shutdown: Arc<Notify>,
}

impl BusConsumer {
    pub fn new(brokers: &str, group: &str, topic: &str) -> AppResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", group)
            .set("bootstrap.servers", brokers)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "10000")
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| AppError::Bus(format!("create consumer: {e}")))?;

        Ok(Self {
            consumer,
            topic: topic.to_string(),
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Consume until shutdown. Handler failures are logged and the loop moves
    /// on; receive failures back off exponentially and give up after a bounded
    /// number of consecutive errors.
    pub async fn run<H>(&self, handler: Arc<H>) -> AppResult<()>
    where
        H: MessageHandler + 'static,
    {
        self.consumer
            .subscribe(&[&self.topic])
            .map_err(|e| AppError::Bus(format!("subscribe: {e}")))?;

        info!(topic = %self.topic, "bus consumer subscribed");

        let mut recv_failures = 0u32;
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("bus consumer shutting down");
                    return Ok(());
                }
                received = self.consumer.recv() => match received {
                    Ok(record) => {
                        recv_failures = 0;
                        let Some(payload) = record.payload() else {
                            warn!("bus record with empty payload");
                            continue;
                        };
                        let message: ChatMessage = match serde_json::from_slice(payload) {
                            Ok(m) => m,
                            Err(e) => {
                                warn!(error = %e, "undecodable bus record dropped");
                                continue;
                            }
                        };
                        debug!(
                            conversation_id = %message.conversation_id,
                            partition = record.partition(),
                            offset = record.offset(),
                            "bus record received"
                        );
                        if let Err(e) = handler.handle(message).await {
                            error!(error = %e, "bus record handling failed");
                        }
                    }
                    Err(e) => {
                        recv_failures += 1;
                        error!(error = %e, attempt = recv_failures, "bus receive failed");
                        if recv_failures >= MAX_RECV_RETRIES {
                            return Err(AppError::Bus(format!(
                                "consumer gave up after {MAX_RECV_RETRIES} receive failures"
                            )));
                        }
                        sleep(Duration::from_millis(
                            500 * 2u64.pow(recv_failures - 1),
                        ))
                        .await;
                    }
                }
            }
        }
    }
}
