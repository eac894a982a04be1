use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};

use crate::error::{AppError, AppResult};
use crate::models::ChatMessage;

/// Publisher side of the commit log. `publish` does not return until the
/// broker acknowledges the record; an unacknowledged message is not sent.
#[derive(Clone)]
pub struct MessageProducer {
    producer: FutureProducer,
    topic: String,
}

impl MessageProducer {
    pub fn new(brokers: &str, topic: &str) -> AppResult<Self> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("client.id", "tidechat")
            .set("acks", "all")
            .set("message.timeout.ms", "30000")
            .create::<FutureProducer>()
            .map_err(|e| AppError::Bus(format!("create producer: {e}")))?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }

    pub async fn publish(&self, message: &ChatMessage) -> AppResult<()> {
        let payload = serde_json::to_string(message)
            .map_err(|e| AppError::Bus(format!("serialize message: {e}")))?;

        let record = FutureRecord::to(&self.topic)
            .key(&message.conversation_id)
            .payload(&payload);

        self.producer
            .send(record, Duration::from_secs(30))
            .await
            .map_err(|(e, _)| AppError::Bus(format!("publish: {e}")))?;

        Ok(())
    }
}
