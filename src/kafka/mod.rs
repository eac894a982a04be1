pub mod consumer;
pub mod producer;

pub use consumer::{BusConsumer, MessageHandler};
pub use producer::MessageProducer;

/// All chat traffic moves over one topic, keyed by conversation id so that a
/// conversation's records land on one partition and stay ordered.
pub const CHAT_MESSAGES_TOPIC: &str = "chat.messages";

/// One consumer per process instance joins this group.
pub const CONSUMER_GROUP: &str = "chat-service";
