use async_trait::async_trait;
use futures_util::future::join_all;

use crate::error::AppResult;
use crate::models::ChatMessage;

pub mod auth_service;
pub mod chat_service;
pub mod email;
pub mod geo;

/// Local delivery contract the chat service fans out through. The connection
/// manager implements it; the chat service never holds a typed reference to
/// the manager itself.
#[async_trait]
pub trait Deliver: Send + Sync {
    /// Hand a message to one user's live local connection, if any. Dropping
    /// silently when the user has no connection here is correct; another
    /// instance owns that user's socket.
    async fn deliver(&self, user_id: &str, message: &ChatMessage);

    /// Iterate conversation members and deliver to each concurrently, with
    /// per-recipient error handling inside `deliver`.
    async fn broadcast_to_chat(&self, members: &[String], message: &ChatMessage) {
        join_all(members.iter().map(|member| self.deliver(member, message))).await;
    }
}

/// Ingress contract the socket read loop pushes inbound chat frames into.
/// The chat service implements it.
#[async_trait]
pub trait Ingest: Send + Sync {
    async fn ingest(&self, message: ChatMessage) -> AppResult<ChatMessage>;
}
