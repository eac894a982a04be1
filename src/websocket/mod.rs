use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::Message;
use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, warn};

use crate::models::ChatMessage;
use crate::services::Deliver;

pub mod handlers;
pub mod message_types;

/// Idle threshold after which a connection is considered dead.
pub const READ_DEADLINE: Duration = Duration::from_secs(2 * 60);

/// Protocol-level heartbeat cadence and its write deadline.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const WRITE_DEADLINE: Duration = Duration::from_secs(10);

/// Janitor sweep cadence.
const JANITOR_INTERVAL: Duration = Duration::from_secs(5 * 60);
const STALE_AFTER_SECS: i64 = 2 * 60;

/// One live socket. Writes go through the channel so a slow peer never
/// blocks a broadcast to anyone else; the owning writer task applies the
/// write deadline.
pub struct ConnectionHandle {
    tx: UnboundedSender<Message>,
    last_ping: AtomicI64,
    is_active: AtomicBool,
}

impl ConnectionHandle {
    fn new(tx: UnboundedSender<Message>) -> Self {
        Self {
            tx,
            last_ping: AtomicI64::new(Utc::now().timestamp()),
            is_active: AtomicBool::new(true),
        }
    }

    pub fn touch(&self) {
        self.last_ping.store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn deactivate(&self) {
        self.is_active.store(false, Ordering::Relaxed);
    }

    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::Relaxed)
    }

    fn is_stale(&self, now: i64) -> bool {
        !self.is_active() || now - self.last_ping.load(Ordering::Relaxed) > STALE_AFTER_SECS
    }

    /// Queue a frame. A closed channel deactivates the connection.
    pub fn send(&self, message: Message) -> bool {
        if !self.is_active() {
            return false;
        }
        if self.tx.send(message).is_err() {
            self.deactivate();
            return false;
        }
        true
    }
}

/// Per-process registry of live sockets, keyed by user id and then by the
/// connection's address. All mutation happens under the outer lock; sends
/// are lock-free channel pushes, so no lock is ever held across a socket
/// write.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<String, HashMap<String, Arc<ConnectionHandle>>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(
        &self,
        user_id: &str,
        addr: &str,
        tx: UnboundedSender<Message>,
    ) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(tx));
        let mut guard = self.inner.write().await;
        guard
            .entry(user_id.to_string())
            .or_default()
            .insert(addr.to_string(), Arc::clone(&handle));
        debug!(user_id, addr, "socket registered");
        handle
    }

    /// Remove one connection. Returns true when the user has no connections
    /// left on this instance.
    pub async fn remove(&self, user_id: &str, addr: &str) -> bool {
        let mut guard = self.inner.write().await;
        let Some(connections) = guard.get_mut(user_id) else {
            return true;
        };
        if let Some(handle) = connections.remove(addr) {
            handle.deactivate();
            let _ = handle.tx.send(Message::Close(None));
        }
        if connections.is_empty() {
            guard.remove(user_id);
            return true;
        }
        false
    }

    /// Write to any one live connection of the user; drops silently when the
    /// user has no socket on this instance.
    pub async fn send_to_user(&self, user_id: &str, message: Message) {
        let guard = self.inner.read().await;
        if let Some(connections) = guard.get(user_id) {
            for handle in connections.values() {
                if handle.send(message.clone()) {
                    return;
                }
            }
        }
    }

    pub async fn connection_count(&self, user_id: &str) -> usize {
        self.inner
            .read()
            .await
            .get(user_id)
            .map_or(0, |connections| connections.len())
    }

    /// Close every socket and empty the registry; used on shutdown.
    pub async fn close_all(&self) {
        let mut guard = self.inner.write().await;
        for connections in guard.values() {
            for handle in connections.values() {
                handle.deactivate();
                let _ = handle.tx.send(Message::Close(None));
            }
        }
        guard.clear();
        info!("all sockets closed");
    }

    /// Sweep dead connections: inactive, or silent past the ping horizon.
    async fn sweep(&self) {
        let now = Utc::now().timestamp();
        let mut guard = self.inner.write().await;
        let mut swept = 0usize;

        guard.retain(|_user, connections| {
            connections.retain(|_addr, handle| {
                if handle.is_stale(now) {
                    handle.deactivate();
                    let _ = handle.tx.send(Message::Close(None));
                    swept += 1;
                    false
                } else {
                    true
                }
            });
            !connections.is_empty()
        });

        if swept > 0 {
            info!(swept, "janitor closed stale sockets");
        }
    }
}

/// Periodic cleanup of dead connections until shutdown is signalled.
pub fn spawn_janitor(registry: ConnectionRegistry, shutdown: Arc<Notify>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
        ticker.tick().await; // immediate first tick is a no-op
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("janitor shutting down");
                    return;
                }
                _ = ticker.tick() => registry.sweep().await,
            }
        }
    });
}

#[async_trait]
impl Deliver for ConnectionRegistry {
    async fn deliver(&self, user_id: &str, message: &ChatMessage) {
        match serde_json::to_string(message) {
            Ok(payload) => self.send_to_user(user_id, Message::Text(payload)).await,
            Err(e) => warn!(user_id, error = %e, "message failed to serialize for delivery"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn register_send_and_remove() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = unbounded_channel();

        registry.register("u1", "addr-1", tx).await;
        assert_eq!(registry.connection_count("u1").await, 1);

        registry
            .send_to_user("u1", Message::Text("hello".into()))
            .await;
        assert!(matches!(rx.recv().await, Some(Message::Text(t)) if t == "hello"));

        let empty = registry.remove("u1", "addr-1").await;
        assert!(empty);
        assert_eq!(registry.connection_count("u1").await, 0);
    }

    #[tokio::test]
    async fn send_to_absent_user_is_silent() {
        let registry = ConnectionRegistry::new();
        registry
            .send_to_user("nobody", Message::Text("x".into()))
            .await;
    }

    #[tokio::test]
    async fn broadcast_reaches_every_member_once() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();
        registry.register("u1", "a", tx1).await;
        registry.register("u2", "b", tx2).await;

        let message = ChatMessage {
            message_id: "m1".into(),
            conversation_id: "c1".into(),
            sender_id: "u1".into(),
            content: "hi".into(),
            message_type: crate::models::MessageType::Text,
            created_at: Utc::now(),
        };

        let members = vec!["u1".to_string(), "u2".to_string()];
        registry.broadcast_to_chat(&members, &message).await;

        for rx in [&mut rx1, &mut rx2] {
            let Some(Message::Text(payload)) = rx.recv().await else {
                panic!("expected a text frame");
            };
            let delivered: ChatMessage = serde_json::from_str(&payload).unwrap();
            assert_eq!(delivered.message_id, "m1");
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn dead_channel_deactivates_the_connection() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = unbounded_channel();
        let handle = registry.register("u1", "a", tx).await;
        drop(rx);

        registry.send_to_user("u1", Message::Text("x".into())).await;
        assert!(!handle.is_active());
    }

    #[tokio::test]
    async fn sweep_removes_inactive_connections() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = unbounded_channel();
        let handle = registry.register("u1", "a", tx).await;

        handle.deactivate();
        registry.sweep().await;
        assert_eq!(registry.connection_count("u1").await, 0);
    }

    #[tokio::test]
    async fn second_connection_keeps_the_user_entry() {
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = unbounded_channel();
        let (tx2, _rx2) = unbounded_channel();
        registry.register("u1", "a", tx1).await;
        registry.register("u1", "b", tx2).await;

        let empty = registry.remove("u1", "a").await;
        assert!(!empty);
        assert_eq!(registry.connection_count("u1").await, 1);
    }
}
