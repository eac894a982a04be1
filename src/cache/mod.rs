use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::timeout;
use tracing::warn;

use crate::error::{AppError, AppResult};

/// Every cache operation is bounded here; a slow or dead Redis shows up as a
/// miss, never as caller latency beyond the budget.
const OP_TIMEOUT: Duration = Duration::from_millis(100);

pub const USER_TTL_SECS: u64 = 24 * 60 * 60;
pub const PAGE_TTL_SECS: u64 = 5 * 60;
pub const CHAT_TTL_SECS: u64 = 5 * 60;

/// Key conventions for the reference data kept warm in Redis.
pub mod keys {
    pub fn user(id: i64) -> String {
        format!("user:{id}")
    }

    pub fn user_email(email: &str) -> String {
        format!("user:email:{email}")
    }

    pub fn user_username(username: &str) -> String {
        format!("user:username:{username}")
    }

    pub fn users_page(page: i64, limit: i64) -> String {
        format!("users:page:{page}:limit:{limit}")
    }

    pub fn chat(id: &str) -> String {
        format!("chat:{id}")
    }
}

/// Advisory JSON cache over Redis. The authoritative stores are always the
/// relational and wide-column backends; entries may be stale up to their TTL.
#[derive(Clone)]
pub struct CacheRepository {
    conn: ConnectionManager,
}

impl CacheRepository {
    pub async fn connect(url: &str) -> AppResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| AppError::Config(format!("redis url: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Config(format!("redis connect: {e}")))?;
        Ok(Self { conn })
    }

    /// Read a JSON value. Timeouts, transport errors and decode failures all
    /// collapse to a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone();
        let fetched = timeout(OP_TIMEOUT, conn.get::<_, Option<String>>(key)).await;

        match fetched {
            Ok(Ok(Some(raw))) => serde_json::from_str(&raw).ok(),
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                warn!(key, error = %e, "cache read failed");
                None
            }
            Err(_) => {
                warn!(key, "cache read timed out");
                None
            }
        }
    }

    /// Best-effort write; failure is logged and swallowed.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let Ok(payload) = serde_json::to_string(value) else {
            warn!(key, "cache value failed to serialize");
            return;
        };

        let mut conn = self.conn.clone();
        match timeout(OP_TIMEOUT, conn.set_ex::<_, _, ()>(key, payload, ttl_secs)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(key, error = %e, "cache write failed"),
            Err(_) => warn!(key, "cache write timed out"),
        }
    }

    /// Best-effort invalidation.
    pub async fn delete(&self, key: &str) {
        let mut conn = self.conn.clone();
        match timeout(OP_TIMEOUT, conn.del::<_, ()>(key)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(key, error = %e, "cache delete failed"),
            Err(_) => warn!(key, "cache delete timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_conventions() {
        assert_eq!(keys::user(7), "user:7");
        assert_eq!(keys::user_email("a@ex.com"), "user:email:a@ex.com");
        assert_eq!(keys::user_username("alice"), "user:username:alice");
        assert_eq!(keys::users_page(2, 50), "users:page:2:limit:50");
        assert_eq!(keys::chat("c1"), "chat:c1");
    }
}
