use std::sync::Arc;

use sqlx::PgPool;

use crate::cache::CacheRepository;
use crate::config::Config;
use crate::middleware::rate_limit::RateLimiter;
use crate::services::auth_service::AuthService;
use crate::services::chat_service::ChatService;
use crate::services::Ingest;
use crate::websocket::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub cache: Arc<CacheRepository>,
    pub auth: Arc<AuthService>,
    pub chat: Arc<ChatService>,
    /// The socket read loop pushes inbound chat frames through this contract
    /// rather than holding the chat service's type.
    pub ingest: Arc<dyn Ingest>,
    pub registry: ConnectionRegistry,
    pub login_limiter: Arc<RateLimiter>,
    pub config: Arc<Config>,
}
