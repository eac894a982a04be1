use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{error, info};

use tidechat::cache::CacheRepository;
use tidechat::config::Config;
use tidechat::db::{self, chat_repo::ChatRepository};
use tidechat::error::{AppError, AppResult};
use tidechat::kafka::{self, BusConsumer, MessageProducer};
use tidechat::middleware::rate_limit::RateLimiter;
use tidechat::models::ChatMessage;
use tidechat::services::auth_service::AuthService;
use tidechat::services::chat_service::ChatService;
use tidechat::services::email::EmailService;
use tidechat::services::geo::GeoService;
use tidechat::services::{Deliver, Ingest};
use tidechat::state::AppState;
use tidechat::websocket::{self, ConnectionRegistry};
use tidechat::{jobs, logging, routes};

/// Bus records land here on every instance; each one fans out to the local
/// sockets of that conversation's members.
struct BroadcastHandler {
    chat: Arc<ChatService>,
}

#[async_trait]
impl kafka::MessageHandler for BroadcastHandler {
    async fn handle(&self, message: ChatMessage) -> AppResult<()> {
        self.chat.broadcast(&message).await
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(_) => {
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let config = Arc::new(Config::from_env()?);

    let pool = db::init_pool(&config.database.url())
        .await
        .map_err(|e| AppError::Config(format!("database: {e}")))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| AppError::Config(format!("migrations: {e}")))?;
    info!("relational store ready");

    let cache = Arc::new(CacheRepository::connect(&config.redis.url()).await?);
    info!("cache ready");

    let chat_repo = Arc::new(ChatRepository::connect(&config.scylla).await?);
    info!(keyspace = %config.scylla.keyspace, "chat log store ready");

    let producer = MessageProducer::new(&config.kafka_broker, kafka::CHAT_MESSAGES_TOPIC)?;
    let consumer = BusConsumer::new(
        &config.kafka_broker,
        kafka::CONSUMER_GROUP,
        kafka::CHAT_MESSAGES_TOPIC,
    )?;
    let consumer_shutdown = consumer.shutdown_handle();
    info!(broker = %config.kafka_broker, "message bus ready");

    let registry = ConnectionRegistry::new();
    let email = Arc::new(EmailService::new(&config.email));
    let geo = Arc::new(GeoService::new(&config.geo_api_key));

    let auth = Arc::new(AuthService::new(
        pool.clone(),
        Arc::clone(&cache),
        email,
        geo,
        config.jwt_secret.clone(),
    ));
    let chat = Arc::new(ChatService::new(
        chat_repo,
        Arc::clone(&cache),
        producer,
        Arc::new(registry.clone()) as Arc<dyn Deliver>,
    ));

    // Background machinery: bus consumer, connection janitor, session sweep.
    {
        let handler = Arc::new(BroadcastHandler {
            chat: Arc::clone(&chat),
        });
        tokio::spawn(async move {
            if let Err(e) = consumer.run(handler).await {
                error!(error = %e, "bus consumer stopped");
            }
        });
    }

    let background_shutdown = Arc::new(Notify::new());
    websocket::spawn_janitor(registry.clone(), Arc::clone(&background_shutdown));
    jobs::session_cleanup::spawn(pool.clone(), Arc::clone(&background_shutdown));

    let state = AppState {
        db: pool.clone(),
        cache,
        auth,
        chat: Arc::clone(&chat),
        ingest: chat as Arc<dyn Ingest>,
        registry: registry.clone(),
        login_limiter: Arc::new(RateLimiter::new(5, Duration::from_secs(60))),
        config: Arc::clone(&config),
    };

    let app = routes::build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Config(format!("bind {addr}: {e}")))?;
    info!(%addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| AppError::Internal(format!("server: {e}")))?;

    // Stop intake first, then drain: consumer and periodic tasks get the
    // signal, sockets close with a normal close frame, pools go last.
    info!("shutting down");
    consumer_shutdown.notify_waiters();
    background_shutdown.notify_waiters();
    registry.close_all().await;
    pool.close().await;

    Ok(())
}
