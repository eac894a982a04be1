use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post, put};
use axum::{middleware as axum_middleware, Router};

use crate::middleware::auth::{require_access, require_any_token};
use crate::middleware::rate_limit::login_rate_limit;
use crate::middleware::request_id::request_monitoring;
use crate::state::AppState;
use crate::websocket::handlers::ws_handler;

pub mod auth;
pub mod chat;
pub mod users;

pub fn build_router(state: AppState) -> Router {
    let auth_public = Router::new()
        .route("/register", post(auth::register))
        .route(
            "/login",
            post(auth::login)
                .route_layer(from_fn_with_state(state.clone(), login_rate_limit)),
        )
        .route("/refresh-token", post(auth::refresh_token))
        .route("/verify-email", post(auth::verify_email))
        .route("/recovery/initiate", post(auth::initiate_recovery))
        .route("/recovery/validate", post(auth::validate_recovery))
        .route("/recovery/reset", post(auth::reset_password));

    let auth_protected = Router::new()
        .route("/logout", post(auth::logout))
        .route("/sessions", get(auth::active_sessions))
        .route("/sessions/:device_id", delete(auth::revoke_session))
        .route("/login-history", get(auth::login_history))
        .layer(from_fn_with_state(state.clone(), require_access));

    // Switch-account accepts either grant; every other protected route is
    // access-only.
    let auth_switch = Router::new()
        .route("/switch-account", post(auth::switch_account))
        .layer(from_fn_with_state(state.clone(), require_any_token));

    let users_public = Router::new()
        .route("/check/username", get(users::check_username))
        .route("/check/email", get(users::check_email));

    let users_protected = Router::new()
        .route("/", get(users::list_users))
        .route("/me", get(users::me))
        .route("/me/profile-picture", post(users::update_profile_picture))
        .layer(from_fn_with_state(state.clone(), require_access));

    let chat_protected = Router::new()
        .route("/", post(chat::create_chat).get(chat::list_chats))
        .route("/notifications", get(chat::list_notifications))
        .route(
            "/notifications/:id/read",
            put(chat::mark_notification_read),
        )
        .route("/join/:code", post(chat::join_via_invite))
        .route("/:id", get(chat::get_chat))
        .route("/:id/messages", get(chat::get_messages))
        .route("/:id/members", post(chat::add_member))
        .route("/:id/members/:user_id", delete(chat::remove_member))
        .route("/:id/members/:user_id/role", put(chat::update_member_role))
        .route(
            "/:id/invite-links",
            post(chat::create_invite).get(chat::list_invites),
        )
        .route("/:id/invite-links/:code", delete(chat::delete_invite))
        .layer(from_fn_with_state(state.clone(), require_access));

    // The socket authenticates itself (query token or first-frame auth), so
    // it sits outside the header middleware.
    let chat_ws = Router::new().route("/ws", get(ws_handler));

    Router::new()
        .route("/ping", get(|| async { "pong" }))
        .route("/health", get(|| async { "OK" }))
        .nest(
            "/api/v1/auth",
            auth_public.merge(auth_protected).merge(auth_switch),
        )
        .nest("/api/v1/users", users_public.merge(users_protected))
        .nest("/api/v1/chat", chat_protected.merge(chat_ws))
        .layer(axum_middleware::from_fn(request_monitoring))
        .with_state(state)
}
