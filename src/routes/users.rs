use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::cache;
use crate::db::user_repo;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::CurrentUser;
use crate::models::User;
use crate::response::{ApiResponse, Envelope};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UsernameQuery {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct ProfilePictureRequest {
    pub profile_picture: String,
}

pub async fn check_username(
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> AppResult<Envelope> {
    let taken = user_repo::username_exists(&state.db, &query.username).await?;
    Ok(ApiResponse::success(
        "USERNAME_CHECK",
        "Username availability",
        json!({ "available": !taken }),
    ))
}

pub async fn check_email(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> AppResult<Envelope> {
    let taken = user_repo::email_exists(&state.db, &query.email).await?;
    Ok(ApiResponse::success(
        "EMAIL_CHECK",
        "Email availability",
        json!({ "available": !taken }),
    ))
}

/// Current profile, read through `user:{id}`.
pub async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Envelope> {
    let key = cache::keys::user(user.id);
    let profile = match state.cache.get::<User>(&key).await {
        Some(cached) => cached,
        None => {
            let fetched = user_repo::find_user_by_id(&state.db, user.id).await?;
            state.cache.set(&key, &fetched, cache::USER_TTL_SECS).await;
            fetched
        }
    };

    Ok(ApiResponse::success(
        "PROFILE",
        "Current profile",
        json!({ "user": profile }),
    ))
}

pub async fn update_profile_picture(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<ProfilePictureRequest>,
) -> AppResult<Envelope> {
    if body.profile_picture.trim().is_empty() {
        return Err(AppError::BadRequest("profile_picture is required".into()));
    }

    let mut profile = user_repo::find_user_by_id(&state.db, user.id).await?;
    profile.profile_picture = Some(body.profile_picture.trim().to_string());
    user_repo::update_user(&state.db, &profile).await?;
    state.cache.delete(&cache::keys::user(user.id)).await;

    Ok(ApiResponse::success(
        "PROFILE_UPDATED",
        "Profile picture updated",
        json!({ "user": profile }),
    ))
}

/// Paged listing, read through `users:page:{p}:limit:{n}` with the short
/// TTL; staleness up to five minutes is accepted.
pub async fn list_users(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Envelope> {
    let limit = query.limit.clamp(1, 100);
    let page = query.page.max(1);
    let key = cache::keys::users_page(page, limit);

    let users = match state.cache.get::<Vec<User>>(&key).await {
        Some(cached) => cached,
        None => {
            let fetched = user_repo::list_users(&state.db, page, limit).await?;
            state.cache.set(&key, &fetched, cache::PAGE_TTL_SECS).await;
            fetched
        }
    };

    Ok(ApiResponse::success(
        "USERS",
        "User listing",
        json!({ "users": users, "page": page, "limit": limit }),
    ))
}
