use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::CurrentUser;
use crate::models::{ChatRole, ChatType};
use crate::response::{ApiResponse, Envelope};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    #[serde(rename = "type")]
    pub chat_type: String,
    #[serde(default)]
    pub name: Option<String>,
    pub participants: Vec<String>,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub before: Option<DateTime<Utc>>,
    /// With `to`, selects the oldest-first date-range read instead of the
    /// newest-first page.
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateInviteRequest {
    #[serde(default)]
    pub max_uses: i32,
    pub expires_in: String,
}

#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    #[serde(default = "default_notification_limit")]
    pub limit: i32,
}

fn default_notification_limit() -> i32 {
    50
}

/// `"90s"`, `"30m"`, `"1h"`, `"7d"`, or a bare number of seconds.
fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(seconds) = raw.parse::<i64>() {
        return Some(Duration::seconds(seconds));
    }

    let unit = raw.chars().last()?;
    let value: i64 = raw[..raw.len() - unit.len_utf8()].parse().ok()?;
    match unit {
        's' => Some(Duration::seconds(value)),
        'm' => Some(Duration::minutes(value)),
        'h' => Some(Duration::hours(value)),
        'd' => Some(Duration::days(value)),
        _ => None,
    }
}

/// Membership guard: at least `min_role` in the chat, or the request is
/// rejected at the gateway.
async fn require_role(
    state: &AppState,
    chat_id: &str,
    user_id: &str,
    min_role: ChatRole,
) -> AppResult<ChatRole> {
    let role = state
        .chat
        .member_role(chat_id, user_id)
        .await?
        .ok_or(AppError::Forbidden)?;
    if role < min_role {
        return Err(AppError::Forbidden);
    }
    Ok(role)
}

pub async fn create_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<CreateChatRequest>,
) -> AppResult<Envelope> {
    let chat_type = ChatType::parse(&body.chat_type)
        .ok_or_else(|| AppError::BadRequest("type must be direct, group or broadcast".into()))?;
    if body.participants.is_empty() && chat_type != ChatType::Broadcast {
        return Err(AppError::BadRequest("participants cannot be empty".into()));
    }

    let chat = state
        .chat
        .create_chat(
            &user.id.to_string(),
            chat_type,
            body.name.clone(),
            body.participants.clone(),
            body.is_private,
        )
        .await?;

    Ok(ApiResponse::success(
        "CHAT_CREATED",
        "Conversation ready",
        json!({ "chat": chat }),
    ))
}

pub async fn list_chats(State(state): State<AppState>, user: CurrentUser) -> AppResult<Envelope> {
    let chats = state.chat.get_user_chats(&user.id.to_string()).await?;
    Ok(ApiResponse::success(
        "CHATS",
        "Your conversations",
        json!({ "chats": chats }),
    ))
}

pub async fn get_chat(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(chat_id): Path<String>,
) -> AppResult<Envelope> {
    let chat = state.chat.get_chat(&chat_id).await?;
    Ok(ApiResponse::success(
        "CHAT",
        "Conversation snapshot",
        json!({ "chat": chat }),
    ))
}

pub async fn get_messages(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(chat_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Envelope> {
    let messages = match (query.from, query.to) {
        (Some(from), Some(to)) => state.chat.get_messages_between(&chat_id, from, to).await?,
        _ => {
            state
                .chat
                .get_messages(&chat_id, query.limit, query.before)
                .await?
        }
    };
    Ok(ApiResponse::success(
        "MESSAGES",
        "Conversation history",
        json!({ "messages": messages }),
    ))
}

pub async fn add_member(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(chat_id): Path<String>,
    Json(body): Json<AddMemberRequest>,
) -> AppResult<Envelope> {
    let chat = state.chat.add_member(&chat_id, &body.user_id).await?;
    Ok(ApiResponse::success(
        "MEMBER_ADDED",
        "Member added",
        json!({ "chat": chat }),
    ))
}

pub async fn remove_member(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((chat_id, member_id)): Path<(String, String)>,
) -> AppResult<Envelope> {
    require_role(&state, &chat_id, &user.id.to_string(), ChatRole::Admin).await?;

    state.chat.remove_member(&chat_id, &member_id).await?;
    Ok(ApiResponse::success(
        "MEMBER_REMOVED",
        "Member removed",
        json!(null),
    ))
}

pub async fn update_member_role(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((chat_id, member_id)): Path<(String, String)>,
    Json(body): Json<UpdateRoleRequest>,
) -> AppResult<Envelope> {
    require_role(&state, &chat_id, &user.id.to_string(), ChatRole::Owner).await?;
    let role = ChatRole::parse(&body.role)
        .ok_or_else(|| AppError::BadRequest("role must be owner, admin or member".into()))?;

    state
        .chat
        .update_member_role(&chat_id, &member_id, role)
        .await?;
    Ok(ApiResponse::success(
        "ROLE_UPDATED",
        "Member role updated",
        json!(null),
    ))
}

pub async fn create_invite(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(chat_id): Path<String>,
    Json(body): Json<CreateInviteRequest>,
) -> AppResult<Envelope> {
    let requester = user.id.to_string();
    require_role(&state, &chat_id, &requester, ChatRole::Admin).await?;

    let expires_in = parse_duration(&body.expires_in)
        .ok_or_else(|| AppError::BadRequest("expires_in must look like 30m, 1h or 7d".into()))?;
    let link = state
        .chat
        .create_invite(&chat_id, &requester, body.max_uses, expires_in)
        .await?;

    Ok(ApiResponse::success(
        "INVITE_CREATED",
        "Invite link created",
        json!({ "invite": link }),
    ))
}

pub async fn list_invites(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(chat_id): Path<String>,
) -> AppResult<Envelope> {
    require_role(&state, &chat_id, &user.id.to_string(), ChatRole::Admin).await?;
    let invites = state.chat.list_invites(&chat_id).await?;
    Ok(ApiResponse::success(
        "INVITES",
        "Invite links",
        json!({ "invites": invites }),
    ))
}

pub async fn join_via_invite(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(code): Path<String>,
) -> AppResult<Envelope> {
    let chat = state
        .chat
        .join_via_invite(&code, &user.id.to_string())
        .await?;
    Ok(ApiResponse::success(
        "JOINED",
        "Joined conversation",
        json!({ "chat": chat }),
    ))
}

pub async fn delete_invite(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((chat_id, code)): Path<(String, String)>,
) -> AppResult<Envelope> {
    require_role(&state, &chat_id, &user.id.to_string(), ChatRole::Admin).await?;
    state.chat.delete_invite(&chat_id, &code).await?;
    Ok(ApiResponse::success(
        "INVITE_REVOKED",
        "Invite link revoked",
        json!(null),
    ))
}

pub async fn list_notifications(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<NotificationsQuery>,
) -> AppResult<Envelope> {
    let notifications = state
        .chat
        .list_notifications(&user.id.to_string(), query.limit.clamp(1, 200))
        .await?;
    Ok(ApiResponse::success(
        "NOTIFICATIONS",
        "Your notifications",
        json!({ "notifications": notifications }),
    ))
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(notification_id): Path<String>,
) -> AppResult<Envelope> {
    state
        .chat
        .mark_notification_read(&user.id.to_string(), &notification_id)
        .await?;
    Ok(ApiResponse::success(
        "NOTIFICATION_READ",
        "Notification marked read",
        json!(null),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_parse_with_unit_suffixes() {
        assert_eq!(parse_duration("90s"), Some(Duration::seconds(90)));
        assert_eq!(parse_duration("30m"), Some(Duration::minutes(30)));
        assert_eq!(parse_duration("1h"), Some(Duration::hours(1)));
        assert_eq!(parse_duration("7d"), Some(Duration::days(7)));
        assert_eq!(parse_duration("3600"), Some(Duration::seconds(3600)));
    }

    #[test]
    fn malformed_durations_are_rejected() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("h"), None);
        assert_eq!(parse_duration("1w"), None);
        assert_eq!(parse_duration("soon"), None);
    }
}
