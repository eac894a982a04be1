use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::{device_id_from_headers, CurrentUser};
use crate::models::user::{
    InitiateRecoveryRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
    SwitchAccountRequest, RefreshTokenRequest, ValidateRecoveryRequest, VerifyEmailRequest,
    DeviceSessionDraft,
};
use crate::response::{ApiResponse, Envelope};
use crate::state::AppState;

fn field_error(field: &str, tag: &str) -> AppError {
    AppError::Validation(json!([{ "field": field, "tag": tag }]))
}

fn client_ip(headers: &HeaderMap, addr: &SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| addr.ip().to_string())
}

fn device_draft(
    headers: &HeaderMap,
    addr: &SocketAddr,
    device_id: Option<String>,
) -> DeviceSessionDraft {
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    DeviceSessionDraft {
        device_id: device_id
            .or_else(|| device_id_from_headers(headers))
            .unwrap_or_default(),
        device_type: user_agent.clone(),
        ip_address: client_ip(headers, addr),
        user_agent,
        location: "Unknown".to_string(),
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<Envelope> {
    if body.username.trim().is_empty() {
        return Err(field_error("username", "required"));
    }
    if body.password.is_empty() {
        return Err(field_error("password", "required"));
    }
    if let Some(email) = body.email.as_deref() {
        if !email.contains('@') {
            return Err(field_error("email", "email"));
        }
    }

    let birth_date = match body.birth_date.as_deref() {
        Some(raw) => Some(
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| field_error("birth_date", "format"))?,
        ),
        None => None,
    };

    let user = state
        .auth
        .register(
            body.username.trim(),
            body.email.as_deref(),
            &body.password,
            birth_date,
        )
        .await?;

    Ok(ApiResponse::created(
        "REGISTRATION_SUCCESS",
        "Registration successful",
        json!({ "user": user }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> AppResult<Envelope> {
    if body.identifier.trim().is_empty() {
        return Err(field_error("identifier", "required"));
    }
    if body.password.is_empty() {
        return Err(field_error("password", "required"));
    }

    let draft = device_draft(&headers, &addr, body.device_id.clone());
    let (user, token, refresh_token, device_info) = state
        .auth
        .login(body.identifier.trim(), &body.password, draft)
        .await?;

    Ok(ApiResponse::success(
        "LOGIN_SUCCESS",
        "Login successful",
        json!({
            "user": user,
            "token": token,
            "refresh_token": refresh_token,
            "device_info": device_info,
        }),
    ))
}

/// The HTTP surface reports an invalid refresh grant as AUTH011; the
/// service-level kind stays AUTH004 for the internal callers.
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> Response {
    match state.auth.refresh_token(&body.refresh_token).await {
        Ok((token, refresh_token)) => ApiResponse::success(
            "TOKEN_REFRESHED",
            "Token refreshed successfully",
            json!({ "token": token, "refresh_token": refresh_token }),
        )
        .into_response(),
        Err(AppError::InvalidRefreshToken) => ApiResponse::error(
            StatusCode::UNAUTHORIZED,
            "AUTH011",
            "Invalid or expired refresh token",
            None,
        )
        .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn logout(
    State(state): State<AppState>,
    user: CurrentUser,
    headers: HeaderMap,
) -> AppResult<Envelope> {
    let device_id = device_id_from_headers(&headers)
        .ok_or_else(|| field_error("Device-ID", "required"))?;

    state.auth.revoke_session(user.id, &device_id).await?;
    Ok(ApiResponse::success(
        "LOGOUT_SUCCESS",
        "Logged out successfully",
        json!(null),
    ))
}

pub async fn switch_account(
    State(state): State<AppState>,
    user: CurrentUser,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<SwitchAccountRequest>,
) -> AppResult<Envelope> {
    let _ = user; // authenticated by the either-grant middleware

    if body.switch_type == "password" && body.password.as_deref().unwrap_or("").is_empty() {
        return Err(AppError::PasswordRequired);
    }
    if body.switch_type == "token" && body.stored_token.as_deref().unwrap_or("").is_empty() {
        return Err(AppError::StoredTokenRequired);
    }

    let draft = device_draft(&headers, &addr, None);
    let (target, token, refresh_token, device_info) =
        state.auth.switch_account(&body, draft).await?;

    Ok(ApiResponse::success(
        "SWITCH_ACCOUNT_SUCCESS",
        "Successfully switched accounts",
        json!({
            "user": target,
            "token": token,
            "refresh_token": refresh_token,
            "device_info": device_info,
        }),
    ))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(body): Json<VerifyEmailRequest>,
) -> AppResult<Envelope> {
    state.auth.verify_email(&body.email, &body.code).await?;
    Ok(ApiResponse::success(
        "EMAIL_VERIFIED",
        "Email verified successfully",
        json!(null),
    ))
}

pub async fn initiate_recovery(
    State(state): State<AppState>,
    Json(body): Json<InitiateRecoveryRequest>,
) -> AppResult<Envelope> {
    state.auth.initiate_account_recovery(&body.email).await?;
    Ok(ApiResponse::success(
        "RECOVERY_INITIATED",
        "Recovery instructions sent",
        json!(null),
    ))
}

pub async fn validate_recovery(
    State(state): State<AppState>,
    Json(body): Json<ValidateRecoveryRequest>,
) -> AppResult<Envelope> {
    state
        .auth
        .validate_recovery_code(&body.email, &body.code)
        .await?;
    Ok(ApiResponse::success(
        "RECOVERY_CODE_VALID",
        "Recovery code is valid",
        json!(null),
    ))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> AppResult<Envelope> {
    if body.new_password.is_empty() {
        return Err(field_error("new_password", "required"));
    }
    state
        .auth
        .reset_password(&body.email, &body.code, &body.new_password)
        .await?;
    Ok(ApiResponse::success(
        "PASSWORD_RESET",
        "Password has been reset",
        json!(null),
    ))
}

pub async fn active_sessions(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Envelope> {
    let sessions = state.auth.get_active_sessions(user.id).await?;
    Ok(ApiResponse::success(
        "SESSIONS",
        "Active sessions",
        json!({ "sessions": sessions }),
    ))
}

pub async fn revoke_session(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(device_id): Path<String>,
) -> AppResult<Envelope> {
    state.auth.revoke_session(user.id, &device_id).await?;
    Ok(ApiResponse::success(
        "SESSION_REVOKED",
        "Session revoked",
        json!(null),
    ))
}

pub async fn login_history(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Envelope> {
    let history = state.auth.get_login_history(user.id).await?;
    Ok(ApiResponse::success(
        "LOGIN_HISTORY",
        "Recent logins",
        json!({ "history": history }),
    ))
}
