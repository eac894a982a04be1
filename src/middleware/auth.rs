use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::AppError;
use crate::security::jwt;
use crate::state::AppState;

pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";
pub const DEVICE_ID_HEADER: &str = "device-id";

/// Bearer token from `Authorization`, falling back to `X-Refresh-Token`.
/// The fallback deliberately lets a refresh token reach the either-validated
/// endpoints; access-only endpoints still reject it at validation.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|v| !v.is_empty() && *v != "null")
    {
        return Some(token.to_string());
    }

    headers
        .get(REFRESH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

pub fn device_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(DEVICE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

/// Authenticated principal, placed in request extensions by the middleware
/// below.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub id: i64,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .copied()
            .ok_or(AppError::Unauthorized)
    }
}

/// Protected endpoints: access tokens only.
pub async fn require_access(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = token_from_headers(request.headers()).ok_or(AppError::Unauthorized)?;
    let user_id = jwt::validate_access(&token, &state.config.jwt_secret)?;
    request.extensions_mut().insert(CurrentUser { id: user_id });
    Ok(next.run(request).await)
}

/// Switch-account: either grant is accepted.
pub async fn require_any_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = token_from_headers(request.headers()).ok_or(AppError::Unauthorized)?;
    let user_id = jwt::validate_either(&token, &state.config.jwt_secret)?;
    request.extensions_mut().insert(CurrentUser { id: user_id });
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;

    #[test]
    fn bearer_header_wins_over_refresh_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer access-token".parse().unwrap());
        headers.insert(REFRESH_TOKEN_HEADER, "refresh-token".parse().unwrap());
        assert_eq!(token_from_headers(&headers).as_deref(), Some("access-token"));
    }

    #[test]
    fn refresh_header_is_the_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(REFRESH_TOKEN_HEADER, "refresh-token".parse().unwrap());
        assert_eq!(
            token_from_headers(&headers).as_deref(),
            Some("refresh-token")
        );
    }

    #[test]
    fn literal_null_authorization_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer null".parse().unwrap());
        headers.insert(REFRESH_TOKEN_HEADER, "refresh-token".parse().unwrap());
        assert_eq!(
            token_from_headers(&headers).as_deref(),
            Some("refresh-token")
        );
    }

    #[test]
    fn no_token_yields_none() {
        assert!(token_from_headers(&HeaderMap::new()).is_none());
    }
}
