use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const ACCESS_TOKEN_TTL_MINUTES: i64 = 15;
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 30;

const REFRESH_SUBJECT: &str = "refresh";

/// Bearer token claims. `sub` is present only on refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub iat: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

impl Claims {
    pub fn is_refresh(&self) -> bool {
        self.sub.as_deref() == Some(REFRESH_SUBJECT)
    }
}

fn sign(claims: &Claims, secret: &str) -> AppResult<String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
}

pub fn generate_access_token(user_id: i64, secret: &str) -> AppResult<String> {
    let now = Utc::now();
    sign(
        &Claims {
            user_id,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(ACCESS_TOKEN_TTL_MINUTES)).timestamp(),
            sub: None,
        },
        secret,
    )
}

pub fn generate_refresh_token(user_id: i64, secret: &str) -> AppResult<String> {
    let now = Utc::now();
    sign(
        &Claims {
            user_id,
            iat: now.timestamp(),
            exp: (now + Duration::days(REFRESH_TOKEN_TTL_DAYS)).timestamp(),
            sub: Some(REFRESH_SUBJECT.to_string()),
        },
        secret,
    )
}

/// New access + refresh pair. Refresh rotates both; clients replace both.
pub fn generate_token_pair(user_id: i64, secret: &str) -> AppResult<(String, String)> {
    Ok((
        generate_access_token(user_id, secret)?,
        generate_refresh_token(user_id, secret)?,
    ))
}

fn decode_claims(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
}

/// Accept only access tokens.
pub fn validate_access(token: &str, secret: &str) -> AppResult<i64> {
    let claims = decode_claims(token, secret).map_err(|_| AppError::Unauthorized)?;
    if claims.is_refresh() {
        return Err(AppError::Unauthorized);
    }
    Ok(claims.user_id)
}

/// Accept only refresh tokens.
pub fn validate_refresh(token: &str, secret: &str) -> AppResult<i64> {
    let claims = decode_claims(token, secret).map_err(|_| AppError::InvalidRefreshToken)?;
    if !claims.is_refresh() {
        return Err(AppError::InvalidRefreshToken);
    }
    Ok(claims.user_id)
}

/// Accept either grant. Used by the switch-account path and the gateway
/// fallback when only `X-Refresh-Token` is present; the widened surface is a
/// product decision, not an oversight.
pub fn validate_either(token: &str, secret: &str) -> AppResult<i64> {
    decode_claims(token, secret)
        .map(|claims| claims.user_id)
        .map_err(|_| AppError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn access_token_round_trips() {
        let token = generate_access_token(42, SECRET).unwrap();
        assert_eq!(validate_access(&token, SECRET).unwrap(), 42);
        assert_eq!(validate_either(&token, SECRET).unwrap(), 42);
    }

    #[test]
    fn refresh_token_is_rejected_by_the_access_validator() {
        let token = generate_refresh_token(42, SECRET).unwrap();
        assert!(validate_access(&token, SECRET).is_err());
        assert_eq!(validate_refresh(&token, SECRET).unwrap(), 42);
        assert_eq!(validate_either(&token, SECRET).unwrap(), 42);
    }

    #[test]
    fn access_token_is_rejected_by_the_refresh_validator() {
        let token = generate_access_token(42, SECRET).unwrap();
        assert!(matches!(
            validate_refresh(&token, SECRET),
            Err(AppError::InvalidRefreshToken)
        ));
    }

    #[test]
    fn wrong_secret_fails_every_validator() {
        let token = generate_access_token(42, SECRET).unwrap();
        assert!(validate_access(&token, "other").is_err());
        assert!(validate_either(&token, "other").is_err());
    }

    #[test]
    fn rotation_yields_distinct_usable_tokens() {
        let (access, refresh) = generate_token_pair(7, SECRET).unwrap();
        assert_ne!(access, refresh);
        assert_eq!(validate_access(&access, SECRET).unwrap(), 7);
        assert_eq!(validate_refresh(&refresh, SECRET).unwrap(), 7);
    }
}
