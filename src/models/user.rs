use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A registered account. Lockout bookkeeping lives on the row itself so the
/// auth service can read-modify-write it in one place.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    pub is_email_verified: bool,
    #[serde(skip_serializing)]
    pub failed_login_attempts: i32,
    #[serde(skip_serializing)]
    pub last_failed_login: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub account_locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// True while a lockout window is open.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.account_locked_until.map_or(false, |until| until > now)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuthCode {
    pub id: i64,
    pub user_id: i64,
    pub code: String,
    pub purpose: String,
    pub is_used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

pub mod code_purpose {
    pub const EMAIL_VERIFICATION: &str = "email_verification";
    pub const LOGIN_VERIFICATION: &str = "login_verification";
    pub const PASSWORD_RESET: &str = "password_reset";
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DeviceSession {
    pub id: i64,
    pub user_id: i64,
    pub device_id: String,
    pub device_type: String,
    pub device_name: String,
    pub ip_address: String,
    pub location: String,
    pub user_agent: String,
    pub last_active: DateTime<Utc>,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
}

/// Device facts captured at the gateway before a session row exists.
/// `device_id` stays empty until the auth service assigns one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceSessionDraft {
    #[serde(default)]
    pub device_id: String,
    pub device_type: String,
    pub ip_address: String,
    pub user_agent: String,
    #[serde(default = "default_location")]
    pub location: String,
}

fn default_location() -> String {
    "Unknown".to_string()
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LoginHistory {
    pub id: i64,
    pub user_id: i64,
    pub device_id: String,
    pub ip_address: String,
    pub location: String,
    pub user_agent: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

pub mod login_status {
    pub const SUCCESS: &str = "success";
    pub const FAILURE: &str = "failure";
    pub const LOCKED: &str = "locked";
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AccountRecovery {
    pub id: i64,
    pub user_id: i64,
    pub request_type: String,
    pub status: String,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

pub mod recovery_status {
    pub const PENDING: &str = "pending";
    pub const CANCELLED: &str = "cancelled";
    pub const COMPLETED: &str = "completed";
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
    /// `YYYY-MM-DD`, optional.
    #[serde(default)]
    pub birth_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email when it contains `@`, username otherwise.
    pub identifier: String,
    pub password: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SwitchAccountRequest {
    /// `token` or `password`.
    pub switch_type: String,
    pub identifier: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub stored_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct InitiateRecoveryRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRecoveryRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_user() -> User {
        let now = Utc::now();
        User {
            id: 1,
            username: "alice".into(),
            email: Some("a@ex.com".into()),
            password_hash: "$2b$12$hash".into(),
            recovery_email: None,
            profile_picture: None,
            birth_date: None,
            is_email_verified: false,
            failed_login_attempts: 0,
            last_failed_login: None,
            account_locked_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn lock_expires_with_the_window() {
        let now = Utc::now();
        let mut user = sample_user();
        assert!(!user.is_locked(now));

        user.account_locked_until = Some(now + Duration::minutes(15));
        assert!(user.is_locked(now));
        assert!(!user.is_locked(now + Duration::minutes(16)));
    }

    #[test]
    fn serialized_user_never_leaks_credentials() {
        let rendered = serde_json::to_value(sample_user()).unwrap();
        assert!(rendered.get("password_hash").is_none());
        assert!(rendered.get("failed_login_attempts").is_none());
        assert!(rendered.get("account_locked_until").is_none());
        assert_eq!(rendered["username"], "alice");
    }
}
