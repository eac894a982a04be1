use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use sqlx::PgPool;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::cache::{self, CacheRepository};
use crate::db::{auth_code_repo, session_repo, user_repo};
use crate::error::{AppError, AppResult};
use crate::models::user::{
    code_purpose, login_status, DeviceSessionDraft, SwitchAccountRequest,
};
use crate::models::{DeviceSession, LoginHistory, User};
use crate::security::{jwt, password, random};
use crate::services::email::EmailService;
use crate::services::geo::GeoService;

const MAX_FAILED_ATTEMPTS: i32 = 5;
const LOCKOUT_MINUTES: i64 = 15;

/// Budget for the cache race and the geo wait on the login critical path.
const LOOKUP_WAIT: Duration = Duration::from_millis(100);

/// Detached side effects carry their own bound instead of the request's
/// cancellation.
const SIDE_EFFECT_TIMEOUT: Duration = Duration::from_secs(5);

const VERIFICATION_CODE_TTL_HOURS: i64 = 24;
const RESET_CODE_TTL_HOURS: i64 = 1;
const RECOVERY_TTL_DAYS: i64 = 7;

pub struct AuthService {
    db: PgPool,
    cache: Arc<CacheRepository>,
    email: Arc<EmailService>,
    geo: Arc<GeoService>,
    jwt_secret: String,
}

/// Fire-and-forget task with its own timeout; failures are logged, never
/// propagated to the caller.
fn spawn_side_effect<F>(label: &'static str, fut: F)
where
    F: Future<Output = AppResult<()>> + Send + 'static,
{
    tokio::spawn(async move {
        match timeout(SIDE_EFFECT_TIMEOUT, fut).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(task = label, error = %e, "side effect failed"),
            Err(_) => warn!(task = label, "side effect timed out"),
        }
    });
}

/// One failed verify: bump the counter, stamp the failure, open the lockout
/// window once the threshold is reached. Returns whether the account is now
/// locked.
fn record_failed_attempt(user: &mut User, now: chrono::DateTime<Utc>) -> bool {
    user.failed_login_attempts += 1;
    user.last_failed_login = Some(now);
    if user.failed_login_attempts >= MAX_FAILED_ATTEMPTS {
        user.account_locked_until = Some(now + ChronoDuration::minutes(LOCKOUT_MINUTES));
        return true;
    }
    false
}

/// A successful verify zeroes the counter and clears any lockout.
fn record_successful_attempt(user: &mut User) {
    user.failed_login_attempts = 0;
    user.last_failed_login = None;
    user.account_locked_until = None;
}

/// The first attempt after the lockout window has passed starts the machine
/// fresh; the stale counter must not re-lock on a single new failure.
fn reset_expired_lock(user: &mut User, now: chrono::DateTime<Utc>) {
    if user.account_locked_until.is_some() && !user.is_locked(now) {
        record_successful_attempt(user);
    }
}

impl AuthService {
    pub fn new(
        db: PgPool,
        cache: Arc<CacheRepository>,
        email: Arc<EmailService>,
        geo: Arc<GeoService>,
        jwt_secret: String,
    ) -> Self {
        Self {
            db,
            cache,
            email,
            geo,
            jwt_secret,
        }
    }

    // --- register ---

    pub async fn register(
        &self,
        username: &str,
        email: Option<&str>,
        plain_password: &str,
        birth_date: Option<NaiveDate>,
    ) -> AppResult<User> {
        if let Some(birth_date) = birth_date {
            if birth_date > Utc::now().date_naive() {
                return Err(AppError::BirthDateInFuture);
            }
        }

        let password_hash = password::hash_password(plain_password)?;
        let user =
            user_repo::create_user(&self.db, username, email, &password_hash, birth_date).await?;

        info!(user_id = user.id, "user registered");

        // Everything after the commit is invisible to the caller: cache warm,
        // verification code, verification email.
        {
            let cache = Arc::clone(&self.cache);
            let cached_user = user.clone();
            spawn_side_effect("warm-user-cache", async move {
                cache
                    .set(&cache::keys::user(cached_user.id), &cached_user, cache::USER_TTL_SECS)
                    .await;
                Ok(())
            });
        }

        if let Some(email_addr) = user.email.clone() {
            let db = self.db.clone();
            let mailer = Arc::clone(&self.email);
            let user_id = user.id;
            spawn_side_effect("send-verification-email", async move {
                let code = random::generate_code(6);
                auth_code_repo::create_auth_code(
                    &db,
                    user_id,
                    &code,
                    code_purpose::EMAIL_VERIFICATION,
                    Utc::now() + ChronoDuration::hours(VERIFICATION_CODE_TTL_HOURS),
                )
                .await?;
                mailer.send_verification_email(&email_addr, &code).await
            });
        }

        Ok(user)
    }

    // --- login ---

    async fn lookup_user(&self, identifier: &str) -> AppResult<User> {
        let is_email = identifier.contains('@');
        let cache_key = if is_email {
            cache::keys::user_email(identifier)
        } else {
            cache::keys::user_username(identifier)
        };

        // Race the cache against its budget; a slow cache must not delay the
        // authoritative lookup by more than 100 ms.
        let lookup = {
            let cache = Arc::clone(&self.cache);
            let key = cache_key.clone();
            tokio::spawn(async move { cache.get::<User>(&key).await })
        };
        if let Ok(Ok(Some(user))) = timeout(LOOKUP_WAIT, lookup).await {
            return Ok(user);
        }

        let fetched = if is_email {
            user_repo::find_user_by_email(&self.db, identifier).await
        } else {
            user_repo::find_user_by_username(&self.db, identifier).await
        };

        // The caller never learns whether the identifier exists.
        let user = fetched.map_err(|_| AppError::InvalidCredentials)?;

        let cache = Arc::clone(&self.cache);
        let cached_user = user.clone();
        spawn_side_effect("cache-user-writeback", async move {
            cache
                .set(&cache_key, &cached_user, cache::USER_TTL_SECS)
                .await;
            Ok(())
        });

        Ok(user)
    }

    fn write_back_user(&self, user: &User, identifier: &str) {
        let is_email = identifier.contains('@');
        let key = if is_email {
            cache::keys::user_email(identifier)
        } else {
            cache::keys::user_username(identifier)
        };
        let cache = Arc::clone(&self.cache);
        let cached_user = user.clone();
        spawn_side_effect("cache-user-update", async move {
            cache.set(&key, &cached_user, cache::USER_TTL_SECS).await;
            Ok(())
        });
    }

    pub async fn login(
        &self,
        identifier: &str,
        plain_password: &str,
        mut device: DeviceSessionDraft,
    ) -> AppResult<(User, String, String, DeviceSessionDraft)> {
        let mut user = self.lookup_user(identifier).await?;
        let now = Utc::now();

        if user.is_locked(now) {
            self.log_attempt(&user, &device, login_status::LOCKED);
            return Err(AppError::AccountLocked);
        }
        reset_expired_lock(&mut user, now);

        if !password::verify_password(plain_password, &user.password_hash)? {
            let now_locked = record_failed_attempt(&mut user, now);

            if let Err(e) = user_repo::update_user(&self.db, &user).await {
                warn!(user_id = user.id, error = %e, "failed to persist attempt counter");
            }
            self.write_back_user(&user, identifier);
            self.log_attempt(&user, &device, login_status::FAILURE);

            return Err(if now_locked {
                AppError::AccountLocked
            } else {
                AppError::InvalidCredentials
            });
        }

        record_successful_attempt(&mut user);
        user_repo::update_user(&self.db, &user).await?;
        self.write_back_user(&user, identifier);

        if device.device_id.is_empty() {
            device.device_id = random::generate_device_id();
        }

        // Geo runs detached with a default already in place; proceed with
        // whatever is known after the budget.
        device.location = "Unknown".to_string();
        let geo_lookup = {
            let geo = Arc::clone(&self.geo);
            let ip = device.ip_address.clone();
            tokio::spawn(async move { geo.get_location(&ip).await })
        };
        if let Ok(Ok(Ok(location))) = timeout(LOOKUP_WAIT, geo_lookup).await {
            device.location = location;
        }

        let (access_token, refresh_token) = jwt::generate_token_pair(user.id, &self.jwt_secret)?;

        {
            let db = self.db.clone();
            let user_id = user.id;
            let draft = device.clone();
            spawn_side_effect("record-device-session", async move {
                session_repo::create_device_session(&db, user_id, &draft).await?;
                Ok(())
            });
        }
        self.log_attempt(&user, &device, login_status::SUCCESS);
        if let Some(email_addr) = user.email.clone() {
            let mailer = Arc::clone(&self.email);
            let draft = device.clone();
            spawn_side_effect("send-login-notification", async move {
                mailer.send_login_notification(&email_addr, &draft).await
            });
        }

        Ok((user, access_token, refresh_token, device))
    }

    fn log_attempt(&self, user: &User, device: &DeviceSessionDraft, status: &'static str) {
        let db = self.db.clone();
        let user_id = user.id;
        let draft = device.clone();
        spawn_side_effect("append-login-history", async move {
            session_repo::log_login(&db, user_id, &draft, status).await
        });
    }

    // --- refresh ---

    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<(String, String)> {
        let user_id = jwt::validate_refresh(refresh_token, &self.jwt_secret)?;
        let user = user_repo::find_user_by_id(&self.db, user_id).await?;
        jwt::generate_token_pair(user.id, &self.jwt_secret)
    }

    // --- switch account ---

    pub async fn switch_account(
        &self,
        request: &SwitchAccountRequest,
        device: DeviceSessionDraft,
    ) -> AppResult<(User, String, String, DeviceSessionDraft)> {
        match request.switch_type.as_str() {
            "token" => {
                let stored_token = request
                    .stored_token
                    .as_deref()
                    .ok_or(AppError::StoredTokenRequired)?;
                let user_id = jwt::validate_either(stored_token, &self.jwt_secret)
                    .map_err(|_| AppError::TokenInvalid)?;
                let user = user_repo::find_user_by_id(&self.db, user_id).await?;

                let matches_identifier = user.username == request.identifier
                    || user.email.as_deref() == Some(request.identifier.as_str());
                if !matches_identifier {
                    return Err(AppError::TokenAccountMismatch);
                }

                let mut device = device;
                if device.device_id.is_empty() {
                    device.device_id = random::generate_device_id();
                }

                let (access_token, refresh_token) =
                    jwt::generate_token_pair(user.id, &self.jwt_secret)?;

                let db = self.db.clone();
                let user_id = user.id;
                let draft = device.clone();
                spawn_side_effect("record-device-session", async move {
                    session_repo::create_device_session(&db, user_id, &draft).await?;
                    Ok(())
                });

                Ok((user, access_token, refresh_token, device))
            }
            "password" => {
                let plain_password = request
                    .password
                    .as_deref()
                    .ok_or(AppError::PasswordRequired)?;
                // Full login path: lockout and failed-attempt accounting
                // apply to account switching as well.
                self.login(&request.identifier, plain_password, device).await
            }
            other => Err(AppError::BadRequest(format!(
                "unknown switch_type: {other}"
            ))),
        }
    }

    // --- email verification ---

    pub async fn verify_email(&self, email: &str, code: &str) -> AppResult<()> {
        let mut user = user_repo::find_user_by_email(&self.db, email).await?;
        auth_code_repo::validate_auth_code(
            &self.db,
            user.id,
            code,
            code_purpose::EMAIL_VERIFICATION,
        )
        .await?;

        user.is_email_verified = true;
        user_repo::update_user(&self.db, &user).await?;
        self.cache.delete(&cache::keys::user(user.id)).await;
        Ok(())
    }

    // --- recovery ---

    pub async fn initiate_account_recovery(&self, email: &str) -> AppResult<()> {
        let user = user_repo::find_user_by_email(&self.db, email).await?;

        let code = random::generate_code(6);
        auth_code_repo::create_auth_code(
            &self.db,
            user.id,
            &code,
            code_purpose::PASSWORD_RESET,
            Utc::now() + ChronoDuration::hours(RESET_CODE_TTL_HOURS),
        )
        .await?;
        auth_code_repo::create_account_recovery(
            &self.db,
            user.id,
            "password_reset",
            Utc::now() + ChronoDuration::days(RECOVERY_TTL_DAYS),
        )
        .await?;

        let mailer = Arc::clone(&self.email);
        let to = email.to_string();
        spawn_side_effect("send-reset-email", async move {
            mailer.send_password_reset_email(&to, &code).await
        });

        Ok(())
    }

    /// Pre-check only; the code stays live for the reset call that consumes
    /// it.
    pub async fn validate_recovery_code(&self, email: &str, code: &str) -> AppResult<()> {
        let user = user_repo::find_user_by_email(&self.db, email).await?;
        auth_code_repo::check_auth_code(&self.db, user.id, code, code_purpose::PASSWORD_RESET)
            .await
    }

    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> AppResult<()> {
        let mut user = user_repo::find_user_by_email(&self.db, email).await?;
        auth_code_repo::validate_auth_code(
            &self.db,
            user.id,
            code,
            code_purpose::PASSWORD_RESET,
        )
        .await?;

        user.password_hash = password::hash_password(new_password)?;
        user_repo::update_user(&self.db, &user).await?;
        auth_code_repo::complete_account_recovery(&self.db, user.id).await?;

        self.cache.delete(&cache::keys::user(user.id)).await;
        Ok(())
    }

    // --- sessions ---

    pub async fn get_active_sessions(&self, user_id: i64) -> AppResult<Vec<DeviceSession>> {
        session_repo::get_active_sessions(&self.db, user_id).await
    }

    /// Revocation is applied asynchronously in storage; the cache entry goes
    /// first so no reader resurrects the session from a stale user snapshot.
    pub async fn revoke_session(&self, user_id: i64, device_id: &str) -> AppResult<()> {
        self.cache.delete(&cache::keys::user(user_id)).await;

        let db = self.db.clone();
        let device_id = device_id.to_string();
        spawn_side_effect("revoke-session", async move {
            session_repo::revoke_session(&db, user_id, &device_id).await
        });

        Ok(())
    }

    pub async fn get_login_history(&self, user_id: i64) -> AppResult<Vec<LoginHistory>> {
        session_repo::get_login_history(&self.db, user_id, 10).await
    }

    pub async fn get_user(&self, user_id: i64) -> AppResult<User> {
        user_repo::find_user_by_id(&self.db, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

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
    fn fifth_failure_opens_the_lockout_window() {
        let mut user = sample_user();
        let now = Utc::now();

        for attempt in 1..MAX_FAILED_ATTEMPTS {
            assert!(!record_failed_attempt(&mut user, now));
            assert_eq!(user.failed_login_attempts, attempt);
            assert!(user.account_locked_until.is_none());
        }

        assert!(record_failed_attempt(&mut user, now));
        let locked_until = user.account_locked_until.unwrap();
        assert_eq!(locked_until, now + ChronoDuration::minutes(LOCKOUT_MINUTES));
        assert!(user.is_locked(now));
        assert!(!user.is_locked(locked_until + ChronoDuration::seconds(1)));
    }

    #[test]
    fn success_resets_counter_and_lock() {
        let mut user = sample_user();
        let now = Utc::now();
        for _ in 0..MAX_FAILED_ATTEMPTS {
            record_failed_attempt(&mut user, now);
        }
        assert!(user.is_locked(now));

        record_successful_attempt(&mut user);
        assert_eq!(user.failed_login_attempts, 0);
        assert!(user.last_failed_login.is_none());
        assert!(user.account_locked_until.is_none());
        assert!(!user.is_locked(now));
    }

    #[test]
    fn failure_after_an_expired_lock_starts_a_fresh_window() {
        let mut user = sample_user();
        let first_round = Utc::now() - ChronoDuration::hours(1);
        for _ in 0..MAX_FAILED_ATTEMPTS {
            record_failed_attempt(&mut user, first_round);
        }

        let now = Utc::now();
        assert!(!user.is_locked(now));

        // The stale counter is discarded, so one new failure counts from one
        // instead of re-locking.
        reset_expired_lock(&mut user, now);
        assert!(!record_failed_attempt(&mut user, now));
        assert_eq!(user.failed_login_attempts, 1);
        assert!(user.account_locked_until.is_none());
    }

    #[test]
    fn an_open_lock_is_not_reset() {
        let mut user = sample_user();
        let now = Utc::now();
        for _ in 0..MAX_FAILED_ATTEMPTS {
            record_failed_attempt(&mut user, now);
        }

        reset_expired_lock(&mut user, now);
        assert!(user.is_locked(now));
        assert_eq!(user.failed_login_attempts, MAX_FAILED_ATTEMPTS);
    }
}
