use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::user::recovery_status;
use crate::models::{AccountRecovery, AuthCode};

/// Persist a fresh code, retiring any unused code the user still holds for
/// the same purpose. Consumed codes never resurrect.
pub async fn create_auth_code(
    pool: &PgPool,
    user_id: i64,
    code: &str,
    purpose: &str,
    expires_at: DateTime<Utc>,
) -> AppResult<AuthCode> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE auth_codes SET is_used = TRUE WHERE user_id = $1 AND purpose = $2 AND NOT is_used",
    )
    .bind(user_id)
    .bind(purpose)
    .execute(&mut *tx)
    .await?;

    let auth_code = sqlx::query_as::<_, AuthCode>(
        r#"
        INSERT INTO auth_codes (user_id, code, purpose, expires_at)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(code)
    .bind(purpose)
    .bind(expires_at)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(auth_code)
}

/// Consume a code: the conditional UPDATE flips `is_used` only when the code
/// is still live, so two racing validations cannot both succeed.
pub async fn validate_auth_code(
    pool: &PgPool,
    user_id: i64,
    code: &str,
    purpose: &str,
) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE auth_codes
        SET is_used = TRUE
        WHERE user_id = $1
          AND code = $2
          AND purpose = $3
          AND NOT is_used
          AND expires_at > CURRENT_TIMESTAMP
        "#,
    )
    .bind(user_id)
    .bind(code)
    .bind(purpose)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::BadRequest("invalid or expired code".into()));
    }
    Ok(())
}

/// Non-consuming check used by the recovery pre-validation endpoint, so the
/// code is still live when the reset request re-validates (and consumes) it.
pub async fn check_auth_code(
    pool: &PgPool,
    user_id: i64,
    code: &str,
    purpose: &str,
) -> AppResult<()> {
    let live: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM auth_codes
            WHERE user_id = $1
              AND code = $2
              AND purpose = $3
              AND NOT is_used
              AND expires_at > CURRENT_TIMESTAMP
        )
        "#,
    )
    .bind(user_id)
    .bind(code)
    .bind(purpose)
    .fetch_one(pool)
    .await?;

    if !live {
        return Err(AppError::BadRequest("invalid or expired code".into()));
    }
    Ok(())
}

/// Open a recovery request, cancelling whatever is still pending for the
/// user. At most one pending request exists at any time.
pub async fn create_account_recovery(
    pool: &PgPool,
    user_id: i64,
    request_type: &str,
    expires_at: DateTime<Utc>,
) -> AppResult<AccountRecovery> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE account_recovery SET status = $1 WHERE user_id = $2 AND status = $3")
        .bind(recovery_status::CANCELLED)
        .bind(user_id)
        .bind(recovery_status::PENDING)
        .execute(&mut *tx)
        .await?;

    let recovery = sqlx::query_as::<_, AccountRecovery>(
        r#"
        INSERT INTO account_recovery (user_id, request_type, expires_at)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(request_type)
    .bind(expires_at)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(recovery)
}

pub async fn complete_account_recovery(pool: &PgPool, user_id: i64) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE account_recovery
        SET status = $1, completed_at = CURRENT_TIMESTAMP
        WHERE user_id = $2 AND status = $3
        "#,
    )
    .bind(recovery_status::COMPLETED)
    .bind(user_id)
    .bind(recovery_status::PENDING)
    .execute(pool)
    .await?;
    Ok(())
}
