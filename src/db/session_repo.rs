use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::user::DeviceSessionDraft;
use crate::models::{DeviceSession, LoginHistory};

/// Insert a device session. Any other device the user holds loses its
/// `is_current` flag first, so exactly one current session exists per device
/// switch.
pub async fn create_device_session(
    pool: &PgPool,
    user_id: i64,
    draft: &DeviceSessionDraft,
) -> AppResult<DeviceSession> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE device_sessions SET is_current = FALSE WHERE user_id = $1 AND device_id <> $2",
    )
    .bind(user_id)
    .bind(&draft.device_id)
    .execute(&mut *tx)
    .await?;

    let session = sqlx::query_as::<_, DeviceSession>(
        r#"
        INSERT INTO device_sessions
            (user_id, device_id, device_type, ip_address, location, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(&draft.device_id)
    .bind(&draft.device_type)
    .bind(&draft.ip_address)
    .bind(&draft.location)
    .bind(&draft.user_agent)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(session)
}

pub async fn get_active_sessions(pool: &PgPool, user_id: i64) -> AppResult<Vec<DeviceSession>> {
    let sessions = sqlx::query_as::<_, DeviceSession>(
        "SELECT * FROM device_sessions WHERE user_id = $1 AND is_current = TRUE",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(sessions)
}

pub async fn revoke_session(pool: &PgPool, user_id: i64, device_id: &str) -> AppResult<()> {
    sqlx::query(
        "UPDATE device_sessions SET is_current = FALSE WHERE user_id = $1 AND device_id = $2",
    )
    .bind(user_id)
    .bind(device_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn log_login(
    pool: &PgPool,
    user_id: i64,
    draft: &DeviceSessionDraft,
    status: &str,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO login_history (user_id, device_id, ip_address, location, user_agent, status)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(user_id)
    .bind(&draft.device_id)
    .bind(&draft.ip_address)
    .bind(&draft.location)
    .bind(&draft.user_agent)
    .bind(status)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_login_history(
    pool: &PgPool,
    user_id: i64,
    limit: i64,
) -> AppResult<Vec<LoginHistory>> {
    let entries = sqlx::query_as::<_, LoginHistory>(
        "SELECT * FROM login_history WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(entries)
}

/// Drop sessions that have been superseded and idle for 30 days.
pub async fn delete_stale_sessions(pool: &PgPool) -> AppResult<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM device_sessions
        WHERE is_current = FALSE
          AND last_active < CURRENT_TIMESTAMP - INTERVAL '30 days'
        "#,
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
