use chrono::NaiveDate;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::User;

/// Insert a new account. A unique violation on username or email surfaces as
/// the public identifier-taken kind.
pub async fn create_user(
    pool: &PgPool,
    username: &str,
    email: Option<&str>,
    password_hash: &str,
    birth_date: Option<NaiveDate>,
) -> AppResult<User> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, email, password_hash, birth_date)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(birth_date)
    .fetch_one(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::IdentifierTaken,
        _ => AppError::Database(e),
    })
}

pub async fn find_user_by_id(pool: &PgPool, id: i64) -> AppResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::UserNotFound)
}

pub async fn find_user_by_email(pool: &PgPool, email: &str) -> AppResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::UserNotFound)
}

pub async fn find_user_by_username(pool: &PgPool, username: &str) -> AppResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::UserNotFound)
}

/// Write back the mutable account fields in one statement. The auth service
/// owns the read-modify-write cycle; concurrent failed logins may each count
/// independently, which keeps the lock threshold a lower bound.
pub async fn update_user(pool: &PgPool, user: &User) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET email = $2,
            password_hash = $3,
            recovery_email = $4,
            profile_picture = $5,
            is_email_verified = $6,
            failed_login_attempts = $7,
            last_failed_login = $8,
            account_locked_until = $9,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        "#,
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.recovery_email)
    .bind(&user.profile_picture)
    .bind(user.is_email_verified)
    .bind(user.failed_login_attempts)
    .bind(user.last_failed_login)
    .bind(user.account_locked_until)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn username_exists(pool: &PgPool, username: &str) -> AppResult<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(pool)
            .await?;
    Ok(exists)
}

pub async fn email_exists(pool: &PgPool, email: &str) -> AppResult<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
        .bind(email)
        .fetch_one(pool)
        .await?;
    Ok(exists)
}

pub async fn list_users(pool: &PgPool, page: i64, limit: i64) -> AppResult<Vec<User>> {
    let offset = (page.max(1) - 1) * limit;
    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users ORDER BY id LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(users)
}
