use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Pool, Postgres};

pub mod auth_code_repo;
pub mod chat_repo;
pub mod chat_schema;
pub mod session_repo;
pub mod user_repo;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Relational pool sized for the request path: each handler borrows one
/// connection per statement, so the cap also bounds concurrent auth work.
pub async fn init_pool(database_url: &str) -> Result<Pool<Postgres>, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(25)
        .min_connections(10)
        .max_lifetime(Duration::from_secs(5 * 60))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}
