use std::env;

use crate::error::AppError;

/// Runtime configuration, sourced from `.env.{APP_ENV}` (falling back to
/// `.env`) with process environment variables taking precedence.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database: DatabaseConfig,
    pub scylla: ScyllaConfig,
    pub redis: RedisConfig,
    pub kafka_broker: String,
    pub email: EmailConfig,
    pub geo_api_key: String,
    pub jwt_secret: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

#[derive(Debug, Clone)]
pub struct ScyllaConfig {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub replication_factor: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}", self.host, self.port)
        } else {
            format!("redis://:{}@{}:{}", self.password, self.host, self.port)
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_key: String,
    pub sender: String,
    pub sender_name: String,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        // Environment-specific file first, plain .env as fallback. Variables
        // already present in the process environment always win.
        let app_env = var_or("APP_ENV", "development");
        if dotenvy::from_filename(format!(".env.{app_env}")).is_err() {
            dotenvy::dotenv().ok();
        }

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::Config("JWT_SECRET missing".into()))?;

        let scylla_hosts: Vec<String> = var_or("SCYLLA_HOSTS", "127.0.0.1:9042")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if scylla_hosts.is_empty() {
            return Err(AppError::Config("SCYLLA_HOSTS must name at least one node".into()));
        }

        Ok(Self {
            port: parse_or("PORT", 8080),
            database: DatabaseConfig {
                host: var_or("DB_HOST", "127.0.0.1"),
                port: parse_or("DB_PORT", 5432),
                user: var_or("DB_USER", "postgres"),
                password: var_or("DB_PASSWORD", ""),
                name: var_or("DB_NAME", "tidechat"),
            },
            scylla: ScyllaConfig {
                hosts: scylla_hosts,
                keyspace: var_or("SCYLLA_KEYSPACE", "tidechat"),
                replication_factor: parse_or("SCYLLA_REPLICATION_FACTOR", 1),
            },
            redis: RedisConfig {
                host: var_or("REDIS_HOST", "127.0.0.1"),
                port: parse_or("REDIS_PORT", 6379),
                password: var_or("REDIS_PASSWORD", ""),
            },
            kafka_broker: var_or("KAFKA_BROKER", "localhost:9092"),
            email: EmailConfig {
                api_key: var_or("EMAIL_API_KEY", ""),
                sender: var_or("EMAIL_SENDER", "no-reply@tidechat.dev"),
                sender_name: var_or("EMAIL_SENDER_NAME", "Tidechat"),
            },
            geo_api_key: var_or("GEO_API_KEY", ""),
            jwt_secret,
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            port: 8080,
            database: DatabaseConfig {
                host: "127.0.0.1".into(),
                port: 5432,
                user: "postgres".into(),
                password: String::new(),
                name: "tidechat_test".into(),
            },
            scylla: ScyllaConfig {
                hosts: vec!["127.0.0.1:9042".into()],
                keyspace: "tidechat_test".into(),
                replication_factor: 1,
            },
            redis: RedisConfig {
                host: "127.0.0.1".into(),
                port: 6379,
                password: String::new(),
            },
            kafka_broker: "localhost:9092".into(),
            email: EmailConfig {
                api_key: String::new(),
                sender: "no-reply@tidechat.dev".into(),
                sender_name: "Tidechat".into(),
            },
            geo_api_key: String::new(),
            jwt_secret: "test-secret-not-for-production".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_url_includes_every_component() {
        let cfg = Config::test_defaults();
        assert_eq!(
            cfg.database.url(),
            "postgres://postgres:@127.0.0.1:5432/tidechat_test"
        );
    }

    #[test]
    fn redis_url_omits_empty_password() {
        let cfg = Config::test_defaults();
        assert_eq!(cfg.redis.url(), "redis://127.0.0.1:6379");

        let with_password = RedisConfig {
            host: "cache.internal".into(),
            port: 6380,
            password: "hunter2".into(),
        };
        assert_eq!(with_password.url(), "redis://:hunter2@cache.internal:6380");
    }
}
