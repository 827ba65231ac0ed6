use std::env;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::warn;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

/// Account created at startup when no user owns the configured email yet.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub port: u16,
    pub storage_backend: StorageBackend,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_expires_in: Duration,
    pub cors_origin: Option<String>,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") => Environment::Production,
            Ok("development") | Err(_) => Environment::Development,
            Ok(other) => {
                warn!("Unknown APP_ENV '{}', using development", other);
                Environment::Development
            }
        };

        let storage_backend = match env::var("STORAGE_BACKEND").as_deref() {
            Ok("memory") => StorageBackend::Memory,
            Ok("postgres") | Err(_) => StorageBackend::Postgres,
            Ok(other) => {
                warn!("Unknown STORAGE_BACKEND '{}', using postgres", other);
                StorageBackend::Postgres
            }
        };

        let config = Self {
            environment,
            port: env::var("PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or_else(|| {
                    warn!("PORT not set or invalid, using {}", DEFAULT_PORT);
                    DEFAULT_PORT
                }),
            storage_backend,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("DATABASE_URL not set, using empty value");
                    String::new()
                }),
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("JWT_SECRET not set, using empty value");
                    String::new()
                }),
            jwt_expires_in: env::var("JWT_EXPIRES_IN")
                .ok()
                .and_then(|value| {
                    let parsed = parse_duration(&value);
                    if parsed.is_none() {
                        warn!("JWT_EXPIRES_IN '{}' is not a valid duration, using 7d", value);
                    }
                    parsed
                })
                .unwrap_or_else(default_token_lifetime),
            cors_origin: env::var("CORS_ORIGIN").ok().filter(|origin| !origin.is_empty()),
            bootstrap_admin: bootstrap_admin_from_env(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        let store_ready = match self.storage_backend {
            StorageBackend::Postgres => !self.database_url.is_empty(),
            StorageBackend::Memory => true,
        };

        store_ready && !self.jwt_secret.is_empty()
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn bootstrap_admin_from_env() -> Option<BootstrapAdmin> {
    let email = env::var("BOOTSTRAP_ADMIN_EMAIL").ok()?;
    let password = match env::var("BOOTSTRAP_ADMIN_PASSWORD") {
        Ok(password) if !password.is_empty() => password,
        _ => {
            warn!("BOOTSTRAP_ADMIN_EMAIL set without BOOTSTRAP_ADMIN_PASSWORD, skipping");
            return None;
        }
    };
    let username = env::var("BOOTSTRAP_ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());

    Some(BootstrapAdmin { username, email, password })
}

pub fn default_token_lifetime() -> Duration {
    Duration::days(7)
}

/// Parses lifetimes written as `7d`, `12h`, `30m`, `45s` or a bare number of seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let (digits, unit) = match value.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&value[..idx], Some(c)),
        _ => (value, None),
    };

    let amount: i64 = digits.parse().ok()?;
    if amount <= 0 {
        return None;
    }

    match unit {
        None | Some('s') => Some(Duration::seconds(amount)),
        Some('m') => Some(Duration::minutes(amount)),
        Some('h') => Some(Duration::hours(amount)),
        Some('d') => Some(Duration::days(amount)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unit_suffixes() {
        assert_eq!(parse_duration("7d"), Some(Duration::days(7)));
        assert_eq!(parse_duration("12h"), Some(Duration::hours(12)));
        assert_eq!(parse_duration("30m"), Some(Duration::minutes(30)));
        assert_eq!(parse_duration("45s"), Some(Duration::seconds(45)));
        assert_eq!(parse_duration("3600"), Some(Duration::seconds(3600)));
    }

    #[test]
    fn rejects_garbage_durations() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("d"), None);
        assert_eq!(parse_duration("-5m"), None);
        assert_eq!(parse_duration("0d"), None);
        assert_eq!(parse_duration("7w"), None);
        assert_eq!(parse_duration("abc"), None);
    }

    #[test]
    fn memory_backend_only_needs_secret() {
        let config = AppConfig {
            environment: Environment::Development,
            port: DEFAULT_PORT,
            storage_backend: StorageBackend::Memory,
            database_url: String::new(),
            database_max_connections: DEFAULT_MAX_CONNECTIONS,
            jwt_secret: "secret".to_string(),
            jwt_expires_in: default_token_lifetime(),
            cors_origin: None,
            bootstrap_admin: None,
        };
        assert!(config.is_configured());

        let postgres = AppConfig { storage_backend: StorageBackend::Postgres, ..config };
        assert!(!postgres.is_configured());
    }
}
