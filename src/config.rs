use std::path::PathBuf;

use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use thiserror::Error;

/// Development-only signing secret. Refused when running in production.
pub const DEV_JWT_SECRET: &str = "zero-balance-secret-key";

pub const DEFAULT_PRODUCTION_ORIGIN: &str = "https://zero-balance.vercel.app";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set when running in production")]
    MissingInProduction(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub options: PgConnectOptions,
    /// `host:port/database (user: ...)`, safe to log.
    pub display: String,
    pub max_connections: u32,
    pub connect_attempts: usize,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("display", &self.display)
            .field("max_connections", &self.max_connections)
            .field("connect_attempts", &self.connect_attempts)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_days: i64,
    pub uses_default_secret: bool,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .field("ttl_days", &self.ttl_days)
            .field("uses_default_secret", &self.uses_default_secret)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub host: String,
    pub port: u16,
    /// `None` means any origin is allowed.
    pub cors_origins: Option<Vec<String>>,
    pub migrations_dir: PathBuf,
    pub debug: bool,
}

/// First non-empty value among `keys`, in order.
pub(crate) fn first_set<F>(keys: &[&str], get: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|k| get(k))
        .find(|v| !v.trim().is_empty())
}

fn parse_or<F, T>(key: &'static str, keys: &[&str], default: T, get: &F) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match first_set(keys, get) {
        Some(v) => v
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value: v }),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match first_set(&["ENVIRONMENT", "RAILWAY_ENVIRONMENT_NAME"], &get) {
            Some(v) if v.trim().eq_ignore_ascii_case("production") => Environment::Production,
            _ => Environment::Development,
        };

        let database = database_config(&get)?;
        let jwt = jwt_config(environment, &get)?;

        let cors_origins = if environment.is_production() {
            let raw = first_set(&["CORS_ORIGINS"], &get)
                .unwrap_or_else(|| DEFAULT_PRODUCTION_ORIGIN.to_string());
            Some(
                raw.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect(),
            )
        } else {
            None
        };

        Ok(Self {
            environment,
            database,
            jwt,
            host: first_set(&["APP_HOST"], &get).unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or("PORT", &["PORT", "APP_PORT"], 8080, &get)?,
            cors_origins,
            migrations_dir: first_set(&["MIGRATIONS_DIR"], &get)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("migrations")),
            debug: parse_or("DEBUG", &["DEBUG"], false, &get)?,
        })
    }
}

fn database_config<F>(get: &F) -> Result<DatabaseConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let host = first_set(&["DB_HOST", "PGHOST"], get).unwrap_or_else(|| "localhost".into());
    let port: u16 = parse_or("DB_PORT", &["DB_PORT", "PGPORT"], 5432, get)?;
    let user = first_set(&["DB_USER", "PGUSER"], get).unwrap_or_else(|| "zero_user".into());
    let pass = first_set(&["DB_PASS", "PGPASSWORD"], get).unwrap_or_else(|| "zero_pass".into());
    let name = first_set(&["DB_NAME", "PGDATABASE"], get).unwrap_or_else(|| "zero_balance".into());
    let ssl_mode = first_set(&["DB_SSL_MODE", "PGSSLMODE"], get).unwrap_or_else(|| "disable".into());

    let options = match first_set(&["DATABASE_URL"], get) {
        Some(url) => url
            .trim()
            .parse::<PgConnectOptions>()
            .map_err(|_| ConfigError::Invalid {
                key: "DATABASE_URL",
                value: "[REDACTED]".into(),
            })?,
        None => PgConnectOptions::new()
            .host(&host)
            .port(port)
            .username(&user)
            .password(&pass)
            .database(&name)
            .ssl_mode(ssl_mode.trim().parse::<PgSslMode>().map_err(|_| ConfigError::Invalid {
                key: "DB_SSL_MODE",
                value: ssl_mode.clone(),
            })?),
    };
    let display = format!(
        "{}:{}/{} (user: {})",
        options.get_host(),
        options.get_port(),
        options.get_database().unwrap_or("-"),
        options.get_username(),
    );

    let connect_attempts: usize = parse_or("DB_CONNECT_ATTEMPTS", &["DB_CONNECT_ATTEMPTS"], 5, get)?;
    if connect_attempts == 0 {
        return Err(ConfigError::Invalid {
            key: "DB_CONNECT_ATTEMPTS",
            value: "0".into(),
        });
    }

    Ok(DatabaseConfig {
        options,
        display,
        max_connections: parse_or("DB_MAX_CONNECTIONS", &["DB_MAX_CONNECTIONS"], 25, get)?,
        connect_attempts,
    })
}

fn jwt_config<F>(environment: Environment, get: &F) -> Result<JwtConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let (secret, uses_default_secret) = match first_set(&["JWT_SECRET"], get) {
        Some(secret) => (secret, false),
        None if environment.is_production() => {
            return Err(ConfigError::MissingInProduction("JWT_SECRET"))
        }
        None => (DEV_JWT_SECRET.to_string(), true),
    };
    Ok(JwtConfig {
        secret,
        ttl_days: 7,
        uses_default_secret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_any_env() {
        let cfg = AppConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.jwt.secret, DEV_JWT_SECRET);
        assert!(cfg.jwt.uses_default_secret);
        assert_eq!(cfg.jwt.ttl_days, 7);
        assert!(cfg.cors_origins.is_none());
        assert_eq!(cfg.migrations_dir, PathBuf::from("migrations"));
        let db = &cfg.database.options;
        assert_eq!(db.get_host(), "localhost");
        assert_eq!(db.get_port(), 5432);
        assert_eq!(db.get_username(), "zero_user");
        assert_eq!(db.get_database(), Some("zero_balance"));
        assert!(matches!(db.get_ssl_mode(), PgSslMode::Disable));
        assert_eq!(cfg.database.connect_attempts, 5);
    }

    #[test]
    fn first_key_wins_and_empty_values_fall_through() {
        let get = lookup(&[("DB_USER", ""), ("PGUSER", "railway"), ("DB_HOST", "db"), ("PGHOST", "ignored")]);
        let cfg = AppConfig::from_lookup(get).expect("config");
        assert_eq!(cfg.database.options.get_username(), "railway");
        assert_eq!(cfg.database.options.get_host(), "db");
    }

    #[test]
    fn password_with_url_delimiters_keeps_host_and_database() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("DB_HOST", "db.internal"),
            ("DB_NAME", "ledger"),
            ("DB_PASS", "p@ss/w#rd?:x"),
        ]))
        .expect("config");
        let db = &cfg.database.options;
        assert_eq!(db.get_host(), "db.internal");
        assert_eq!(db.get_port(), 5432);
        assert_eq!(db.get_database(), Some("ledger"));
        assert_eq!(db.get_username(), "zero_user");
        assert_eq!(cfg.database.display, "db.internal:5432/ledger (user: zero_user)");
        assert!(!format!("{:?}", cfg).contains("p@ss"));
    }

    #[test]
    fn unknown_ssl_mode_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("PGSSLMODE", "sometimes")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DB_SSL_MODE", .. }));
    }

    #[test]
    fn database_url_overrides_parts() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://a:b@c:5433/d"),
            ("DB_HOST", "other"),
        ]))
        .expect("config");
        assert_eq!(cfg.database.options.get_host(), "c");
        assert_eq!(cfg.database.options.get_database(), Some("d"));
        assert_eq!(cfg.database.display, "c:5433/d (user: a)");
        assert!(!format!("{:?}", cfg.database).contains("a:b@"));
    }

    #[test]
    fn production_requires_explicit_secret() {
        let err = AppConfig::from_lookup(lookup(&[("ENVIRONMENT", "production")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingInProduction("JWT_SECRET")));

        let err = AppConfig::from_lookup(lookup(&[
            ("RAILWAY_ENVIRONMENT_NAME", "production"),
            ("JWT_SECRET", "   "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingInProduction(_)));
    }

    #[test]
    fn production_cors_origins_are_split() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("ENVIRONMENT", "production"),
            ("JWT_SECRET", "s3cret"),
            ("CORS_ORIGINS", "https://a.example, https://b.example,"),
        ]))
        .expect("config");
        assert_eq!(
            cfg.cors_origins,
            Some(vec!["https://a.example".to_string(), "https://b.example".to_string()])
        );
        assert!(!cfg.jwt.uses_default_secret);
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    #[test]
    fn secret_is_redacted_in_debug_output() {
        let cfg = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "top-secret")])).expect("config");
        assert!(!format!("{:?}", cfg.jwt).contains("top-secret"));
    }
}
