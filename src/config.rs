use std::{env, fmt::Display, str::FromStr};

use crate::constants::{DEFAULT_JWT_AUDIENCE, DEFAULT_JWT_ISSUER, TOKEN_LIFETIME_DAYS};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is required")]
    Missing(&'static str),
    #[error("Invalid {key} value: {info}")]
    Invalid { key: &'static str, info: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_key: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_lifetime_days: i64,
    pub cors_origin: String,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `load` uses the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            port: try_load(&lookup, "PORT", "5027")?,
            database_url: require(&lookup, "DATABASE_URL")?,
            database_max_connections: try_load(&lookup, "DATABASE_MAX_CONNECTIONS", "10")?,
            jwt_key: require(&lookup, "JWT_KEY")?,
            jwt_issuer: try_load(&lookup, "JWT_ISSUER", DEFAULT_JWT_ISSUER)?,
            jwt_audience: try_load(&lookup, "JWT_AUDIENCE", DEFAULT_JWT_AUDIENCE)?,
            jwt_lifetime_days: try_load(
                &lookup,
                "JWT_LIFETIME_DAYS",
                &TOKEN_LIFETIME_DAYS.to_string(),
            )?,
            cors_origin: origin(try_load(&lookup, "CORS_ORIGIN", "http://localhost:5173")?)?,
        })
    }
}

/// Accepts `scheme://host[:port]` only, the form a browser sends in `Origin`.
fn origin(value: String) -> Result<String, ConfigError> {
    let valid = match value.split_once("://") {
        Some((scheme, host)) => {
            matches!(scheme, "http" | "https") && !host.is_empty() && !host.contains('/')
        }
        None => false,
    };

    if !valid {
        log::error!("Invalid CORS_ORIGIN value: {value}");
        return Err(ConfigError::Invalid {
            key: "CORS_ORIGIN",
            info: format!("{value} is not an origin"),
        });
    }
    Ok(value)
}

fn require<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => {
            log::error!("{key} not set");
            Err(ConfigError::Missing(key))
        }
    }
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            log::info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            log::warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key,
                info: e.to_string(),
            }
        })
}
