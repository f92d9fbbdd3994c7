use std::{net::SocketAddr, path::PathBuf};

pub const DEFAULT_BIND: &str = "0.0.0.0:5000";
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 60;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: `{value}` is not a valid {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("TASKNEST_JWT_SECRET must be at least 32 bytes")]
    WeakSecret,
}

/// Server settings, read from the environment (and `.env` if present).
///
/// Missing persistence or verifier credentials are not errors: the server
/// starts degraded instead (demo listing, unverified tokens).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind: SocketAddr,
    pub database_path: Option<PathBuf>,
    pub jwt_secret: Option<String>,
    pub token_ttl_minutes: i64,
    pub static_dir: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> Result<Settings, ConfigError> {
        dotenvy::dotenv().ok();
        Settings::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Settings, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_raw = var("TASKNEST_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            key: "TASKNEST_BIND",
            value: bind_raw.clone(),
            expected: "socket address",
        })?;

        let token_ttl_minutes = match var("TASKNEST_TOKEN_TTL_MINUTES") {
            None => DEFAULT_TOKEN_TTL_MINUTES,
            Some(raw) => match raw.parse::<i64>() {
                Ok(minutes) if minutes > 0 => minutes,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "TASKNEST_TOKEN_TTL_MINUTES",
                        value: raw,
                        expected: "positive number of minutes",
                    })
                }
            },
        };

        let jwt_secret = var("TASKNEST_JWT_SECRET");
        if jwt_secret.as_ref().is_some_and(|s| s.len() < 32) {
            return Err(ConfigError::WeakSecret);
        }

        Ok(Settings {
            bind,
            database_path: var("TASKNEST_DATABASE_PATH").map(PathBuf::from),
            jwt_secret,
            token_ttl_minutes,
            static_dir: var("TASKNEST_STATIC_DIR").map(PathBuf::from),
        })
    }
}
