use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

/// Default cap on simultaneously running ingestion tasks per upload request.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 3;

/// Upper bound for the token lifetime and refresh window: one year.
pub const MAX_TOKEN_MINUTES: i64 = 60 * 24 * 365;
const DEFAULT_TOKEN_MINUTES: i64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    pub ttl_minutes: i64,
    pub max_refresh_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_in_flight: usize,
    pub body_limit_mb: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub cors_allow_origins: Vec<String>,
    pub jwt: JwtConfig,
    pub upload: UploadConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            private_key_path: std::env::var("JWT_PRIVATE_KEY_PATH")
                .unwrap_or_else(|_| "keys/priv.pem".into())
                .into(),
            public_key_path: std::env::var("JWT_PUBLIC_KEY_PATH")
                .unwrap_or_else(|_| "keys/pub.pem".into())
                .into(),
            ttl_minutes: token_minutes(
                "JWT_TTL_MINUTES",
                std::env::var("JWT_TTL_MINUTES").ok().as_deref(),
            ),
            max_refresh_minutes: token_minutes(
                "JWT_MAX_REFRESH_MINUTES",
                std::env::var("JWT_MAX_REFRESH_MINUTES").ok().as_deref(),
            ),
        };
        let upload = UploadConfig {
            dir: std::env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "./upload".into())
                .into(),
            max_in_flight: env_parse::<usize>("UPLOAD_MAX_IN_FLIGHT")
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_IN_FLIGHT),
            body_limit_mb: env_parse("UPLOAD_BODY_LIMIT_MB").unwrap_or(32),
        };
        let cors_allow_origins = std::env::var("CORS_ALLOW_ORIGINS")
            .map(|v| parse_list(&v))
            .unwrap_or_default();

        Ok(Self {
            database_url,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parse("APP_PORT").unwrap_or(8080),
            cors_allow_origins,
            jwt,
            upload,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

/// Minutes in `1..=MAX_TOKEN_MINUTES`; anything else falls back to the default.
fn token_minutes(key: &str, raw: Option<&str>) -> i64 {
    let Some(raw) = raw else {
        return DEFAULT_TOKEN_MINUTES;
    };
    match raw.trim().parse::<i64>() {
        Ok(m) if (1..=MAX_TOKEN_MINUTES).contains(&m) => m,
        _ => {
            warn!(%key, value = %raw, default = DEFAULT_TOKEN_MINUTES, "token minutes out of range");
            DEFAULT_TOKEN_MINUTES
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
