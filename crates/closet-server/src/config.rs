use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use closet_api::Settings;
use closet_api::middleware::IdentityMode;

const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

/// Everything the binary reads from its environment, parsed once at
/// startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub api: Settings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset and empty values take the default;
    /// values that do not parse fail with the variable's name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let jwt_secret = get("CLOSET_JWT_SECRET", DEFAULT_JWT_SECRET);
        if jwt_secret == DEFAULT_JWT_SECRET {
            warn!("CLOSET_JWT_SECRET is not set; using the development secret");
        }

        let timeout_secs: u64 = parse(
            "CLOSET_RECOMMEND_TIMEOUT_SECS",
            &get("CLOSET_RECOMMEND_TIMEOUT_SECS", "5"),
        )?;

        Ok(Self {
            host: get("CLOSET_HOST", "0.0.0.0"),
            port: parse("CLOSET_PORT", &get("CLOSET_PORT", "8080"))?,
            db_path: PathBuf::from(get("CLOSET_DB_PATH", "closet.db")),
            api: Settings {
                jwt_secret,
                identity: parse("CLOSET_IDENTITY", &get("CLOSET_IDENTITY", "bearer"))?,
                email_domain: get("CLOSET_EMAIL_DOMAIN", "kyonggi.ac.kr"),
                upload_dir: PathBuf::from(get("CLOSET_UPLOAD_DIR", "./uploads")),
                public_url: get("CLOSET_PUBLIC_URL", "http://localhost:8080"),
                max_upload_bytes: parse(
                    "CLOSET_MAX_UPLOAD_BYTES",
                    &get("CLOSET_MAX_UPLOAD_BYTES", "10485760"),
                )?,
                recommend_url: get("CLOSET_RECOMMEND_URL", "http://localhost:8000"),
                recommend_timeout: Duration::from_secs(timeout_secs),
            },
        })
    }

    pub fn identity_mode(&self) -> IdentityMode {
        self.api.identity
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("invalid {}: '{}'", key, raw))
}
