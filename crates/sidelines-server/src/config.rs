use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::warn;

/// Placeholder secrets that MUST NOT be used in release builds.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "dev-service-key-change-me",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// Embedded in the session cookie name (`sb-<ref>-auth-token`).
    pub project_ref: String,
    /// Shared with the schedule and play-by-play producers.
    pub service_key: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), cfg!(debug_assertions))
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>, allow_placeholders: bool) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let port = var("SIDELINES_PORT", "3000");
        let config = Self {
            host: var("SIDELINES_HOST", "0.0.0.0"),
            port: port
                .parse()
                .with_context(|| format!("SIDELINES_PORT '{}' is not a port number", port))?,
            db_path: var("SIDELINES_DB_PATH", "sidelines.db").into(),
            jwt_secret: var("SIDELINES_JWT_SECRET", "dev-secret-change-me"),
            project_ref: var("SIDELINES_PROJECT_REF", "local"),
            service_key: var("SIDELINES_SERVICE_KEY", "dev-service-key-change-me"),
        };

        for (name, value) in [
            ("SIDELINES_JWT_SECRET", &config.jwt_secret),
            ("SIDELINES_SERVICE_KEY", &config.service_key),
        ] {
            if value.is_empty() || PLACEHOLDER_SECRETS.contains(&value.as_str()) {
                if !allow_placeholders {
                    bail!("{} is unset or still a placeholder; set it in .env and restart", name);
                }
                warn!("{} is a placeholder; fine for development only", name);
            }
        }

        Ok(config)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
