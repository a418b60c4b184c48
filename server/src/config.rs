use std::{fmt, path::PathBuf};

use anyhow::{Context, Result};

pub const DEFAULT_POLICY_PATH: &str = "config/roles.toml";
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

#[derive(Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub policy_path: PathBuf,
    pub cors_allowed_origins: Vec<String>,
    pub upstream_url: Option<String>,
    pub body_limit: usize,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("policy_path", &self.policy_path)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("upstream_url", &self.upstream_url)
            .field("body_limit", &self.body_limit)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            policy_path: PathBuf::from(DEFAULT_POLICY_PATH),
            cors_allowed_origins: Vec::new(),
            upstream_url: None,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let api_key = env_optional("API_KEY");
        if api_key.is_none() {
            tracing::warn!("API_KEY not set; no caller can resolve to the admin role");
        }

        let policy_path = env_optional("ROLES_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_POLICY_PATH));

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .filter_map(|s| {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect::<Vec<_>>();

        let upstream_url =
            env_optional("UPSTREAM_URL").map(|url| url.trim_end_matches('/').to_string());

        let body_limit = match env_optional("BODY_LIMIT_BYTES") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .context("BODY_LIMIT_BYTES must be a positive integer")?,
            None => DEFAULT_BODY_LIMIT,
        };

        Ok(Self {
            api_key,
            policy_path,
            cors_allowed_origins,
            upstream_url,
            body_limit,
        })
    }
}

fn env_optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
