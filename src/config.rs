//! Client configuration.
//!
//! Values come from the process environment (optionally seeded from a `.env`
//! file through dotenvy) and can be overridden field by field by the CLI.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{ClientError, Result};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_STATE_DIR: &str = ".apitest";

/// How the bearer token is attached to outbound requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStyle {
    /// Custom `token: <jwt>` header, used by almost every endpoint.
    #[default]
    TokenHeader,
    /// Standard `Authorization: Bearer <jwt>`.
    Bearer,
}

impl FromStr for AuthStyle {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token" | "token-header" => Ok(AuthStyle::TokenHeader),
            "bearer" => Ok(AuthStyle::Bearer),
            other => Err(ClientError::Config(format!(
                "unknown auth style '{}', expected 'token' or 'bearer'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Directory holding the persisted and tab-scoped state files.
    pub state_dir: PathBuf,
    /// Default header style; individual endpoints may override it.
    pub auth_style: AuthStyle,
    pub log_level: String,
    pub log_json: bool,
    /// When set, logs are also written to a daily rolling file here.
    pub log_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            auth_style: AuthStyle::default(),
            log_level: "info".to_string(),
            log_json: false,
            log_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load from `APITEST_*` environment variables, reading `.env` first.
    pub fn from_env() -> Result<Self> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let mut config = ClientConfig::default();
        if let Some(url) = lookup("APITEST_BASE_URL") {
            config = config.with_base_url(&url)?;
        }
        if let Some(dir) = lookup("APITEST_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        if let Some(style) = lookup("APITEST_AUTH_STYLE") {
            config.auth_style = style.parse()?;
        }
        if let Some(level) = lookup("APITEST_LOG") {
            config.log_level = level;
        }
        if let Some(json) = lookup("APITEST_LOG_JSON") {
            config.log_json = matches!(json.trim(), "1" | "true" | "yes");
        }
        config.log_dir = lookup("APITEST_LOG_DIR").map(PathBuf::from);
        Ok(config)
    }

    pub fn with_base_url(mut self, url: &str) -> Result<Self> {
        let url = url.trim().trim_end_matches('/');
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "base url '{}' must start with http:// or https://",
                url
            )));
        }
        self.base_url = url.to_string();
        Ok(self)
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }
}
