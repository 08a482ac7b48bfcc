use crate::constants::{DEFAULT_TIMEOUT_SECS, FACEBOOK_API_VERSION, FACEBOOK_BASE_URL};
use dotenv::dotenv;
use std::env;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub access_token: String,
    pub graph_url: String,
    pub api_version: String,
    pub timeout: Duration,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Environment variable not found: {0}")]
    MissingEnv(String),
    #[error("Invalid Graph API URL: {0}")]
    InvalidGraphUrl(String),
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

impl Config {
    /// Loads `.env` (if present) and reads the process environment.
    ///
    /// `token_override` comes from the `--fb-token` flag and wins over
    /// `META_ACCESS_TOKEN`.
    pub fn from_env(token_override: Option<String>) -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(token_override, |key| env::var(key).ok())
    }

    fn from_lookup<F>(token_override: Option<String>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let access_token = token_override
            .or_else(|| lookup("META_ACCESS_TOKEN"))
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnv("META_ACCESS_TOKEN".to_string()))?;

        let graph_url = lookup("GRAPH_API_URL").unwrap_or_else(|| FACEBOOK_BASE_URL.to_string());

        // Validate the URL format
        let parsed = Url::parse(&graph_url)
            .map_err(|e| ConfigError::InvalidGraphUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidGraphUrl(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        let api_version =
            lookup("GRAPH_API_VERSION").unwrap_or_else(|| FACEBOOK_API_VERSION.to_string());

        let timeout_secs = match lookup("GRAPH_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: "GRAPH_TIMEOUT_SECS".to_string(),
                    value: raw,
                })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            access_token,
            graph_url: graph_url.trim_end_matches('/').to_string(),
            api_version,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Versioned root every resource path is appended to.
    pub fn base_url(&self) -> String {
        format!("{}/{}", self.graph_url, self.api_version)
    }
}
