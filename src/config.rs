use anyhow::{bail, Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::util::is_local_endpoint_url;

const BACKEND_URL_ENV: &str = "MYGPT_BACKEND_URL";
const PREFERENCE_SCOPE_ENV: &str = "MYGPT_PREFERENCE_SCOPE";
const CONNECT_TIMEOUT_ENV: &str = "MYGPT_CONNECT_TIMEOUT_SECS";
const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_PREFERENCE_SCOPE: &str = "global";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const MAX_CONNECT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend_url: String,
    pub preference_scope: String,
    pub connect_timeout_secs: u64,
    pub log_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            preference_scope: DEFAULT_PREFERENCE_SCOPE.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            log_path: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let backend_url = non_empty_env(BACKEND_URL_ENV)
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        let preference_scope = non_empty_env(PREFERENCE_SCOPE_ENV)
            .unwrap_or_else(|| DEFAULT_PREFERENCE_SCOPE.to_string());
        let connect_timeout_secs = match non_empty_env(CONNECT_TIMEOUT_ENV) {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("{CONNECT_TIMEOUT_ENV} must be a whole number of seconds, got '{raw}'"))?,
            None => DEFAULT_CONNECT_TIMEOUT_SECS,
        };
        let log_path = non_empty_env(crate::api::logging::LOG_PATH_ENV).map(PathBuf::from);

        Ok(Self {
            backend_url,
            preference_scope,
            connect_timeout_secs,
            log_path,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let parsed = Url::parse(self.backend_url.trim())
            .with_context(|| format!("Invalid {BACKEND_URL_ENV} '{}'", self.backend_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "Invalid {BACKEND_URL_ENV} '{}': expected http:// or https:// URL",
                self.backend_url
            );
        }
        if parsed.scheme() == "http" && !is_local_endpoint_url(&self.backend_url) {
            tracing::warn!(
                url = %self.backend_url,
                "backend is reached over plain http on a non-local host"
            );
        }

        let scope = self.preference_scope.as_str();
        if scope.is_empty() || scope.chars().any(char::is_whitespace) {
            bail!("Invalid {PREFERENCE_SCOPE_ENV} '{scope}': expected a single non-empty word");
        }

        if !(1..=MAX_CONNECT_TIMEOUT_SECS).contains(&self.connect_timeout_secs) {
            bail!(
                "{CONNECT_TIMEOUT_ENV} must be between 1 and {MAX_CONNECT_TIMEOUT_SECS}, got {}",
                self.connect_timeout_secs
            );
        }

        Ok(())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
