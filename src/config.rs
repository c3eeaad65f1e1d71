use std::env;
use std::path::PathBuf;
use std::time::Duration;

use log::{info, warn};
use reqwest::Url;

use crate::errors::ConfigError;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_APP_URL: &str = "http://localhost:3000";
const DEFAULT_STORAGE_DIR: &str = ".sherohub";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client options. Pass this into [`Client::new`](crate::Client::new).
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL of the REST backend. Paths such as `/events/` are appended to it.
    pub api_url: String,
    /// Base URL of the web app, used by the [`BrowserNavigator`](crate::BrowserNavigator).
    pub app_url: String,
    /// Directory holding the persisted session.
    pub storage_dir: PathBuf,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Whether session transitions should be echoed to the terminal.
    pub debug: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            app_url: DEFAULT_APP_URL.to_string(),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            debug: false,
        }
    }
}

impl ClientOptions {
    /// Reads `SHEROHUB_*` variables, loading a `.env` file first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let timeout_secs: u64 = load("SHEROHUB_TIMEOUT_SECS", &DEFAULT_TIMEOUT_SECS.to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidTimeout)?;

        let options = Self {
            api_url: load("SHEROHUB_API_URL", DEFAULT_API_URL),
            app_url: load("SHEROHUB_APP_URL", DEFAULT_APP_URL),
            storage_dir: PathBuf::from(load("SHEROHUB_STORAGE_DIR", DEFAULT_STORAGE_DIR)),
            timeout: Duration::from_secs(timeout_secs),
            debug: parse_flag(&load("SHEROHUB_DEBUG", "false")),
        };

        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_http_url(&self.api_url) {
            return Err(ConfigError::InvalidApiUrl(self.api_url.clone()));
        }

        if !is_http_url(&self.app_url) {
            return Err(ConfigError::InvalidAppUrl(self.app_url.clone()));
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(())
    }
}

fn load(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        Ok(_) => {
            warn!("{key} is empty, using default: {default}");
            default.to_string()
        }
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default.to_string()
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}
