//! Process settings read from the environment (after `dotenvy::dotenv()`).

use crate::config::PageSettings;
use crate::error::ConfigError;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Settings {
    pub bind_addr: String,
    /// Resource config file or directory.
    pub config_path: String,
    /// PostgreSQL URL. `None` selects the in-memory repository.
    pub database_url: Option<String>,
    pub page: PageSettings,
    pub request_timeout: Option<Duration>,
    /// Headers every request must carry, checked before routing.
    pub required_headers: Vec<String>,
    pub require_bearer: bool,
    pub body_limit_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bind_addr: "0.0.0.0:3000".into(),
            config_path: "resources".into(),
            database_url: None,
            page: PageSettings::default(),
            request_timeout: None,
            required_headers: Vec::new(),
            require_bearer: false,
            body_limit_bytes: 1024 * 1024,
        }
    }
}

impl Settings {
    /// Read settings from process env. Loads `.env` first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut s = Settings::default();
        if let Some(v) = get("BIND_ADDR") {
            s.bind_addr = v;
        }
        if let Some(v) = get("CONFIG_PATH") {
            s.config_path = v;
        }
        s.database_url = get("DATABASE_URL").filter(|v| !v.trim().is_empty());
        if let Some(v) = get("DEFAULT_LIMIT") {
            s.page.default_limit = parse_num("DEFAULT_LIMIT", &v)?;
        }
        if let Some(v) = get("MAX_LIMIT") {
            s.page.max_limit = parse_num("MAX_LIMIT", &v)?;
        }
        if s.page.default_limit == 0 || s.page.max_limit == 0 || s.page.default_limit > s.page.max_limit {
            return Err(ConfigError::Validation(format!(
                "invalid page settings: DEFAULT_LIMIT={} MAX_LIMIT={}",
                s.page.default_limit, s.page.max_limit
            )));
        }
        if let Some(v) = get("REQUEST_TIMEOUT_MS") {
            let ms: u64 = parse_num("REQUEST_TIMEOUT_MS", &v)?;
            s.request_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(v) = get("REQUIRED_HEADERS") {
            s.required_headers = v
                .split(',')
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect();
        }
        if let Some(v) = get("REQUIRE_BEARER") {
            s.require_bearer = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = get("BODY_LIMIT_BYTES") {
            s.body_limit_bytes = parse_num("BODY_LIMIT_BYTES", &v)?;
        }
        Ok(s)
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, v: &str) -> Result<T, ConfigError> {
    v.trim()
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{} must be a non-negative integer, got '{}'", key, v)))
}
