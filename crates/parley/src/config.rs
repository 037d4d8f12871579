//! Client configuration.
//!
//! Defaults match the backend's own defaults; every field can be overridden
//! from the environment with `from_env()` or with the `with_*` setters.

use std::time::Duration;

use reqwest::Url;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/";
pub const DEFAULT_USER_ID: &str = "default";
pub const DEFAULT_VOICE_ID: &str = "mxTlDrtKZzOqgjtBw4hM";

const ENV_BASE_URL: &str = "PARLEY_BASE_URL";
const ENV_USER_ID: &str = "PARLEY_USER_ID";
const ENV_VOICE_ENABLED: &str = "PARLEY_VOICE_ENABLED";
const ENV_VOICE_ID: &str = "PARLEY_VOICE_ID";
const ENV_REQUEST_TIMEOUT: &str = "PARLEY_REQUEST_TIMEOUT";
const ENV_HEALTH_INTERVAL: &str = "PARLEY_HEALTH_INTERVAL";
const ENV_AUTH_TOKEN: &str = "PARLEY_AUTH_TOKEN";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend root; always ends with `/` so endpoint paths join underneath it.
    pub base_url: Url,
    pub user_id: String,
    /// Ask the backend to synthesize speech for chat replies.
    pub voice_enabled: bool,
    pub voice_id: String,
    /// Per-request timeout; expiry surfaces as `TransportError::Timeout`.
    pub request_timeout: Duration,
    /// Cadence for the optional health poller.
    pub health_interval: Duration,
    pub auth_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid"),
            user_id: DEFAULT_USER_ID.to_string(),
            voice_enabled: true,
            voice_id: DEFAULT_VOICE_ID.to_string(),
            request_timeout: Duration::from_secs(30),
            health_interval: Duration::from_secs(30),
            auth_token: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from `PARLEY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_BASE_URL) {
            config = config.with_base_url(&url)?;
        }
        if let Some(user_id) = lookup(ENV_USER_ID) {
            config = config.with_user_id(user_id)?;
        }
        if let Some(value) = lookup(ENV_VOICE_ENABLED) {
            config.voice_enabled = parse_bool(ENV_VOICE_ENABLED, &value)?;
        }
        if let Some(voice_id) = lookup(ENV_VOICE_ID) {
            config.voice_id = voice_id;
        }
        if let Some(value) = lookup(ENV_REQUEST_TIMEOUT) {
            config.request_timeout = parse_seconds(ENV_REQUEST_TIMEOUT, &value)?;
        }
        if let Some(value) = lookup(ENV_HEALTH_INTERVAL) {
            config.health_interval = parse_seconds(ENV_HEALTH_INTERVAL, &value)?;
        }
        config.auth_token = lookup(ENV_AUTH_TOKEN).filter(|t| !t.is_empty());

        Ok(config)
    }

    pub fn with_base_url(mut self, url: &str) -> Result<Self, ConfigError> {
        let mut parsed = Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
            value: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                value: url.to_string(),
                reason: "scheme must be http or https".to_string(),
            });
        }
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }
        self.base_url = parsed;
        Ok(self)
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Result<Self, ConfigError> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(ConfigError::Empty(ENV_USER_ID.to_string()));
        }
        self.user_id = user_id;
        Ok(self)
    }

    pub fn with_voice_enabled(mut self, enabled: bool) -> Self {
        self.voice_enabled = enabled;
        self
    }

    pub fn with_voice_id(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

fn parse_seconds(var: &str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| *s > 0.0)
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .filter(|d| !d.is_zero())
        .ok_or_else(|| ConfigError::InvalidSeconds {
            var: var.to_string(),
            value: value.to_string(),
        })
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}
