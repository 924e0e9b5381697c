//! Client configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::path::PathBuf;

use reqwest::Url;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";
pub const DEFAULT_SESSION_DIR: &str = ".geosiaga";

/// Errors produced while building a [`ClientConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid base URL '{value}': {reason}")]
    InvalidBaseUrl { value: String, reason: String },

    #[error("invalid {var}: '{value}' is not a number of seconds")]
    InvalidTimeout { var: &'static str, value: String },
}

/// Optional transport timeouts. `None` keeps the HTTP client's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: Option<u64>,
    pub connect_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root that endpoint paths such as `/login` are appended to.
    pub base_url: Url,
    /// Route the logout helper redirects to.
    pub login_route: String,
    /// Directory holding per-origin session files.
    pub session_dir: PathBuf,
    pub timeouts: Timeouts,
}

impl ClientConfig {
    /// Config for `base_url` with every other setting at its default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if `base_url` is not an absolute http(s) URL.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            login_route: DEFAULT_LOGIN_ROUTE.to_owned(),
            session_dir: PathBuf::from(DEFAULT_SESSION_DIR),
            timeouts: Timeouts::default(),
        })
    }

    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `GEOSIAGA_BASE_URL`: default `http://127.0.0.1:8000/api`
    /// - `GEOSIAGA_LOGIN_ROUTE`: default `/login`
    /// - `GEOSIAGA_SESSION_DIR`: default `.geosiaga`
    /// - `GEOSIAGA_REQUEST_TIMEOUT_SECS`: unset keeps the transport default
    /// - `GEOSIAGA_CONNECT_TIMEOUT_SECS`: unset keeps the transport default
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL or a timeout value is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL or a timeout value is malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup("GEOSIAGA_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let mut config = Self::new(&base_url)?;
        if let Some(route) = lookup("GEOSIAGA_LOGIN_ROUTE").filter(|r| !r.trim().is_empty()) {
            config.login_route = route;
        }
        if let Some(dir) = lookup("GEOSIAGA_SESSION_DIR").filter(|d| !d.trim().is_empty()) {
            config.session_dir = PathBuf::from(dir);
        }
        config.timeouts = Timeouts {
            request_secs: parse_secs("GEOSIAGA_REQUEST_TIMEOUT_SECS", lookup("GEOSIAGA_REQUEST_TIMEOUT_SECS"))?,
            connect_secs: parse_secs("GEOSIAGA_CONNECT_TIMEOUT_SECS", lookup("GEOSIAGA_CONNECT_TIMEOUT_SECS"))?,
        };
        Ok(config)
    }

    /// Absolute URL for an API path such as `/login`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

/// Parse and normalize an API base URL. Trailing slashes are dropped.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidBaseUrl`] for relative or non-http(s) URLs.
pub fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed)
        .map_err(|e| ConfigError::InvalidBaseUrl { value: raw.to_owned(), reason: e.to_string() })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl {
            value: raw.to_owned(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(url)
}

fn parse_secs(var: &'static str, raw: Option<String>) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = raw.filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidTimeout { var, value: raw })
}
