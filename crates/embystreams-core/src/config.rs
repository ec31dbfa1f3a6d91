//! Media-server connection settings and their validation.
//!
//! The raw settings arrive as a string map from the plugin settings store.
//! Validation is pure: no DNS lookups, no filesystem access. The host check
//! is the SSRF guard, so anything that is not a bare IP literal or an
//! RFC-1123 style hostname is rejected outright.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use tracing::warn;

use crate::error::ConfigError;
use crate::settings::keys;

/// Port used when the settings do not name one.
pub const DEFAULT_PORT: u16 = 8096;

/// Shortest API key the media server hands out.
pub const MIN_API_KEY_LEN: usize = 32;

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Validated connection settings for one request cycle.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_key: String,
    pub use_https: bool,
}

impl ServerConfig {
    /// Validate a raw settings map.
    ///
    /// Checks run in a fixed order: required fields, host, port, API key.
    pub fn validate(raw: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let host = raw.get(keys::HOST).map(String::as_str).unwrap_or("");
        let api_key = raw.get(keys::API_KEY).map(String::as_str).unwrap_or("");

        if host.is_empty() {
            return Err(ConfigError::MissingField(keys::HOST));
        }
        if api_key.is_empty() {
            return Err(ConfigError::MissingField(keys::API_KEY));
        }

        validate_host(host)?;
        let port = parse_port(raw.get(keys::PORT).map(String::as_str))?;
        validate_api_key(api_key)?;

        let use_https = raw
            .get(keys::USE_HTTPS)
            .map(|v| crate::settings::parse_flag(v))
            .unwrap_or(false);

        Ok(Self {
            host: host.to_string(),
            port,
            api_key: api_key.to_string(),
            use_https,
        })
    }

    pub fn scheme(&self) -> &'static str {
        if self.use_https {
            "https"
        } else {
            "http"
        }
    }

    /// `scheme://host:port`, with IPv6 literals bracketed.
    pub fn base_url(&self) -> String {
        let host = match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => format!("[{}]", self.host),
            _ => self.host.clone(),
        };
        format!("{}://{}:{}", self.scheme(), host, self.port)
    }
}

// The API key must never end up in logs, so Debug redacts it.
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_key", &"<redacted>")
            .field("use_https", &self.use_https)
            .finish()
    }
}

/// Accept an IPv4/IPv6 literal or a dot-separated hostname.
pub fn validate_host(host: &str) -> Result<(), ConfigError> {
    if host.parse::<IpAddr>().is_ok() || is_valid_hostname(host) {
        return Ok(());
    }
    let prefix: String = host.chars().take(50).collect();
    warn!(host = ?prefix, "rejected media server host");
    Err(ConfigError::InvalidHost)
}

fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > MAX_HOSTNAME_LEN {
        return false;
    }
    host.split('.').all(is_valid_label)
}

fn is_valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_LABEL_LEN {
        return false;
    }
    if bytes[0] == b'-' || bytes[bytes.len() - 1] == b'-' {
        return false;
    }
    bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
}

/// Parse the port setting. Absent or blank falls back to [`DEFAULT_PORT`].
pub fn parse_port(raw: Option<&str>) -> Result<u16, ConfigError> {
    let raw = match raw {
        None => return Ok(DEFAULT_PORT),
        Some(s) if s.trim().is_empty() => return Ok(DEFAULT_PORT),
        Some(s) => s.trim(),
    };
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::InvalidPort);
    }
    match raw.parse::<u32>() {
        Ok(p) if (1..=u16::MAX as u32).contains(&p) => Ok(p as u16),
        _ => Err(ConfigError::InvalidPort),
    }
}

pub fn validate_api_key(key: &str) -> Result<(), ConfigError> {
    if key.len() >= MIN_API_KEY_LEN && key.bytes().all(|b| b.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(ConfigError::InvalidApiKey)
    }
}
