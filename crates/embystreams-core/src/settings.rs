//! Plugin settings: the recognized option keys, their defaults, and the
//! normalization applied before anything is persisted.

use std::collections::{BTreeMap, HashMap};

/// Recognized option keys in the settings store.
pub mod keys {
    pub const HOST: &str = "HOST";
    pub const PORT: &str = "PORT";
    pub const API_KEY: &str = "API_KEY";
    pub const USE_HTTPS: &str = "USE_HTTPS";
    pub const REFRESH_INTERVAL: &str = "REFRESH_INTERVAL";
    pub const SHOW_THUMBNAILS: &str = "SHOW_THUMBNAILS";
    pub const SHOW_TRANSCODE_INFO: &str = "SHOW_TRANSCODE_INFO";
    pub const MAX_STREAMS: &str = "MAX_STREAMS";
    pub const SHOW_IDLE: &str = "SHOW_IDLE";

    pub const ALL: [&str; 9] = [
        HOST,
        PORT,
        API_KEY,
        USE_HTTPS,
        REFRESH_INTERVAL,
        SHOW_THUMBNAILS,
        SHOW_TRANSCODE_INFO,
        MAX_STREAMS,
        SHOW_IDLE,
    ];

    pub fn is_recognized(key: &str) -> bool {
        ALL.contains(&key)
    }
}

const DEFAULT_REFRESH_INTERVAL: u32 = 10;
const MIN_REFRESH_INTERVAL: u32 = 5;
const DEFAULT_MAX_STREAMS: usize = 10;

/// Interpret a stored boolean flag (`yes`, `1`, `true`, case-insensitive).
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "yes" | "1" | "true" | "on"
    )
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Every recognized setting, normalized.
///
/// Connection fields are kept as raw strings; they are validated per request
/// by [`crate::ServerConfig::validate`], not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSettings {
    pub host: String,
    pub port: String,
    pub api_key: String,
    pub use_https: bool,
    /// Dashboard poll interval in seconds (at least 5).
    pub refresh_interval: u32,
    pub show_thumbnails: bool,
    pub show_transcode_info: bool,
    /// Cap on returned sessions; `0` means unlimited.
    pub max_streams: usize,
    pub show_idle: bool,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: crate::config::DEFAULT_PORT.to_string(),
            api_key: String::new(),
            use_https: false,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            show_thumbnails: true,
            show_transcode_info: true,
            max_streams: DEFAULT_MAX_STREAMS,
            show_idle: false,
        }
    }
}

impl PluginSettings {
    /// Build settings from a raw map, falling back to defaults for anything
    /// absent or unparsable.
    pub fn from_map(raw: &HashMap<String, String>) -> Self {
        let d = Self::default();
        let get = |k: &str| raw.get(k).map(|v| v.trim());

        Self {
            host: get(keys::HOST).map(str::to_string).unwrap_or(d.host),
            port: get(keys::PORT)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .unwrap_or(d.port),
            api_key: get(keys::API_KEY).map(str::to_string).unwrap_or(d.api_key),
            use_https: get(keys::USE_HTTPS).map(parse_flag).unwrap_or(d.use_https),
            refresh_interval: get(keys::REFRESH_INTERVAL)
                .and_then(|v| v.parse::<u32>().ok())
                .map(|v| v.max(MIN_REFRESH_INTERVAL))
                .unwrap_or(d.refresh_interval),
            show_thumbnails: get(keys::SHOW_THUMBNAILS)
                .map(parse_flag)
                .unwrap_or(d.show_thumbnails),
            show_transcode_info: get(keys::SHOW_TRANSCODE_INFO)
                .map(parse_flag)
                .unwrap_or(d.show_transcode_info),
            max_streams: get(keys::MAX_STREAMS)
                .and_then(|v| v.parse::<i64>().ok())
                .map(|v| v.max(0) as usize)
                .unwrap_or(d.max_streams),
            show_idle: get(keys::SHOW_IDLE).map(parse_flag).unwrap_or(d.show_idle),
        }
    }

    /// Serialize to the on-disk key/value form (sorted for stable output).
    pub fn to_map(&self) -> BTreeMap<&'static str, String> {
        let mut m = BTreeMap::new();
        m.insert(keys::HOST, self.host.clone());
        m.insert(keys::PORT, self.port.clone());
        m.insert(keys::API_KEY, self.api_key.clone());
        m.insert(keys::USE_HTTPS, if self.use_https { "1" } else { "0" }.to_string());
        m.insert(keys::REFRESH_INTERVAL, self.refresh_interval.to_string());
        m.insert(keys::SHOW_THUMBNAILS, yes_no(self.show_thumbnails).to_string());
        m.insert(
            keys::SHOW_TRANSCODE_INFO,
            yes_no(self.show_transcode_info).to_string(),
        );
        m.insert(keys::MAX_STREAMS, self.max_streams.to_string());
        m.insert(keys::SHOW_IDLE, yes_no(self.show_idle).to_string());
        m
    }

    /// Raw map in the shape [`crate::ServerConfig::validate`] expects.
    pub fn connection_map(&self) -> HashMap<String, String> {
        self.to_map()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    /// True when both host and API key are filled in.
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.api_key.is_empty()
    }

    /// `None` when unlimited.
    pub fn stream_cap(&self) -> Option<usize> {
        (self.max_streams > 0).then_some(self.max_streams)
    }
}
