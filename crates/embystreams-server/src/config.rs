//! Gateway configuration: TOML file + CLI overrides.
//!
//! This is the gateway's own configuration (where to listen, where the
//! plugin settings file lives, which CSRF secret to expect). The media-server
//! connection settings are not here; they are read from the plugin settings
//! store on every request.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub auth: AuthSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_settings_path")]
    pub settings_path: String,
    #[serde(default = "default_api_root")]
    pub api_root: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            settings_path: default_settings_path(),
            api_root: default_api_root(),
        }
    }
}

/// `[auth]` section of the config TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSection {
    /// Session CSRF secret the dashboard host hands to the browser.
    #[serde(default)]
    pub csrf_token: Option<String>,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8097
}
fn default_settings_path() -> String {
    "/boot/config/plugins/embystreams/embystreams.cfg".to_string()
}
fn default_api_root() -> String {
    "emby".to_string()
}

/// CLI values that override the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub settings_path: Option<String>,
    pub csrf_token: Option<String>,
}

/// Resolved gateway configuration (paths expanded, CLI overrides applied).
#[derive(Clone)]
pub struct GatewayConfig {
    pub bind: String,
    pub port: u16,
    pub settings_path: PathBuf,
    pub api_root: String,
    pub csrf_token: Option<String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("settings_path", &self.settings_path)
            .field("api_root", &self.api_root)
            .field("csrf_token", &self.csrf_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl GatewayConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(config_path: Option<&Path>, overrides: Overrides) -> Result<Self, String> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)
                        .map_err(|e| format!("cannot read {}: {e}", expanded.display()))?;
                    toml::from_str::<ConfigFile>(&content)
                        .map_err(|e| format!("config parse error: {e}"))?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        Ok(Self::merge(file_config, overrides))
    }

    fn merge(file: ConfigFile, overrides: Overrides) -> Self {
        let settings_str = overrides
            .settings_path
            .unwrap_or(file.server.settings_path);
        let api_root = file.server.api_root.trim_matches('/').to_string();

        Self {
            bind: overrides.bind.unwrap_or(file.server.bind),
            port: overrides.port.unwrap_or(file.server.port),
            settings_path: expand_tilde_str(&settings_str),
            api_root: if api_root.is_empty() {
                default_api_root()
            } else {
                api_root
            },
            csrf_token: overrides
                .csrf_token
                .or(file.auth.csrf_token)
                .filter(|t| !t.is_empty()),
        }
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}
