//! Plugin settings persistence.
//!
//! The dashboard host keeps plugin settings in a flat `KEY="value"` file.
//! The gateway reads it fresh on every request and only writes it from the
//! `saveConfig` action.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::settings::PluginSettings;

/// Key-value settings persistence.
pub trait ConfigStore: Send + Sync {
    /// Load the raw settings map. A store with nothing saved yields an empty map.
    fn load(&self) -> Result<HashMap<String, String>, StoreError>;

    /// Persist normalized settings, replacing what was stored.
    fn save(&self, settings: &PluginSettings) -> Result<(), StoreError>;
}

/// Settings file on disk.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<HashMap<String, String>, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "settings file not found, using defaults");
            return Ok(HashMap::new());
        }

        audit_permissions(&self.path);
        let content = fs::read_to_string(&self.path)?;
        parse(&content)
    }

    fn save(&self, settings: &PluginSettings) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        let content = render(settings);

        // Write next to the target and rename so readers never see a partial file.
        let tmp = self.path.with_extension("cfg.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            restrict_permissions(&file)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

#[cfg(unix)]
fn audit_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = fs::metadata(path) {
        if meta.permissions().mode() & 0o077 != 0 {
            warn!(path = %path.display(), "settings file is readable by group or others");
        }
    }
}

#[cfg(not(unix))]
fn audit_permissions(_path: &Path) {}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &fs::File) -> std::io::Result<()> {
    Ok(())
}

/// Parse `KEY=value` / `KEY="value"` lines. `#` and `;` start comments.
pub fn parse(content: &str) -> Result<HashMap<String, String>, StoreError> {
    let mut out = HashMap::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or(StoreError::Parse(idx + 1))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(StoreError::Parse(idx + 1));
        }

        let value = value.trim();
        let value = match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            Some(quoted) => unescape(quoted),
            None => value.to_string(),
        };

        out.insert(key.to_string(), value);
    }

    Ok(out)
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('"' | '\\')) => out.push(next),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn sanitize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_ascii_uppercase()
}

fn escape_value(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .flat_map(|c| match c {
            '"' => vec!['\\', '"'],
            '\\' => vec!['\\', '\\'],
            c => vec![c],
        })
        .collect()
}

/// Render settings in the on-disk format.
pub fn render(settings: &PluginSettings) -> String {
    let mut content = String::from("# EmbyStreams Configuration\n");
    content.push_str(&format!(
        "# Generated: {}\n\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    for (key, value) in settings.to_map() {
        content.push_str(&format!("{}=\"{}\"\n", sanitize_key(key), escape_value(&value)));
    }
    content
}

/// In-memory store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: RwLock::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<HashMap<String, String>, StoreError> {
        Ok(self
            .values
            .read()
            .map(|v| v.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone()))
    }

    fn save(&self, settings: &PluginSettings) -> Result<(), StoreError> {
        let mut values = self
            .values
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *values = settings.connection_map();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::keys;

    #[test]
    fn parses_quoted_and_bare_values() {
        let m = parse(
            "# comment\n\nHOST=\"emby.lan\"\nPORT=8096\n; other comment\nAPI_KEY = \"a\\\"b\"\n",
        )
        .unwrap();
        assert_eq!(m["HOST"], "emby.lan");
        assert_eq!(m["PORT"], "8096");
        assert_eq!(m["API_KEY"], "a\"b");
    }

    #[test]
    fn rejects_lines_without_equals() {
        match parse("HOST=\"x\"\ngarbage\n") {
            Err(StoreError::Parse(2)) => {}
            other => panic!("expected parse error on line 2, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("nope.cfg"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("plugins/embystreams/embystreams.cfg"));
        let settings = PluginSettings {
            host: "emby.lan".into(),
            api_key: "0123456789abcdef0123456789abcdef".into(),
            show_idle: true,
            ..Default::default()
        };
        store.save(&settings).unwrap();

        let raw = store.load().unwrap();
        assert_eq!(raw[keys::HOST], "emby.lan");
        assert_eq!(raw[keys::SHOW_IDLE], "yes");
        assert_eq!(PluginSettings::from_map(&raw), settings);
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embystreams.cfg");
        FileConfigStore::new(&path)
            .save(&PluginSettings::default())
            .unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn escaping_survives_quotes_and_newlines() {
        let settings = PluginSettings {
            host: "a\"b\\c\nd".into(),
            ..Default::default()
        };
        let raw = parse(&render(&settings)).unwrap();
        assert_eq!(raw[keys::HOST], "a\"b\\cd");
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryConfigStore::with_values([(keys::HOST, "emby")]);
        assert_eq!(store.load().unwrap()[keys::HOST], "emby");
        store.save(&PluginSettings::default()).unwrap();
        assert_eq!(store.load().unwrap()[keys::HOST], "");
    }
}
