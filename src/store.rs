use dirs_next as dirs;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Cache key for the committed zone configuration.
pub const HR_SETTINGS_KEY: &str = "hrSettings";

#[derive(Debug)]
pub enum StoreError {
    NoConfigDir,
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NoConfigDir => write!(f, "no configuration directory available"),
            StoreError::Io(e) => write!(f, "cache I/O failed: {e}"),
            StoreError::Json(e) => write!(f, "cache file is not valid JSON: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::NoConfigDir => None,
            StoreError::Io(e) => Some(e),
            StoreError::Json(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Json(e)
    }
}

/// String-keyed local cache. Last writer wins.
pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Cache persisted as one JSON object of `key -> string` in a file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    const FILE: &'static str = "hr_zone_dashboard_cache.json";

    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Store located in the user's configuration directory.
    pub fn in_config_dir() -> Result<Self, StoreError> {
        dirs::config_dir()
            .map(|p| Self::new(p.join(Self::FILE)))
            .ok_or(StoreError::NoConfigDir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

impl SettingsStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        // an unreadable file is replaced rather than blocking the write
        let mut entries = self.read_all().unwrap_or_else(|e| {
            log::warn!("Rewriting unreadable cache {}: {e}", self.path.display());
            BTreeMap::new()
        });
        entries.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }
}

/// In-memory cache for tests and headless use.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut store = Self::new();
        store.entries.insert(key.to_string(), value.to_string());
        store
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_roundtrip_and_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().join("nested").join("cache.json"));
        assert_eq!(store.get(HR_SETTINGS_KEY).unwrap(), None);

        store.set(HR_SETTINGS_KEY, r#"{"maxHR":190}"#).unwrap();
        store.set("other", "x").unwrap();

        let reopened = FileStore::new(store.path());
        assert_eq!(
            reopened.get(HR_SETTINGS_KEY).unwrap().as_deref(),
            Some(r#"{"maxHR":190}"#)
        );
        assert_eq!(reopened.get("other").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn corrupt_file_errors_on_read_but_is_replaced_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut store = FileStore::new(&path);
        assert!(matches!(store.get(HR_SETTINGS_KEY), Err(StoreError::Json(_))));

        store.set(HR_SETTINGS_KEY, "{}").unwrap();
        assert_eq!(store.get(HR_SETTINGS_KEY).unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn memory_store_overwrites() {
        let mut store = MemoryStore::with_entry(HR_SETTINGS_KEY, "a");
        store.set(HR_SETTINGS_KEY, "b").unwrap();
        assert_eq!(store.get(HR_SETTINGS_KEY).unwrap().as_deref(), Some("b"));
    }
}
