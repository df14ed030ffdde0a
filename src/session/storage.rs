// Key/value persistence for the session. Values are serialized JSON strings
// stored under fixed keys, read back verbatim on startup.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::SessionError;

pub const TOKENS_KEY: &str = "oauth_tokens";
pub const USER_KEY: &str = "oauth_user";
pub const CURRENT_MODULE_KEY: &str = "current_module";
pub const PERMISSIONS_KEY: &str = "oauth_permissions";

pub const ALL_KEYS: [&str; 4] = [TOKENS_KEY, USER_KEY, CURRENT_MODULE_KEY, PERMISSIONS_KEY];

pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;
    fn remove(&self, key: &str) -> Result<(), SessionError>;
}

// ── In-memory ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.values
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.values
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(key);
        Ok(())
    }
}

// ── JSON file ───────────────────────────────────────────────────────────

/// One JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Opens `path`, starting empty if it does not exist yet. A corrupt file
    /// is treated as empty and overwritten on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "Discarding unreadable session file: {}", e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// `<data dir>/swapgate/session.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|d| d.join("swapgate").join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(values)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let mut values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        values.insert(key.to_string(), value.to_string());
        self.flush(&values)
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        let mut values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        if values.remove(key).is_some() {
            self.flush(&values)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_basic_ops() {
        let s = MemoryStorage::new();
        assert_eq!(s.get(TOKENS_KEY), None);
        s.set(TOKENS_KEY, "{}").unwrap();
        assert_eq!(s.get(TOKENS_KEY).as_deref(), Some("{}"));
        s.remove(TOKENS_KEY).unwrap();
        assert_eq!(s.get(TOKENS_KEY), None);
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let s = FileStorage::open(&path).unwrap();
        s.set(CURRENT_MODULE_KEY, "nft").unwrap();
        s.set(USER_KEY, r#"{"id":"u1"}"#).unwrap();
        s.remove(USER_KEY).unwrap();
        drop(s);

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get(CURRENT_MODULE_KEY).as_deref(), Some("nft"));
        assert_eq!(reopened.get(USER_KEY), None);
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();

        let s = FileStorage::open(&path).unwrap();
        assert_eq!(s.get(TOKENS_KEY), None);
        s.set(TOKENS_KEY, "x").unwrap();
        assert_eq!(FileStorage::open(&path).unwrap().get(TOKENS_KEY).as_deref(), Some("x"));
    }
}
