//! Per-tab session storage for the "seen before" flag.
//!
//! Survives a reload of the same context, not a fresh one. Only boolean
//! flags are needed.

use std::collections::HashSet;
use std::path::PathBuf;

use parking_lot::Mutex;

/// Boolean flags scoped to one context's session.
pub trait SessionStore: Send + Sync {
    /// Whether `key` has been set in this session.
    fn get(&self, key: &str) -> bool;

    /// Best-effort: a store that cannot persist logs and carries on.
    fn set(&self, key: &str);
}

/// Session store that lives as long as the value.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    flags: Mutex<HashSet<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> bool {
        self.flags.lock().contains(key)
    }

    fn set(&self, key: &str) {
        self.flags.lock().insert(key.to_string());
    }
}

/// Flags stored as marker files inside one directory per context.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Store flags under `dir`, created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn marker(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.flag"))
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> bool {
        self.marker(key).is_file()
    }

    fn set(&self, key: &str) {
        let path = self.marker(key);
        let result = std::fs::create_dir_all(&self.dir).and_then(|()| std::fs::write(&path, b"true"));
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "failed to persist session flag");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_remembers_flags() {
        let store = MemorySessionStore::new();
        assert!(!store.get("app_visited"));
        store.set("app_visited");
        assert!(store.get("app_visited"));
        assert!(!store.get("other"));
    }

    #[test]
    fn file_store_survives_a_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tab-1");

        let first = FileSessionStore::new(&path);
        assert!(!first.get("app_visited"));
        first.set("app_visited");

        // A reload reopens the same directory.
        let reloaded = FileSessionStore::new(&path);
        assert!(reloaded.get("app_visited"));
    }

    #[test]
    fn file_store_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        store.set("../escape");
        assert!(store.get("../escape"));
        assert!(dir.path().join("___escape.flag").is_file());
    }

    #[test]
    fn file_store_write_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let store = FileSessionStore::new(&blocker);
        store.set("app_visited");
        assert!(!store.get("app_visited"));
    }
}
