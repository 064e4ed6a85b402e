use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::app::{Result, StandfastError};
use crate::store::{FingerprintEntry, FingerprintStore};

type Entries = BTreeMap<String, FingerprintEntry>;

/// Fingerprint store persisted as one JSON object:
/// `{ "<identity>": { "fingerprint": "<hex>" } }`.
pub struct JsonFileStore {
    path: Option<PathBuf>,
    entries: Mutex<Entries>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Entries::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            Entries::new()
        };

        debug!("Loaded {} fingerprints from {}", entries.len(), path.display());

        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(Entries::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries>> {
        self.entries
            .lock()
            .map_err(|e| StandfastError::Config(format!("Fingerprint store poisoned: {}", e)))
    }

    fn persist(&self, entries: &Entries) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut bytes = serde_json::to_vec_pretty(entries)?;
        bytes.push(b'\n');

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl FingerprintStore for JsonFileStore {
    fn get(&self, identity: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(identity).map(|e| e.fingerprint.clone()))
    }

    fn put(&self, identity: &str, fingerprint: &str) -> Result<()> {
        let mut entries = self.lock()?;
        let previous = entries.insert(
            identity.to_string(),
            FingerprintEntry {
                fingerprint: fingerprint.to_string(),
            },
        );
        if let Err(e) = self.persist(&entries) {
            // keep memory and disk in agreement
            match previous {
                Some(prev) => entries.insert(identity.to_string(), prev),
                None => entries.remove(identity),
            };
            return Err(e);
        }
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_put_get() {
        let store = JsonFileStore::in_memory();
        assert!(store.is_empty().unwrap());
        assert_eq!(store.get("A").unwrap(), None);

        store.put("A", "aaa").unwrap();
        assert_eq!(store.get("A").unwrap(), Some("aaa".into()));

        store.put("A", "bbb").unwrap();
        assert_eq!(store.get("A").unwrap(), Some("bbb".into()));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("judges.fingerprints.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.put("B", "222").unwrap();
            store.put("A", "111").unwrap();
        }

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get("A").unwrap(), Some("111".into()));
        assert_eq!(store.get("B").unwrap(), Some("222".into()));

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["A"]["fingerprint"], "111");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_open_missing_and_empty_file() {
        let dir = TempDir::new().unwrap();
        let missing = JsonFileStore::open(dir.path().join("nope.json")).unwrap();
        assert!(missing.is_empty().unwrap());

        let empty_path = dir.path().join("empty.json");
        fs::write(&empty_path, "").unwrap();
        assert!(JsonFileStore::open(&empty_path).unwrap().is_empty().unwrap());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(JsonFileStore::open(&path).is_err());
    }
}
