use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::remote::{RemoteBlob, RemoteError, RemoteStore};

/// Calls received by a [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub find: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

struct StoredBlob {
    id: String,
    name: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct State {
    blobs: Vec<StoredBlob>,
    /// Ids still listed by `find` whose content is gone.
    ghosts: HashSet<String>,
    next_id: u64,
    calls: CallCounts,
    failure: Option<String>,
}

/// In-process remote store. Supports injecting ghost references and
/// failures, and counts every call.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every blob named `name` a stale reference: still listed, but
    /// updates fail with `NotFound`.
    pub fn mark_ghost(&self, name: &str) {
        let mut state = self.lock();
        let ids: Vec<String> = state
            .blobs
            .iter()
            .filter(|b| b.name == name)
            .map(|b| b.id.clone())
            .collect();
        state.ghosts.extend(ids);
    }

    /// Fail every following call with `RemoteError::Request(message)`.
    pub fn fail_with(&self, message: &str) {
        self.lock().failure = Some(message.to_string());
    }

    pub fn recover(&self) {
        self.lock().failure = None;
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn count_named(&self, name: &str) -> usize {
        self.lock().blobs.iter().filter(|b| b.name == name).count()
    }

    pub fn content(&self, name: &str) -> Option<Vec<u8>> {
        let state = self.lock();
        state
            .blobs
            .iter()
            .find(|b| b.name == name && !state.ghosts.contains(&b.id))
            .map(|b| b.bytes.clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().blobs.iter().map(|b| b.name.clone()).collect();
        names.sort();
        names
    }

    fn check_failure(state: &State) -> Result<(), RemoteError> {
        match &state.failure {
            Some(message) => Err(RemoteError::Request(message.clone())),
            None => Ok(()),
        }
    }

    fn sha256(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn checksum(&self, bytes: &[u8]) -> String {
        Self::sha256(bytes)
    }

    async fn find(&self, name: &str) -> Result<Vec<RemoteBlob>, RemoteError> {
        let mut state = self.lock();
        state.calls.find += 1;
        Self::check_failure(&state)?;

        Ok(state
            .blobs
            .iter()
            .filter(|b| b.name == name)
            .map(|b| RemoteBlob {
                id: b.id.clone(),
                name: b.name.clone(),
                checksum: (!state.ghosts.contains(&b.id)).then(|| Self::sha256(&b.bytes)),
            })
            .collect())
    }

    async fn create(
        &self,
        name: &str,
        bytes: &[u8],
        _mime: &str,
    ) -> Result<RemoteBlob, RemoteError> {
        let mut state = self.lock();
        state.calls.create += 1;
        Self::check_failure(&state)?;

        state.next_id += 1;
        let id = format!("blob-{}", state.next_id);
        state.blobs.push(StoredBlob {
            id: id.clone(),
            name: name.to_string(),
            bytes: bytes.to_vec(),
        });
        Ok(RemoteBlob {
            id,
            name: name.to_string(),
            checksum: Some(Self::sha256(bytes)),
        })
    }

    async fn update(
        &self,
        blob: &RemoteBlob,
        bytes: &[u8],
        _mime: &str,
    ) -> Result<RemoteBlob, RemoteError> {
        let mut state = self.lock();
        state.calls.update += 1;
        Self::check_failure(&state)?;

        if state.ghosts.contains(&blob.id) {
            return Err(RemoteError::NotFound(blob.id.clone()));
        }
        let stored = state
            .blobs
            .iter_mut()
            .find(|b| b.id == blob.id)
            .ok_or_else(|| RemoteError::NotFound(blob.id.clone()))?;
        stored.bytes = bytes.to_vec();

        Ok(RemoteBlob {
            id: blob.id.clone(),
            name: blob.name.clone(),
            checksum: Some(Self::sha256(bytes)),
        })
    }

    async fn delete(&self, blob: &RemoteBlob) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.calls.delete += 1;
        Self::check_failure(&state)?;

        let before = state.blobs.len();
        state.blobs.retain(|b| b.id != blob.id);
        state.ghosts.remove(&blob.id);
        if state.blobs.len() == before {
            return Err(RemoteError::NotFound(blob.id.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    #[test]
    fn test_ghost_is_listed_without_checksum() {
        let store = MemoryStore::new();
        let blob = block_on(store.create("a.json", b"[]", "application/json")).unwrap();
        store.mark_ghost("a.json");

        let listed = block_on(store.find("a.json")).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].checksum, None);
        assert_eq!(store.content("a.json"), None);
        assert!(matches!(
            block_on(store.update(&blob, b"[1]", "application/json")),
            Err(RemoteError::NotFound(_))
        ));

        block_on(store.delete(&blob)).unwrap();
        assert!(block_on(store.find("a.json")).unwrap().is_empty());
    }

    #[test]
    fn test_failure_injection_counts_calls() {
        let store = MemoryStore::new();
        store.fail_with("down");
        assert!(block_on(store.find("a.json")).is_err());
        store.recover();
        assert!(block_on(store.find("a.json")).is_ok());
        assert_eq!(store.calls().find, 2);
    }
}
