pub mod json_file;

use serde::{Deserialize, Serialize};

use crate::app::Result;

pub use json_file::JsonFileStore;

/// Last known fingerprint of one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintEntry {
    pub fingerprint: String,
}

/// Identity -> fingerprint mapping. Entries are added and replaced but
/// never removed.
pub trait FingerprintStore {
    fn get(&self, identity: &str) -> Result<Option<String>>;
    fn put(&self, identity: &str, fingerprint: &str) -> Result<()>;
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
