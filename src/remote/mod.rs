//! Remote mirror of local artifacts.
//!
//! ```text
//! local artifact → find(name) → create | no-op | update → (ghost) delete + create
//! ```
//!
//! The remote is an opaque name-keyed blob store scoped to one folder,
//! reached through [`RemoteStore`]. [`RemoteSync`] owns the reconciliation
//! algorithm and is the only caller of the store.

pub mod directory;
pub mod drive;
pub mod memory;

pub use directory::DirectoryStore;
pub use drive::{DriveCredentials, DriveStore};
pub use memory::MemoryStore;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const FOLDER_ENV: &str = "GDRIVE_FOLDER_ID";
pub const CREDENTIALS_ENV: &str = "GOOGLE_SERVICE_ACCOUNT_BASE64";

#[derive(Error, Debug)]
pub enum RemoteError {
    /// The blob a reference points at no longer exists.
    #[error("Remote blob not found: {0}")]
    NotFound(String),

    #[error("Remote authentication failed: {0}")]
    Auth(String),

    #[error("Remote quota exceeded: {0}")]
    Quota(String),

    #[error("Remote request failed: {0}")]
    Request(String),

    #[error("Invalid remote credentials: {0}")]
    Credentials(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A remote object as listed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBlob {
    pub id: String,
    pub name: String,
    /// Content checksum as reported by the remote, in the store's own
    /// algorithm (see [`RemoteStore::checksum`]).
    pub checksum: Option<String>,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Human readable location, for logs.
    fn describe(&self) -> String;

    /// Checksum of local bytes, comparable with [`RemoteBlob::checksum`].
    fn checksum(&self, bytes: &[u8]) -> String;

    async fn find(&self, name: &str) -> Result<Vec<RemoteBlob>, RemoteError>;

    async fn create(&self, name: &str, bytes: &[u8], mime: &str)
        -> Result<RemoteBlob, RemoteError>;

    /// Replace the content of `blob`. A stale reference must fail with
    /// [`RemoteError::NotFound`].
    async fn update(
        &self,
        blob: &RemoteBlob,
        bytes: &[u8],
        mime: &str,
    ) -> Result<RemoteBlob, RemoteError>;

    async fn delete(&self, blob: &RemoteBlob) -> Result<(), RemoteError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No remote blob existed; one was created.
    Created,
    /// Checksums matched; nothing was uploaded.
    Unchanged,
    /// The existing blob was updated in place.
    Updated,
    /// The listed blob was a ghost; it was deleted and created again.
    Recreated,
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Created => write!(f, "created"),
            SyncOutcome::Unchanged => write!(f, "unchanged"),
            SyncOutcome::Updated => write!(f, "updated"),
            SyncOutcome::Recreated => write!(f, "recreated"),
        }
    }
}

pub struct RemoteSync {
    store: Arc<dyn RemoteStore>,
}

impl RemoteSync {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// Mirror a local file under its file name.
    pub async fn sync_file(&self, path: &Path, mime: &str) -> Result<SyncOutcome, RemoteError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RemoteError::Request(format!("No file name in {}", path.display())))?;
        let bytes = tokio::fs::read(path).await?;
        self.sync_bytes(name, &bytes, mime).await
    }

    pub async fn sync_bytes(
        &self,
        name: &str,
        bytes: &[u8],
        mime: &str,
    ) -> Result<SyncOutcome, RemoteError> {
        let mut existing = self.store.find(name).await?;
        if existing.len() > 1 {
            warn!(
                "{} blobs named {} in {}; syncing the first",
                existing.len(),
                name,
                self.store.describe()
            );
        }

        // Nothing there yet
        if existing.is_empty() {
            self.store.create(name, bytes, mime).await?;
            info!("Created {} in {}", name, self.store.describe());
            return Ok(SyncOutcome::Created);
        }
        let blob = existing.swap_remove(0);

        // Same bytes, nothing to upload
        let local = self.store.checksum(bytes);
        if blob.checksum.as_deref() == Some(local.as_str()) {
            debug!("{} unchanged in {}", name, self.store.describe());
            return Ok(SyncOutcome::Unchanged);
        }

        match self.store.update(&blob, bytes, mime).await {
            Ok(_) => {
                info!("Updated {} in {}", name, self.store.describe());
                Ok(SyncOutcome::Updated)
            }
            Err(RemoteError::NotFound(_)) => {
                warn!(
                    "Stale reference {} for {}; deleting and recreating",
                    blob.id, name
                );
                // The blob may already be gone
                match self.store.delete(&blob).await {
                    Ok(()) | Err(RemoteError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
                self.store.create(name, bytes, mime).await?;
                info!("Recreated {} in {}", name, self.store.describe());
                Ok(SyncOutcome::Recreated)
            }
            Err(e) => Err(e),
        }
    }
}

/// Remote settings from the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Mirror into this directory instead of Google Drive.
    pub directory: Option<PathBuf>,
}

/// Which backend to use, resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteBackend {
    Drive {
        folder_id: String,
        credentials_b64: String,
    },
    Directory(PathBuf),
}

impl RemoteBackend {
    /// `None` when neither a mirror directory is configured nor both Drive
    /// variables are set; remote sync is then disabled.
    pub fn resolve<F>(config: &RemoteConfig, env: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = &config.directory {
            return Some(Self::Directory(dir.clone()));
        }

        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        match (non_empty(FOLDER_ENV), non_empty(CREDENTIALS_ENV)) {
            (Some(folder_id), Some(credentials_b64)) => Some(Self::Drive {
                folder_id,
                credentials_b64,
            }),
            _ => None,
        }
    }

    pub fn connect(&self) -> Result<Arc<dyn RemoteStore>, RemoteError> {
        Ok(match self {
            Self::Drive {
                folder_id,
                credentials_b64,
            } => Arc::new(DriveStore::new(
                folder_id.clone(),
                DriveCredentials::from_base64(credentials_b64)?,
            )?),
            Self::Directory(dir) => Arc::new(DirectoryStore::new(dir.clone())),
        })
    }
}
