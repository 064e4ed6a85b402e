use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::remote::{RemoteBlob, RemoteError, RemoteStore};

/// Mirrors artifacts into a directory, e.g. a mounted network share.
/// Blob ids are file names.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn not_found(blob_id: &str, e: std::io::Error) -> RemoteError {
        if e.kind() == ErrorKind::NotFound {
            RemoteError::NotFound(blob_id.to_string())
        } else {
            RemoteError::Io(e)
        }
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> Result<RemoteBlob, RemoteError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let tmp = self.root.join(format!(".{}.tmp", name));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, self.root.join(name)).await?;
        Ok(RemoteBlob {
            id: name.to_string(),
            name: name.to_string(),
            checksum: Some(self.checksum(bytes)),
        })
    }
}

#[async_trait]
impl RemoteStore for DirectoryStore {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn checksum(&self, bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    async fn find(&self, name: &str) -> Result<Vec<RemoteBlob>, RemoteError> {
        match tokio::fs::read(self.root.join(name)).await {
            Ok(bytes) => Ok(vec![RemoteBlob {
                id: name.to_string(),
                name: name.to_string(),
                checksum: Some(self.checksum(&bytes)),
            }]),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(
        &self,
        name: &str,
        bytes: &[u8],
        _mime: &str,
    ) -> Result<RemoteBlob, RemoteError> {
        self.write(name, bytes).await
    }

    async fn update(
        &self,
        blob: &RemoteBlob,
        bytes: &[u8],
        _mime: &str,
    ) -> Result<RemoteBlob, RemoteError> {
        tokio::fs::metadata(self.root.join(&blob.id))
            .await
            .map_err(|e| Self::not_found(&blob.id, e))?;
        self.write(&blob.id, bytes).await
    }

    async fn delete(&self, blob: &RemoteBlob) -> Result<(), RemoteError> {
        tokio::fs::remove_file(self.root.join(&blob.id))
            .await
            .map_err(|e| Self::not_found(&blob.id, e))
    }
}
