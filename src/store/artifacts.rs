//! Directory-backed artifact store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::StorageError;
use crate::pipeline::types::{ArtifactDocument, ArtifactId};
use crate::store::traits::ArtifactStore;

/// Stores each artifact as `<root>/<identifier>.csv`.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn store(&self, document: &ArtifactDocument) -> Result<PathBuf, StorageError> {
        fs::create_dir_all(&self.root).await?;
        let path = self.resolve(&document.id);

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(path));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(document.body.as_bytes()).await?;
        file.flush().await?;

        debug!(path = %path.display(), bytes = document.body.len(), "Artifact written");
        Ok(path)
    }

    fn resolve(&self, id: &ArtifactId) -> PathBuf {
        self.root.join(id.file_name())
    }

    async fn exists(&self, id: &ArtifactId) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.resolve(id)).await?)
    }
}
