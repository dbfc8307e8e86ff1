//! `ArtifactStore` trait — durable home for generated CSV artifacts.
//!
//! The store is the only link between a report and a later approval: the
//! reply carries an identifier, the store turns it back into a local path.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::pipeline::types::{ArtifactDocument, ArtifactId};

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist a document under its identifier. Never overwrites.
    async fn store(&self, document: &ArtifactDocument) -> Result<PathBuf, StorageError>;

    /// Local path an identifier maps to (whether or not it exists).
    fn resolve(&self, id: &ArtifactId) -> PathBuf;

    /// Whether an artifact with this identifier has been stored.
    async fn exists(&self, id: &ArtifactId) -> Result<bool, StorageError>;
}
