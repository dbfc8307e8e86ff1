//! Artifact persistence.

pub mod artifacts;
pub mod traits;

pub use artifacts::FsArtifactStore;
pub use traits::ArtifactStore;
