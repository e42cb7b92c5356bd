//! Artifact access for Buildstash publishing.
//!
//! This crate provides:
//! - The `ArtifactSource` capability: existence, name, size, ranged and
//!   streaming reads
//! - Backends: workspace filesystem and in-memory

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{
    filesystem::{FileArtifact, WorkspaceFiles},
    memory::MemoryArtifact,
};
pub use error::{StorageError, StorageResult};
pub use traits::{ArtifactSource, ByteStream, MAX_RANGE_SIZE};
