//! Artifact source trait.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Maximum range size for a single `read_range` call (512 MiB).
pub const MAX_RANGE_SIZE: u64 = 512 * 1024 * 1024;

/// Read-only handle to one artifact file.
///
/// The publisher never owns artifact bytes: it asks the source for the
/// file's size, streams the whole file for direct uploads and reads byte
/// ranges for multipart uploads.
#[async_trait]
pub trait ArtifactSource: Send + Sync + 'static {
    /// Bare file name reported to the registry.
    fn name(&self) -> &str;

    /// Static identifier for the backend type, for logging.
    fn backend_name(&self) -> &'static str;

    /// Check whether the artifact exists.
    async fn exists(&self) -> StorageResult<bool>;

    /// Size of the artifact in bytes.
    async fn size(&self) -> StorageResult<u64>;

    /// Read `len` bytes starting at `offset`.
    async fn read_range(&self, offset: u64, len: u64) -> StorageResult<Bytes>;

    /// Stream the whole artifact.
    async fn stream(&self) -> StorageResult<ByteStream>;

    /// Stream `len` bytes starting at `offset`. Unlike
    /// [`read_range`](Self::read_range) the length is not capped.
    async fn stream_range(&self, offset: u64, len: u64) -> StorageResult<ByteStream>;
}

/// Check that `offset..offset + len` lies inside an artifact of `size` bytes.
pub(crate) fn checked_range_end(offset: u64, len: u64, size: u64) -> StorageResult<u64> {
    let end = offset.checked_add(len).ok_or_else(|| {
        StorageError::InvalidRange(format!("offset {offset} + length {len} overflows"))
    })?;
    if end > size {
        return Err(StorageError::InvalidRange(format!(
            "range {offset}..{end} is past the end of a {size} byte artifact"
        )));
    }
    Ok(end)
}

/// Validate a requested range and convert its length to `usize`.
pub(crate) fn checked_range_len(offset: u64, len: u64, size: u64) -> StorageResult<usize> {
    if len > MAX_RANGE_SIZE {
        return Err(StorageError::InvalidRange(format!(
            "range size {len} exceeds maximum {MAX_RANGE_SIZE} bytes"
        )));
    }
    checked_range_end(offset, len, size)?;
    usize::try_from(len).map_err(|_| {
        StorageError::InvalidRange(format!("range size {len} exceeds platform address space"))
    })
}
