//! In-memory artifacts, for callers that already hold the bytes.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ArtifactSource, ByteStream, checked_range_end, checked_range_len};
use async_trait::async_trait;
use bytes::Bytes;

/// An artifact backed by a byte buffer. `None` models a missing file.
#[derive(Clone, Debug)]
pub struct MemoryArtifact {
    name: String,
    data: Option<Bytes>,
}

impl MemoryArtifact {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: Some(data.into()),
        }
    }

    /// An artifact that reports itself as missing.
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: None,
        }
    }

    fn data(&self) -> StorageResult<&Bytes> {
        self.data
            .as_ref()
            .ok_or_else(|| StorageError::NotFound(self.name.clone()))
    }
}

#[async_trait]
impl ArtifactSource for MemoryArtifact {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn exists(&self) -> StorageResult<bool> {
        Ok(self.data.is_some())
    }

    async fn size(&self) -> StorageResult<u64> {
        Ok(self.data()?.len() as u64)
    }

    async fn read_range(&self, offset: u64, len: u64) -> StorageResult<Bytes> {
        let data = self.data()?;
        let len = checked_range_len(offset, len, data.len() as u64)?;
        // checked_range_len bounds offset + len by the buffer length
        let start = offset as usize;
        Ok(data.slice(start..start + len))
    }

    async fn stream(&self) -> StorageResult<ByteStream> {
        let data = self.data()?.clone();
        Ok(Box::pin(futures::stream::once(async move { Ok(data) })))
    }

    async fn stream_range(&self, offset: u64, len: u64) -> StorageResult<ByteStream> {
        let data = self.data()?;
        let end = checked_range_end(offset, len, data.len() as u64)?;
        let slice = data.slice(offset as usize..end as usize);
        Ok(Box::pin(futures::stream::once(async move { Ok(slice) })))
    }
}
