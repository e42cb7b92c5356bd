//! Workspace filesystem backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ArtifactSource, ByteStream, checked_range_end, checked_range_len};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::instrument;

/// Default chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// A build workspace. Artifact paths are resolved relative to its root and
/// may not escape it.
#[derive(Clone, Debug)]
pub struct WorkspaceFiles {
    root: PathBuf,
}

impl WorkspaceFiles {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open an artifact by workspace-relative path.
    ///
    /// The file does not have to exist yet; [`ArtifactSource::exists`]
    /// reports that.
    pub async fn open(&self, path: &str) -> StorageResult<FileArtifact> {
        let root = self.root.clone();
        let relative = path.to_string();
        let resolved = tokio::task::spawn_blocking(move || resolve_sync(&root, &relative))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })??;
        FileArtifact::from_path(resolved)
    }
}

/// Resolve `path` under `root`, rejecting anything that would escape it,
/// including through symlinks.
fn resolve_sync(root: &Path, path: &str) -> StorageResult<PathBuf> {
    if path.trim().is_empty() {
        return Err(StorageError::InvalidPath("path is empty".to_string()));
    }

    let requested = Path::new(path);
    let relative = if requested.is_absolute() {
        requested.strip_prefix(root).map_err(|_| {
            StorageError::InvalidPath(format!("{path} is outside the workspace"))
        })?
    } else {
        requested
    };

    for component in relative.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(StorageError::InvalidPath(format!(
                    "contains unsafe path component: {path}"
                )));
            }
        }
    }

    let full = root.join(relative);
    let root_canonical = root.canonicalize().map_err(|e| {
        StorageError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to canonicalize workspace root: {e}"),
        ))
    })?;

    // Missing files resolve lexically; the existence check reports them.
    match full.canonicalize() {
        Ok(canonical) if !canonical.starts_with(&root_canonical) => Err(
            StorageError::InvalidPath(format!("resolved path escapes the workspace: {path}")),
        ),
        Ok(_) => Ok(full),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(full),
        Err(err) => Err(StorageError::Io(std::io::Error::new(
            err.kind(),
            format!("failed to resolve {path}: {err}"),
        ))),
    }
}

/// An artifact on the local filesystem.
#[derive(Clone, Debug)]
pub struct FileArtifact {
    name: String,
    path: PathBuf,
}

impl FileArtifact {
    /// Wrap an arbitrary path. No workspace containment check is applied.
    pub fn from_path(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                StorageError::InvalidPath(format!("{} has no file name", path.display()))
            })?
            .to_string();
        Ok(Self { name, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open_file(&self) -> StorageResult<fs::File> {
        fs::File::open(&self.path)
            .await
            .map_err(|e| self.map_not_found(e))
    }

    fn map_not_found(&self, e: std::io::Error) -> StorageError {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(self.path.display().to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

#[async_trait]
impl ArtifactSource for FileArtifact {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem", path = %self.path.display()))]
    async fn exists(&self) -> StorageResult<bool> {
        match fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem", path = %self.path.display()))]
    async fn size(&self) -> StorageResult<u64> {
        let meta = fs::metadata(&self.path)
            .await
            .map_err(|e| self.map_not_found(e))?;
        if !meta.is_file() {
            return Err(StorageError::InvalidPath(format!(
                "{} is not a regular file",
                self.path.display()
            )));
        }
        Ok(meta.len())
    }

    #[instrument(skip(self), fields(backend = "filesystem", path = %self.path.display()))]
    async fn read_range(&self, offset: u64, len: u64) -> StorageResult<Bytes> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        let size = self.size().await?;
        let len = checked_range_len(offset, len, size)?;

        let mut file = self.open_file().await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).await?;

        Ok(Bytes::from(buf))
    }

    #[instrument(skip(self), fields(backend = "filesystem", path = %self.path.display()))]
    async fn stream(&self) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let file = self.open_file().await?;

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self), fields(backend = "filesystem", path = %self.path.display()))]
    async fn stream_range(&self, offset: u64, len: u64) -> StorageResult<ByteStream> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        let size = self.size().await?;
        checked_range_end(offset, len, size)?;

        let mut file = self.open_file().await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;

        let stream = async_stream::try_stream! {
            let mut reader = file.take(len);
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            let mut sent = 0u64;
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                sent += n as u64;
                yield Bytes::copy_from_slice(&buf[..n]);
            }
            if sent < len {
                Err::<(), _>(StorageError::InvalidRange(format!(
                    "artifact shrank: read {sent} of {len} bytes at offset {offset}"
                )))?;
            }
        };

        Ok(Box::pin(stream))
    }
}
