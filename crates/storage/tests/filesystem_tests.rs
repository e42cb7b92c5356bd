// Workspace filesystem backend: path resolution, sizes and ranged reads.

mod common;

use buildstash_storage::{ArtifactSource, MAX_RANGE_SIZE, StorageError, WorkspaceFiles};
use bytes::Bytes;
use common::{seeded_bytes, write_artifact};
use futures::TryStreamExt;
use tempfile::TempDir;

#[tokio::test]
async fn test_open_reports_name_and_size() {
    let temp = TempDir::new().unwrap();
    let data = seeded_bytes(7, 4096);
    write_artifact(temp.path(), "build/outputs/app.bin", &data);

    let workspace = WorkspaceFiles::new(temp.path());
    let artifact = workspace.open("build/outputs/app.bin").await.unwrap();

    assert_eq!(artifact.name(), "app.bin");
    assert_eq!(artifact.backend_name(), "filesystem");
    assert!(artifact.exists().await.unwrap());
    assert_eq!(artifact.size().await.unwrap(), 4096);
}

#[tokio::test]
async fn test_read_range_matches_file_contents() {
    let temp = TempDir::new().unwrap();
    let data = seeded_bytes(11, 10_000);
    write_artifact(temp.path(), "app.bin", &data);

    let artifact = WorkspaceFiles::new(temp.path())
        .open("app.bin")
        .await
        .unwrap();

    let middle = artifact.read_range(3_000, 4_000).await.unwrap();
    assert_eq!(middle, data.slice(3_000..7_000));

    let tail = artifact.read_range(9_999, 1).await.unwrap();
    assert_eq!(tail, data.slice(9_999..));

    match artifact.read_range(9_000, 2_000).await {
        Err(StorageError::InvalidRange(_)) => {}
        other => panic!("expected InvalidRange, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_yields_whole_file() {
    let temp = TempDir::new().unwrap();
    // Larger than one streaming chunk
    let data = seeded_bytes(3, 200 * 1024);
    write_artifact(temp.path(), "app.bin", &data);

    let artifact = WorkspaceFiles::new(temp.path())
        .open("app.bin")
        .await
        .unwrap();
    let chunks: Vec<Bytes> = artifact.stream().await.unwrap().try_collect().await.unwrap();
    assert!(chunks.len() > 1);
    assert_eq!(chunks.concat(), data.to_vec());
}

#[tokio::test]
async fn test_stream_range_matches_file_contents() {
    let temp = TempDir::new().unwrap();
    let data = seeded_bytes(5, 200 * 1024);
    write_artifact(temp.path(), "app.bin", &data);

    let artifact = WorkspaceFiles::new(temp.path())
        .open("app.bin")
        .await
        .unwrap();
    let chunks: Vec<Bytes> = artifact
        .stream_range(1_000, 150_000)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(chunks.concat(), data.slice(1_000..151_000).to_vec());

    match artifact.stream_range(200 * 1024 - 10, 11).await {
        Err(StorageError::InvalidRange(_)) => {}
        Ok(_) => panic!("expected InvalidRange, got a stream"),
        Err(other) => panic!("expected InvalidRange, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_range_is_not_capped() {
    use std::io::{Seek, SeekFrom, Write};

    let temp = TempDir::new().unwrap();
    let size = MAX_RANGE_SIZE + 8;
    let path = temp.path().join("large.bin");
    // Sparse except for the last four bytes.
    let mut file = std::fs::File::create(&path).unwrap();
    file.set_len(size).unwrap();
    file.seek(SeekFrom::Start(size - 4)).unwrap();
    file.write_all(b"tail").unwrap();
    drop(file);

    let artifact = WorkspaceFiles::new(temp.path())
        .open("large.bin")
        .await
        .unwrap();
    assert!(matches!(
        artifact.read_range(0, size).await,
        Err(StorageError::InvalidRange(_))
    ));

    let mut whole = artifact.stream_range(0, size).await.unwrap();
    let first = whole.try_next().await.unwrap().unwrap();
    assert!(!first.is_empty());
    drop(whole);

    let tail: Vec<Bytes> = artifact
        .stream_range(size - 6, 6)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(tail.concat(), b"\0\0tail");
}

#[tokio::test]
async fn test_missing_file_is_not_an_open_error() {
    let temp = TempDir::new().unwrap();
    let artifact = WorkspaceFiles::new(temp.path())
        .open("missing.bin")
        .await
        .unwrap();

    assert!(!artifact.exists().await.unwrap());
    match artifact.size().await {
        Err(StorageError::NotFound(_)) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_directory_is_not_an_artifact() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("outputs")).unwrap();

    let artifact = WorkspaceFiles::new(temp.path())
        .open("outputs")
        .await
        .unwrap();
    assert!(!artifact.exists().await.unwrap());
}

#[tokio::test]
async fn test_rejects_parent_traversal() {
    let temp = TempDir::new().unwrap();
    let workspace = WorkspaceFiles::new(temp.path());

    for path in ["../secret", "build/../../secret", ""] {
        match workspace.open(path).await {
            Err(StorageError::InvalidPath(_)) => {}
            other => panic!("expected InvalidPath for {path:?}, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_absolute_paths_must_stay_inside_workspace() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    let inside = write_artifact(&root, "app.bin", b"data");

    let workspace = WorkspaceFiles::new(&root);
    let artifact = workspace.open(inside.to_str().unwrap()).await.unwrap();
    assert_eq!(artifact.size().await.unwrap(), 4);

    let outside = TempDir::new().unwrap();
    let elsewhere = write_artifact(outside.path(), "other.bin", b"x");
    assert!(matches!(
        workspace.open(elsewhere.to_str().unwrap()).await,
        Err(StorageError::InvalidPath(_))
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn test_rejects_symlink_escape() {
    let temp = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let target = write_artifact(outside.path(), "secret.bin", b"secret");
    std::os::unix::fs::symlink(&target, temp.path().join("link.bin")).unwrap();

    let workspace = WorkspaceFiles::new(temp.path());
    match workspace.open("link.bin").await {
        Err(StorageError::InvalidPath(_)) => {}
        other => panic!("expected InvalidPath, got {other:?}"),
    }
}
