//! Atomic file writes.
//!
//! Feature records and transcripts are rewritten while other tasks may be
//! reading them, so every write goes through a temp file in the target's
//! directory:
//! 1. Write content to `.{filename}.{uuid}.tmp`
//! 2. Sync the file to disk (fsync)
//! 3. Rename over the target
//!
//! The random suffix keeps two concurrent writers of the same file from
//! sharing a temp file. `rename` replaces an existing target on every
//! platform Rust's std supports, and is atomic on POSIX when source and
//! destination share a filesystem.

use crate::error::{DroverError, Result};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Atomically write bytes to a file, creating parent directories as needed.
pub async fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await.map_err(|e| {
            DroverError::UserError(format!(
                "failed to create parent directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = generate_temp_path(path)?;

    if let Err(e) = write_and_sync(&temp_path, content).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }

    fs::rename(&temp_path, path).await.map_err(|e| {
        DroverError::UserError(format!(
            "failed to atomically replace '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Atomically write a string to a file.
pub async fn atomic_write_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes()).await
}

fn generate_temp_path(target: &Path) -> Result<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            DroverError::UserError(format!("invalid file path '{}'", target.display()))
        })?;

    Ok(parent.join(format!(".{}.{}.tmp", filename, Uuid::new_v4().simple())))
}

async fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let io_err = |action: &str, e: std::io::Error| {
        DroverError::UserError(format!(
            "failed to {} temporary file '{}': {}",
            action,
            path.display(),
            e
        ))
    };

    let mut file = File::create(path).await.map_err(|e| io_err("create", e))?;
    file.write_all(content)
        .await
        .map_err(|e| io_err("write", e))?;
    file.sync_all().await.map_err(|e| io_err("sync", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_atomic_write_new_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("feature.json");

        atomic_write(&file_path, b"{\"id\":\"f-1\"}").await.unwrap();

        let content = std::fs::read_to_string(&file_path).unwrap();
        assert_eq!(content, "{\"id\":\"f-1\"}");
    }

    #[tokio::test]
    async fn test_atomic_write_replace_existing() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("agent-output.md");
        std::fs::write(&file_path, "original content").unwrap();

        atomic_write_file(&file_path, "new content").await.unwrap();

        assert_eq!(std::fs::read_to_string(&file_path).unwrap(), "new content");
    }

    #[tokio::test]
    async fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir
            .path()
            .join(".drover")
            .join("features")
            .join("f-1")
            .join("feature.json");

        atomic_write(&file_path, b"nested").await.unwrap();

        assert_eq!(std::fs::read_to_string(&file_path).unwrap(), "nested");
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test.txt");

        atomic_write(&file_path, b"content").await.unwrap();
        atomic_write(&file_path, b"content again").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["test.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_collide() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("shared.txt");

        let writes = (0..8).map(|i| {
            let path = file_path.clone();
            async move { atomic_write_file(&path, &format!("writer {}", i)).await }
        });
        for result in futures::future::join_all(writes).await {
            result.unwrap();
        }

        let content = std::fs::read_to_string(&file_path).unwrap();
        assert!(content.starts_with("writer "));
    }

    #[test]
    fn test_generate_temp_path() {
        let target = Path::new("/some/path/file.txt");
        let temp = generate_temp_path(target).unwrap();

        assert_eq!(temp.parent().unwrap(), Path::new("/some/path"));
        let name = temp.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".file.txt."));
        assert!(name.ends_with(".tmp"));
        assert_ne!(temp, generate_temp_path(target).unwrap());
    }
}
