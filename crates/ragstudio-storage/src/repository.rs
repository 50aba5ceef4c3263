use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;
use walkdir::WalkDir;

use ragstudio_core::layout;
use ragstudio_core::models::commit::RemoteCommit;

use crate::error::StorageError;

/// A named, versioned folder-of-files store.
///
/// Provides durability and a commit history. There is no locking: a
/// second writer to the same repository silently wins.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn exists(&self, repo: &str) -> Result<bool, StorageError>;

    /// Create the repository if it does not exist yet. Returns its id.
    async fn create(&self, repo: &str) -> Result<String, StorageError>;

    /// Upload every file under `local_dir` and record one commit.
    async fn upload_folder(
        &self,
        repo: &str,
        local_dir: &Path,
        message: &str,
    ) -> Result<RemoteCommit, StorageError>;

    /// Download one file into `local_dir`, keeping its relative path.
    async fn download_file(
        &self,
        repo: &str,
        filename: &str,
        local_dir: &Path,
    ) -> Result<PathBuf, StorageError>;

    /// Replace the contents of `local_dir` with the repository's files.
    /// Returns the number of files written.
    async fn download_folder(&self, repo: &str, local_dir: &Path) -> Result<usize, StorageError>;

    async fn list_files(&self, repo: &str) -> Result<Vec<String>, StorageError>;

    /// Commit history, newest first.
    async fn list_commits(&self, repo: &str) -> Result<Vec<RemoteCommit>, StorageError>;

    async fn last_commit(&self, repo: &str) -> Result<Option<RemoteCommit>, StorageError> {
        Ok(self.list_commits(repo).await?.into_iter().next())
    }
}

/// Repository names become key prefixes and directory names, so they are
/// restricted to `[A-Za-z0-9._-]` and may not be `.` or `..`.
pub fn validate_repo_name(repo: &str) -> Result<(), StorageError> {
    let valid_chars = repo
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if repo.is_empty() || repo == "." || repo == ".." || !valid_chars {
        return Err(StorageError::InvalidRepoName(repo.to_string()));
    }
    Ok(())
}

/// Reject filenames that would escape the download directory.
pub(crate) fn validate_filename(filename: &str) -> Result<(), StorageError> {
    let escapes = filename.starts_with('/')
        || filename.split('/').any(|part| part.is_empty() || part == "..");
    if escapes {
        return Err(StorageError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// Every regular file under `dir` as `(absolute path, repository filename)`,
/// sorted by filename.
pub(crate) fn folder_files(dir: &Path) -> Result<Vec<(PathBuf, String)>, StorageError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))?;
        files.push((entry.path().to_path_buf(), layout::relative_filename(relative)));
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

/// Empty `dir`, creating it if needed.
pub(crate) fn reset_dir(dir: &Path) -> Result<(), StorageError> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Write `body` to `local_dir/filename`, creating parent directories.
pub(crate) fn write_local(local_dir: &Path, filename: &str, body: &[u8]) -> Result<PathBuf, StorageError> {
    let path = local_dir.join(filename);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, body)?;
    Ok(path)
}

pub(crate) fn new_commit(message: &str) -> RemoteCommit {
    RemoteCommit {
        id: Uuid::new_v4().simple().to_string(),
        created_at: jiff::Timestamp::now(),
        message: message.to_string(),
    }
}
