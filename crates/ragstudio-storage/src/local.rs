use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use ragstudio_core::layout;
use ragstudio_core::models::commit::RemoteCommit;

use crate::error::StorageError;
use crate::repository::{
    self, SnapshotRepository, folder_files, reset_dir, validate_filename, validate_repo_name,
    write_local,
};

/// Snapshot repositories kept on the local filesystem, using the same key
/// layout as the S3 repository with `root` standing in for the bucket.
#[derive(Debug, Clone)]
pub struct LocalSnapshotRepository {
    root: PathBuf,
}

impl LocalSnapshotRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn files_dir(&self, repo: &str) -> PathBuf {
        self.root.join(layout::repo_files_prefix(repo))
    }

    fn commits_path(&self, repo: &str) -> PathBuf {
        self.root.join(layout::repo_commits(repo))
    }

    fn read_log(&self, repo: &str) -> Result<Vec<RemoteCommit>, StorageError> {
        let path = self.commits_path(repo);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let body = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn write_log(&self, repo: &str, log: &[RemoteCommit]) -> Result<(), StorageError> {
        let path = self.commits_path(repo);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serde_json::to_vec_pretty(log)?)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    async fn require(&self, repo: &str) -> Result<(), StorageError> {
        if self.exists(repo).await? {
            Ok(())
        } else {
            Err(StorageError::RepoNotFound {
                repo: repo.to_string(),
            })
        }
    }
}

#[async_trait]
impl SnapshotRepository for LocalSnapshotRepository {
    async fn exists(&self, repo: &str) -> Result<bool, StorageError> {
        validate_repo_name(repo)?;
        Ok(self.root.join(layout::repo_marker(repo)).exists())
    }

    async fn create(&self, repo: &str) -> Result<String, StorageError> {
        if self.exists(repo).await? {
            return Ok(repo.to_string());
        }
        let marker = self.root.join(layout::repo_marker(repo));
        if let Some(parent) = marker.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(self.files_dir(repo))?;
        let body = serde_json::json!({
            "name": repo,
            "created_at": jiff::Timestamp::now(),
        });
        std::fs::write(&marker, serde_json::to_vec_pretty(&body)?)?;

        info!(root = %self.root.display(), repo, "created repository");
        Ok(repo.to_string())
    }

    async fn upload_folder(
        &self,
        repo: &str,
        local_dir: &Path,
        message: &str,
    ) -> Result<RemoteCommit, StorageError> {
        self.require(repo).await?;

        let files = folder_files(local_dir)?;
        let dest = self.files_dir(repo);
        for (path, filename) in &files {
            let body = std::fs::read(path)?;
            write_local(&dest, filename, &body)?;
        }

        let mut log = self.read_log(repo)?;
        let commit = repository::new_commit(message);
        log.push(commit.clone());
        self.write_log(repo, &log)?;

        info!(repo, files = files.len(), commit = %commit.id, "uploaded folder");
        Ok(commit)
    }

    async fn download_file(
        &self,
        repo: &str,
        filename: &str,
        local_dir: &Path,
    ) -> Result<PathBuf, StorageError> {
        validate_repo_name(repo)?;
        validate_filename(filename)?;

        let source = self.files_dir(repo).join(filename);
        if !source.is_file() {
            return Err(StorageError::FileNotFound {
                repo: repo.to_string(),
                filename: filename.to_string(),
            });
        }
        let body = std::fs::read(&source)?;
        debug!(repo, filename, "downloading file");
        write_local(local_dir, filename, &body)
    }

    async fn download_folder(&self, repo: &str, local_dir: &Path) -> Result<usize, StorageError> {
        self.require(repo).await?;

        let files = self.list_files(repo).await?;
        reset_dir(local_dir)?;
        for filename in &files {
            self.download_file(repo, filename, local_dir).await?;
        }

        info!(repo, files = files.len(), dest = %local_dir.display(), "downloaded folder");
        Ok(files.len())
    }

    async fn list_files(&self, repo: &str) -> Result<Vec<String>, StorageError> {
        validate_repo_name(repo)?;
        let dir = self.files_dir(repo);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        Ok(folder_files(&dir)?.into_iter().map(|(_, name)| name).collect())
    }

    async fn list_commits(&self, repo: &str) -> Result<Vec<RemoteCommit>, StorageError> {
        validate_repo_name(repo)?;
        let mut log = self.read_log(repo)?;
        log.reverse();
        Ok(log)
    }
}
