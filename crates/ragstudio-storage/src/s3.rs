use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_sdk_s3::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use ragstudio_core::layout;
use ragstudio_core::models::commit::RemoteCommit;

use crate::error::StorageError;
use crate::objects;
use crate::repository::{
    self, SnapshotRepository, folder_files, reset_dir, validate_filename, validate_repo_name,
    write_local,
};
use crate::state;

/// Marker object written when a repository is created.
#[derive(Debug, Serialize, Deserialize)]
struct RepoMarker {
    name: String,
    created_at: jiff::Timestamp,
}

/// Snapshot repositories stored in one S3 bucket.
///
/// Files live under `repos/<name>/files/`; the commit log is a JSON array
/// (oldest first) at `repos/<name>/_meta/commits.json`.
#[derive(Clone)]
pub struct S3SnapshotRepository {
    client: Client,
    bucket: String,
}

impl S3SnapshotRepository {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
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
impl SnapshotRepository for S3SnapshotRepository {
    async fn exists(&self, repo: &str) -> Result<bool, StorageError> {
        validate_repo_name(repo)?;
        objects::object_exists(&self.client, &self.bucket, &layout::repo_marker(repo)).await
    }

    async fn create(&self, repo: &str) -> Result<String, StorageError> {
        if self.exists(repo).await? {
            return Ok(repo.to_string());
        }
        let marker = RepoMarker {
            name: repo.to_string(),
            created_at: jiff::Timestamp::now(),
        };
        state::save_state(&self.client, &self.bucket, &layout::repo_marker(repo), &marker).await?;

        info!(bucket = %self.bucket, repo, "created repository");
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
        for (path, filename) in &files {
            let body = std::fs::read(path)?;
            objects::put_object(
                &self.client,
                &self.bucket,
                &layout::repo_file(repo, filename),
                body,
                None,
            )
            .await?;
        }

        // The commit is only recorded once every file is in place.
        let commits_key = layout::repo_commits(repo);
        let mut log: Vec<RemoteCommit> =
            state::load_state_or_default(&self.client, &self.bucket, &commits_key).await?;
        let commit = repository::new_commit(message);
        log.push(commit.clone());
        state::save_state(&self.client, &self.bucket, &commits_key, &log).await?;

        info!(
            bucket = %self.bucket,
            repo,
            files = files.len(),
            commit = %commit.id,
            "uploaded folder"
        );
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

        let body = objects::get_object(&self.client, &self.bucket, &layout::repo_file(repo, filename))
            .await
            .map_err(|e| match e {
                StorageError::NotFound { .. } => StorageError::FileNotFound {
                    repo: repo.to_string(),
                    filename: filename.to_string(),
                },
                other => other,
            })?;

        write_local(local_dir, filename, &body)
    }

    async fn download_folder(&self, repo: &str, local_dir: &Path) -> Result<usize, StorageError> {
        self.require(repo).await?;

        let files = self.list_files(repo).await?;
        reset_dir(local_dir)?;
        for filename in &files {
            self.download_file(repo, filename, local_dir).await?;
        }

        info!(bucket = %self.bucket, repo, files = files.len(), dest = %local_dir.display(), "downloaded folder");
        Ok(files.len())
    }

    async fn list_files(&self, repo: &str) -> Result<Vec<String>, StorageError> {
        validate_repo_name(repo)?;
        let prefix = layout::repo_files_prefix(repo);
        let keys = objects::list_objects(&self.client, &self.bucket, &prefix).await?;
        Ok(file_names_under(&prefix, keys))
    }

    async fn list_commits(&self, repo: &str) -> Result<Vec<RemoteCommit>, StorageError> {
        validate_repo_name(repo)?;
        let mut log: Vec<RemoteCommit> =
            state::load_state_or_default(&self.client, &self.bucket, &layout::repo_commits(repo))
                .await?;
        log.reverse();
        Ok(log)
    }
}

/// File names relative to `prefix`, sorted. The prefix marker itself and
/// folder markers ending in `/` are not files.
fn file_names_under(prefix: &str, keys: Vec<String>) -> Vec<String> {
    let mut files: Vec<String> = keys
        .into_iter()
        .filter_map(|key| key.strip_prefix(prefix).map(str::to_string))
        .filter(|name| !name.is_empty() && !name.ends_with('/'))
        .collect();
    files.sort();
    files
}
