//! The preferences repository.
//!
//! A small separate snapshot repository holding `preferences.json`, which
//! remembers the storage repo the studio last worked on.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use ragstudio_core::layout::{self, PREFERENCES_FILE};
use ragstudio_core::models::preferences::Preferences;
use ragstudio_storage::error::StorageError;
use ragstudio_storage::repository::SnapshotRepository;

use crate::error::StudioError;

pub struct PreferencesRepo {
    repository: Arc<dyn SnapshotRepository>,
    repo_id: String,
    local_dir: PathBuf,
}

impl PreferencesRepo {
    pub fn new(
        repository: Arc<dyn SnapshotRepository>,
        repo_id: impl Into<String>,
        local_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            repository,
            repo_id: repo_id.into(),
            local_dir: local_dir.into(),
        }
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    /// Make sure the preferences repo exists. A missing repo is created
    /// with empty preferences when `allow_create` is set and is fatal
    /// otherwise.
    pub async fn ensure_exists(&self, allow_create: bool) -> Result<(), StudioError> {
        if self.repository.exists(&self.repo_id).await? {
            return Ok(());
        }
        if !allow_create {
            return Err(StudioError::PreferencesRepoMissing(self.repo_id.clone()));
        }

        info!(repo = %self.repo_id, "creating preferences repo");
        self.repository.create(&self.repo_id).await?;
        self.write_local(&Preferences::default())?;
        self.repository
            .upload_folder(&self.repo_id, &self.local_dir, "initial preferences")
            .await?;
        Ok(())
    }

    /// Current preferences. A repo without a preferences file reads as
    /// empty preferences.
    pub async fn fetch(&self) -> Result<Preferences, StudioError> {
        let path = match self
            .repository
            .download_file(&self.repo_id, PREFERENCES_FILE, &self.local_dir)
            .await
        {
            Ok(path) => path,
            Err(StorageError::FileNotFound { .. }) => return Ok(Preferences::default()),
            Err(e) => return Err(e.into()),
        };
        let contents = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&contents)?)
    }

    /// Record `storage_repo` as the active one, keeping other keys.
    pub async fn mark_active(&self, storage_repo: &str) -> Result<(), StudioError> {
        let mut prefs = self.fetch().await?;
        if prefs.active_repo_id.as_deref() == Some(storage_repo) {
            return Ok(());
        }
        prefs.active_repo_id = Some(storage_repo.to_string());
        self.write_local(&prefs)?;
        self.repository
            .upload_folder(&self.repo_id, &self.local_dir, "set active repo")
            .await?;
        info!(active_repo_id = storage_repo, "active storage repo updated");
        Ok(())
    }

    fn write_local(&self, prefs: &Preferences) -> Result<(), StudioError> {
        std::fs::create_dir_all(&self.local_dir)?;
        let path = layout::preferences_path(&self.local_dir);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serde_json::to_vec(prefs)?)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ragstudio_storage::local::LocalSnapshotRepository;

    use super::*;

    fn prefs_repo(remote: &std::path::Path, local: &std::path::Path) -> PreferencesRepo {
        PreferencesRepo::new(
            Arc::new(LocalSnapshotRepository::new(remote)),
            "prefs",
            local,
        )
    }

    #[tokio::test]
    async fn missing_repo_is_fatal_without_permission() {
        let remote = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        let prefs = prefs_repo(remote.path(), local.path());

        assert!(matches!(
            prefs.ensure_exists(false).await,
            Err(StudioError::PreferencesRepoMissing(_))
        ));
    }

    #[tokio::test]
    async fn created_repo_starts_empty_then_tracks_active_repo() {
        let remote = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        let prefs = prefs_repo(remote.path(), local.path());

        prefs.ensure_exists(true).await.unwrap();
        prefs.ensure_exists(false).await.unwrap();
        assert_eq!(prefs.fetch().await.unwrap().active_repo_id, None);

        prefs.mark_active("rag-app-1").await.unwrap();
        assert_eq!(
            prefs.fetch().await.unwrap().active_repo_id.as_deref(),
            Some("rag-app-1")
        );
    }

    #[tokio::test]
    async fn unrelated_keys_are_preserved() {
        let remote = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        let repository = Arc::new(LocalSnapshotRepository::new(remote.path()));
        repository.create("prefs").await.unwrap();
        let seed = tempfile::tempdir().unwrap();
        std::fs::write(seed.path().join("preferences.json"), r#"{"theme":"dark"}"#).unwrap();
        repository.upload_folder("prefs", seed.path(), "seed").await.unwrap();

        let prefs = PreferencesRepo::new(repository, "prefs", local.path());
        prefs.mark_active("rag-app-2").await.unwrap();

        let stored = prefs.fetch().await.unwrap();
        assert_eq!(stored.active_repo_id.as_deref(), Some("rag-app-2"));
        assert_eq!(stored.extra["theme"], "dark");
    }
}
