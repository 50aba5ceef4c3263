//! Storage-root and remote-repository layout conventions.
//!
//! Pure path/string functions. These define where the index snapshot,
//! the settings document and the preferences document live locally, and
//! how repository files map onto remote object keys.

use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "model_settings.json";

pub const PREFERENCES_FILE: &str = "preferences.json";

pub const INDEX_DIR: &str = "index";

pub const DOCSTORE_FILE: &str = "docstore.json";

pub const VECTOR_STORE_FILE: &str = "vector_store.json";

pub const INDEX_STORE_FILE: &str = "index_store.json";

pub const DEFAULT_PREFS_REPO: &str = "rag-app-studio-preferences";

pub fn settings_path(storage_root: &Path) -> PathBuf {
    storage_root.join(SETTINGS_FILE)
}

pub fn index_dir(storage_root: &Path) -> PathBuf {
    storage_root.join(INDEX_DIR)
}

pub fn preferences_path(prefs_dir: &Path) -> PathBuf {
    prefs_dir.join(PREFERENCES_FILE)
}

pub fn repo_prefix(repo: &str) -> String {
    format!("repos/{repo}/")
}

pub fn repo_files_prefix(repo: &str) -> String {
    format!("repos/{repo}/files/")
}

pub fn repo_file(repo: &str, filename: &str) -> String {
    format!("repos/{repo}/files/{filename}")
}

pub fn repo_marker(repo: &str) -> String {
    format!("repos/{repo}/_meta/repo.json")
}

pub fn repo_commits(repo: &str) -> String {
    format!("repos/{repo}/_meta/commits.json")
}

/// Convert a path relative to an uploaded folder into a repository
/// filename (forward slashes on every platform).
pub fn relative_filename(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_file_keys_sit_under_files_prefix() {
        let key = repo_file("rag-app-1", "index/docstore.json");
        assert!(key.starts_with(&repo_files_prefix("rag-app-1")));
        assert_eq!(key, "repos/rag-app-1/files/index/docstore.json");
    }

    #[test]
    fn relative_filename_uses_forward_slashes() {
        let rel = Path::new("index").join("docstore.json");
        assert_eq!(relative_filename(&rel), "index/docstore.json");
    }

    #[test]
    fn settings_live_at_storage_root() {
        assert_eq!(
            settings_path(Path::new("/data/rag")),
            PathBuf::from("/data/rag/model_settings.json")
        );
    }
}
