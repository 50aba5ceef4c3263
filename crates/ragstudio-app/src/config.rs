use std::path::PathBuf;

use ragstudio_core::layout::{self, DEFAULT_PREFS_REPO};
use ragstudio_core::models::settings::{DEFAULT_EMBEDDING_MODEL, DEFAULT_LLM_MODEL};

use crate::error::StudioError;

const DEFAULT_MODELS_DOWNLOAD_FOLDER: &str = "/tmp/rag_store/models";
const DEFAULT_RAG_STORAGE_PATH: &str = "/tmp/rag_store/rag_storage";
const DEFAULT_DOC_STORAGE_PATH: &str = "/tmp/rag_store/doc_storage";
const DEFAULT_PREFS_REPO_DIR: &str = "/tmp/rag_store/prefs_repo";
const DEFAULT_LOCAL_REPO_ROOT: &str = "/tmp/rag_store/repos";
const DEFAULT_VLLM_BINARY: &str = "vllm";
const DEFAULT_VLLM_PORT: u16 = 8000;
const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";

/// Where snapshot repositories live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryBackend {
    S3 { bucket: String, region: Option<String> },
    Local { root: PathBuf },
}

/// Settings for serving models on local accelerators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRuntimeConfig {
    pub vllm_binary: PathBuf,
    /// Port of the local generation server.
    pub generation_port: u16,
    pub hub_endpoint: String,
    pub hub_token: Option<String>,
}

impl Default for LocalRuntimeConfig {
    fn default() -> Self {
        Self {
            vllm_binary: PathBuf::from(DEFAULT_VLLM_BINARY),
            generation_port: DEFAULT_VLLM_PORT,
            hub_endpoint: DEFAULT_HUB_ENDPOINT.to_string(),
            hub_token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioConfig {
    pub models_download_folder: PathBuf,
    pub rag_storage_path: PathBuf,
    pub doc_storage_path: PathBuf,
    pub prefs_repo_dir: PathBuf,
    /// Storage repo to load instead of the one in preferences.
    pub rag_repo_id: Option<String>,
    /// Start a fresh storage repo.
    pub create_new_rag_app: bool,
    pub prefs_repo_id: String,
    pub backend: RepositoryBackend,
    pub default_model: String,
    pub default_embedding_model: String,
    pub local_runtime: LocalRuntimeConfig,
}

impl StudioConfig {
    pub fn from_env() -> Result<Self, StudioError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from a key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StudioError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let path_or = |key: &str, default: &str| PathBuf::from(get(key).unwrap_or_else(|| default.to_string()));

        let rag_repo_id = get("RAG_REPO_ID");
        let create_new_rag_app = get("CREATE_NEW_RAG_APP").is_some();
        if create_new_rag_app && rag_repo_id.is_some() {
            return Err(StudioError::Config(
                "cannot set both RAG_REPO_ID and CREATE_NEW_RAG_APP; drop RAG_REPO_ID for a fresh app"
                    .to_string(),
            ));
        }

        let backend = match get("RAG_STUDIO_BACKEND").as_deref().unwrap_or("s3") {
            "s3" => RepositoryBackend::S3 {
                bucket: get("RAG_STUDIO_BUCKET").ok_or_else(|| {
                    StudioError::Config("RAG_STUDIO_BUCKET is required for the s3 backend".to_string())
                })?,
                region: get("AWS_REGION"),
            },
            "local" => RepositoryBackend::Local {
                root: path_or("RAG_LOCAL_REPO_ROOT", DEFAULT_LOCAL_REPO_ROOT),
            },
            other => {
                return Err(StudioError::Config(format!(
                    "unknown RAG_STUDIO_BACKEND {other:?} (expected s3 or local)"
                )));
            }
        };

        let generation_port = match get("VLLM_PORT") {
            Some(port) => port.trim().parse::<u16>().map_err(|e| {
                StudioError::Config(format!("VLLM_PORT {port:?} is not a port number: {e}"))
            })?,
            None => DEFAULT_VLLM_PORT,
        };
        let local_runtime = LocalRuntimeConfig {
            vllm_binary: path_or("VLLM_BINARY", DEFAULT_VLLM_BINARY),
            generation_port,
            hub_endpoint: get("HF_ENDPOINT").unwrap_or_else(|| DEFAULT_HUB_ENDPOINT.to_string()),
            hub_token: get("HF_TOKEN"),
        };

        Ok(Self {
            models_download_folder: path_or("MODELS_DOWNLOAD_FOLDER", DEFAULT_MODELS_DOWNLOAD_FOLDER),
            rag_storage_path: path_or("RAG_STORAGE_PATH", DEFAULT_RAG_STORAGE_PATH),
            doc_storage_path: path_or("DOC_STORAGE_PATH", DEFAULT_DOC_STORAGE_PATH),
            prefs_repo_dir: path_or("PREFS_REPO_DIR", DEFAULT_PREFS_REPO_DIR),
            rag_repo_id,
            create_new_rag_app,
            prefs_repo_id: get("RAG_PREFS_REPO_ID").unwrap_or_else(|| DEFAULT_PREFS_REPO.to_string()),
            backend,
            default_model: get("RAG_DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            default_embedding_model: get("RAG_DEFAULT_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            local_runtime,
        })
    }

    pub fn settings_path(&self) -> PathBuf {
        layout::settings_path(&self.rag_storage_path)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<StudioConfig, StudioError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StudioConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[("RAG_STUDIO_BUCKET", "studio-bucket")]).unwrap();
        assert_eq!(config.rag_storage_path, PathBuf::from("/tmp/rag_store/rag_storage"));
        assert_eq!(
            config.settings_path(),
            PathBuf::from("/tmp/rag_store/rag_storage/model_settings.json")
        );
        assert_eq!(config.prefs_repo_id, "rag-app-studio-preferences");
        assert_eq!(config.default_model, DEFAULT_LLM_MODEL);
        assert!(!config.create_new_rag_app);
        assert_eq!(config.local_runtime, LocalRuntimeConfig::default());
        assert_eq!(
            config.backend,
            RepositoryBackend::S3 {
                bucket: "studio-bucket".to_string(),
                region: None
            }
        );
    }

    #[test]
    fn s3_backend_needs_a_bucket() {
        assert!(matches!(config(&[]), Err(StudioError::Config(_))));
    }

    #[test]
    fn local_backend() {
        let config = config(&[
            ("RAG_STUDIO_BACKEND", "local"),
            ("RAG_LOCAL_REPO_ROOT", "/data/repos"),
            ("RAG_REPO_ID", "rag-app-1"),
        ])
        .unwrap();
        assert_eq!(
            config.backend,
            RepositoryBackend::Local {
                root: PathBuf::from("/data/repos")
            }
        );
        assert_eq!(config.rag_repo_id.as_deref(), Some("rag-app-1"));
    }

    #[test]
    fn create_new_conflicts_with_repo_id() {
        let err = config(&[
            ("RAG_STUDIO_BACKEND", "local"),
            ("RAG_REPO_ID", "rag-app-1"),
            ("CREATE_NEW_RAG_APP", "1"),
        ])
        .unwrap_err();
        assert!(matches!(err, StudioError::Config(_)));
    }

    #[test]
    fn empty_values_are_unset() {
        let config = config(&[
            ("RAG_STUDIO_BACKEND", "local"),
            ("RAG_REPO_ID", ""),
            ("CREATE_NEW_RAG_APP", ""),
        ])
        .unwrap();
        assert_eq!(config.rag_repo_id, None);
        assert!(!config.create_new_rag_app);
    }

    #[test]
    fn local_runtime_settings() {
        let runtime = config(&[
            ("RAG_STUDIO_BACKEND", "local"),
            ("VLLM_BINARY", "/opt/vllm/bin/vllm"),
            ("VLLM_PORT", "9100"),
            ("HF_TOKEN", "hf_secret"),
        ])
        .unwrap()
        .local_runtime;
        assert_eq!(runtime.vllm_binary, PathBuf::from("/opt/vllm/bin/vllm"));
        assert_eq!(runtime.generation_port, 9100);
        assert_eq!(runtime.hub_endpoint, "https://huggingface.co");
        assert_eq!(runtime.hub_token.as_deref(), Some("hf_secret"));

        for port in ["eighty", "70000", "-1"] {
            let result = config(&[("RAG_STUDIO_BACKEND", "local"), ("VLLM_PORT", port)]);
            assert!(matches!(result, Err(StudioError::Config(_))), "{port}");
        }
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(config(&[("RAG_STUDIO_BACKEND", "ftp")]).is_err());
    }
}
