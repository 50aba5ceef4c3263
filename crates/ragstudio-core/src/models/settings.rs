use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::prompts;

pub const DEFAULT_LLM_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-large-en-v1.5";
pub const DEFAULT_APP_NAME: &str = "RAG App";

/// The per-app settings document, `model_settings.json`.
///
/// Lives inside the storage root next to the index snapshot and is
/// checkpointed together with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_prompts: Option<ChatPrompts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_prompts: Option<QueryPrompts>,
}

/// Templates for the condense-plus-context chat engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPrompts {
    pub condense_prompt: String,
    pub context_prompt: String,
}

impl Default for ChatPrompts {
    fn default() -> Self {
        Self {
            condense_prompt: prompts::DEFAULT_CONDENSE_PROMPT.to_string(),
            context_prompt: prompts::DEFAULT_CONTEXT_PROMPT.to_string(),
        }
    }
}

/// Templates for the single-shot query engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPrompts {
    pub text_qa_template: String,
    pub refine_template: String,
}

impl Default for QueryPrompts {
    fn default() -> Self {
        Self {
            text_qa_template: prompts::DEFAULT_TEXT_QA_PROMPT.to_string(),
            refine_template: prompts::DEFAULT_REFINE_PROMPT.to_string(),
        }
    }
}

impl ModelSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            app_name: None,
            embedding_model: None,
            chat_prompts: None,
            query_prompts: None,
        }
    }

    pub fn app_name(&self) -> &str {
        self.app_name.as_deref().unwrap_or(DEFAULT_APP_NAME)
    }

    pub fn embedding_model(&self) -> &str {
        self.embedding_model
            .as_deref()
            .unwrap_or(DEFAULT_EMBEDDING_MODEL)
    }

    /// Chat templates, falling back to the defaults when unset.
    pub fn chat_prompts(&self) -> ChatPrompts {
        self.chat_prompts.clone().unwrap_or_default()
    }

    /// Query templates, falling back to the defaults when unset.
    pub fn query_prompts(&self) -> QueryPrompts {
        self.query_prompts.clone().unwrap_or_default()
    }
}

/// Read the settings document. A file that is not valid JSON is fatal.
pub fn read_settings(path: &Path) -> Result<ModelSettings, CoreError> {
    let contents = std::fs::read(path)?;
    serde_json::from_slice(&contents).map_err(|source| CoreError::MalformedSettings {
        path: path.to_path_buf(),
        source,
    })
}

/// Write the settings document (temp file then rename).
pub fn write_settings(path: &Path, settings: &ModelSettings) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(settings)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;

    tracing::debug!(path = %path.display(), model = %settings.model, "settings written");
    Ok(())
}
