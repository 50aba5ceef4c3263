//! Known Bedrock models.
//!
//! Hugging Face names of models that Bedrock also hosts are accepted as
//! aliases, so settings written for a self-hosted runtime keep working.

use ragstudio_runtime::profile::ModelProfile;

use crate::error::BedrockError;

const ALIASES: &[(&str, &str)] = &[
    ("mistralai/Mistral-7B-Instruct-v0.1", "mistral.mistral-7b-instruct-v0:2"),
    ("mistralai/Mistral-7B-Instruct-v0.2", "mistral.mistral-7b-instruct-v0:2"),
    ("mistralai/Mixtral-8x7B-Instruct-v0.1", "mistral.mixtral-8x7b-instruct-v0:1"),
    ("meta-llama/Meta-Llama-3-8B-Instruct", "meta.llama3-8b-instruct-v1:0"),
    ("meta-llama/Meta-Llama-3-70B-Instruct", "meta.llama3-70b-instruct-v1:0"),
    ("BAAI/bge-large-en-v1.5", "amazon.titan-embed-text-v2:0"),
    ("BAAI/bge-small-en-v1.5", "amazon.titan-embed-text-v2:0"),
];

/// Map a configured model name onto a Bedrock model id.
pub fn resolve_model_id(name: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map_or(name, |(_, id)| *id)
}

/// Context window of a Bedrock generation model, in tokens.
pub fn context_window(model_id: &str) -> Option<u32> {
    let window = match model_id {
        id if id.contains("anthropic.claude") => 200_000,
        id if id.contains("amazon.nova") => 300_000,
        id if id.contains("mistral-7b") || id.contains("mixtral-8x7b") => 32_000,
        id if id.contains("mistral.mistral-large") => 128_000,
        id if id.contains("meta.llama3-8b") || id.contains("meta.llama3-70b") => 8_192,
        id if id.contains("meta.llama3") => 128_000,
        _ => return None,
    };
    Some(window)
}

/// Output dimensionality of a Bedrock embedding model.
pub fn embedding_dims(model_id: &str) -> Option<usize> {
    match model_id {
        "amazon.titan-embed-text-v2:0" => Some(1024),
        "amazon.titan-embed-text-v1" => Some(1536),
        "amazon.titan-embed-g1-text-02" => Some(1536),
        _ => None,
    }
}

pub fn describe(name: &str) -> Result<ModelProfile, BedrockError> {
    let model_id = resolve_model_id(name);
    let window =
        context_window(model_id).ok_or_else(|| BedrockError::UnsupportedModel(name.to_string()))?;
    Ok(ModelProfile::hosted(model_id, window))
}
