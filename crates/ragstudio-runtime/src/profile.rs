use serde::{Deserialize, Serialize};

use ragstudio_core::runtime::Precision;

use crate::error::RuntimeError;

/// Memory geometry of a locally hosted generation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryFootprint {
    pub parameter_count: u64,
    pub num_layers: u32,
    pub num_kv_heads: u32,
    pub head_dim: u32,
}

impl MemoryFootprint {
    pub fn weight_bytes(&self, precision: Precision) -> u64 {
        self.parameter_count.saturating_mul(precision.bytes())
    }

    /// Key and value cache bytes for one token across all layers.
    pub fn kv_bytes_per_token(&self, precision: Precision) -> u64 {
        [
            u64::from(self.num_layers),
            u64::from(self.num_kv_heads),
            u64::from(self.head_dim),
            precision.bytes(),
        ]
        .into_iter()
        .fold(2, u64::saturating_mul)
    }
}

/// What negotiation needs to know about a model before building it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub name: String,
    /// Context length the architecture itself declares.
    pub max_position_embeddings: u32,
    pub native_precision: Precision,
    /// `None` for hosted models, which use no local accelerator memory.
    pub footprint: Option<MemoryFootprint>,
}

impl ModelProfile {
    pub fn hosted(name: impl Into<String>, max_context_len: u32) -> Self {
        Self {
            name: name.into(),
            max_position_embeddings: max_context_len,
            native_precision: Precision::BFloat16,
            footprint: None,
        }
    }

    /// Build a profile from a Hugging Face style `config.json`.
    pub fn from_hf_config(name: &str, config_json: &str) -> Result<Self, RuntimeError> {
        let config: HfConfig = serde_json::from_str(config_json)?;
        let invalid = |reason: &str| RuntimeError::InvalidProfile {
            model: name.to_string(),
            reason: reason.to_string(),
        };

        let max_position_embeddings = config
            .max_position_embeddings
            .ok_or_else(|| invalid("missing max_position_embeddings"))?;
        let native_precision = match config.torch_dtype.as_deref() {
            Some(dtype) => Precision::from_dtype_name(dtype)
                .ok_or_else(|| invalid(&format!("unsupported torch_dtype {dtype}")))?,
            None => Precision::Float32,
        };

        if config.num_attention_heads == 0 || config.hidden_size == 0 {
            return Err(invalid("hidden_size and num_attention_heads must be non-zero"));
        }
        let heads = u64::from(config.num_attention_heads);
        let kv_heads = config.num_key_value_heads.unwrap_or(config.num_attention_heads);
        let hidden = config.hidden_size;
        let head_dim = match config.head_dim {
            Some(dim) => dim,
            None => u32::try_from(hidden / heads)
                .map_err(|_| invalid("head dimension does not fit in 32 bits"))?,
        };
        let intermediate = match config.intermediate_size {
            Some(size) => size,
            None => hidden.checked_mul(4).ok_or_else(|| invalid("intermediate_size overflows"))?,
        };

        let parameter_count = parameter_count(
            &config,
            u64::from(kv_heads),
            u64::from(head_dim),
            intermediate,
        )
        .ok_or_else(|| invalid("parameter count overflows"))?;
        let footprint = MemoryFootprint {
            parameter_count,
            num_layers: config.num_hidden_layers,
            num_kv_heads: kv_heads,
            head_dim,
        };
        Ok(Self {
            name: name.to_string(),
            max_position_embeddings,
            native_precision,
            footprint: Some(footprint),
        })
    }
}

fn parameter_count(
    config: &HfConfig,
    kv_heads: u64,
    head_dim: u64,
    intermediate: u64,
) -> Option<u64> {
    let hidden = config.hidden_size;
    let heads = u64::from(config.num_attention_heads);
    let query_out = hidden.checked_mul(heads)?.checked_mul(head_dim)?.checked_mul(2)?;
    let kv_out = hidden.checked_mul(kv_heads)?.checked_mul(head_dim)?.checked_mul(2)?;
    let attention = query_out.checked_add(kv_out)?;
    let mlp = hidden.checked_mul(intermediate)?.checked_mul(3)?;
    let per_layer = attention.checked_add(mlp)?;
    let embeddings = config.vocab_size.checked_mul(hidden)?;
    let lm_head = if config.tie_word_embeddings { 0 } else { embeddings };
    u64::from(config.num_hidden_layers)
        .checked_mul(per_layer)?
        .checked_add(embeddings)?
        .checked_add(lm_head)
}

#[derive(Debug, Deserialize)]
struct HfConfig {
    max_position_embeddings: Option<u32>,
    torch_dtype: Option<String>,
    hidden_size: u64,
    num_hidden_layers: u32,
    num_attention_heads: u32,
    num_key_value_heads: Option<u32>,
    head_dim: Option<u32>,
    intermediate_size: Option<u64>,
    vocab_size: u64,
    #[serde(default)]
    tie_word_embeddings: bool,
}
