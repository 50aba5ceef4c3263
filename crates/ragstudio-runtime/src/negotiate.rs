//! Resource negotiation.
//!
//! Reconciles a model profile against a resource snapshot before any
//! generation handle is built:
//!
//! 1. the architecture limit comes from the profile;
//! 2. precision is the native one unless the hardware cannot run it, in
//!    which case it falls back to float16;
//! 3. the memory limit is the number of KV-cache tokens that fit in the
//!    usable budget after weights and the activation reserve;
//! 4. the effective context length is the smaller of the two.
//!
//! Precision depends only on device capability, never on free memory, so
//! less free memory can never yield a longer context.

use serde::{Deserialize, Serialize};
use tracing::info;

use ragstudio_core::runtime::{ModelParams, Precision};

use crate::error::RuntimeError;
use crate::profile::ModelProfile;
use crate::resources::ResourceSnapshot;

const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NegotiationPolicy {
    /// Fraction of free accelerator memory the model may claim.
    pub memory_utilization: f64,
    /// Bytes held back for activations and runtime overhead.
    pub activation_reserve_bytes: u64,
    /// KV-cache allocation granularity, in tokens.
    pub block_size: u32,
    /// Shortest context window worth serving.
    pub min_context_len: u32,
}

impl Default for NegotiationPolicy {
    fn default() -> Self {
        Self {
            memory_utilization: 0.9,
            activation_reserve_bytes: GIB,
            block_size: 16,
            min_context_len: 512,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiatedConfig {
    pub precision: Precision,
    /// The native precision was unsupported and a fallback was chosen.
    pub precision_fallback: bool,
    pub max_len_by_architecture: u32,
    /// `None` when the model is not bound by local memory.
    pub max_len_by_memory: Option<u32>,
    pub effective_max_len: u32,
    pub tensor_parallel: u32,
}

impl NegotiatedConfig {
    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            precision: self.precision,
            max_context_len: self.effective_max_len,
            tensor_parallel: self.tensor_parallel,
        }
    }
}

pub fn negotiate(
    profile: &ModelProfile,
    resources: &ResourceSnapshot,
    policy: &NegotiationPolicy,
) -> Result<NegotiatedConfig, RuntimeError> {
    let max_len_by_architecture = profile.max_position_embeddings;

    let Some(footprint) = profile.footprint else {
        let config = NegotiatedConfig {
            precision: profile.native_precision,
            precision_fallback: false,
            max_len_by_architecture,
            max_len_by_memory: None,
            effective_max_len: max_len_by_architecture,
            tensor_parallel: 1,
        };
        info!(model = %profile.name, effective_max_len = config.effective_max_len, "hosted model, no memory negotiation");
        return Ok(config);
    };

    let (precision, precision_fallback) = choose_precision(profile.native_precision, resources);

    let budget_bytes = (resources.free_bytes() as f64 * policy.memory_utilization.clamp(0.0, 1.0)) as u64;
    let fixed_bytes = footprint
        .weight_bytes(precision)
        .saturating_add(policy.activation_reserve_bytes);
    let kv_budget = budget_bytes
        .checked_sub(fixed_bytes)
        .ok_or_else(|| RuntimeError::InsufficientMemory {
            model: profile.name.clone(),
            required_bytes: fixed_bytes,
            budget_bytes,
        })?;

    let per_token = footprint.kv_bytes_per_token(precision).max(1);
    let block = u64::from(policy.block_size.max(1));
    let tokens = (kv_budget / per_token) / block * block;
    let max_len_by_memory = u32::try_from(tokens).unwrap_or(u32::MAX);

    let effective_max_len = max_len_by_architecture.min(max_len_by_memory);
    if effective_max_len < policy.min_context_len {
        return Err(RuntimeError::ContextTooSmall {
            model: profile.name.clone(),
            max_len: effective_max_len,
            min_len: policy.min_context_len,
        });
    }

    let config = NegotiatedConfig {
        precision,
        precision_fallback,
        max_len_by_architecture,
        max_len_by_memory: Some(max_len_by_memory),
        effective_max_len,
        tensor_parallel: resources.device_count().max(1),
    };
    info!(
        model = %profile.name,
        %precision,
        precision_fallback,
        max_len_by_architecture,
        max_len_by_memory,
        effective_max_len,
        tensor_parallel = config.tensor_parallel,
        "negotiated model configuration"
    );
    Ok(config)
}

fn choose_precision(native: Precision, resources: &ResourceSnapshot) -> (Precision, bool) {
    if resources.supports(native) {
        (native, false)
    } else {
        (Precision::Float16, true)
    }
}
