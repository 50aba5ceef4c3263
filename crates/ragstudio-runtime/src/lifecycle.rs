//! Ownership of the live model handles.
//!
//! The manager holds exactly one generation handle and one embedding handle
//! inside an [`Engine`]. A swap releases the old generation handle, has the
//! builder reclaim its memory, and only then probes and negotiates, so the
//! probe sees what the new model can actually use.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use ragstudio_core::runtime::{EmbeddingModel, GenerationModel};

use crate::builder::ModelBuilder;
use crate::error::RuntimeError;
use crate::negotiate::{NegotiatedConfig, NegotiationPolicy, negotiate};
use crate::resources::ResourceProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Ready,
    Swapping,
    /// The last build failed; there is no generation handle. A new swap may
    /// be attempted.
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Ready => "ready",
            LifecycleState::Swapping => "swapping",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The live model handles. Query and chat engines borrow from here.
#[derive(Default)]
pub struct Engine {
    embed_model: Option<Arc<dyn EmbeddingModel>>,
    llm: Option<Box<dyn GenerationModel>>,
    llm_name: Option<String>,
    negotiated: Option<NegotiatedConfig>,
}

impl Engine {
    pub fn embed_model(&self) -> Result<Arc<dyn EmbeddingModel>, RuntimeError> {
        self.embed_model.clone().ok_or(RuntimeError::NoEmbeddingModel)
    }

    pub fn llm(&self) -> Result<&dyn GenerationModel, RuntimeError> {
        self.llm.as_deref().ok_or(RuntimeError::NoGenerationModel)
    }

    pub fn llm_name(&self) -> Option<&str> {
        self.llm_name.as_deref()
    }

    pub fn negotiated(&self) -> Option<&NegotiatedConfig> {
        self.negotiated.as_ref()
    }

    fn release_llm(&mut self) {
        self.llm = None;
        self.llm_name = None;
        self.negotiated = None;
    }
}

pub struct ModelLifecycleManager {
    builder: Arc<dyn ModelBuilder>,
    probe: Arc<dyn ResourceProbe>,
    policy: NegotiationPolicy,
    state: LifecycleState,
    engine: Engine,
}

impl ModelLifecycleManager {
    pub fn new(
        builder: Arc<dyn ModelBuilder>,
        probe: Arc<dyn ResourceProbe>,
        policy: NegotiationPolicy,
    ) -> Self {
        Self {
            builder,
            probe,
            policy,
            state: LifecycleState::Uninitialized,
            engine: Engine::default(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn builder(&self) -> &Arc<dyn ModelBuilder> {
        &self.builder
    }

    /// Build both handles from scratch.
    pub async fn initialize(
        &mut self,
        model_name: &str,
        embedding_model_name: &str,
    ) -> Result<NegotiatedConfig, RuntimeError> {
        if self.state != LifecycleState::Uninitialized {
            return Err(RuntimeError::AlreadyInitialized);
        }
        info!(model_name, embedding_model_name, "initializing models");

        let embed = match self.builder.make_embedding_model(embedding_model_name).await {
            Ok(embed) => embed,
            Err(e) => {
                self.state = LifecycleState::Failed;
                error!(embedding_model_name, error = %e, "embedding model construction failed");
                return Err(e);
            }
        };
        self.engine.embed_model = Some(embed);
        self.build_generation(model_name).await
    }

    /// Replace the generation model. Returns the negotiated configuration,
    /// whose `effective_max_len` is the context window now in force.
    ///
    /// On failure the manager is left in [`LifecycleState::Failed`] with no
    /// generation handle; the previous one has already been released.
    pub async fn swap(
        &mut self,
        model_name: &str,
        clear_space: bool,
    ) -> Result<NegotiatedConfig, RuntimeError> {
        match self.state {
            LifecycleState::Ready | LifecycleState::Failed => {}
            LifecycleState::Uninitialized | LifecycleState::Swapping => {
                return Err(RuntimeError::NotInitialized);
            }
        }
        info!(
            from = self.engine.llm_name().unwrap_or("none"),
            to = model_name,
            clear_space,
            "swapping generation model"
        );

        self.state = LifecycleState::Swapping;
        self.engine.release_llm();
        if clear_space {
            if let Err(e) = self.builder.cache().clear_generation_models() {
                self.state = LifecycleState::Failed;
                return Err(e);
            }
        }
        self.build_generation(model_name).await
    }

    /// Replace the embedding model. Callers must make sure nothing was
    /// embedded with the old one.
    ///
    /// The new handle is built before the old one is dropped, so a failed
    /// build leaves the current embedding model and the state untouched.
    pub async fn swap_embedding_model(
        &mut self,
        model_name: &str,
    ) -> Result<Arc<dyn EmbeddingModel>, RuntimeError> {
        match self.state {
            LifecycleState::Ready | LifecycleState::Failed => {}
            LifecycleState::Uninitialized | LifecycleState::Swapping => {
                return Err(RuntimeError::NotInitialized);
            }
        }
        info!(model_name, "swapping embedding model");

        let embed = match self.builder.make_embedding_model(model_name).await {
            Ok(embed) => embed,
            Err(e) => {
                error!(
                    model_name,
                    error = %e,
                    "embedding model construction failed, keeping the current one"
                );
                return Err(e);
            }
        };
        drop(self.engine.embed_model.replace(embed.clone()));
        if let Err(e) = self.builder.reclaim().await {
            warn!(error = %e, "reclaiming the previous embedding model failed");
        }
        Ok(embed)
    }

    async fn build_generation(&mut self, model_name: &str) -> Result<NegotiatedConfig, RuntimeError> {
        match self.negotiate_and_build(model_name).await {
            Ok((llm, config)) => {
                self.engine.llm = Some(llm);
                self.engine.llm_name = Some(model_name.to_string());
                self.engine.negotiated = Some(config);
                self.state = LifecycleState::Ready;
                info!(model_name, effective_max_len = config.effective_max_len, "generation model ready");
                Ok(config)
            }
            Err(e) => {
                self.engine.release_llm();
                self.state = LifecycleState::Failed;
                error!(model_name, error = %e, "generation model construction failed");
                Err(e)
            }
        }
    }

    async fn negotiate_and_build(
        &self,
        model_name: &str,
    ) -> Result<(Box<dyn GenerationModel>, NegotiatedConfig), RuntimeError> {
        self.builder.reclaim().await?;
        let resources = self.probe.probe().await?;
        let profile = self.builder.describe(model_name).await?;
        let config = negotiate(&profile, &resources, &self.policy)?;
        let llm = self.builder.make_generation_model(model_name, &config).await?;
        Ok((llm, config))
    }
}
