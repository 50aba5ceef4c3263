use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use ragstudio_core::models::chat::{ChatMessage, ChatRecord, ChatRole, RecordKey};
use ragstudio_core::models::commit::RemoteCommit;
use ragstudio_core::models::sampling::SamplingParams;
use ragstudio_core::models::settings::{self, ChatPrompts, ModelSettings, QueryPrompts};
use ragstudio_core::threads::ConversationThreadStore;
use ragstudio_runtime::builder::ModelBuilder;
use ragstudio_runtime::lifecycle::ModelLifecycleManager;
use ragstudio_runtime::negotiate::NegotiationPolicy;
use ragstudio_runtime::resources::ResourceProbe;
use ragstudio_search::engine::Response;
use ragstudio_search::store::KnowledgeIndexStore;
use ragstudio_storage::repository::SnapshotRepository;

use crate::config::StudioConfig;
use crate::error::StudioError;
use crate::preferences::PreferencesRepo;

/// Whether the studio may change what it serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StudioRole {
    /// Builds the app: ingest, settings and model changes, checkpoints.
    Builder,
    /// Serves a committed app read-only.
    Inference,
}

/// Everything a dashboard needs in one value.
#[derive(Debug, Clone, Serialize)]
pub struct StudioSummary {
    pub model: String,
    pub app_name: String,
    pub repo_name: String,
    pub files: Vec<Option<String>>,
    pub embedding_model: String,
    pub last_checkpoint: Option<jiff::Timestamp>,
    pub chat_prompts: ChatPrompts,
    pub query_prompts: QueryPrompts,
}

/// Injected collaborators for [`Studio::boot`] and [`Studio::boot_inference`].
pub struct Collaborators {
    pub repository: Arc<dyn SnapshotRepository>,
    pub builder: Arc<dyn ModelBuilder>,
    pub probe: Arc<dyn ResourceProbe>,
    pub policy: NegotiationPolicy,
}

/// One RAG app: its storage repo, knowledge index, live models, settings
/// and conversation threads.
///
/// Index and settings live in the same storage root and are always
/// checkpointed together.
pub struct Studio {
    config: StudioConfig,
    role: StudioRole,
    repository: Arc<dyn SnapshotRepository>,
    prefs: PreferencesRepo,
    repo_id: String,
    settings: ModelSettings,
    models: ModelLifecycleManager,
    index: KnowledgeIndexStore,
    threads: ConversationThreadStore,
    started_at: jiff::Timestamp,
}

impl Studio {
    /// Start in the builder role.
    ///
    /// Picks the storage repo (fresh, from `RAG_REPO_ID`, or the active one
    /// in preferences), downloads it, reads its settings, builds the
    /// models and opens the index.
    pub async fn boot(config: StudioConfig, deps: Collaborators) -> Result<Self, StudioError> {
        let started_at = jiff::Timestamp::now();
        let prefs = PreferencesRepo::new(
            deps.repository.clone(),
            config.prefs_repo_id.clone(),
            config.prefs_repo_dir.clone(),
        );
        prefs.ensure_exists(true).await?;
        info!(prefs_repo = prefs.repo_id(), "preferences repo ready");

        let requested = requested_storage_repo(&config, &prefs).await?;
        let repo_id = match requested {
            Some(repo_id) => repo_id,
            None => create_storage_repo(&config, deps.repository.as_ref(), &prefs).await?,
        };

        Self::load(config, deps, prefs, repo_id, StudioRole::Builder, started_at).await
    }

    /// Start in the read-only inference role. The repo comes from
    /// `RAG_REPO_ID` or the preferences repo; either being absent is fatal.
    pub async fn boot_inference(config: StudioConfig, deps: Collaborators) -> Result<Self, StudioError> {
        let started_at = jiff::Timestamp::now();
        let prefs = PreferencesRepo::new(
            deps.repository.clone(),
            config.prefs_repo_id.clone(),
            config.prefs_repo_dir.clone(),
        );

        let repo_id = match &config.rag_repo_id {
            Some(repo_id) => repo_id.clone(),
            None => {
                prefs.ensure_exists(false).await?;
                prefs
                    .fetch()
                    .await?
                    .active_repo_id
                    .ok_or(StudioError::NoActiveRepo)?
            }
        };

        Self::load(config, deps, prefs, repo_id, StudioRole::Inference, started_at).await
    }

    async fn load(
        config: StudioConfig,
        deps: Collaborators,
        prefs: PreferencesRepo,
        repo_id: String,
        role: StudioRole,
        started_at: jiff::Timestamp,
    ) -> Result<Self, StudioError> {
        info!(repo = %repo_id, ?role, "fetching storage repo");
        deps.repository
            .download_folder(&repo_id, &config.rag_storage_path)
            .await?;
        let settings = settings::read_settings(&config.settings_path())?;
        info!(model = %settings.model, app_name = settings.app_name(), "loaded model settings");

        let mut models = ModelLifecycleManager::new(deps.builder, deps.probe, deps.policy);
        models
            .initialize(&settings.model, settings.embedding_model())
            .await?;

        std::fs::create_dir_all(&config.doc_storage_path)?;
        let index = KnowledgeIndexStore::open(&config.rag_storage_path, models.engine().embed_model()?)?;

        info!(repo = %repo_id, ?role, files = index.document_count(), "studio ready");
        Ok(Self {
            config,
            role,
            repository: deps.repository,
            prefs,
            repo_id,
            settings,
            models,
            index,
            threads: ConversationThreadStore::new(),
            started_at,
        })
    }

    pub fn role(&self) -> StudioRole {
        self.role
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn started_at(&self) -> jiff::Timestamp {
        self.started_at
    }

    pub fn current_settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn models(&self) -> &ModelLifecycleManager {
        &self.models
    }

    pub fn index(&self) -> &KnowledgeIndexStore {
        &self.index
    }

    // Threads.

    pub fn get_thread(&self, user_id: &str) -> Vec<ChatRecord> {
        self.threads.read(user_id)
    }

    pub fn record_turn(
        &mut self,
        user_id: &str,
        prior_messages: &[ChatMessage],
        question: ChatMessage,
        answer: ChatMessage,
    ) -> RecordKey {
        self.threads.update(user_id, prior_messages, question, answer)
    }

    pub fn compact_thread(&mut self, user_id: &str) {
        self.threads.compact(user_id);
    }

    // Documents.

    /// Add one file to the index. Not durable until [`Studio::checkpoint`].
    pub async fn ingest_document(&mut self, path: &Path) -> Result<usize, StudioError> {
        self.ensure_writable()?;
        Ok(self.index.ingest(path).await?)
    }

    /// Store an uploaded file in the document folder, ingest it and
    /// checkpoint.
    pub async fn upload_document(&mut self, file_name: &str, bytes: &[u8]) -> Result<RemoteCommit, StudioError> {
        self.ensure_writable()?;
        let invalid = file_name.trim().is_empty()
            || file_name.contains(['/', '\\'])
            || file_name == "."
            || file_name == "..";
        if invalid {
            return Err(StudioError::InvalidFileName(file_name.to_string()));
        }

        let path = self.config.doc_storage_path.join(file_name);
        info!(file_name, path = %path.display(), bytes = bytes.len(), "storing uploaded document");
        std::fs::create_dir_all(&self.config.doc_storage_path)?;
        std::fs::write(&path, bytes)?;

        self.index.ingest(&path).await?;
        self.checkpoint().await
    }

    pub fn list_files(&self) -> Vec<Option<String>> {
        self.index.list_documents()
    }

    /// Persist the settings and the index, upload them as one commit and
    /// mark the repo active in preferences.
    pub async fn checkpoint(&mut self) -> Result<RemoteCommit, StudioError> {
        self.ensure_writable()?;
        settings::write_settings(&self.config.settings_path(), &self.settings)?;
        let commit = self
            .index
            .checkpoint(self.repository.as_ref(), &self.repo_id, "checkpoint")
            .await?;
        self.prefs.mark_active(&self.repo_id).await?;
        Ok(commit)
    }

    /// Time of the newest commit in the storage repo.
    pub async fn last_checkpoint(&self) -> Result<Option<jiff::Timestamp>, StudioError> {
        Ok(self
            .repository
            .last_commit(&self.repo_id)
            .await?
            .map(|commit| commit.created_at))
    }

    // Models and settings.

    /// Swap the generation model and checkpoint the new setting. Returns
    /// the negotiated context length.
    pub async fn swap_model(&mut self, model_name: &str, clear_space: bool) -> Result<u32, StudioError> {
        self.ensure_writable()?;
        let negotiated = self.models.swap(model_name, clear_space).await?;

        self.settings.model = model_name.to_string();
        self.checkpoint().await?;
        info!(model_name, effective_max_len = negotiated.effective_max_len, "model swapped");
        Ok(negotiated.effective_max_len)
    }

    /// Swap the embedding model. Only allowed while the index is empty.
    pub async fn swap_embedding_model(&mut self, model_name: &str) -> Result<(), StudioError> {
        self.ensure_writable()?;
        if !self.index.is_empty() {
            warn!(model_name, "refusing embedding model change on a non-empty index");
            return Err(StudioError::EmbeddingModelLocked);
        }

        let embed = self.models.swap_embedding_model(model_name).await?;
        self.index.rebind_embedding_model(embed)?;
        self.settings.embedding_model = Some(model_name.to_string());
        self.checkpoint().await?;
        Ok(())
    }

    pub async fn update_app_name(&mut self, app_name: &str) -> Result<(), StudioError> {
        self.ensure_writable()?;
        self.settings.app_name = Some(app_name.to_string());
        self.checkpoint().await?;
        Ok(())
    }

    pub async fn update_chat_prompts(&mut self, prompts: ChatPrompts) -> Result<(), StudioError> {
        self.ensure_writable()?;
        self.settings.chat_prompts = Some(prompts);
        self.checkpoint().await?;
        Ok(())
    }

    pub async fn update_query_prompts(&mut self, prompts: QueryPrompts) -> Result<(), StudioError> {
        self.ensure_writable()?;
        self.settings.query_prompts = Some(prompts);
        self.checkpoint().await?;
        Ok(())
    }

    // Inference.

    /// Single-shot question over the index.
    pub async fn query(&self, prompt: &str, sampling: &SamplingParams) -> Result<Response, StudioError> {
        sampling.validate()?;
        let llm = self.models.engine().llm()?;
        let engine = self
            .index
            .query_engine(llm, self.settings.query_prompts())
            .with_sampling(sampling.clone());
        Ok(engine.query(prompt).await?)
    }

    /// Answer the last message of `messages`, which must come from the
    /// user, with the earlier messages as history.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingParams,
    ) -> Result<Response, StudioError> {
        sampling.validate()?;
        let (last, history) = split_chat(messages)?;
        let llm = self.models.engine().llm()?;
        let engine = self
            .index
            .chat_engine(llm, self.settings.chat_prompts())
            .with_sampling(sampling.clone());
        Ok(engine.chat(&last.content, history).await?)
    }

    /// [`Studio::chat`], then record the turn in the user's thread.
    pub async fn chat_as(
        &mut self,
        user_id: &str,
        messages: &[ChatMessage],
        sampling: &SamplingParams,
    ) -> Result<Response, StudioError> {
        let response = self.chat(messages, sampling).await?;
        let (last, history) = split_chat(messages)?;
        self.threads.update(
            user_id,
            history,
            last.clone(),
            ChatMessage::assistant(response.response.clone()),
        );
        Ok(response)
    }

    pub async fn summary(&self) -> Result<StudioSummary, StudioError> {
        Ok(StudioSummary {
            model: self.settings.model.clone(),
            app_name: self.settings.app_name().to_string(),
            repo_name: self.repo_id.clone(),
            files: self.list_files(),
            embedding_model: self.settings.embedding_model().to_string(),
            last_checkpoint: self.last_checkpoint().await?,
            chat_prompts: self.settings.chat_prompts(),
            query_prompts: self.settings.query_prompts(),
        })
    }

    fn ensure_writable(&self) -> Result<(), StudioError> {
        match self.role {
            StudioRole::Builder => Ok(()),
            StudioRole::Inference => Err(StudioError::ReadOnly),
        }
    }
}

/// `None` asks the caller to start a fresh storage repo.
async fn requested_storage_repo(
    config: &StudioConfig,
    prefs: &PreferencesRepo,
) -> Result<Option<String>, StudioError> {
    if config.create_new_rag_app {
        return Ok(None);
    }
    if let Some(repo_id) = &config.rag_repo_id {
        return Ok(Some(repo_id.clone()));
    }
    let preferences = prefs.fetch().await?;
    info!(active_repo_id = ?preferences.active_repo_id, "loaded preferences");
    Ok(preferences.active_repo_id)
}

/// Create a storage repo holding only default settings, and make it the
/// active one.
async fn create_storage_repo(
    config: &StudioConfig,
    repository: &dyn SnapshotRepository,
    prefs: &PreferencesRepo,
) -> Result<String, StudioError> {
    let repo_id = format!("rag-app-{}", &Uuid::new_v4().simple().to_string()[..8]);
    info!(repo = %repo_id, "no storage repo requested, creating one");
    repository.create(&repo_id).await?;

    let storage_root = &config.rag_storage_path;
    if storage_root.exists() {
        info!(path = %storage_root.display(), "clearing storage root");
        std::fs::remove_dir_all(storage_root)?;
    }
    std::fs::create_dir_all(storage_root)?;

    let mut defaults = ModelSettings::new(config.default_model.clone());
    if config.default_embedding_model != settings::DEFAULT_EMBEDDING_MODEL {
        defaults.embedding_model = Some(config.default_embedding_model.clone());
    }
    settings::write_settings(&config.settings_path(), &defaults)?;
    repository
        .upload_folder(&repo_id, storage_root, "initial model settings")
        .await?;
    prefs.mark_active(&repo_id).await?;
    Ok(repo_id)
}

fn split_chat(messages: &[ChatMessage]) -> Result<(&ChatMessage, &[ChatMessage]), StudioError> {
    let (last, history) = messages
        .split_last()
        .ok_or_else(|| StudioError::InvalidChat("no messages".to_string()))?;
    if last.role != ChatRole::User {
        return Err(StudioError::InvalidChat(format!(
            "last message must come from the user, not {}",
            last.role
        )));
    }
    Ok((last, history))
}
