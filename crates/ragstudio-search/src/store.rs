use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ragstudio_core::layout::{self, INDEX_STORE_FILE};
use ragstudio_core::models::commit::RemoteCommit;
use ragstudio_core::models::node::{Node, ScoredNode};
use ragstudio_core::models::settings::{ChatPrompts, QueryPrompts};
use ragstudio_core::runtime::{EmbeddingModel, GenerationModel};
use ragstudio_storage::repository::SnapshotRepository;

use crate::chunk::{NodeParser, ParagraphSplitter};
use crate::docstore::DocStore;
use crate::engine::{ChatEngine, DEFAULT_SIMILARITY_TOP_K, QueryEngine};
use crate::error::SearchError;
use crate::loader;
use crate::vectors::{FlatVectorIndex, VectorIndex, ensure_finite};

const INDEX_STORE_VERSION: u32 = 1;

/// Index-level metadata, `index_store.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStoreMeta {
    pub version: u32,
    pub embedding_model: String,
    pub dims: usize,
    pub document_count: usize,
    pub node_count: usize,
}

/// The knowledge index behind one app's storage root.
///
/// Owns the docstore and vector index, borrows nothing. Snapshot files
/// live under `<storage_root>/index/`.
pub struct KnowledgeIndexStore<V = FlatVectorIndex> {
    storage_root: PathBuf,
    docstore: DocStore,
    vectors: V,
    embed_model: Arc<dyn EmbeddingModel>,
    parser: Box<dyn NodeParser>,
    unsaved: bool,
    last_checkpoint: Option<RemoteCommit>,
}

impl KnowledgeIndexStore<FlatVectorIndex> {
    /// Open the index under `storage_root`, loading a snapshot when one
    /// exists and starting empty otherwise.
    pub fn open(
        storage_root: impl Into<PathBuf>,
        embed_model: Arc<dyn EmbeddingModel>,
    ) -> Result<Self, SearchError> {
        Self::open_with(storage_root, embed_model, Box::new(ParagraphSplitter::default()))
    }
}

impl<V: VectorIndex> KnowledgeIndexStore<V> {
    pub fn open_with(
        storage_root: impl Into<PathBuf>,
        embed_model: Arc<dyn EmbeddingModel>,
        parser: Box<dyn NodeParser>,
    ) -> Result<Self, SearchError> {
        let storage_root = storage_root.into();
        if storage_root.as_os_str().is_empty() {
            return Err(SearchError::EmptyStorageRoot);
        }
        std::fs::create_dir_all(&storage_root)?;

        let index_dir = layout::index_dir(&storage_root);
        let (docstore, vectors) = match DocStore::load(&index_dir)? {
            Some(docstore) => {
                let vectors = V::load(&index_dir)?.ok_or_else(|| {
                    SearchError::IndexCorrupted("docstore present without vector store".to_string())
                })?;
                if vectors.len() != docstore.node_count() {
                    return Err(SearchError::IndexCorrupted(format!(
                        "{} nodes but {} vectors",
                        docstore.node_count(),
                        vectors.len()
                    )));
                }
                check_embedding_model(&index_dir, embed_model.as_ref())?;
                info!(
                    storage_root = %storage_root.display(),
                    documents = docstore.document_count(),
                    nodes = docstore.node_count(),
                    "loaded index snapshot"
                );
                (docstore, vectors)
            }
            None => {
                info!(storage_root = %storage_root.display(), "no index snapshot, starting empty");
                (DocStore::default(), V::default())
            }
        };

        Ok(Self {
            storage_root,
            docstore,
            vectors,
            embed_model,
            parser,
            unsaved: false,
            last_checkpoint: None,
        })
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn embed_model(&self) -> &Arc<dyn EmbeddingModel> {
        &self.embed_model
    }

    /// Load, split, embed and insert one file. Returns the number of nodes
    /// added. Nothing is inserted if embedding fails or yields a non-finite
    /// vector.
    pub async fn ingest(&mut self, path: &Path) -> Result<usize, SearchError> {
        let document = loader::load_document(path)?;
        let nodes = self.parser.parse(&document);

        let texts: Vec<String> = nodes.iter().map(|n| n.text.clone()).collect();
        let embeddings = self.embed_model.embed(&texts).await?;
        if embeddings.len() != nodes.len() {
            return Err(SearchError::EmbeddingCountMismatch {
                expected: nodes.len(),
                actual: embeddings.len(),
            });
        }

        for (node, embedding) in nodes.iter().zip(&embeddings) {
            ensure_finite(node.id, embedding)?;
        }

        self.docstore.add(&document, &nodes);
        for (node, embedding) in nodes.iter().zip(embeddings) {
            self.vectors.insert(node.id, embedding)?;
        }
        self.unsaved = true;

        info!(
            file = ?document.metadata.file_name,
            doc_id = %document.id,
            nodes = nodes.len(),
            "document ingested"
        );
        Ok(nodes.len())
    }

    /// Source file name of every ingested document, in ingestion order.
    /// Documents ingested without a file name yield `None`.
    pub fn list_documents(&self) -> Vec<Option<String>> {
        self.docstore
            .documents()
            .map(|(_, info)| info.metadata.file_name.clone())
            .collect()
    }

    pub fn document_count(&self) -> usize {
        self.docstore.document_count()
    }

    pub fn is_empty(&self) -> bool {
        self.docstore.is_empty()
    }

    /// All nodes, grouped by document in ingestion order.
    pub fn nodes(&self) -> Vec<&Node> {
        self.docstore.nodes().collect()
    }

    pub fn node_text(&self, node_id: &uuid::Uuid) -> Option<&str> {
        self.docstore.node(node_id).map(|n| n.text.as_str())
    }

    /// Whether ingested content has not yet reached a successful checkpoint.
    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved
    }

    pub fn last_checkpoint(&self) -> Option<&RemoteCommit> {
        self.last_checkpoint.as_ref()
    }

    /// Write the snapshot files under `<storage_root>/index/`.
    pub fn persist_local(&self) -> Result<(), SearchError> {
        let index_dir = layout::index_dir(&self.storage_root);
        std::fs::create_dir_all(&index_dir)?;

        self.docstore.persist(&index_dir)?;
        self.vectors.persist(&index_dir)?;
        let meta = IndexStoreMeta {
            version: INDEX_STORE_VERSION,
            embedding_model: self.embed_model.model_name().to_string(),
            dims: self.embed_model.dims(),
            document_count: self.docstore.document_count(),
            node_count: self.docstore.node_count(),
        };
        write_json_atomic(&index_dir.join(INDEX_STORE_FILE), &meta)?;

        info!(index_dir = %index_dir.display(), nodes = meta.node_count, "index persisted");
        Ok(())
    }

    /// Persist locally, then upload the whole storage root as one commit.
    pub async fn checkpoint(
        &mut self,
        repository: &dyn SnapshotRepository,
        repo: &str,
        message: &str,
    ) -> Result<RemoteCommit, SearchError> {
        self.persist_local()?;
        let commit = repository
            .upload_folder(repo, &self.storage_root, message)
            .await?;

        self.unsaved = false;
        self.last_checkpoint = Some(commit.clone());
        info!(repo, commit_id = %commit.id, "checkpoint uploaded");
        Ok(commit)
    }

    /// The `top_k` nodes most similar to `query`.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredNode>, SearchError> {
        if self.vectors.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let embedding = self.embed_model.embed_query(query).await?;
        let hits = self.vectors.query(&embedding, top_k);

        Ok(hits
            .into_iter()
            .filter_map(|(id, score)| {
                self.docstore.node(&id).map(|node| ScoredNode {
                    node: node.clone(),
                    score,
                })
            })
            .collect())
    }

    /// Replace the embedding model. Refused once documents exist, since
    /// stored vectors would no longer be comparable with queries.
    pub fn rebind_embedding_model(
        &mut self,
        embed_model: Arc<dyn EmbeddingModel>,
    ) -> Result<(), SearchError> {
        if !self.docstore.is_empty() {
            return Err(SearchError::IndexNotEmpty);
        }
        info!(
            from = self.embed_model.model_name(),
            to = embed_model.model_name(),
            "embedding model rebound"
        );
        self.embed_model = embed_model;
        Ok(())
    }

    pub fn query_engine<'a>(
        &'a self,
        llm: &'a dyn GenerationModel,
        prompts: QueryPrompts,
    ) -> QueryEngine<'a, V> {
        QueryEngine::new(self, llm, prompts, DEFAULT_SIMILARITY_TOP_K)
    }

    pub fn chat_engine<'a>(
        &'a self,
        llm: &'a dyn GenerationModel,
        prompts: ChatPrompts,
    ) -> ChatEngine<'a, V> {
        ChatEngine::new(self, llm, prompts, DEFAULT_SIMILARITY_TOP_K)
    }
}

fn check_embedding_model(index_dir: &Path, embed_model: &dyn EmbeddingModel) -> Result<(), SearchError> {
    let path = index_dir.join(INDEX_STORE_FILE);
    if !path.exists() {
        return Ok(());
    }
    let contents = std::fs::read(&path)?;
    let meta: IndexStoreMeta = serde_json::from_slice(&contents)
        .map_err(|e| SearchError::IndexCorrupted(format!("{}: {e}", path.display())))?;
    if meta.embedding_model != embed_model.model_name() {
        warn!(
            snapshot_model = %meta.embedding_model,
            configured_model = embed_model.model_name(),
            "index was built with a different embedding model"
        );
    }
    Ok(())
}

/// Serialize `value` to `path` via a temp file and rename.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), SearchError> {
    let json = serde_json::to_vec(value)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
