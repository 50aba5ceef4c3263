//! Vector storage for node embeddings.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ragstudio_core::layout::VECTOR_STORE_FILE;

use crate::error::SearchError;
use crate::store::write_json_atomic;

/// Embedding storage and nearest-neighbour lookup, keyed by node id.
pub trait VectorIndex: Default + Send + Sync {
    /// Load from an index directory. `None` when no vector file exists.
    fn load(index_dir: &Path) -> Result<Option<Self>, SearchError>;

    fn persist(&self, index_dir: &Path) -> Result<(), SearchError>;

    /// Rejects embeddings holding NaN or infinite components.
    fn insert(&mut self, node_id: Uuid, embedding: Vec<f32>) -> Result<(), SearchError>;

    /// Up to `top_k` node ids, most similar first.
    fn query(&self, embedding: &[f32], top_k: usize) -> Vec<(Uuid, f32)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exhaustive cosine-similarity index persisted as `vector_store.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatVectorIndex {
    embedding_dict: BTreeMap<Uuid, Vec<f32>>,
}

impl VectorIndex for FlatVectorIndex {
    fn load(index_dir: &Path) -> Result<Option<Self>, SearchError> {
        let path = index_dir.join(VECTOR_STORE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read(&path)?;
        let index = serde_json::from_slice(&contents).map_err(|e| {
            SearchError::IndexCorrupted(format!("{}: {e}", path.display()))
        })?;
        Ok(Some(index))
    }

    fn persist(&self, index_dir: &Path) -> Result<(), SearchError> {
        write_json_atomic(&index_dir.join(VECTOR_STORE_FILE), self)
    }

    fn insert(&mut self, node_id: Uuid, embedding: Vec<f32>) -> Result<(), SearchError> {
        ensure_finite(node_id, &embedding)?;
        self.embedding_dict.insert(node_id, embedding);
        Ok(())
    }

    fn query(&self, embedding: &[f32], top_k: usize) -> Vec<(Uuid, f32)> {
        let mut scored: Vec<(Uuid, f32)> = self
            .embedding_dict
            .iter()
            .map(|(id, v)| (*id, cosine_similarity(embedding, v)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);
        scored
    }

    fn len(&self) -> usize {
        self.embedding_dict.len()
    }
}

/// JSON has no encoding for NaN or infinity, so such a vector would make
/// the persisted index unloadable.
pub fn ensure_finite(node_id: Uuid, embedding: &[f32]) -> Result<(), SearchError> {
    if embedding.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(SearchError::NonFiniteEmbedding { node_id })
    }
}

/// Cosine similarity in `[-1, 1]`. Mismatched or zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}
