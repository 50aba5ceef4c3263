use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provenance carried by documents and the nodes derived from them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

/// A raw ingested file, before chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub text: String,
    pub metadata: SourceMetadata,
}

/// An index-addressable chunk of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    /// The document this node was cut from.
    pub ref_doc_id: Uuid,
    pub text: String,
    pub metadata: SourceMetadata,
}

/// A node returned by retrieval, with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredNode {
    pub node: Node,
    pub score: f32,
}
