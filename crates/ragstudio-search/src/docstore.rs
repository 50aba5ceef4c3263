use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ragstudio_core::layout::DOCSTORE_FILE;
use ragstudio_core::models::node::{Document, Node, SourceMetadata};

use crate::error::SearchError;
use crate::store::write_json_atomic;

/// What the index remembers about one ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefDocInfo {
    pub node_ids: Vec<Uuid>,
    pub metadata: SourceMetadata,
}

/// Node texts and document bookkeeping, persisted as `docstore.json`.
///
/// Documents are kept in ingestion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocStore {
    nodes: BTreeMap<Uuid, Node>,
    ref_doc_order: Vec<Uuid>,
    ref_doc_info: BTreeMap<Uuid, RefDocInfo>,
}

impl DocStore {
    pub fn load(index_dir: &Path) -> Result<Option<Self>, SearchError> {
        let path = index_dir.join(DOCSTORE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read(&path)?;
        let store: DocStore = serde_json::from_slice(&contents)
            .map_err(|e| SearchError::IndexCorrupted(format!("{}: {e}", path.display())))?;
        store.check()?;
        Ok(Some(store))
    }

    pub fn persist(&self, index_dir: &Path) -> Result<(), SearchError> {
        write_json_atomic(&index_dir.join(DOCSTORE_FILE), self)
    }

    pub fn add(&mut self, document: &Document, nodes: &[Node]) {
        let info = RefDocInfo {
            node_ids: nodes.iter().map(|n| n.id).collect(),
            metadata: document.metadata.clone(),
        };
        for node in nodes {
            self.nodes.insert(node.id, node.clone());
        }
        self.ref_doc_order.push(document.id);
        self.ref_doc_info.insert(document.id, info);
    }

    /// Documents in ingestion order.
    pub fn documents(&self) -> impl Iterator<Item = (&Uuid, &RefDocInfo)> {
        self.ref_doc_order
            .iter()
            .filter_map(|id| self.ref_doc_info.get_key_value(id))
    }

    pub fn node(&self, id: &Uuid) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.documents()
            .flat_map(|(_, info)| info.node_ids.iter())
            .filter_map(|id| self.nodes.get(id))
    }

    pub fn document_count(&self) -> usize {
        self.ref_doc_order.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ref_doc_order.is_empty()
    }

    fn check(&self) -> Result<(), SearchError> {
        for id in &self.ref_doc_order {
            let info = self.ref_doc_info.get(id).ok_or_else(|| {
                SearchError::IndexCorrupted(format!("document {id} has no entry"))
            })?;
            if let Some(missing) = info.node_ids.iter().find(|n| !self.nodes.contains_key(*n)) {
                return Err(SearchError::IndexCorrupted(format!(
                    "document {id} references missing node {missing}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str) -> (Document, Vec<Node>) {
        let doc = Document {
            id: Uuid::new_v4(),
            text: format!("text of {name}"),
            metadata: SourceMetadata {
                file_name: Some(name.to_string()),
                file_path: None,
            },
        };
        let node = Node {
            id: Uuid::new_v4(),
            ref_doc_id: doc.id,
            text: doc.text.clone(),
            metadata: doc.metadata.clone(),
        };
        (doc, vec![node])
    }

    #[test]
    fn documents_keep_ingestion_order() {
        let mut store = DocStore::default();
        for name in ["b.txt", "a.txt", "c.txt"] {
            let (d, n) = doc(name);
            store.add(&d, &n);
        }
        let names: Vec<_> = store
            .documents()
            .map(|(_, info)| info.metadata.file_name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["b.txt", "a.txt", "c.txt"]);
        assert_eq!(store.node_count(), 3);
    }

    #[test]
    fn dangling_node_reference_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let (d, n) = doc("a.txt");
        let mut store = DocStore::default();
        store.add(&d, &n);
        store.nodes.clear();
        store.persist(dir.path()).unwrap();

        assert!(matches!(
            DocStore::load(dir.path()),
            Err(SearchError::IndexCorrupted(_))
        ));
    }
}
