use std::path::Path;

use uuid::Uuid;

use ragstudio_core::models::node::{Document, SourceMetadata};

use crate::error::SearchError;

/// Load one file as a single text document.
///
/// The file must be UTF-8. Its file name and path are recorded as source
/// metadata so retrieved nodes can be traced back to the upload.
pub fn load_document(path: &Path) -> Result<Document, SearchError> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8(bytes).map_err(|e| SearchError::UnsupportedDocument {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let metadata = SourceMetadata {
        file_name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        file_path: Some(path.to_string_lossy().into_owned()),
    };

    Ok(Document {
        id: Uuid::new_v4(),
        text,
        metadata,
    })
}
