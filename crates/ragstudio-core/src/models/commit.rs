use serde::{Deserialize, Serialize};

/// One entry in a remote repository's commit history.
///
/// Read-only from the caller's point of view. Used to report when the
/// last checkpoint happened, never as a concurrency token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCommit {
    pub id: String,
    pub created_at: jiff::Timestamp,
    #[serde(default)]
    pub message: String,
}
