use serde::{Deserialize, Serialize};

/// Contents of `preferences.json` in the preferences repository.
///
/// Keys this build does not know about are carried through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// The storage repo the studio last checkpointed to. `None` means no
    /// storage repo has been selected yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_repo_id: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
