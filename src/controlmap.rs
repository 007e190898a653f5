//! Update control map: the optional rollout-control sub-document a v2
//! deployment can ship.
//!
//! The agent passes the map through without acting on it, but decodes it
//! strictly: unknown fields anywhere in the document are a decode error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Rollout control document attached to a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateControlMap {
    pub id: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub states: HashMap<String, ControlMapState>,
}

/// Per-state control entry (e.g. for `ArtifactInstall_Enter`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlMapState {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub on_map_expire: String,
    #[serde(default)]
    pub on_action_executed: String,
}
