//! Device identity: what software the device currently runs.
//!
//! Every update check sends the installed artifact name, the device type and
//! any extra provides the installed artifact declared. The server matches
//! those against its scheduled deployments.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};

/// Snapshot of the currently installed software, sent with every update
/// check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurrentUpdate {
    pub artifact_name: String,
    pub device_type:   String,
    /// Extra provides advertised by the installed artifact.
    pub provides: HashMap<String, String>,
}

impl Serialize for CurrentUpdate {
    /// Wire form: the provides mapping with `artifact_name` and
    /// `device_type` merged in, the named fields winning over same-named
    /// provides keys. Keys are emitted in sorted order so request bodies
    /// are reproducible. The snapshot itself is never modified.
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut merged: BTreeMap<&str, &str> = self
            .provides
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        merged.insert("artifact_name", &self.artifact_name);
        merged.insert("device_type", &self.device_type);

        let mut map = serializer.serialize_map(Some(merged.len()))?;
        for (k, v) in merged {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ── Identity files ────────────────────────────────────────────────────────────

/// Read one required entry from a flat `key=value` identity file.
fn read_keyed_value(path: &Path, key: &str) -> Result<String> {
    let content = fs::read_to_string(path)
        .map_err(|e| AgentError::Config(format!("cannot read {}: {e}", path.display())))?;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            if k.trim() == key && !v.trim().is_empty() {
                return Ok(v.trim().to_string());
            }
        }
    }
    Err(AgentError::Config(format!(
        "{} does not define {key}",
        path.display()
    )))
}

/// Parse every `key=value` line of `path` into a provides mapping.
fn read_provides_file(path: &Path) -> Result<HashMap<String, String>> {
    let content = fs::read_to_string(path)
        .map_err(|e| AgentError::Config(format!("cannot read {}: {e}", path.display())))?;
    let mut provides = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            provides.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    Ok(provides)
}

/// Assemble the identity snapshot from the configured sources.
///
/// The artifact name always comes from the `artifact_info` file; the device
/// type comes from the config when set inline, otherwise from the
/// `device_type` file.
pub fn load_current_update(cfg: &AgentConfig) -> Result<CurrentUpdate> {
    let artifact_name = read_keyed_value(&cfg.artifact_info_file, "artifact_name")?;
    let device_type = if cfg.device_type.is_empty() {
        read_keyed_value(&cfg.device_type_file, "device_type")?
    } else {
        cfg.device_type.clone()
    };
    let provides = match &cfg.provides_file {
        Some(path) => read_provides_file(path)?,
        None => HashMap::new(),
    };
    Ok(CurrentUpdate {
        artifact_name,
        device_type,
        provides,
    })
}
