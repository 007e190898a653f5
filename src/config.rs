//! Agent configuration file parser.
//!
//! Parses the flat `key = value` format of `ota-client.conf`. Every key is
//! optional except `server_url`; unknown keys are ignored so one config file
//! can serve several agent generations.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{AgentError, Result};
use crate::update::client::MIN_ARTIFACT_SIZE;

// Default interval constants (seconds)
const UPDATE_INTERVAL: u64 = 1800;
const FETCH_MAX_WAIT:  u64 = 300;

/// Full agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Deployment server address; `https://` is assumed when no scheme is
    /// given.
    pub server_url: String,
    /// Inline device type; wins over `device_type_file` when set.
    pub device_type: String,
    /// File holding `device_type=<type>`.
    pub device_type_file: PathBuf,
    /// File holding `artifact_name=<name>` for the installed artifact.
    pub artifact_info_file: PathBuf,
    /// Optional `key=value` file of extra provides.
    pub provides_file: Option<PathBuf>,
    /// Directory downloaded artifacts are stored in.
    pub store_dir: PathBuf,
    /// Seconds between update checks.
    pub update_interval: u64,
    /// Time budget for one resumable artifact fetch, in seconds.
    pub fetch_max_wait: u64,
    /// Plausibility floor for declared artifact sizes, in bytes.
    pub min_artifact_size: u64,
    // ── Process ───────────────────────────────────────────────────────────────
    pub pid_file:   PathBuf,
    pub log_syslog: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url:         String::new(),
            device_type:        String::new(),
            device_type_file:   PathBuf::from("/var/lib/ota-client/device_type"),
            artifact_info_file: PathBuf::from("/etc/ota-client/artifact_info"),
            provides_file:      None,
            store_dir:          PathBuf::from("/var/lib/ota-client/store"),
            update_interval:    UPDATE_INTERVAL,
            fetch_max_wait:     FETCH_MAX_WAIT,
            min_artifact_size:  MIN_ARTIFACT_SIZE,
            pid_file:           PathBuf::from("/var/run/ota-client.pid"),
            log_syslog:         true,
        }
    }
}

/// Parse `path` as an `ota-client.conf` key=value configuration file.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| AgentError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse_config(&content)
}

fn parse_config(content: &str) -> Result<AgentConfig> {
    let mut cfg = AgentConfig::default();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.splitn(2, '=');
        let key = match parts.next() {
            Some(k) => k.trim().to_ascii_lowercase(),
            None => continue,
        };
        let val = match parts.next() {
            Some(v) => v.trim().to_string(),
            None => continue,
        };
        if val.is_empty() {
            continue;
        }

        match key.as_str() {
            "server_url"         => cfg.server_url         = val,
            "device_type"        => cfg.device_type        = val,
            "device_type_file"   => cfg.device_type_file   = PathBuf::from(&val),
            "artifact_info_file" => cfg.artifact_info_file = PathBuf::from(&val),
            "provides_file"      => cfg.provides_file      = Some(PathBuf::from(&val)),
            "store_dir"          => cfg.store_dir          = PathBuf::from(&val),
            "update_interval"    => cfg.update_interval    = parse_u64(&key, &val)?,
            "fetch_max_wait"     => cfg.fetch_max_wait     = parse_u64(&key, &val)?,
            "min_artifact_size"  => cfg.min_artifact_size  = parse_u64(&key, &val)?,
            "pid_file"           => cfg.pid_file           = PathBuf::from(&val),
            "log_syslog"         => cfg.log_syslog         = val == "true" || val == "1" || val == "yes",
            _ => debug!("ignoring unknown config key {key}"),
        }
    }

    Ok(cfg)
}

fn parse_u64(key: &str, val: &str) -> Result<u64> {
    val.parse()
        .map_err(|e| AgentError::Config(format!("{key} must be an integer: {e}")))
}

/// Validate that required fields are populated.
pub fn validate_config(cfg: &AgentConfig) -> Result<()> {
    if cfg.server_url.is_empty() {
        return Err(AgentError::Config("server_url is required".into()));
    }
    Ok(())
}
