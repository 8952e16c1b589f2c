//! Configuration for the provisioning node
//!
//! Settings are loaded from a TOML file with per-field defaults and
//! overridden by the daemon's command-line flags.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::ConfigError;

/// Settings for the provisioning pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Node identity used as the protocol credential and link identity
    pub node_id: String,

    /// Port the public multiplexed inbound listens on
    pub ingress_port: u16,

    /// Fixed tunnel hostname (empty = discover a quick-tunnel hostname)
    pub tunnel_domain: String,

    /// Raw tunnel credential: token, JSON blob, or empty for a quick tunnel
    pub tunnel_credential: String,

    /// Edge address exported descriptors point at
    pub edge_host: String,

    /// Edge port exported descriptors point at
    pub edge_port: u16,

    /// Optional name prefix for exported descriptors
    pub node_label: String,

    /// Telemetry server host (empty = agent not started)
    pub telemetry_host: String,

    /// Telemetry auth token
    pub telemetry_token: String,

    /// Registry base URL for subscription sync (empty = no sync)
    pub registry_url: String,

    /// Public URL of this service, used to build the subscription URL
    pub public_url: String,

    /// Path segment the front-end serves the subscription under
    pub sub_path: String,

    /// Register the public URL with the keep-alive service
    pub auto_access: bool,

    /// Working directory for generated files
    pub work_dir: PathBuf,

    /// Proxy engine binary
    pub engine_bin: PathBuf,

    /// Tunnel client binary
    pub tunnel_bin: PathBuf,

    /// Telemetry agent binary
    pub agent_bin: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        let work_dir = PathBuf::from("./tmp");

        Self {
            node_id: Uuid::new_v4().to_string(),
            ingress_port: 8002,
            tunnel_domain: String::new(),
            tunnel_credential: String::new(),
            edge_host: "saas.sin.fan".to_string(),
            edge_port: 443,
            node_label: String::new(),
            telemetry_host: String::new(),
            telemetry_token: String::new(),
            registry_url: String::new(),
            public_url: String::new(),
            sub_path: "subb".to_string(),
            auto_access: false,
            engine_bin: work_dir.join("engine"),
            tunnel_bin: work_dir.join("tunnel-client"),
            agent_bin: work_dir.join("telemetry-agent"),
            work_dir,
        }
    }
}

impl Settings {
    /// Whether the telemetry agent should be started
    pub fn telemetry_enabled(&self) -> bool {
        !self.telemetry_host.is_empty() && !self.telemetry_token.is_empty()
    }
}

/// Paths of generated artifacts under the working directory
#[derive(Debug, Clone)]
pub struct WorkPaths {
    /// Routing configuration consumed by the proxy engine
    pub routing_config: PathBuf,
    /// Log file the tunnel client writes and discovery polls
    pub tunnel_log: PathBuf,
    /// Exported subscription bundle snapshot
    pub subscription: PathBuf,
    /// Raw tunnel credential side file
    pub tunnel_credential: PathBuf,
    /// Generated tunnel definition side file
    pub tunnel_definition: PathBuf,
}

impl WorkPaths {
    /// Derive all artifact paths from the working directory
    pub fn new(work_dir: &Path) -> Self {
        Self {
            routing_config: work_dir.join("config.json"),
            tunnel_log: work_dir.join("tunnel.log"),
            subscription: work_dir.join("sub.txt"),
            tunnel_credential: work_dir.join("cred.json"),
            tunnel_definition: work_dir.join("tunnel.yml"),
        }
    }
}

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("muxgate")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}
