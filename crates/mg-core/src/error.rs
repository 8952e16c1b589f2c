//! Core error types for Muxgate

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for mg-core operations
pub type Result<T> = std::result::Result<T, NodeError>;

/// Top-level error type for the provisioning pipeline
///
/// Only `RoutingConfig` is fatal to startup; every other failure in
/// the pipeline is handled best-effort at the point of occurrence.
#[derive(Error, Debug)]
pub enum NodeError {
    /// The routing configuration could not be materialized
    #[error("Failed to write routing config to {path:?}: {source}")]
    RoutingConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
