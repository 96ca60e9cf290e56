use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8443;
pub const DEFAULT_METADATA_PATH: &str = "/opt/ml/metadata/resource-metadata.json";

/// Immutable per-invocation settings, built once from the parsed CLI
/// arguments and passed by reference everywhere.
#[derive(Debug, Clone)]
pub struct Config {
    /// Seconds of inactivity after which the instance counts as idle.
    pub idle_seconds: u64,
    /// Port of the local Jupyter server.
    pub port: u16,
    /// Treat open kernel connections as activity unless set.
    pub ignore_connections: bool,
    /// Skip TLS certificate validation on the local sessions API.
    pub accept_invalid_certs: bool,
    /// Location of the SageMaker resource metadata file.
    pub metadata_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration validation error: {0}")]
    Validation(String),
}

impl Config {
    pub fn new(
        idle_seconds: u64,
        port: u16,
        ignore_connections: bool,
        accept_invalid_certs: bool,
        metadata_path: PathBuf,
    ) -> Result<Self, ConfigError> {
        let cfg = Self {
            idle_seconds,
            port,
            ignore_connections,
            accept_invalid_certs,
            metadata_path,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_seconds < 1 {
            return Err(ConfigError::Validation(
                "--time must be at least 1 second".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::Validation(
                "--port must be in the range 1..65535".to_string(),
            ));
        }
        if self.metadata_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "--metadata-file must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
