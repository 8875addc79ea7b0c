//! Configuration management for the camera client

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::auth::Credential;
use crate::client::ClientOptions;
use crate::frame::{ExtractPolicy, DEFAULT_MAX_BUFFER_BYTES};
use crate::transport::{Endpoint, TlsOptions, DEFAULT_PORT};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
}

/// Printer camera connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Printer address on the LAN
    #[serde(default)]
    pub host: String,

    /// LAN access code shown on the printer screen
    #[serde(default)]
    pub access_code: String,

    /// Camera service port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Accept the printer's self-signed certificate without verification.
    /// Printers do not ship a verifiable certificate, so turning this off
    /// only works behind a TLS-terminating proxy with a trusted certificate.
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,

    /// Frames extracted per read: "one-per-read" or "drain"
    #[serde(default)]
    pub extract_policy: ExtractPolicy,

    /// Upper bound on buffered bytes without a complete frame
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: usize,

    /// Bytes requested per socket read
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            access_code: String::new(),
            port: default_port(),
            accept_invalid_certs: default_accept_invalid_certs(),
            extract_policy: ExtractPolicy::default(),
            max_buffer_bytes: default_max_buffer_bytes(),
            read_chunk_size: default_read_chunk_size(),
        }
    }
}

impl CameraConfig {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    pub fn tls_options(&self) -> TlsOptions {
        TlsOptions {
            accept_invalid_certs: self.accept_invalid_certs,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            extract_policy: self.extract_policy,
            max_buffer_bytes: self.max_buffer_bytes,
            read_chunk_size: self.read_chunk_size,
        }
    }
}

// Default value functions
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_accept_invalid_certs() -> bool {
    true
}
fn default_max_buffer_bytes() -> usize {
    DEFAULT_MAX_BUFFER_BYTES
}
fn default_read_chunk_size() -> usize {
    4096
}

const MIN_READ_CHUNK: usize = 512;
const MAX_READ_CHUNK: usize = 1024 * 1024;

impl Config {
    /// Loads and validates configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file without validating it, so that command line
    /// overrides can fill in missing fields first
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Parses and validates configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cam = &self.camera;

        if cam.host.trim().is_empty() {
            return Err(ConfigError::Invalid("camera.host must be set".to_string()));
        }

        if cam.port == 0 {
            return Err(ConfigError::Invalid("camera.port must be > 0".to_string()));
        }

        Credential::new(cam.access_code.clone())
            .map_err(|e| ConfigError::Invalid(format!("camera.access_code: {}", e)))?;

        if cam.read_chunk_size < MIN_READ_CHUNK || cam.read_chunk_size > MAX_READ_CHUNK {
            return Err(ConfigError::Invalid(format!(
                "camera.read_chunk_size must be between {} and {}, got {}",
                MIN_READ_CHUNK, MAX_READ_CHUNK, cam.read_chunk_size
            )));
        }

        if cam.max_buffer_bytes < cam.read_chunk_size {
            return Err(ConfigError::Invalid(format!(
                "camera.max_buffer_bytes ({}) must be at least read_chunk_size ({})",
                cam.max_buffer_bytes, cam.read_chunk_size
            )));
        }

        Ok(())
    }

    /// Saves configuration to TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.camera.port, 6000);
        assert!(config.camera.accept_invalid_certs);
        assert_eq!(config.camera.extract_policy, ExtractPolicy::OnePerRead);
        assert_eq!(config.camera.read_chunk_size, 4096);

        // No host or access code yet
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
[camera]
host = "192.168.1.21"
access_code = "93994527"
port = 6001
accept_invalid_certs = false
extract_policy = "drain"
max_buffer_bytes = 1048576
read_chunk_size = 8192
        "#;

        let config = Config::from_str(toml).unwrap();

        assert_eq!(config.camera.host, "192.168.1.21");
        assert_eq!(config.camera.access_code, "93994527");
        assert_eq!(config.camera.endpoint(), Endpoint::new("192.168.1.21", 6001));
        assert!(!config.camera.tls_options().accept_invalid_certs);

        let options = config.camera.client_options();
        assert_eq!(options.extract_policy, ExtractPolicy::Drain);
        assert_eq!(options.max_buffer_bytes, 1048576);
        assert_eq!(options.read_chunk_size, 8192);
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let toml = r#"
[camera]
host = "printer.local"
access_code = "12345678"
        "#;

        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.camera.port, 6000);
        assert!(config.camera.accept_invalid_certs);
        assert_eq!(config.camera.max_buffer_bytes, DEFAULT_MAX_BUFFER_BYTES);
    }

    #[test]
    fn test_invalid_access_code() {
        let toml = r#"
[camera]
host = "printer.local"
access_code = "0123456789012345678901234567890123456789"
        "#;

        let result = Config::from_str(toml);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_read_chunk() {
        let toml = r#"
[camera]
host = "printer.local"
access_code = "12345678"
read_chunk_size = 16
        "#;

        assert!(Config::from_str(toml).is_err());
    }

    #[test]
    fn test_buffer_smaller_than_chunk() {
        let toml = r#"
[camera]
host = "printer.local"
access_code = "12345678"
read_chunk_size = 4096
max_buffer_bytes = 1024
        "#;

        assert!(Config::from_str(toml).is_err());
    }

    #[test]
    fn test_unknown_policy_fails_to_parse() {
        let toml = r#"
[camera]
host = "printer.local"
access_code = "12345678"
extract_policy = "sometimes"
        "#;

        assert!(matches!(Config::from_str(toml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.toml");

        let mut config = Config::default();
        config.camera.host = "10.0.0.5".to_string();
        config.camera.access_code = "abcdef12".to_string();
        config.camera.extract_policy = ExtractPolicy::Drain;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.camera.host, "10.0.0.5");
        assert_eq!(loaded.camera.access_code, "abcdef12");
        assert_eq!(loaded.camera.extract_policy, ExtractPolicy::Drain);
    }

    #[test]
    fn test_read_skips_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[camera]\nport = 6000\n").unwrap();

        assert!(Config::read(&path).is_ok());
        assert!(Config::load(&path).is_err());
    }
}
