//! Configuration module for the handler-kit server
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.

use crate::json::{JsonOptions, DEFAULT_MAX_JSON_BYTES};
use crate::upload::{UploadPolicy, ANY_CONTENT_TYPE, DEFAULT_MAX_TOTAL_BYTES};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("UPLOAD_DIR", "/srv/uploads");
/// let result = expand_env_vars("directory: ${UPLOAD_DIR}");
/// assert_eq!(result, "directory: /srv/uploads");
///
/// let result = expand_env_vars("${MISSING:-default}");
/// assert_eq!(result, "default");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR: regex_lite::Regex =
            regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]+))?\}").unwrap();
    }

    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in ENV_VAR.captures_iter(s) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let var_name = &cap[1];

        // Append the text before the match
        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);
    result
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub json: JsonConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.address.parse::<SocketAddr>().map_err(|e| {
            ConfigError::ValidationError(format!(
                "Invalid server address '{}': {}",
                self.server.address, e
            ))
        })?;

        if self.upload.directory.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "Upload directory cannot be empty".into(),
            ));
        }

        if self.upload.max_total_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "upload.max_total_bytes must be greater than 0".into(),
            ));
        }

        for content_type in &self.upload.allowed_types {
            if !is_valid_content_type(content_type) {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid allowed type '{}': must be 'type/subtype' or '*'",
                    content_type
                )));
            }
        }

        if self.json.max_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "json.max_bytes must be greater than 0".into(),
            ));
        }

        if self.download.directory.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "Download directory cannot be empty".into(),
            ));
        }

        Ok(())
    }
}

/// Validate that a content type is `*` or has the form `type/subtype`
fn is_valid_content_type(content_type: &str) -> bool {
    if content_type == ANY_CONTENT_TYPE {
        return true;
    }
    match content_type.split_once('/') {
        Some((kind, subtype)) => {
            !kind.trim().is_empty() && !subtype.trim().is_empty() && !subtype.contains('/')
        }
        None => false,
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_upload_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: u64,
    #[serde(default)]
    pub allowed_types: Vec<String>,
    #[serde(default = "default_rename")]
    pub rename: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            directory: default_upload_dir(),
            max_total_bytes: default_max_total_bytes(),
            allowed_types: Vec::new(),
            rename: default_rename(),
        }
    }
}

impl UploadConfig {
    /// Build the immutable per-call upload policy
    pub fn policy(&self) -> UploadPolicy {
        UploadPolicy {
            max_total_bytes: self.max_total_bytes,
            allowed_content_types: self.allowed_types.clone(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_max_total_bytes() -> u64 {
    DEFAULT_MAX_TOTAL_BYTES
}

fn default_rename() -> bool {
    true
}

/// JSON body configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonConfig {
    #[serde(default = "default_max_json_bytes")]
    pub max_bytes: usize,
    #[serde(default)]
    pub allow_unknown_fields: bool,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_json_bytes(),
            allow_unknown_fields: false,
        }
    }
}

impl JsonConfig {
    /// Decoder options for request bodies
    pub fn options(&self) -> JsonOptions {
        JsonOptions {
            max_bytes: self.max_bytes,
            allow_unknown_fields: self.allow_unknown_fields,
        }
    }
}

fn default_max_json_bytes() -> usize {
    DEFAULT_MAX_JSON_BYTES
}

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_upload_dir")]
    pub directory: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: default_upload_dir(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}
