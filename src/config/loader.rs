//! Configuration loader with environment variable expansion

use super::{expand_env_vars, Config, ConfigError};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Config, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_minimal() {
        let config = ConfigLoader::from_yaml("server:\n  address: \"127.0.0.1:0\"\n").unwrap();
        assert_eq!(config.server.address, "127.0.0.1:0");
        assert!(config.upload.rename);
        assert_eq!(config.json.max_bytes, 1024 * 1024);
    }

    #[test]
    fn test_from_yaml_missing_server() {
        assert!(ConfigLoader::from_yaml("upload:\n  rename: false\n").is_err());
    }
}
