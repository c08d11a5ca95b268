//! Client configuration
//!
//! Stored as JSON; every field has a default so partial files load.
//! Environment variables override file values.

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::EccCurve;

/// Environment variable names
pub const ENV_CURVE: &str = "OPGP_ECC_CURVE";
pub const ENV_USER_PIN: &str = "OPGP_ECC_USER_PIN";
pub const ENV_ADMIN_PIN: &str = "OPGP_ECC_ADMIN_PIN";
pub const ENV_EXTENDED_LENGTH: &str = "OPGP_ECC_EXTENDED_LENGTH";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Settings for provisioning a card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Curve for all three key slots
    pub curve: EccCurve,
    /// PW1
    pub user_pin: String,
    /// PW3
    pub admin_pin: String,
    /// Send long commands as extended APDUs instead of chaining
    pub extended_length: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            curve: EccCurve::P256,
            user_pin: "123456".to_string(),
            admin_pin: "12345678".to_string(),
            extended_length: true,
        }
    }
}

impl ClientConfig {
    /// Load a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        info!("Loaded client config from {:?}", path);
        Ok(config)
    }

    /// Write this config as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        debug!("Saved client config to {:?}", path.as_ref());
        Ok(())
    }

    /// Load `path` when given (defaults otherwise), then apply the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up by environment variable name
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_CURVE) {
            self.curve = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_CURVE,
                value,
            })?;
        }
        if let Some(value) = lookup(ENV_USER_PIN) {
            self.user_pin = value;
        }
        if let Some(value) = lookup(ENV_ADMIN_PIN) {
            self.admin_pin = value;
        }
        if let Some(value) = lookup(ENV_EXTENDED_LENGTH) {
            self.extended_length = match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_EXTENDED_LENGTH,
                        value,
                    })
                }
            };
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.curve, EccCurve::P256);
        assert_eq!(config.user_pin, "123456");
        assert_eq!(config.admin_pin, "12345678");
        assert!(config.extended_length);
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"curve": "secp256k1", "extended_length": false}}"#).unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.curve, EccCurve::Secp256k1);
        assert!(!config.extended_length);
        assert_eq!(config.admin_pin, "12345678");
    }

    #[test]
    fn test_curve_aliases() {
        let config: ClientConfig = serde_json::from_str(r#"{"curve": "ansix9p384r1"}"#).unwrap();
        assert_eq!(config.curve, EccCurve::P384);
        let config: ClientConfig = serde_json::from_str(r#"{"curve": "ansix9p521r1"}"#).unwrap();
        assert_eq!(config.curve, EccCurve::P521);
        assert!(serde_json::from_str::<ClientConfig>(r#"{"curve": "brainpoolP256r1"}"#).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");

        let config = ClientConfig {
            curve: EccCurve::P384,
            user_pin: "654321".to_string(),
            ..ClientConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(ClientConfig::load(Some(path.as_path())).unwrap().curve, EccCurve::P384);
        assert_eq!(ClientConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ClientConfig::from_file(dir.path().join("absent.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let config = ClientConfig::default()
            .with_overrides(env(&[
                (ENV_CURVE, "2b81040022"),
                (ENV_ADMIN_PIN, "87654321"),
                (ENV_EXTENDED_LENGTH, "off"),
            ]))
            .unwrap();
        assert_eq!(config.curve, EccCurve::P384);
        assert_eq!(config.admin_pin, "87654321");
        assert_eq!(config.user_pin, "123456");
        assert!(!config.extended_length);
    }

    #[test]
    fn test_invalid_env_values() {
        let result = ClientConfig::default().with_overrides(env(&[(ENV_CURVE, "ed25519")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key: ENV_CURVE, .. })
        ));

        let result = ClientConfig::default().with_overrides(env(&[(ENV_EXTENDED_LENGTH, "maybe")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
