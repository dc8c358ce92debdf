use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{NigoriError, NigoriResult};

/// Top-level configuration (loaded from nigori.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NigoriConfig {
    pub logging: LoggingConfig,
    pub crypto: CryptoConfig,
}

impl NigoriConfig {
    /// Parse a TOML document; missing sections and keys take their defaults.
    pub fn from_toml_str(s: &str) -> NigoriResult<Self> {
        toml::from_str(s).map_err(|e| NigoriError::Other(anyhow::anyhow!("parsing config: {e}")))
    }

    /// Load a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> NigoriResult<Self> {
        if !path.exists() {
            tracing::debug!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            NigoriError::Other(anyhow::anyhow!("reading config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info); RUST_LOG overrides it
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

/// KDF selectable for a user-created custom passphrase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassphraseKdf {
    Pbkdf2,
    Scrypt,
}

/// Passphrase and key-derivation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Treat scrypt-derived custom passphrases as unsupported (default: false)
    pub force_disable_scrypt_for_custom_passphrase: bool,
    /// KDF for passphrases set on this device (default: pbkdf2)
    pub custom_passphrase_key_derivation: PassphraseKdf,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            force_disable_scrypt_for_custom_passphrase: false,
            custom_passphrase_key_derivation: PassphraseKdf::Pbkdf2,
        }
    }
}

impl CryptoConfig {
    /// Whether a new custom passphrase should be derived with scrypt.
    pub fn use_scrypt_for_new_passphrase(&self) -> bool {
        self.custom_passphrase_key_derivation == PassphraseKdf::Scrypt
            && !self.force_disable_scrypt_for_custom_passphrase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[logging]
log_level = "debug"
log_format = "json"

[crypto]
force_disable_scrypt_for_custom_passphrase = true
custom_passphrase_key_derivation = "scrypt"
"#;
        let config = NigoriConfig::from_toml_str(toml_str).unwrap();

        assert_eq!(config.logging.log_level, "debug");
        assert_eq!(config.logging.log_format, LogFormat::Json);
        assert!(config.crypto.force_disable_scrypt_for_custom_passphrase);
        assert_eq!(
            config.crypto.custom_passphrase_key_derivation,
            PassphraseKdf::Scrypt
        );
        // Force-disable wins over the preference
        assert!(!config.crypto.use_scrypt_for_new_passphrase());
    }

    #[test]
    fn test_parse_defaults() {
        let config = NigoriConfig::from_toml_str("").unwrap();

        assert_eq!(config.logging.log_level, "info");
        assert_eq!(config.logging.log_format, LogFormat::Text);
        assert!(!config.crypto.force_disable_scrypt_for_custom_passphrase);
        assert_eq!(
            config.crypto.custom_passphrase_key_derivation,
            PassphraseKdf::Pbkdf2
        );
        assert!(!config.crypto.use_scrypt_for_new_passphrase());
    }

    #[test]
    fn test_parse_partial_config() {
        let config = NigoriConfig::from_toml_str(
            r#"
[crypto]
custom_passphrase_key_derivation = "scrypt"
"#,
        )
        .unwrap();

        assert!(config.crypto.use_scrypt_for_new_passphrase());
        assert_eq!(config.logging.log_level, "info");
    }

    #[test]
    fn test_invalid_kdf_rejected() {
        let result = NigoriConfig::from_toml_str(
            r#"
[crypto]
custom_passphrase_key_derivation = "md5"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nigori.toml");
        std::fs::write(&path, "[logging]\nlog_level = \"trace\"\n").unwrap();

        let config = NigoriConfig::load(&path).unwrap();
        assert_eq!(config.logging.log_level, "trace");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = NigoriConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.logging.log_level, "info");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = NigoriConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = NigoriConfig::from_toml_str(&toml_str).unwrap();

        assert_eq!(config.logging.log_level, parsed.logging.log_level);
        assert_eq!(
            config.crypto.custom_passphrase_key_derivation,
            parsed.crypto.custom_passphrase_key_derivation
        );
    }
}
