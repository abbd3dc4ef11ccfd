use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{FdevError, Result};
use crate::paths::Paths;
use crate::ssh::KeyAlgorithm;
use crate::utils::{ensure_private_dir, write_file_with_mode, PRIVATE_FILE_MODE};

/// Number of `~/.ssh/config` snapshots kept by default.
pub const DEFAULT_BACKUP_KEEP: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// How many SSH config snapshots to keep in `backups/`.
    #[serde(default = "default_backup_keep")]
    pub backup_keep: usize,
    #[serde(default = "default_key_type")]
    pub default_key_type: String,
    /// Alternative SSH client config to manage instead of `~/.ssh/config`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_config_path: Option<String>,
}

fn default_backup_keep() -> usize {
    DEFAULT_BACKUP_KEEP
}

fn default_key_type() -> String {
    "ed25519".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backup_keep: DEFAULT_BACKUP_KEEP,
            default_key_type: default_key_type(),
            ssh_config_path: None,
        }
    }
}

impl AppConfig {
    /// Load `config.yaml` from the base directory.
    ///
    /// A missing file yields the defaults; `FDEV_BACKUP_KEEP` overrides the
    /// stored `backup_keep`.
    pub fn load(paths: &Paths) -> Result<Self> {
        let path = paths.config_file();

        let mut config = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(FdevError::io("read", &path))?;
            serde_yaml::from_str::<AppConfig>(&content)
                .map_err(|e| FdevError::Config(format!("Invalid config: {}", e)))?
        } else {
            AppConfig::default()
        };

        if let Ok(keep) = std::env::var("FDEV_BACKUP_KEEP") {
            config.backup_keep = keep.trim().parse().map_err(|_| {
                FdevError::Config(format!("FDEV_BACKUP_KEEP must be a number, got '{}'", keep))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, paths: &Paths) -> Result<()> {
        self.validate()?;

        let path = paths.config_file();
        ensure_private_dir(&paths.base)?;

        let content = serde_yaml::to_string(self)
            .map_err(|e| FdevError::Config(format!("Failed to serialize config: {}", e)))?;

        write_file_with_mode(&path, content.as_bytes(), PRIVATE_FILE_MODE)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.backup_keep == 0 {
            return Err(FdevError::Config(
                "backup_keep must be at least 1".to_string(),
            ));
        }

        self.key_algorithm()?;
        Ok(())
    }

    pub fn key_algorithm(&self) -> Result<KeyAlgorithm> {
        self.default_key_type
            .parse()
            .map_err(|e: FdevError| FdevError::Config(e.to_string()))
    }

    /// The configured SSH config override, tilde-expanded.
    pub fn ssh_config_override(&self) -> Option<PathBuf> {
        self.ssh_config_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
    }

    /// Apply the settings that affect the filesystem layout.
    pub fn apply_to(&self, paths: Paths) -> Paths {
        match self.ssh_config_override() {
            Some(path) => paths.with_ssh_config(path),
            None => paths,
        }
    }

    /// Set a single key from the CLI. Returns `false` for an unknown key.
    pub fn set(&mut self, key: &str, value: &str) -> Result<bool> {
        match key {
            "backup_keep" | "backup-keep" => {
                self.backup_keep = value.trim().parse().map_err(|_| {
                    FdevError::Config(format!("backup_keep must be a number, got '{}'", value))
                })?;
            }
            "default_key_type" | "default-key-type" | "key_type" | "key-type" => {
                self.default_key_type = value.trim().to_lowercase();
            }
            "ssh_config" | "ssh-config" | "ssh_config_path" => {
                self.ssh_config_path = if value.trim().is_empty() {
                    None
                } else {
                    Some(value.trim().to_string())
                };
            }
            _ => return Ok(false),
        }

        self.validate()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.backup_keep, 10);
        assert_eq!(config.default_key_type, "ed25519");
        assert!(config.ssh_config_path.is_none());
        assert_eq!(config.key_algorithm().unwrap(), KeyAlgorithm::Ed25519);
    }

    #[test]
    fn test_config_deserialization_fills_defaults() {
        let yaml = r#"
default_key_type: ecdsa
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.backup_keep, 10);
        assert_eq!(config.key_algorithm().unwrap(), KeyAlgorithm::Ecdsa);
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig {
            backup_keep: 5,
            ..Default::default()
        };

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("backup_keep: 5"));
        assert!(yaml.contains("default_key_type: ed25519"));
        // ssh_config_path should not appear when None
        assert!(!yaml.contains("ssh_config_path"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = AppConfig {
            backup_keep: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            default_key_type: "dsa".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_set_keys() {
        let mut config = AppConfig::default();

        assert!(config.set("backup-keep", "3").unwrap());
        assert_eq!(config.backup_keep, 3);

        assert!(config.set("key_type", "RSA").unwrap());
        assert_eq!(config.key_algorithm().unwrap(), KeyAlgorithm::Rsa);

        assert!(!config.set("unknown", "x").unwrap());
        assert!(config.set("backup_keep", "many").is_err());
    }

    #[test]
    fn test_apply_ssh_config_override() {
        let config = AppConfig {
            ssh_config_path: Some("/tmp/sandbox/ssh_config".to_string()),
            ..Default::default()
        };
        let paths = config.apply_to(Paths::new("/b", "/h"));
        assert_eq!(
            paths.ssh_config(),
            std::path::Path::new("/tmp/sandbox/ssh_config")
        );
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(temp_dir.path().join(".fdev"), temp_dir.path());

        let config = AppConfig {
            backup_keep: 4,
            default_key_type: "rsa".to_string(),
            ssh_config_path: None,
        };
        config.save(&paths).unwrap();

        let content = std::fs::read_to_string(paths.config_file()).unwrap();
        let loaded: AppConfig = serde_yaml::from_str(&content).unwrap();
        assert_eq!(loaded.backup_keep, 4);
        assert_eq!(loaded.default_key_type, "rsa");

        #[cfg(unix)]
        assert_eq!(crate::utils::file_mode(&paths.config_file()), Some(0o600));
    }
}
