//! Filesystem layout of the tool.
//!
//! ```text
//! ~/.fdev/
//!   config.yaml
//!   keys/<alias>/id_<algorithm>       private key (0600)
//!   keys/<alias>/id_<algorithm>.pub   public key  (0644)
//!   backups/ssh_config_<timestamp>    rotated ~/.ssh/config snapshots
//! ~/.ssh/config                       target file
//! ```

use std::path::{Path, PathBuf};

use crate::error::{FdevError, Result};
use crate::ssh::KeyAlgorithm;
use crate::utils::ensure_private_dir;
use crate::validation::validate_alias;

/// Prefix of every `~/.ssh/config` snapshot in the backups directory.
pub const SSH_CONFIG_BACKUP_PREFIX: &str = "ssh_config";

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
    pub keys: PathBuf,
    pub backups: PathBuf,
    ssh_config: PathBuf,
}

impl Paths {
    /// Layout rooted at `base`, targeting `<home>/.ssh/config`.
    pub fn new(base: impl Into<PathBuf>, home: impl AsRef<Path>) -> Self {
        let base = base.into();
        Self {
            keys: base.join("keys"),
            backups: base.join("backups"),
            ssh_config: home.as_ref().join(".ssh").join("config"),
            base,
        }
    }

    /// Resolve the layout for the current user.
    ///
    /// `FDEV_HOME` overrides the base directory (default `~/.fdev`).
    pub fn discover() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| FdevError::Config("Cannot determine home directory".to_string()))?;

        let base = match std::env::var("FDEV_HOME") {
            Ok(dir) if !dir.trim().is_empty() => {
                PathBuf::from(shellexpand::tilde(dir.trim()).as_ref())
            }
            _ => home.join(".fdev"),
        };

        Ok(Self::new(base, home))
    }

    /// Point the layout at a different SSH client config file.
    pub fn with_ssh_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssh_config = path.into();
        self
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.yaml")
    }

    pub fn ssh_config(&self) -> &Path {
        &self.ssh_config
    }

    pub fn ssh_dir(&self) -> &Path {
        self.ssh_config.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Directory holding the key pair for `alias`. Fails on an invalid alias
    /// so a crafted alias can never escape `keys/`.
    pub fn key_dir(&self, alias: &str) -> Result<PathBuf> {
        validate_alias(alias)?;
        Ok(self.keys.join(alias))
    }

    pub fn private_key(&self, alias: &str, algorithm: KeyAlgorithm) -> Result<PathBuf> {
        Ok(self.key_dir(alias)?.join(algorithm.file_name()))
    }

    pub fn public_key(&self, alias: &str, algorithm: KeyAlgorithm) -> Result<PathBuf> {
        Ok(self
            .key_dir(alias)?
            .join(format!("{}.pub", algorithm.file_name())))
    }

    /// Create the base, keys and backups directories, all owner-only since
    /// they hold key material and copies of the SSH config.
    pub fn ensure_directories(&self) -> Result<()> {
        ensure_private_dir(&self.base)?;
        ensure_private_dir(&self.keys)?;
        ensure_private_dir(&self.backups)?;
        tracing::debug!("Ensured directory layout under {}", self.base.display());
        Ok(())
    }
}
