//! Upsert of managed `Host` blocks.
//!
//! [`merge`] is pure: it takes a parsed config and returns the complete new
//! file text. [`generate_applied_config`] adds the parse step and is the only
//! entry point used by both the preview and the commit path, so what is
//! previewed is exactly what gets written.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::keys::KeyAlgorithm;
use super::parser::{self, ConfigBlock, ParsedConfig};
use crate::error::{FdevError, Result};
use crate::paths::Paths;
use crate::validation::{validate_alias, validate_hostname};

/// Where the private key of an identity lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRef {
    /// An explicit private key file.
    Path(PathBuf),
    /// A key pair managed under `keys/<alias>/`.
    Store {
        alias: String,
        algorithm: KeyAlgorithm,
    },
}

/// An SSH identity to be materialised as a managed `Host` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub alias: String,
    pub hostname: String,
    pub key: KeyRef,
}

impl Identity {
    pub fn new(alias: impl Into<String>, hostname: impl Into<String>, key: KeyRef) -> Self {
        Self {
            alias: alias.into(),
            hostname: hostname.into(),
            key,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_alias(&self.alias)?;
        validate_hostname(&self.hostname)?;
        if let KeyRef::Store { alias, .. } = &self.key {
            validate_alias(alias)?;
        }
        Ok(())
    }

    /// Absolute path written to `IdentityFile`.
    ///
    /// Explicit paths are tilde-expanded, then resolved against the current
    /// directory.
    pub fn key_path(&self, paths: &Paths) -> Result<PathBuf> {
        match &self.key {
            KeyRef::Path(path) => {
                let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref());
                std::path::absolute(&expanded).map_err(FdevError::io("resolve", &expanded))
            }
            KeyRef::Store { alias, algorithm } => paths.private_key(alias, *algorithm),
        }
    }
}

/// Lines of the managed block for `identity`, without the marker comments.
pub fn managed_block(identity: &Identity, key_path: &str) -> Vec<String> {
    vec![
        format!("Host {}", identity.alias),
        format!("  HostName {}", identity.hostname.trim()),
        "  User git".to_string(),
        format!("  IdentityFile {}", key_path),
        "  IdentitiesOnly yes".to_string(),
    ]
}

/// Insert or update the managed block for `identity` and render the file.
///
/// An existing managed block with the same alias is replaced in place;
/// otherwise the block is appended. Unmanaged blocks, including one that
/// happens to share the alias, are never touched.
pub fn merge(mut parsed: ParsedConfig, identity: &Identity, key_path: &str) -> String {
    let lines = managed_block(identity, key_path);

    match parsed
        .blocks
        .iter_mut()
        .find(|b| b.is_managed && b.host_alias == identity.alias)
    {
        Some(existing) => existing.lines = lines,
        None => parsed
            .blocks
            .push(ConfigBlock::managed(identity.alias.clone(), lines)),
    }

    parsed.render()
}

/// Compute the SSH config text that applying `identity` would produce.
pub fn generate_applied_config(paths: &Paths, identity: &Identity) -> Result<String> {
    identity.validate()?;

    let parsed = parser::parse(paths.ssh_config())?;
    let key_path = identity.key_path(paths)?;

    Ok(merge(parsed, identity, &key_path.to_string_lossy()))
}
