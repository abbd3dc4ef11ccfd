//! Adopting key pairs that were created outside the tool, usually in `~/.ssh`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use ssh_key::{PrivateKey, PublicKey};

use super::keys::{public_key_bits, KeyAlgorithm, KeyMaterial, KeyStore};
use super::legacy::{decode_legacy_pem, is_encrypted_pem, pem_label, OPENSSH_LABEL};
use crate::error::{FdevError, Result};
use crate::utils::{copy_file_with_mode, ensure_private_dir, PRIVATE_FILE_MODE, PUBLIC_FILE_MODE};
use crate::validation::sanitize_alias;

/// A private/public key pair found by [`scan_foreign_keys`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    /// File name of the private key, e.g. `id_ed25519`.
    pub name: String,
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    /// `None` when the type could not be determined.
    pub algorithm: Option<KeyAlgorithm>,
    /// 0 when unknown or not applicable.
    pub bits: u32,
    pub protected: bool,
}

/// Find `id_*` private keys in `dir` that have a `<name>.pub` sibling.
///
/// Symlinked keys are followed. Unreadable files are skipped with a warning.
/// Results are sorted by name.
pub fn scan_foreign_keys(dir: &Path) -> Result<Vec<ForeignKey>> {
    let entries = std::fs::read_dir(dir).map_err(FdevError::io("list", dir))?;

    let mut found = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with("id_") || name.ends_with(".pub") {
            continue;
        }

        let private_key_path = entry.path();
        if !private_key_path.is_file() {
            continue;
        }

        let public_key_path = dir.join(format!("{}.pub", name));
        if !public_key_path.is_file() {
            continue;
        }

        let bytes = match std::fs::read(&private_key_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", private_key_path.display(), e);
                continue;
            }
        };

        let mut detected = detect_key_type(&bytes);

        // A guess from the PEM label; the public half knows better
        if detected.inferred {
            if let Some((algorithm, bits)) = read_public_key_type(&public_key_path) {
                detected.algorithm = Some(algorithm);
                detected.bits = bits;
            }
        }

        tracing::debug!("Found {} ({:?})", name, detected);

        found.push(ForeignKey {
            name,
            private_key_path,
            public_key_path,
            algorithm: detected.algorithm,
            bits: detected.bits,
            protected: detected.protected,
        });
    }

    found.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(found)
}

/// What could be learned about a private key file without a passphrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedKey {
    /// `None` when the file is not a PEM private key.
    pub algorithm: Option<KeyAlgorithm>,
    /// 0 when unknown or not applicable.
    pub bits: u32,
    pub protected: bool,
    /// The algorithm is a guess from the PEM label, with size 0.
    pub inferred: bool,
}

impl DetectedKey {
    const UNKNOWN: DetectedKey = DetectedKey {
        algorithm: None,
        bits: 0,
        protected: false,
        inferred: false,
    };

    fn from_key(key: &PrivateKey) -> Self {
        let public = key.public_key();
        DetectedKey {
            algorithm: KeyAlgorithm::from_ssh(&public.algorithm()),
            bits: public_key_bits(public),
            protected: key.is_encrypted(),
            inferred: false,
        }
    }
}

/// Classify private key bytes.
///
/// OpenSSH-format keys are parsed; their public half is stored in clear, so
/// algorithm and size are known even when the key is encrypted. Unencrypted
/// PKCS#1, SEC1 and PKCS#8 keys are decoded. Anything else that is PEM
/// armoured falls back to the label: `RSA` and `EC` labels name their
/// algorithm, any other label is taken as ed25519. Input without a private
/// key PEM block is unknown.
pub fn detect_key_type(bytes: &[u8]) -> DetectedKey {
    let text = String::from_utf8_lossy(bytes);
    let Some(label) = pem_label(&text) else {
        return DetectedKey::UNKNOWN;
    };

    let error = if label == OPENSSH_LABEL {
        match PrivateKey::from_openssh(text.as_bytes()) {
            Ok(key) => return DetectedKey::from_key(&key),
            Err(e) => e.to_string().to_lowercase(),
        }
    } else if is_encrypted_pem(&text) {
        String::new()
    } else {
        match decode_legacy_pem(&text, None) {
            Ok(key) => return DetectedKey::from_key(&key),
            Err(e) => e.to_string().to_lowercase(),
        }
    };

    let protected = is_encrypted_pem(&text)
        || ["passphrase", "encrypted", "decrypt"]
            .iter()
            .any(|needle| error.contains(needle));

    let algorithm = if label.starts_with("RSA ") {
        KeyAlgorithm::Rsa
    } else if label.starts_with("EC ") {
        KeyAlgorithm::Ecdsa
    } else {
        KeyAlgorithm::Ed25519
    };

    DetectedKey {
        algorithm: Some(algorithm),
        bits: 0,
        protected,
        inferred: true,
    }
}

fn read_public_key_type(path: &Path) -> Option<(KeyAlgorithm, u32)> {
    let content = std::fs::read_to_string(path).ok()?;
    let public = PublicKey::from_openssh(content.trim()).ok()?;
    let algorithm = KeyAlgorithm::from_ssh(&public.algorithm())?;
    Some((algorithm, public_key_bits(&public)))
}

impl KeyStore<'_> {
    /// Copy a foreign key pair into `keys/<alias>/`.
    ///
    /// The alias is `new_alias` (or the key file name) sanitised; when a key
    /// directory with that alias already exists, `-2`, `-3`, ... is appended.
    pub fn import_foreign_key(
        &self,
        candidate: &ForeignKey,
        new_alias: Option<&str>,
    ) -> Result<KeyMaterial> {
        let algorithm = candidate.algorithm.ok_or_else(|| {
            FdevError::validation(
                "algorithm",
                format!("cannot determine the key type of {}", candidate.name),
            )
        })?;

        let base = sanitize_alias(new_alias.unwrap_or(&candidate.name));
        let alias = self.unique_alias(&base)?;

        let key_dir = self.paths().key_dir(&alias)?;
        ensure_private_dir(&key_dir)?;

        let private_key_path = self.paths().private_key(&alias, algorithm)?;
        let public_key_path = self.paths().public_key(&alias, algorithm)?;

        copy_file_with_mode(&candidate.private_key_path, &private_key_path, PRIVATE_FILE_MODE)?;
        copy_file_with_mode(&candidate.public_key_path, &public_key_path, PUBLIC_FILE_MODE)?;

        tracing::info!(
            "Imported {} as '{}'",
            candidate.private_key_path.display(),
            alias
        );

        Ok(KeyMaterial {
            alias,
            algorithm,
            bits: candidate.bits,
            protected: candidate.protected,
            private_key_path,
            public_key_path,
        })
    }

    fn unique_alias(&self, base: &str) -> Result<String> {
        if !self.paths().key_dir(base)?.exists() {
            return Ok(base.to_string());
        }

        let mut n = 2;
        loop {
            let candidate = format!("{}-{}", base, n);
            if !self.paths().key_dir(&candidate)?.exists() {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}
