//! Key pair generation for managed identities.
//!
//! Keys live under `keys/<alias>/id_<algorithm>` in OpenSSH private key
//! format (optionally passphrase-encrypted), next to an authorized-keys style
//! `.pub` file. The alias directory is owner-only, the private key 0600 and
//! the public key 0644.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ssh_key::private::{EcdsaKeypair, Ed25519Keypair, KeypairData, RsaKeypair};
use ssh_key::{Algorithm, EcdsaCurve, HashAlg, LineEnding, PrivateKey, PublicKey};

use super::legacy::{decode_legacy_pem, pem_label, OPENSSH_LABEL};
use crate::error::{FdevError, Result};
use crate::paths::Paths;
use crate::utils::{
    ensure_private_dir, remove_file_if_exists, write_file_with_mode, PRIVATE_FILE_MODE,
    PUBLIC_FILE_MODE,
};
use crate::validation::validate_alias;

pub const DEFAULT_RSA_BITS: u32 = 4096;
pub const MIN_RSA_BITS: u32 = 2048;
pub const MAX_RSA_BITS: u32 = 16384;
pub const DEFAULT_ECDSA_BITS: u32 = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    #[default]
    Ed25519,
    Rsa,
    Ecdsa,
}

impl KeyAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgorithm::Ed25519 => "ed25519",
            KeyAlgorithm::Rsa => "rsa",
            KeyAlgorithm::Ecdsa => "ecdsa",
        }
    }

    /// File name of the private key, e.g. `id_ed25519`.
    pub fn file_name(&self) -> &'static str {
        match self {
            KeyAlgorithm::Ed25519 => "id_ed25519",
            KeyAlgorithm::Rsa => "id_rsa",
            KeyAlgorithm::Ecdsa => "id_ecdsa",
        }
    }

    /// Bit length used when the caller passes 0. Ed25519 has no size.
    pub fn default_bits(&self) -> u32 {
        match self {
            KeyAlgorithm::Ed25519 => 0,
            KeyAlgorithm::Rsa => DEFAULT_RSA_BITS,
            KeyAlgorithm::Ecdsa => DEFAULT_ECDSA_BITS,
        }
    }

    pub fn from_ssh(algorithm: &Algorithm) -> Option<Self> {
        match algorithm {
            Algorithm::Ed25519 => Some(KeyAlgorithm::Ed25519),
            Algorithm::Rsa { .. } => Some(KeyAlgorithm::Rsa),
            Algorithm::Ecdsa { .. } => Some(KeyAlgorithm::Ecdsa),
            _ => None,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyAlgorithm {
    type Err = FdevError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "ed25519" => Ok(KeyAlgorithm::Ed25519),
            "rsa" | "rsa4096" => Ok(KeyAlgorithm::Rsa),
            "ecdsa" => Ok(KeyAlgorithm::Ecdsa),
            other => Err(FdevError::validation(
                "algorithm",
                format!("'{}' is not supported (use ed25519, rsa or ecdsa)", other),
            )),
        }
    }
}

/// A validated algorithm / size combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpec {
    pub algorithm: KeyAlgorithm,
    pub bits: u32,
}

impl KeySpec {
    /// Validate `bits` for `algorithm`; 0 selects the algorithm default.
    ///
    /// - ed25519: size is fixed, `bits` is ignored and recorded as 0
    /// - rsa: 2048..=16384, default 4096
    /// - ecdsa: 256, 384 or 521 (P-256 / P-384 / P-521), default 256
    pub fn new(algorithm: KeyAlgorithm, bits: u32) -> Result<Self> {
        let bits = match algorithm {
            KeyAlgorithm::Ed25519 => 0,
            _ if bits == 0 => algorithm.default_bits(),
            KeyAlgorithm::Rsa => {
                if !(MIN_RSA_BITS..=MAX_RSA_BITS).contains(&bits) {
                    return Err(FdevError::validation(
                        "bits",
                        format!(
                            "RSA keys must be between {} and {} bits, got {}",
                            MIN_RSA_BITS, MAX_RSA_BITS, bits
                        ),
                    ));
                }
                bits
            }
            KeyAlgorithm::Ecdsa => {
                if ![256, 384, 521].contains(&bits) {
                    return Err(FdevError::validation(
                        "bits",
                        format!("ECDSA keys must be 256, 384 or 521 bits, got {}", bits),
                    ));
                }
                bits
            }
        };

        Ok(Self { algorithm, bits })
    }

    fn curve(&self) -> EcdsaCurve {
        match self.bits {
            384 => EcdsaCurve::NistP384,
            521 => EcdsaCurve::NistP521,
            _ => EcdsaCurve::NistP256,
        }
    }
}

impl Default for KeySpec {
    fn default() -> Self {
        Self {
            algorithm: KeyAlgorithm::Ed25519,
            bits: 0,
        }
    }
}

/// A key pair managed by the tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMaterial {
    pub alias: String,
    pub algorithm: KeyAlgorithm,
    pub bits: u32,
    pub protected: bool,
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
}

/// Creates key pairs under the `keys/` directory of a [`Paths`] layout.
#[derive(Debug, Clone, Copy)]
pub struct KeyStore<'a> {
    paths: &'a Paths,
}

impl<'a> KeyStore<'a> {
    pub fn new(paths: &'a Paths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &'a Paths {
        self.paths
    }

    /// Algorithm of the first private key present for `alias`, checking
    /// ed25519, rsa and ecdsa in that order.
    pub fn existing_algorithm(&self, alias: &str) -> Result<Option<KeyAlgorithm>> {
        for algorithm in [KeyAlgorithm::Ed25519, KeyAlgorithm::Rsa, KeyAlgorithm::Ecdsa] {
            if self.paths.private_key(alias, algorithm)?.exists() {
                return Ok(Some(algorithm));
            }
        }
        Ok(None)
    }

    /// Generate a new key pair for `alias`.
    ///
    /// Fails with [`FdevError::KeyExists`] when the private key is already
    /// there, so the caller can offer [`KeyStore::force_generate`] instead.
    pub fn generate(
        &self,
        alias: &str,
        comment: &str,
        spec: KeySpec,
        passphrase: Option<&str>,
    ) -> Result<KeyMaterial> {
        validate_alias(alias)?;

        let private_path = self.paths.private_key(alias, spec.algorithm)?;
        if private_path.exists() {
            return Err(FdevError::KeyExists { path: private_path });
        }

        self.write_new(alias, comment, spec, passphrase)
    }

    /// Like [`KeyStore::generate`], but removes an existing key pair first.
    pub fn force_generate(
        &self,
        alias: &str,
        comment: &str,
        spec: KeySpec,
        passphrase: Option<&str>,
    ) -> Result<KeyMaterial> {
        validate_alias(alias)?;

        let private_path = self.paths.private_key(alias, spec.algorithm)?;
        let public_path = self.paths.public_key(alias, spec.algorithm)?;
        if private_path.exists() {
            tracing::info!("Replacing existing key at {}", private_path.display());
        }
        remove_file_if_exists(&private_path)?;
        remove_file_if_exists(&public_path)?;

        self.write_new(alias, comment, spec, passphrase)
    }

    fn write_new(
        &self,
        alias: &str,
        comment: &str,
        spec: KeySpec,
        passphrase: Option<&str>,
    ) -> Result<KeyMaterial> {
        let passphrase = passphrase.filter(|p| !p.is_empty());

        ensure_private_dir(&self.paths.key_dir(alias)?)?;

        let private_key_path = self.paths.private_key(alias, spec.algorithm)?;
        let public_key_path = self.paths.public_key(alias, spec.algorithm)?;

        let key = generate_private_key(spec, comment)?;
        write_key_pair(&key, passphrase, &private_key_path, &public_key_path)?;

        tracing::info!(
            "Generated {} key for '{}' at {}",
            spec.algorithm,
            alias,
            private_key_path.display()
        );

        Ok(KeyMaterial {
            alias: alias.to_string(),
            algorithm: spec.algorithm,
            bits: spec.bits,
            protected: passphrase.is_some(),
            private_key_path,
            public_key_path,
        })
    }
}

fn generate_private_key(spec: KeySpec, comment: &str) -> Result<PrivateKey> {
    let mut rng = rand::thread_rng();

    let keypair = match spec.algorithm {
        KeyAlgorithm::Ed25519 => KeypairData::from(Ed25519Keypair::random(&mut rng)),
        KeyAlgorithm::Rsa => KeypairData::from(
            RsaKeypair::random(&mut rng, spec.bits as usize)
                .map_err(|e| FdevError::KeyGen(format!("RSA-{}: {}", spec.bits, e)))?,
        ),
        KeyAlgorithm::Ecdsa => KeypairData::from(
            EcdsaKeypair::random(&mut rng, spec.curve())
                .map_err(|e| FdevError::KeyGen(format!("ECDSA-{}: {}", spec.bits, e)))?,
        ),
    };

    PrivateKey::new(keypair, comment)
        .map_err(|e| FdevError::KeyGen(format!("Failed to build private key: {}", e)))
}

/// The public half is written from the plaintext key; an encrypted key keeps
/// its comment inside the encrypted section.
fn write_key_pair(
    key: &PrivateKey,
    passphrase: Option<&str>,
    private_path: &Path,
    public_path: &Path,
) -> Result<()> {
    let encrypted;
    let stored = match passphrase {
        Some(passphrase) => {
            encrypted = key
                .encrypt(&mut rand::thread_rng(), passphrase)
                .map_err(|e| FdevError::KeyGen(format!("Failed to encrypt private key: {}", e)))?;
            &encrypted
        }
        None => key,
    };

    let private_openssh = stored
        .to_openssh(LineEnding::LF)
        .map_err(|e| FdevError::KeyGen(format!("Failed to encode private key: {}", e)))?;

    write_file_with_mode(private_path, private_openssh.as_bytes(), PRIVATE_FILE_MODE)?;
    write_public_key(key.public_key(), public_path)
}

fn write_public_key(public_key: &PublicKey, path: &Path) -> Result<()> {
    let public_openssh = public_key
        .to_openssh()
        .map_err(|e| FdevError::KeyGen(format!("Failed to encode public key: {}", e)))?;

    write_file_with_mode(
        path,
        format!("{}\n", public_openssh).as_bytes(),
        PUBLIC_FILE_MODE,
    )
}

/// Load a private key, decrypting it when it is protected.
///
/// OpenSSH keys are read directly; PKCS#1, SEC1 and PKCS#8 keys go through
/// [`decode_legacy_pem`] and come back without a comment.
pub fn load_private_key(path: &Path, passphrase: Option<&str>) -> Result<PrivateKey> {
    let content = std::fs::read_to_string(path).map_err(FdevError::io("read", path))?;

    if pem_label(&content).is_some_and(|label| label != OPENSSH_LABEL) {
        return decode_legacy_pem(&content, passphrase)
            .map_err(|e| FdevError::Parse(format!("{}: {}", path.display(), e)));
    }

    let key = PrivateKey::from_openssh(&content)
        .map_err(|e| FdevError::Parse(format!("{}: {}", path.display(), e)))?;

    if !key.is_encrypted() {
        return Ok(key);
    }

    let passphrase = passphrase.filter(|p| !p.is_empty()).ok_or_else(|| {
        FdevError::Parse(format!(
            "{} is passphrase-protected; a passphrase is required",
            path.display()
        ))
    })?;

    key.decrypt(passphrase).map_err(|e| {
        tracing::debug!("decrypt failed for {}: {}", path.display(), e);
        FdevError::Parse(format!("incorrect passphrase for {}", path.display()))
    })
}

/// Rewrite `public_path` from the private key at `private_path`.
pub fn regenerate_public_key(
    private_path: &Path,
    public_path: &Path,
    passphrase: Option<&str>,
) -> Result<()> {
    let key = load_private_key(private_path, passphrase)?;
    write_public_key(key.public_key(), public_path)?;

    tracing::info!("Regenerated public key at {}", public_path.display());
    Ok(())
}

/// Size in bits of a public key: RSA modulus length, ECDSA curve size,
/// 0 for Ed25519 and anything else.
pub fn public_key_bits(public_key: &PublicKey) -> u32 {
    match public_key.algorithm() {
        Algorithm::Ecdsa { curve } => match curve {
            EcdsaCurve::NistP384 => 384,
            EcdsaCurve::NistP521 => 521,
            _ => 256,
        },
        Algorithm::Rsa { .. } => public_key
            .key_data()
            .rsa()
            .and_then(|rsa| rsa.n.as_positive_bytes())
            .and_then(|n| n.split_first())
            .map(|(first, rest)| rest.len() as u32 * 8 + (8 - first.leading_zeros()))
            .unwrap_or(0),
        _ => 0,
    }
}

/// SHA256 fingerprint (`SHA256:...`) of a public or private key file.
pub fn key_fingerprint(path: &Path) -> Result<String> {
    let key_data = std::fs::read_to_string(path).map_err(FdevError::io("read", path))?;

    if let Ok(private_key) = PrivateKey::from_openssh(&key_data) {
        return Ok(private_key
            .public_key()
            .fingerprint(HashAlg::Sha256)
            .to_string());
    }

    if let Ok(public_key) = PublicKey::from_openssh(key_data.trim()) {
        return Ok(public_key.fingerprint(HashAlg::Sha256).to_string());
    }

    if let Ok(private_key) = decode_legacy_pem(&key_data, None) {
        return Ok(private_key
            .public_key()
            .fingerprint(HashAlg::Sha256)
            .to_string());
    }

    Err(FdevError::Parse(format!(
        "Failed to parse SSH key from {}",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::file_mode;

    fn temp_paths() -> (tempfile::TempDir, Paths) {
        let temp_dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(temp_dir.path().join(".fdev"), temp_dir.path());
        (temp_dir, paths)
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("ed25519".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::Ed25519);
        assert_eq!("".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::Ed25519);
        assert_eq!("RSA".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::Rsa);
        assert_eq!("rsa4096".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::Rsa);
        assert_eq!("ecdsa".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::Ecdsa);
        assert!(matches!(
            "dsa".parse::<KeyAlgorithm>(),
            Err(FdevError::Validation { field: "algorithm", .. })
        ));
    }

    #[test]
    fn test_key_spec_defaults_and_bounds() {
        assert_eq!(KeySpec::new(KeyAlgorithm::Ed25519, 1234).unwrap().bits, 0);
        assert_eq!(KeySpec::new(KeyAlgorithm::Rsa, 0).unwrap().bits, 4096);
        assert_eq!(KeySpec::new(KeyAlgorithm::Rsa, 3072).unwrap().bits, 3072);
        assert_eq!(KeySpec::new(KeyAlgorithm::Ecdsa, 0).unwrap().bits, 256);
        assert_eq!(KeySpec::new(KeyAlgorithm::Ecdsa, 521).unwrap().bits, 521);

        assert!(KeySpec::new(KeyAlgorithm::Rsa, 1024).is_err());
        assert!(KeySpec::new(KeyAlgorithm::Ecdsa, 512).is_err());
    }

    #[test]
    fn test_invalid_alias_fails_before_touching_disk() {
        let (_temp_dir, paths) = temp_paths();
        let store = KeyStore::new(&paths);

        let err = store
            .generate("Bad Alias", "", KeySpec::default(), None)
            .unwrap_err();
        assert!(matches!(err, FdevError::Validation { field: "alias", .. }));
        assert!(!paths.keys.exists());
    }

    #[test]
    fn test_generate_ed25519_layout_and_permissions() {
        let (_temp_dir, paths) = temp_paths();
        let store = KeyStore::new(&paths);

        let material = store
            .generate("github-work", "me@example.com", KeySpec::default(), None)
            .unwrap();

        assert_eq!(material.algorithm, KeyAlgorithm::Ed25519);
        assert!(!material.protected);
        assert_eq!(
            material.private_key_path,
            paths.keys.join("github-work").join("id_ed25519")
        );
        assert_eq!(
            material.public_key_path,
            paths.keys.join("github-work").join("id_ed25519.pub")
        );

        let private = PrivateKey::from_openssh(
            std::fs::read_to_string(&material.private_key_path).unwrap(),
        )
        .unwrap();
        assert_eq!(private.algorithm(), Algorithm::Ed25519);

        let public = std::fs::read_to_string(&material.public_key_path).unwrap();
        assert!(public.starts_with("ssh-ed25519 "));
        assert!(public.trim_end().ends_with("me@example.com"));
        assert!(public.ends_with('\n'));

        #[cfg(unix)]
        {
            assert_eq!(file_mode(&material.private_key_path), Some(0o600));
            assert_eq!(file_mode(&material.public_key_path), Some(0o644));
            assert_eq!(file_mode(&paths.keys.join("github-work")), Some(0o700));
        }
    }

    #[test]
    fn test_generate_twice_fails_and_force_replaces() {
        let (_temp_dir, paths) = temp_paths();
        let store = KeyStore::new(&paths);

        let first = store.generate("x", "", KeySpec::default(), None).unwrap();
        let first_public = std::fs::read_to_string(&first.public_key_path).unwrap();

        let err = store.generate("x", "", KeySpec::default(), None).unwrap_err();
        assert!(err.is_key_exists());
        // The existing key was not touched
        assert_eq!(
            std::fs::read_to_string(&first.public_key_path).unwrap(),
            first_public
        );

        let second = store
            .force_generate("x", "", KeySpec::default(), None)
            .unwrap();
        let second_public = std::fs::read_to_string(&second.public_key_path).unwrap();
        assert_ne!(first_public, second_public);
    }

    #[test]
    fn test_different_algorithms_coexist_for_alias() {
        let (_temp_dir, paths) = temp_paths();
        let store = KeyStore::new(&paths);

        store.generate("work", "", KeySpec::default(), None).unwrap();
        let ecdsa = store
            .generate("work", "", KeySpec::new(KeyAlgorithm::Ecdsa, 384).unwrap(), None)
            .unwrap();

        assert_eq!(ecdsa.bits, 384);
        assert_eq!(
            store.existing_algorithm("work").unwrap(),
            Some(KeyAlgorithm::Ed25519)
        );
        assert_eq!(store.existing_algorithm("nobody").unwrap(), None);
        let public = std::fs::read_to_string(&ecdsa.public_key_path).unwrap();
        assert!(public.starts_with("ecdsa-sha2-nistp384 "));
        assert_eq!(
            public_key_bits(&PublicKey::from_openssh(public.trim()).unwrap()),
            384
        );
    }

    #[test]
    fn test_protected_key_and_public_regeneration() {
        let (_temp_dir, paths) = temp_paths();
        let store = KeyStore::new(&paths);

        let material = store
            .generate("secret", "c", KeySpec::default(), Some("hunter2"))
            .unwrap();
        assert!(material.protected);

        let private = PrivateKey::from_openssh(
            std::fs::read_to_string(&material.private_key_path).unwrap(),
        )
        .unwrap();
        assert!(private.is_encrypted());

        let original_public = std::fs::read_to_string(&material.public_key_path).unwrap();
        std::fs::remove_file(&material.public_key_path).unwrap();

        // Missing and wrong passphrases are parse errors
        let err = regenerate_public_key(&material.private_key_path, &material.public_key_path, None)
            .unwrap_err();
        assert!(matches!(err, FdevError::Parse(_)));
        let err = regenerate_public_key(
            &material.private_key_path,
            &material.public_key_path,
            Some("wrong"),
        )
        .unwrap_err();
        assert!(matches!(err, FdevError::Parse(_)));
        assert!(!material.public_key_path.exists());

        regenerate_public_key(
            &material.private_key_path,
            &material.public_key_path,
            Some("hunter2"),
        )
        .unwrap();
        assert_eq!(
            std::fs::read_to_string(&material.public_key_path).unwrap(),
            original_public
        );
    }

    #[test]
    fn test_regenerate_rejects_garbage() {
        let (temp_dir, _paths) = temp_paths();
        let private = temp_dir.path().join("id_bad");
        std::fs::write(&private, "not a key").unwrap();

        let err =
            regenerate_public_key(&private, &temp_dir.path().join("id_bad.pub"), None).unwrap_err();
        assert!(matches!(err, FdevError::Parse(_)));
    }

    #[test]
    fn test_regenerate_from_pkcs1_key() {
        let temp_dir = tempfile::tempdir().unwrap();
        let private = temp_dir.path().join("id_rsa");
        let public = temp_dir.path().join("id_rsa.pub");
        std::fs::write(&private, include_str!("testdata/rsa_pkcs1.pem")).unwrap();

        regenerate_public_key(&private, &public, None).unwrap();

        let written = PublicKey::from_openssh(std::fs::read_to_string(&public).unwrap().trim()).unwrap();
        let expected =
            PublicKey::from_openssh(include_str!("testdata/rsa_pkcs1.pub").trim()).unwrap();
        assert_eq!(written.key_data(), expected.key_data());
        assert_eq!(public_key_bits(&written), 2048);
        assert_eq!(
            key_fingerprint(&private).unwrap(),
            expected.fingerprint(HashAlg::Sha256).to_string()
        );
    }

    #[test]
    fn test_regenerate_from_encrypted_pkcs8_key() {
        let temp_dir = tempfile::tempdir().unwrap();
        let private = temp_dir.path().join("id_ecdsa");
        let public = temp_dir.path().join("id_ecdsa.pub");
        std::fs::write(&private, include_str!("testdata/ec256_pkcs8_encrypted.pem")).unwrap();

        let err = regenerate_public_key(&private, &public, None).unwrap_err();
        assert!(matches!(err, FdevError::Parse(_)));

        regenerate_public_key(&private, &public, Some("hunter2")).unwrap();
        let written = std::fs::read_to_string(&public).unwrap();
        assert!(written.starts_with("ecdsa-sha2-nistp256 "));
    }

    #[test]
    fn test_key_fingerprint() {
        let (_temp_dir, paths) = temp_paths();
        let material = KeyStore::new(&paths)
            .generate("fp", "", KeySpec::default(), None)
            .unwrap();

        let from_private = key_fingerprint(&material.private_key_path).unwrap();
        let from_public = key_fingerprint(&material.public_key_path).unwrap();
        assert!(from_private.starts_with("SHA256:"));
        assert_eq!(from_private, from_public);
    }

    // RSA generation is slow in debug builds. Run with `cargo test -- --ignored`.
    #[test]
    #[ignore]
    fn test_generate_rsa_reports_modulus_bits() {
        let (_temp_dir, paths) = temp_paths();
        let material = KeyStore::new(&paths)
            .generate("rsa", "", KeySpec::new(KeyAlgorithm::Rsa, 2048).unwrap(), None)
            .unwrap();

        assert_eq!(material.private_key_path.file_name().unwrap(), "id_rsa");
        let public = std::fs::read_to_string(&material.public_key_path).unwrap();
        assert_eq!(
            public_key_bits(&PublicKey::from_openssh(public.trim()).unwrap()),
            2048
        );
    }
}
