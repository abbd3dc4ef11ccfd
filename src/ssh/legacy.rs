//! PEM private keys in the encodings that predate the OpenSSH container:
//! PKCS#1 (`RSA PRIVATE KEY`), SEC1 (`EC PRIVATE KEY`) and PKCS#8
//! (`PRIVATE KEY`, `ENCRYPTED PRIVATE KEY`).
//!
//! Keys are decoded with the RustCrypto crates `ssh-key` itself builds on and
//! converted into an [`ssh_key::PrivateKey`], so the rest of the crate only
//! deals with one key type. Traditional `Proc-Type: 4,ENCRYPTED` PEM is
//! recognised but cannot be decrypted.

use pkcs8::DecodePrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use ssh_key::private::{EcdsaKeypair, Ed25519Keypair, KeypairData, RsaKeypair};
use ssh_key::PrivateKey;

use crate::error::{FdevError, Result};

pub const OPENSSH_LABEL: &str = "OPENSSH PRIVATE KEY";

/// Label of the first `-----BEGIN <label>-----` line naming a private key.
///
/// Leading blocks such as `EC PARAMETERS` are skipped.
pub fn pem_label(text: &str) -> Option<&str> {
    text.lines().find_map(|line| {
        line.trim()
            .strip_prefix("-----BEGIN ")
            .and_then(|rest| rest.strip_suffix("-----"))
            .filter(|label| label.ends_with("PRIVATE KEY"))
    })
}

/// Whether the PEM armour marks the key as passphrase protected.
pub fn is_encrypted_pem(text: &str) -> bool {
    text.contains("Proc-Type: 4,ENCRYPTED")
        || pem_label(text).is_some_and(|label| label.contains("ENCRYPTED"))
}

/// Decode a non-OpenSSH PEM private key.
///
/// `passphrase` is only used for `ENCRYPTED PRIVATE KEY` (PKCS#8 PBES2).
pub fn decode_legacy_pem(text: &str, passphrase: Option<&str>) -> Result<PrivateKey> {
    let label = pem_label(text)
        .ok_or_else(|| FdevError::Parse("not a PEM private key".to_string()))?;

    let keypair = match label {
        "RSA PRIVATE KEY" | "EC PRIVATE KEY" if is_encrypted_pem(text) => {
            return Err(FdevError::Parse(
                "Proc-Type encrypted PEM keys are not supported; \
                 convert with `ssh-keygen -p -f <key>`"
                    .to_string(),
            ));
        }
        "RSA PRIVATE KEY" => {
            rsa_keypair(rsa::RsaPrivateKey::from_pkcs1_pem(text).map_err(parse_error)?)?
        }
        "EC PRIVATE KEY" => decode_sec1(text)?,
        "PRIVATE KEY" => decode_pkcs8(text, None)?,
        "ENCRYPTED PRIVATE KEY" => {
            let passphrase = passphrase.filter(|p| !p.is_empty()).ok_or_else(|| {
                FdevError::Parse("key is passphrase-protected; a passphrase is required".to_string())
            })?;
            decode_pkcs8(text, Some(passphrase))
                .map_err(|_| FdevError::Parse("incorrect passphrase".to_string()))?
        }
        other => {
            return Err(FdevError::Parse(format!("unsupported PEM key type '{}'", other)));
        }
    };

    PrivateKey::new(keypair, "").map_err(parse_error)
}

fn parse_error(e: impl std::fmt::Display) -> FdevError {
    FdevError::Parse(e.to_string())
}

fn rsa_keypair(key: rsa::RsaPrivateKey) -> Result<KeypairData> {
    RsaKeypair::try_from(key)
        .map(KeypairData::from)
        .map_err(parse_error)
}

fn p256_keypair(secret: p256::SecretKey) -> KeypairData {
    let public = secret.public_key();
    KeypairData::from(EcdsaKeypair::NistP256 {
        private: secret.into(),
        public: public.into(),
    })
}

fn p384_keypair(secret: p384::SecretKey) -> KeypairData {
    let public = secret.public_key();
    KeypairData::from(EcdsaKeypair::NistP384 {
        private: secret.into(),
        public: public.into(),
    })
}

/// The scalar length and the embedded public point tell the curves apart;
/// P-256 is tried first since a short scalar also fits P-384.
fn decode_sec1(text: &str) -> Result<KeypairData> {
    if let Ok(secret) = p256::SecretKey::from_sec1_pem(text) {
        return Ok(p256_keypair(secret));
    }

    p384::SecretKey::from_sec1_pem(text)
        .map(p384_keypair)
        .map_err(|e| FdevError::Parse(format!("unsupported EC private key: {}", e)))
}

fn decode_pkcs8(text: &str, passphrase: Option<&str>) -> Result<KeypairData> {
    fn load<T: DecodePrivateKey>(text: &str, passphrase: Option<&str>) -> Option<T> {
        match passphrase {
            Some(passphrase) => T::from_pkcs8_encrypted_pem(text, passphrase).ok(),
            None => T::from_pkcs8_pem(text).ok(),
        }
    }

    if let Some(key) = load::<rsa::RsaPrivateKey>(text, passphrase) {
        return rsa_keypair(key);
    }
    if let Some(secret) = load::<p256::SecretKey>(text, passphrase) {
        return Ok(p256_keypair(secret));
    }
    if let Some(secret) = load::<p384::SecretKey>(text, passphrase) {
        return Ok(p384_keypair(secret));
    }
    if let Some(signing_key) = load::<ed25519_dalek::SigningKey>(text, passphrase) {
        return Ok(KeypairData::from(Ed25519Keypair::from_seed(
            &signing_key.to_bytes(),
        )));
    }

    Err(FdevError::Parse("unsupported PKCS#8 key algorithm".to_string()))
}
