//! Local SSH identity management.
//!
//! ## Modules
//!
//! - [`parser`] - split `~/.ssh/config` into header lines and `Host` blocks
//! - [`merge`] - upsert a managed block for an [`Identity`]
//! - [`diff`] - dry-run preview of an apply
//! - [`backup`] - timestamped snapshots with pruning
//! - [`writer`] - lock, back up and atomically write the merged config
//! - [`keys`] - key pair generation and public key regeneration
//! - [`import`] - scan for and adopt existing key pairs
//! - [`legacy`] - PKCS#1, SEC1 and PKCS#8 private keys

pub mod backup;
pub mod diff;
pub mod import;
pub mod keys;
pub mod legacy;
pub mod merge;
pub mod parser;
pub mod writer;

pub use diff::{preview_apply, DiffKind, DiffLine, DiffSummary};
pub use import::scan_foreign_keys;
pub use keys::{regenerate_public_key, KeyAlgorithm, KeyMaterial, KeySpec, KeyStore};
pub use merge::{Identity, KeyRef};
pub use writer::apply;
