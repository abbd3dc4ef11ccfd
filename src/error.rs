use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FdevError {
    #[error("Failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A private key already exists where a new one would be written.
    /// Callers match on this to offer an overwrite instead of failing.
    #[error("Key already exists at {}", path.display())]
    KeyExists { path: PathBuf },

    #[error("Key parse error: {0}")]
    Parse(String),

    #[error("Key generation failed: {0}")]
    KeyGen(String),

    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{} is locked by another fdev process", path.display())]
    Locked { path: PathBuf },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dialog error: {0}")]
    Dialog(#[from] dialoguer::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl FdevError {
    /// Returns a closure that wraps an `io::Error` with the failed operation
    /// and the path it was applied to. Meant for `map_err`.
    pub fn io(op: &'static str, path: impl AsRef<Path>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        move |source| FdevError::Io { op, path, source }
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn is_key_exists(&self) -> bool {
        matches!(self, Self::KeyExists { .. })
    }
}

pub type Result<T> = std::result::Result<T, FdevError>;
