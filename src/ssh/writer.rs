//! Committing a merged config to disk.
//!
//! [`apply`] is the only code path that modifies the SSH config: it takes the
//! advisory lock, snapshots the current file, computes the new content with
//! [`generate_applied_config`] and swaps it in with [`write_atomic`].

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;

use super::backup::backup;
use super::merge::{generate_applied_config, Identity};
use crate::error::{FdevError, Result};
use crate::paths::Paths;
use crate::utils::{ensure_private_dir, set_mode, PRIVATE_FILE_MODE};

const LOCK_ATTEMPTS: u32 = 10;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(100);
const STALE_LOCK_AGE: Duration = Duration::from_secs(60);

/// Exclusive lock on a config file, held as `<path>.lock`.
/// The lock file is removed when the guard is dropped.
#[derive(Debug)]
pub struct ConfigLock {
    _lock_file: std::fs::File,
    lock_path: PathBuf,
}

impl Drop for ConfigLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

impl ConfigLock {
    pub fn lock_path(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        target.with_file_name(name)
    }

    /// Acquire the lock for `target`, retrying for about a second.
    ///
    /// A lock file older than a minute is considered left over from a crashed
    /// process and is removed.
    pub fn acquire(target: &Path) -> Result<Self> {
        let lock_path = Self::lock_path(target);
        if let Some(parent) = lock_path.parent() {
            ensure_private_dir(parent)?;
        }

        for attempt in 0..LOCK_ATTEMPTS {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(Self {
                        _lock_file: file,
                        lock_path,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if let Some(age) = lock_age(&lock_path) {
                        if age > STALE_LOCK_AGE {
                            tracing::warn!(
                                "Removing stale lock file {} (age: {:?})",
                                lock_path.display(),
                                age
                            );
                            let _ = std::fs::remove_file(&lock_path);
                            continue;
                        }
                    }

                    if attempt + 1 < LOCK_ATTEMPTS {
                        std::thread::sleep(LOCK_RETRY_DELAY);
                    }
                }
                Err(e) => return Err(FdevError::io("create lock", &lock_path)(e)),
            }
        }

        Err(FdevError::Locked {
            path: target.to_path_buf(),
        })
    }
}

fn lock_age(lock_path: &Path) -> Option<Duration> {
    let modified = std::fs::metadata(lock_path).ok()?.modified().ok()?;
    Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default(),
    )
}

/// Replace `path` with `content` so readers see either the old or the new
/// file, never a partial one.
///
/// The parent directory is created owner-only, the content goes to a temp file
/// in the same directory which is synced, restricted to 0600 and renamed over
/// the target. The temp file is removed if any step fails.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ensure_private_dir(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "config".to_string());
    let temp_path = parent.join(format!("{}.{}.tmp", file_name, std::process::id()));

    if let Err(e) = write_temp_and_rename(&temp_path, path, content) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }

    set_mode(path, PRIVATE_FILE_MODE)?;
    tracing::debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

fn write_temp_and_rename(temp_path: &Path, path: &Path, content: &str) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(PRIVATE_FILE_MODE);
    }

    let mut file = options
        .open(temp_path)
        .map_err(FdevError::io("create", temp_path))?;
    file.write_all(content.as_bytes())
        .map_err(FdevError::io("write", temp_path))?;
    file.sync_all().map_err(FdevError::io("sync", temp_path))?;
    drop(file);

    set_mode(temp_path, PRIVATE_FILE_MODE)?;

    std::fs::rename(temp_path, path).map_err(FdevError::io("replace", path))
}

/// Result of a committed apply.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    /// Snapshot of the previous file, `None` when there was no file yet.
    pub backup: Option<PathBuf>,
    pub config_path: PathBuf,
    pub content: String,
    /// `false` when the file already had exactly this content.
    pub changed: bool,
}

/// Upsert `identity` into the SSH config: lock, back up, merge, write.
///
/// Validation runs before anything is written; if the backup fails the
/// config is left untouched.
pub fn apply(paths: &Paths, identity: &Identity, keep: usize) -> Result<ApplyOutcome> {
    identity.validate()?;

    let config_path = paths.ssh_config().to_path_buf();
    let _lock = ConfigLock::acquire(&config_path)?;

    let previous = match std::fs::read_to_string(&config_path) {
        Ok(content) => Some(content),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(FdevError::io("read", &config_path)(e)),
    };

    let backup_path = backup(&config_path, &paths.backups, keep)?;
    let content = generate_applied_config(paths, identity)?;
    write_atomic(&config_path, &content)?;

    tracing::info!(
        "Applied identity '{}' to {}",
        identity.alias,
        config_path.display()
    );

    Ok(ApplyOutcome {
        backup: backup_path,
        changed: previous.as_deref() != Some(content.as_str()),
        config_path,
        content,
    })
}
