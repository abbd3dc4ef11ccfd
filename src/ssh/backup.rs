//! Timestamped snapshots of the SSH config, pruned to the newest N.

use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, Utc};

use crate::error::{FdevError, Result};
use crate::utils::{copy_file_with_mode, ensure_private_dir, PRIVATE_FILE_MODE};

/// UTC, so names sort chronologically across DST changes.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const TIMESTAMP_LEN: usize = 15;

/// Copy `path` into `backup_dir` as `<file name>_<YYYYMMDD_HHMMSS>` and prune
/// the directory down to `keep` snapshots of that file.
///
/// Returns `None` without touching anything when `path` does not exist.
pub fn backup(path: &Path, backup_dir: &Path, keep: usize) -> Result<Option<PathBuf>> {
    if !path.exists() {
        tracing::debug!("Nothing to back up at {}", path.display());
        return Ok(None);
    }

    ensure_private_dir(backup_dir)?;

    let prefix = backup_prefix(path);
    let target = next_backup_path(backup_dir, &prefix);

    copy_file_with_mode(path, &target, PRIVATE_FILE_MODE)?;
    tracing::info!("Backed up {} to {}", path.display(), target.display());

    prune(backup_dir, &prefix, keep)?;

    Ok(Some(target))
}

/// `ssh_config` for `~/.ssh/config`, `<name>` otherwise, plus the `_` separator.
pub fn backup_prefix(path: &Path) -> String {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some("config") | None => crate::paths::SSH_CONFIG_BACKUP_PREFIX,
        Some(name) => name,
    };
    format!("{}_", name)
}

/// First free name for this second. A second snapshot within the same second
/// gets `_001`, `_002`, ... which still sorts after the first one.
fn next_backup_path(backup_dir: &Path, prefix: &str) -> PathBuf {
    let stamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();
    let base = backup_dir.join(format!("{}{}", prefix, stamp));
    if !base.exists() {
        return base;
    }

    (1..)
        .map(|n| backup_dir.join(format!("{}{}_{:03}", prefix, stamp, n)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(base)
}

/// Whether `name` is `<prefix><YYYYMMDD_HHMMSS>`, optionally with a `_NNN`
/// same-second suffix. A longer prefix such as `ssh_config_work_` never
/// matches `ssh_config_`.
fn is_snapshot_name(name: &str, prefix: &str) -> bool {
    let Some(rest) = name.strip_prefix(prefix) else {
        return false;
    };
    let Some(stamp) = rest.get(..TIMESTAMP_LEN) else {
        return false;
    };
    if NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_err() {
        return false;
    }

    match &rest[TIMESTAMP_LEN..] {
        "" => true,
        suffix => suffix
            .strip_prefix('_')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())),
    }
}

/// Snapshots of `prefix` in `dir`, oldest first.
pub fn list_backups(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(FdevError::io("list", dir)(e)),
    };

    let mut backups: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| is_snapshot_name(&entry.file_name().to_string_lossy(), prefix))
        .map(|entry| entry.path())
        .collect();

    backups.sort();
    Ok(backups)
}

/// Delete all but the newest `keep` snapshots. Returns the removed paths.
pub fn prune(dir: &Path, prefix: &str, keep: usize) -> Result<Vec<PathBuf>> {
    let backups = list_backups(dir, prefix)?;
    if backups.len() <= keep {
        return Ok(Vec::new());
    }

    let excess = backups.len() - keep;
    let mut removed = Vec::with_capacity(excess);
    for old in backups.into_iter().take(excess) {
        std::fs::remove_file(&old).map_err(FdevError::io("remove", &old))?;
        tracing::debug!("Pruned backup {}", old.display());
        removed.push(old);
    }

    Ok(removed)
}
