//! Input validation shared by the config merger and the key store.
//!
//! Everything here runs before the filesystem is touched.

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::error::{FdevError, Result};

static ALIAS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_-]+$").expect("alias pattern is valid"));

static HOST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s:/]+(:[0-9]+)?$").expect("host pattern is valid"));

/// Check that an alias is usable both as an SSH `Host` name and as a
/// directory name under `keys/`.
pub fn validate_alias(alias: &str) -> Result<()> {
    if ALIAS_RE.is_match(alias) {
        Ok(())
    } else {
        Err(FdevError::validation(
            "alias",
            format!("'{}' may only contain a-z, 0-9, - and _", alias),
        ))
    }
}

/// Check a `HostName` value: bare host with an optional port, no scheme.
pub fn validate_hostname(hostname: &str) -> Result<()> {
    let host = hostname.trim();
    if host.is_empty() {
        return Err(FdevError::validation("hostname", "required"));
    }

    let lower = host.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Err(FdevError::validation(
            "hostname",
            format!("'{}' must not include a protocol", host),
        ));
    }

    if !HOST_RE.is_match(host) {
        return Err(FdevError::validation(
            "hostname",
            format!("'{}' is not a valid host", host),
        ));
    }

    Ok(())
}

/// Turn an arbitrary name (e.g. a key file name) into a valid alias.
///
/// Lower-cases, collapses every run of characters outside `[a-z0-9]` into a
/// single `-`, trims dashes from both ends and falls back to `key`.
pub fn sanitize_alias(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.trim().to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }

    if out.is_empty() {
        "key".to_string()
    } else {
        out
    }
}
