//! Environment checks for `fdev doctor`.

use serde::Serialize;

use crate::paths::Paths;
use crate::utils::{file_mode, PRIVATE_DIR_MODE, PRIVATE_FILE_MODE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub name: String,
    pub ok: bool,
    /// "OK", or how to fix it.
    pub message: String,
}

impl Check {
    fn new(name: impl Into<String>, ok: bool, fix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok,
            message: if ok { "OK".to_string() } else { fix.into() },
        }
    }
}

pub fn run(paths: &Paths) -> Vec<Check> {
    let mut checks = Vec::with_capacity(5);

    let ssh_dir = paths.ssh_dir();
    let ssh_dir_exists = ssh_dir.is_dir();
    checks.push(Check::new(
        format!("{} exists", ssh_dir.display()),
        ssh_dir_exists,
        format!("Create it with: mkdir -m 700 {}", ssh_dir.display()),
    ));

    // Only meaningful where Unix permission bits exist
    if cfg!(unix) {
        let mode_ok = ssh_dir_exists && file_mode(ssh_dir) == Some(PRIVATE_DIR_MODE);
        checks.push(Check::new(
            format!("{} has mode 0700", ssh_dir.display()),
            mode_ok,
            format!("Fix it with: chmod 700 {}", ssh_dir.display()),
        ));

        let config = paths.ssh_config();
        if config.exists() {
            checks.push(Check::new(
                format!("{} has mode 0600", config.display()),
                file_mode(config) == Some(PRIVATE_FILE_MODE),
                format!("Fix it with: chmod 600 {}", config.display()),
            ));
        }
    }

    checks.push(Check::new(
        "ssh available on PATH",
        which::which("ssh").is_ok(),
        "Install OpenSSH",
    ));

    checks.push(Check::new(
        format!("{} created", paths.base.display()),
        paths.base.is_dir(),
        "Base directory not found; run any fdev command that writes, e.g. fdev key generate",
    ));

    checks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(checks: &'a [Check], needle: &str) -> &'a Check {
        checks
            .iter()
            .find(|c| c.name.contains(needle))
            .unwrap_or_else(|| panic!("no check containing {:?}", needle))
    }

    #[test]
    fn test_missing_dirs_are_reported() {
        let temp_dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(temp_dir.path().join(".fdev"), temp_dir.path());

        let checks = run(&paths);

        let ssh = find(&checks, ".ssh exists");
        assert!(!ssh.ok);
        assert!(ssh.message.contains("mkdir -m 700"));
        assert!(!find(&checks, ".fdev created").ok);
    }

    #[cfg(unix)]
    #[test]
    fn test_permission_checks() {
        let temp_dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(temp_dir.path().join(".fdev"), temp_dir.path());
        paths.ensure_directories().unwrap();
        crate::utils::ensure_dir_with_mode(paths.ssh_dir(), 0o755).unwrap();
        std::fs::write(paths.ssh_config(), "Host a\n").unwrap();
        crate::utils::set_mode(paths.ssh_config(), 0o644).unwrap();

        let checks = run(&paths);
        assert!(find(&checks, ".ssh exists").ok);
        assert!(!find(&checks, "mode 0700").ok);
        assert!(!find(&checks, "mode 0600").ok);
        assert!(find(&checks, ".fdev created").ok);

        crate::utils::set_mode(paths.ssh_dir(), 0o700).unwrap();
        crate::utils::set_mode(paths.ssh_config(), 0o600).unwrap();

        let checks = run(&paths);
        assert!(find(&checks, "mode 0700").ok);
        assert_eq!(find(&checks, "mode 0600").message, "OK");
    }
}
