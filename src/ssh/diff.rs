//! Dry-run preview of an apply.
//!
//! The diff is positional, not LCS: line `i` of the current file is compared
//! with line `i` of the new one. An inserted line therefore shows up as a run
//! of remove/add pairs below it. That is acceptable for a preview, which
//! never writes anything.

use serde::{Deserialize, Serialize};

use super::merge::{generate_applied_config, Identity};
use crate::error::{FdevError, Result};
use crate::paths::Paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Unchanged,
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: DiffKind,
    pub text: String,
}

impl DiffLine {
    fn new(kind: DiffKind, text: &str) -> Self {
        Self {
            kind,
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl DiffSummary {
    pub fn of(lines: &[DiffLine]) -> Self {
        lines.iter().fold(Self::default(), |mut acc, line| {
            match line.kind {
                DiffKind::Added => acc.added += 1,
                DiffKind::Removed => acc.removed += 1,
                DiffKind::Unchanged => acc.unchanged += 1,
            }
            acc
        })
    }

    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split('\n').collect()
    }
}

/// Positional line diff of `current` against `next`.
pub fn diff_lines(current: &str, next: &str) -> Vec<DiffLine> {
    let old = split_lines(current);
    let new = split_lines(next);

    let mut out = Vec::with_capacity(old.len().max(new.len()));
    for i in 0..old.len().max(new.len()) {
        match (old.get(i), new.get(i)) {
            (Some(a), Some(b)) if a == b => out.push(DiffLine::new(DiffKind::Unchanged, a)),
            (Some(a), Some(b)) => {
                out.push(DiffLine::new(DiffKind::Removed, a));
                out.push(DiffLine::new(DiffKind::Added, b));
            }
            (Some(a), None) => out.push(DiffLine::new(DiffKind::Removed, a)),
            (None, Some(b)) => out.push(DiffLine::new(DiffKind::Added, b)),
            (None, None) => {}
        }
    }

    out
}

/// What [`crate::ssh::writer::apply`] would change, without writing or
/// taking a backup.
pub fn preview_apply(paths: &Paths, identity: &Identity) -> Result<Vec<DiffLine>> {
    let config_path = paths.ssh_config();
    let current = match std::fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(FdevError::io("read", config_path)(e)),
    };

    let next = generate_applied_config(paths, identity)?;
    Ok(diff_lines(&current, &next))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::ssh::merge::KeyRef;
    use crate::ssh::writer::apply;

    /// Rebuild one side of the diff from its lines.
    fn side(lines: &[DiffLine], skip: DiffKind) -> String {
        lines
            .iter()
            .filter(|l| l.kind != skip)
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn kinds(lines: &[DiffLine]) -> Vec<DiffKind> {
        lines.iter().map(|l| l.kind).collect()
    }

    #[test]
    fn test_identical_texts_are_unchanged() {
        let lines = diff_lines("a\nb\n", "a\nb\n");
        assert!(lines.iter().all(|l| l.kind == DiffKind::Unchanged));
        assert!(DiffSummary::of(&lines).is_noop());
    }

    #[test]
    fn test_mismatch_emits_removed_then_added() {
        let lines = diff_lines("a\nb", "a\nc");
        assert_eq!(
            lines,
            vec![
                DiffLine::new(DiffKind::Unchanged, "a"),
                DiffLine::new(DiffKind::Removed, "b"),
                DiffLine::new(DiffKind::Added, "c"),
            ]
        );
    }

    #[test]
    fn test_longer_side_is_pure_add_or_remove() {
        assert_eq!(
            kinds(&diff_lines("a", "a\nb\nc")),
            vec![DiffKind::Unchanged, DiffKind::Added, DiffKind::Added]
        );
        assert_eq!(
            kinds(&diff_lines("a\nb\nc", "a")),
            vec![DiffKind::Unchanged, DiffKind::Removed, DiffKind::Removed]
        );
    }

    #[test]
    fn test_empty_current_is_all_added() {
        let lines = diff_lines("", "Host a\n");
        assert!(lines.iter().all(|l| l.kind == DiffKind::Added));
        assert_eq!(side(&lines, DiffKind::Removed), "Host a\n");
    }

    #[test]
    fn test_insertion_shifts_into_pairs() {
        let summary = DiffSummary::of(&diff_lines("a\nb\nc", "x\na\nb\nc"));
        assert_eq!(summary.removed, 3);
        assert_eq!(summary.added, 4);
        assert_eq!(summary.unchanged, 0);
    }

    #[test]
    fn test_both_sides_can_be_rebuilt() {
        let current = "# c\n\nHost a\n  User a\n";
        let next = "# c\n\nHost a\n  User b\n\nHost z\n";
        let lines = diff_lines(current, next);

        assert_eq!(side(&lines, DiffKind::Added), current);
        assert_eq!(side(&lines, DiffKind::Removed), next);
    }

    #[test]
    fn test_preview_matches_apply_and_writes_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(temp_dir.path().join(".fdev"), temp_dir.path());
        std::fs::create_dir_all(paths.ssh_dir()).unwrap();
        let original = "Host github.com\n  HostName github.com\n";
        std::fs::write(paths.ssh_config(), original).unwrap();

        let identity = Identity::new(
            "github-work",
            "github.com",
            KeyRef::Path(PathBuf::from("/k/id_ed25519")),
        );

        let preview = preview_apply(&paths, &identity).unwrap();
        assert_eq!(std::fs::read_to_string(paths.ssh_config()).unwrap(), original);
        assert!(!paths.backups.exists());

        let outcome = apply(&paths, &identity, 10).unwrap();
        assert_eq!(side(&preview, DiffKind::Removed), outcome.content);
    }

    #[test]
    fn test_diff_line_serializes_lowercase_kind() {
        let json = serde_json::to_string(&DiffLine::new(DiffKind::Added, "x")).unwrap();
        assert_eq!(json, r#"{"kind":"added","text":"x"}"#);
    }
}
