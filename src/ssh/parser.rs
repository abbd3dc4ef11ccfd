//! SSH client config parsing.
//!
//! The parser is deliberately shallow: it only splits the file into the lines
//! before the first `Host` stanza and one [`ConfigBlock`] per stanza, keeping
//! every line verbatim. Blocks written by this tool are recognised by the
//! `# BEGIN FDEV <alias>` marker right before their `Host` line.
//!
//! Blank lines at the end of the header and of each block are separators,
//! not content. They are dropped while parsing and re-created by
//! [`ParsedConfig::render`], which is what keeps repeated applies stable.

use std::path::Path;

use serde::Serialize;

use crate::error::{FdevError, Result};

pub const BEGIN_MARKER: &str = "# BEGIN FDEV ";
pub const END_MARKER: &str = "# END FDEV ";

/// One `Host` stanza. `lines[0]` is the `Host <alias>` line itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigBlock {
    pub host_alias: String,
    pub is_managed: bool,
    pub lines: Vec<String>,
}

impl ConfigBlock {
    pub fn managed(alias: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            host_alias: alias.into(),
            is_managed: true,
            lines,
        }
    }

    /// Value of the first `<keyword> <value>` line in the block body,
    /// keyword matched case-insensitively.
    pub fn option(&self, keyword: &str) -> Option<&str> {
        self.lines.iter().skip(1).find_map(|line| {
            let mut parts = line.split_whitespace();
            let key = parts.next()?;
            let value = parts.next()?;
            key.eq_ignore_ascii_case(keyword).then_some(value)
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedConfig {
    pub header_lines: Vec<String>,
    pub blocks: Vec<ConfigBlock>,
}

impl ParsedConfig {
    /// Reassemble the file text.
    ///
    /// Header lines come first, then one blank line. Managed blocks are
    /// wrapped in their marker comments, blocks are separated by exactly one
    /// blank line, and the result ends with a single newline.
    pub fn render(&self) -> String {
        let mut out: Vec<String> = self.header_lines.clone();
        if !out.is_empty() {
            out.push(String::new());
        }

        for (idx, block) in self.blocks.iter().enumerate() {
            if idx > 0 {
                out.push(String::new());
            }
            if block.is_managed {
                out.push(format!("{}{}", BEGIN_MARKER, block.host_alias));
                out.extend(block.lines.iter().cloned());
                out.push(format!("{}{}", END_MARKER, block.host_alias));
            } else {
                out.extend(block.lines.iter().cloned());
            }
        }

        let mut text = out.join("\n").trim_end().to_string();
        text.push('\n');
        text
    }

    fn push_block(&mut self, mut block: ConfigBlock) {
        trim_trailing_blank(&mut block.lines);
        self.blocks.push(block);
    }
}

/// Parse the SSH config at `path`. A missing file is an empty config.
pub fn parse(path: &Path) -> Result<ParsedConfig> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let parsed = parse_str(&content);
            tracing::debug!(
                "Parsed {}: {} header lines, {} blocks",
                path.display(),
                parsed.header_lines.len(),
                parsed.blocks.len()
            );
            Ok(parsed)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ParsedConfig::default()),
        Err(e) => Err(FdevError::io("read", path)(e)),
    }
}

/// Parse SSH config text.
pub fn parse_str(content: &str) -> ParsedConfig {
    let mut result = ParsedConfig::default();
    let mut current: Option<ConfigBlock> = None;
    let mut pending_alias: Option<String> = None;

    for line in content.lines() {
        let trimmed = line.trim();

        if let Some(alias) = trimmed.strip_prefix(BEGIN_MARKER) {
            pending_alias = Some(alias.trim().to_string());
            continue;
        }
        if trimmed.starts_with(END_MARKER) {
            continue;
        }

        if is_host_line(trimmed) {
            if let Some(block) = current.take() {
                result.push_block(block);
            }
            let alias = trimmed.split_whitespace().nth(1).unwrap_or_default();
            let is_managed = pending_alias.take().as_deref() == Some(alias);
            current = Some(ConfigBlock {
                host_alias: alias.to_string(),
                is_managed,
                lines: vec![line.to_string()],
            });
            continue;
        }

        match current.as_mut() {
            Some(block) => block.lines.push(line.to_string()),
            None => result.header_lines.push(line.to_string()),
        }
    }

    if let Some(block) = current {
        result.push_block(block);
    }
    trim_trailing_blank(&mut result.header_lines);

    result
}

fn trim_trailing_blank(lines: &mut Vec<String>) {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
}

fn is_host_line(trimmed: &str) -> bool {
    trimmed
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("host "))
}

/// An unmanaged `Host` stanza that can be adopted as an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportableHost {
    pub host_alias: String,
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub identity_file: Option<String>,
}

/// List every block of the config at `path` that this tool does not own.
pub fn importable_hosts(path: &Path) -> Result<Vec<ImportableHost>> {
    let parsed = parse(path)?;

    Ok(parsed
        .blocks
        .iter()
        .filter(|b| !b.is_managed)
        .map(|b| ImportableHost {
            host_alias: b.host_alias.clone(),
            hostname: b.option("HostName").map(str::to_string),
            user: b.option("User").map(str::to_string),
            identity_file: b.option("IdentityFile").map(str::to_string),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &str = "# global comment

Host github.com
  HostName github.com

# BEGIN FDEV github-work
Host github-work
  HostName github.com
  User git
# END FDEV github-work
";

    #[test]
    fn test_parse_mixed_blocks() {
        let parsed = parse_str(MIXED);

        assert_eq!(parsed.header_lines, vec!["# global comment"]);
        assert_eq!(parsed.blocks.len(), 2);

        assert_eq!(parsed.blocks[0].host_alias, "github.com");
        assert!(!parsed.blocks[0].is_managed);
        assert_eq!(
            parsed.blocks[0].lines,
            vec!["Host github.com", "  HostName github.com"]
        );

        assert_eq!(parsed.blocks[1].host_alias, "github-work");
        assert!(parsed.blocks[1].is_managed);
        // Markers are not part of the block
        assert_eq!(
            parsed.blocks[1].lines,
            vec!["Host github-work", "  HostName github.com", "  User git"]
        );
    }

    #[test]
    fn test_parse_missing_file_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let parsed = parse(&temp_dir.path().join("config")).unwrap();
        assert_eq!(parsed, ParsedConfig::default());
    }

    #[test]
    fn test_parse_unreadable_path_is_io_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        // A directory cannot be read as a file
        let err = parse(temp_dir.path()).unwrap_err();
        assert!(matches!(err, FdevError::Io { op: "read", .. }));
    }

    #[test]
    fn test_host_keyword_is_case_insensitive() {
        let parsed = parse_str("HOST a\n  HostName a.com\nhost b\n");
        let aliases: Vec<_> = parsed.blocks.iter().map(|b| b.host_alias.as_str()).collect();
        assert_eq!(aliases, vec!["a", "b"]);
    }

    #[test]
    fn test_hostname_line_does_not_open_block() {
        let parsed = parse_str("Host a\nHostName a.com\n");
        assert_eq!(parsed.blocks.len(), 1);
        assert_eq!(parsed.blocks[0].lines.len(), 2);
    }

    #[test]
    fn test_stray_begin_marker_is_dropped() {
        let parsed = parse_str("# BEGIN FDEV other\nHost mine\n  HostName x\n");
        assert_eq!(parsed.blocks.len(), 1);
        assert!(!parsed.blocks[0].is_managed);
        assert!(parsed.header_lines.is_empty());
    }

    #[test]
    fn test_marker_is_consumed_by_first_host_line() {
        // The pending marker is cleared by the first Host line even on mismatch
        let parsed = parse_str("# BEGIN FDEV b\nHost a\nHost b\n");
        assert!(!parsed.blocks[0].is_managed);
        assert!(!parsed.blocks[1].is_managed);
    }

    #[test]
    fn test_render_round_trip() {
        let parsed = parse_str(MIXED);
        let rendered = parsed.render();
        assert_eq!(rendered, MIXED);
        assert_eq!(parse_str(&rendered), parsed);
    }

    #[test]
    fn test_trailing_blank_lines_are_separators() {
        let parsed = parse_str("# c\n\n\n\nHost a\n  HostName a.com\n\n   \n\nHost b\n\n");
        assert_eq!(parsed.header_lines, vec!["# c"]);
        assert_eq!(parsed.blocks[0].lines, vec!["Host a", "  HostName a.com"]);
        assert_eq!(parsed.blocks[1].lines, vec!["Host b"]);
        assert_eq!(parsed.render(), "# c\n\nHost a\n  HostName a.com\n\nHost b\n");
    }

    #[test]
    fn test_inner_comments_stay_with_block() {
        let parsed = parse_str("Host a\n  # note\n\n  User x\n");
        assert_eq!(parsed.blocks[0].lines, vec!["Host a", "  # note", "", "  User x"]);
    }

    #[test]
    fn test_block_option_lookup() {
        let parsed = parse_str("Host a\n  hostname a.com\n  IdentityFile ~/.ssh/id_a\n");
        let block = &parsed.blocks[0];
        assert_eq!(block.option("HostName"), Some("a.com"));
        assert_eq!(block.option("identityfile"), Some("~/.ssh/id_a"));
        assert_eq!(block.option("User"), None);
    }

    #[test]
    fn test_importable_hosts_skips_managed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config");
        std::fs::write(
            &path,
            format!("{}\nHost gitlab\n  HostName gitlab.com\n  User me\n", MIXED),
        )
        .unwrap();

        let hosts = importable_hosts(&path).unwrap();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].host_alias, "github.com");
        assert_eq!(hosts[0].hostname.as_deref(), Some("github.com"));
        assert_eq!(hosts[1].host_alias, "gitlab");
        assert_eq!(hosts[1].user.as_deref(), Some("me"));
        assert!(hosts[1].identity_file.is_none());
    }
}
