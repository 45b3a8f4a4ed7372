//! Edit block extraction from free-form model output
//!
//! Scans a response for blocks of the form:
//!
//! ```text
//! path/to/file.py
//! <<<<<<< ORIGINAL
//! old lines
//! =======
//! new lines
//! >>>>>>> UPDATED
//! ```
//!
//! Prose, code fences and fence language tags around a block are ignored.
//! Malformed blocks are dropped without affecting their neighbours.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

pub const ORIGINAL_MARKER: &str = "<<<<<<< ORIGINAL";
pub const DIVIDER_MARKER: &str = "=======";
pub const UPDATED_MARKER: &str = ">>>>>>> UPDATED";

/// Optional drive or root, directory segments (spaces allowed), and a final
/// component without spaces containing at least one word character.
static PATH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z]:[\\/]|/)?(?:[\w .-]+[\\/])*[\w.-]*\w[\w.-]*$")
        .expect("path token pattern is valid")
});

/// One parsed before/after instruction for a single file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDirective {
    pub path: PathBuf,
    /// Expected current text; empty means "create or populate"
    pub original: String,
    pub updated: String,
    /// Literal block text, from the path line to the UPDATED marker
    pub block: String,
}

/// Reasons a candidate block is dropped
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no file path precedes the ORIGINAL marker")]
    MissingPath,
    #[error("ORIGINAL section is not closed by a divider")]
    MissingDivider,
    #[error("UPDATED marker not found")]
    MissingUpdated,
}

/// Extract every well-formed edit directive, in textual order
pub fn extract(response: &str) -> Vec<EditDirective> {
    let text = response.replace('\r', "");
    let lines: Vec<&str> = text.lines().collect();

    let mut directives = Vec::new();
    // Path lookback never crosses into an already consumed block
    let mut floor = 0;
    let mut i = 0;

    while i < lines.len() {
        if !is_marker(lines[i], ORIGINAL_MARKER) {
            i += 1;
            continue;
        }

        match parse_block(&lines, floor, i) {
            Ok((directive, next)) => {
                directives.push(directive);
                i = next;
                floor = next;
            }
            Err(err) => {
                debug!(line = i + 1, error = %err, "dropping malformed edit block");
                i += 1;
                floor = i;
            }
        }
    }

    directives
}

/// Parse the block whose ORIGINAL marker sits at `at`.
/// Returns the directive and the index of the first line after the block.
fn parse_block(
    lines: &[&str],
    floor: usize,
    at: usize,
) -> Result<(EditDirective, usize), ParseError> {
    let (path_idx, path) = find_path(lines, floor, at).ok_or(ParseError::MissingPath)?;

    let mut i = at + 1;
    let original_start = i;
    loop {
        let line = lines.get(i).ok_or(ParseError::MissingDivider)?;
        if line.trim() == DIVIDER_MARKER {
            break;
        }
        if is_marker(line, ORIGINAL_MARKER) || is_marker(line, UPDATED_MARKER) {
            return Err(ParseError::MissingDivider);
        }
        i += 1;
    }
    let original = section(&lines[original_start..i]);

    i += 1;
    let updated_start = i;
    loop {
        let line = lines.get(i).ok_or(ParseError::MissingUpdated)?;
        if is_marker(line, UPDATED_MARKER) {
            break;
        }
        if is_marker(line, ORIGINAL_MARKER) {
            return Err(ParseError::MissingUpdated);
        }
        i += 1;
    }
    let updated = section(&lines[updated_start..i]);

    let directive = EditDirective {
        path,
        original,
        updated,
        block: lines[path_idx..=i].join("\n") + "\n",
    };
    Ok((directive, i + 1))
}

/// Walk back from the ORIGINAL marker over blank and fence lines to the path
fn find_path(lines: &[&str], floor: usize, at: usize) -> Option<(usize, PathBuf)> {
    let mut k = at;
    while k > floor {
        k -= 1;
        let t = lines[k].trim();
        if t.is_empty() || is_fence(t) {
            continue;
        }
        return path_token(t).map(|p| (k, p));
    }
    None
}

/// Clean a candidate path line and check that it looks like a path
fn path_token(line: &str) -> Option<PathBuf> {
    let t = line
        .trim()
        .trim_end_matches(':')
        .trim_matches(|c| c == '`' || c == '*' || c == '"' || c == '\'')
        .trim();

    if t.is_empty() || !PATH_TOKEN.is_match(t) {
        return None;
    }
    Some(PathBuf::from(t))
}

fn is_marker(line: &str, marker: &str) -> bool {
    line.trim().starts_with(marker)
}

fn is_fence(trimmed: &str) -> bool {
    trimmed.starts_with("```")
}

/// Section body: lines joined with a trailing newline when non-empty
fn section(lines: &[&str]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut s = lines.join("\n");
    s.push('\n');
    s
}

/// Remove incidental wrapping the model puts around file text:
/// a leading line echoing the file name and a surrounding fence pair.
/// Non-empty results always end with a single newline.
pub fn strip_wrapping(text: &str, fname: Option<&Path>) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut lines: Vec<&str> = text.lines().collect();

    let name = fname
        .and_then(|f| f.file_name())
        .map(|n| n.to_string_lossy().into_owned());
    if let Some(name) = name
        && lines.first().is_some_and(|l| l.trim().ends_with(&name))
    {
        lines.remove(0);
    }

    if lines.len() >= 2
        && lines.first().is_some_and(|l| is_fence(l.trim()))
        && lines.last().is_some_and(|l| is_fence(l.trim()))
    {
        lines = lines[1..lines.len() - 1].to_vec();
    }

    if lines.is_empty() {
        return String::new();
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
