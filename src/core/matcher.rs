//! Fuzzy chunk locator and patcher
//!
//! Finds the region of a file that best matches an approximate "before"
//! snippet and substitutes the "after" text. Strategies run in order and the
//! first success wins:
//! - exact substring (first occurrence)
//! - per-line whitespace-normalized match, re-applying dropped indentation
//! - sliding window over line runs scored by normalized line-level edit
//!   distance
//!
//! The matcher is a pure function of its inputs; callers decide what to write.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use similar::TextDiff;
use tracing::debug;

/// Tunables for the sliding-window strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Minimum similarity in [0.0, 1.0] a window needs to be accepted
    pub threshold: f64,
    /// Allowed deviation of window length from the snippet's line count
    pub length_tolerance: f64,
    /// A disjoint window scoring within this margin of the best one makes the
    /// match ambiguous
    pub tie_margin: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            length_tolerance: 0.2,
            tie_margin: 0.01,
        }
    }
}

/// Which strategy produced a replacement
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    /// `before` was empty and the file was empty
    Populate,
    Exact,
    Whitespace,
    Fuzzy { score: f64 },
}

/// Successful replacement with provenance
#[derive(Debug, Clone, PartialEq)]
pub struct Replacement {
    pub content: String,
    pub strategy: Strategy,
}

/// Replace the region of `content` best matching `before` with `after`.
/// Returns `None` when no confident match exists.
pub fn locate_and_replace(content: &str, before: &str, after: &str) -> Option<String> {
    replace_with(content, before, after, &MatchConfig::default()).map(|r| r.content)
}

/// Same as [`locate_and_replace`] with explicit tunables and provenance
pub fn replace_with(
    content: &str,
    before: &str,
    after: &str,
    config: &MatchConfig,
) -> Option<Replacement> {
    if before.trim().is_empty() {
        // Only an empty file can be populated from an empty preimage
        return content.trim().is_empty().then(|| Replacement {
            content: after.to_string(),
            strategy: Strategy::Populate,
        });
    }

    if content.contains(before) {
        return Some(Replacement {
            content: content.replacen(before, after, 1),
            strategy: Strategy::Exact,
        });
    }

    let file_lines: Vec<&str> = content.split_inclusive('\n').collect();
    let before_lines: Vec<&str> = before.lines().collect();

    if let Some(content) = replace_whitespace_normalized(&file_lines, &before_lines, after) {
        return Some(Replacement {
            content,
            strategy: Strategy::Whitespace,
        });
    }

    let window = best_window(&file_lines, &before_lines, config)?;
    debug!(
        start = window.start + 1,
        lines = window.len,
        score = window.score,
        "fuzzy window accepted"
    );
    Some(Replacement {
        content: splice(&file_lines, window.start, window.start + window.len, after),
        strategy: Strategy::Fuzzy {
            score: window.score,
        },
    })
}

/// Line-by-line comparison ignoring leading/trailing whitespace
fn replace_whitespace_normalized(
    file_lines: &[&str],
    before_lines: &[&str],
    after: &str,
) -> Option<String> {
    let n = before_lines.len();
    if n == 0 || n > file_lines.len() {
        return None;
    }

    let start = (0..=file_lines.len() - n).find(|&start| {
        before_lines
            .iter()
            .zip(&file_lines[start..start + n])
            .all(|(b, f)| b.trim() == f.trim())
    })?;

    let matched = &file_lines[start..start + n];
    let after = match indent_delta(matched, before_lines) {
        Some(extra) => reindent(after, extra),
        None => after.to_string(),
    };

    Some(splice(file_lines, start, start + n, &after))
}

/// Leading whitespace the file consistently carries on top of the snippet.
/// Returns `None` unless every non-blank line agrees on a non-empty prefix.
fn indent_delta<'a>(matched: &[&'a str], before_lines: &[&str]) -> Option<&'a str> {
    let mut delta: Option<&'a str> = None;

    for (f, b) in matched.iter().zip(before_lines) {
        if b.trim().is_empty() {
            continue;
        }
        let f_lead = leading_ws(f);
        let extra = f_lead.strip_suffix(leading_ws(b))?;
        match delta {
            None => delta = Some(extra),
            Some(d) if d == extra => {}
            Some(_) => return None,
        }
    }

    delta.filter(|d| !d.is_empty())
}

fn leading_ws(line: &str) -> &str {
    let body = line.trim_start();
    &line[..line.len() - body.len()]
}

fn reindent(text: &str, extra: &str) -> String {
    text.split_inclusive('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{extra}{line}")
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: usize,
    len: usize,
    score: f64,
}

impl Window {
    fn end(&self) -> usize {
        self.start + self.len
    }

    fn overlaps(&self, other: &Window) -> bool {
        self.start < other.end() && other.start < self.end()
    }
}

/// Lines scoring below this against a snippet line count as unmatched
const LINE_FLOOR: f64 = 0.5;

/// Score every line run within the length tolerance and pick the best one.
/// Earliest start (then shortest run) wins exact ties; a disjoint run within
/// the tie margin makes the result ambiguous.
///
/// A run's score is a line-level diff ratio: snippet lines are aligned in
/// order against the run, each aligned pair contributes its char-level
/// similarity, and the total is normalized by both line counts.
fn best_window(file_lines: &[&str], before_lines: &[&str], config: &MatchConfig) -> Option<Window> {
    let n = before_lines.len();
    if n == 0 || file_lines.is_empty() {
        return None;
    }

    // Epsilon keeps e.g. 5 * 0.2 from flooring to zero
    let delta = (n as f64 * config.length_tolerance + 1e-6).floor() as usize;
    let min_len = n.saturating_sub(delta).max(1);
    let max_len = n + delta;

    let needle: Vec<&str> = before_lines.iter().map(|l| l.trim()).collect();
    let scores = LineScores::new(file_lines, &needle);

    // Windows scoring below this bound can neither win nor create a tie
    let floor = config.threshold - config.tie_margin;

    let mut candidates: Vec<Window> = Vec::new();
    for start in 0..file_lines.len() {
        let longest = max_len.min(file_lines.len() - start);
        if longest < min_len {
            break;
        }
        let aligned = scores.align(start, longest);
        for len in min_len..=longest {
            let score = 2.0 * aligned[len] / (n + len) as f64;
            if score >= floor {
                candidates.push(Window { start, len, score });
            }
        }
    }

    let mut best: Option<Window> = None;
    for w in &candidates {
        if best.is_none_or(|b| w.score > b.score) {
            best = Some(*w);
        }
    }
    let best = best?;

    if best.score < config.threshold {
        debug!(score = best.score, "best window below threshold");
        return None;
    }

    let rival = candidates
        .iter()
        .find(|w| !w.overlaps(&best) && w.score >= best.score - config.tie_margin);
    if let Some(rival) = rival {
        debug!(
            best = best.start + 1,
            rival = rival.start + 1,
            score = best.score,
            "ambiguous fuzzy match"
        );
        return None;
    }

    Some(best)
}

/// Similarity of every file line against every snippet line, computed once
/// per distinct trimmed file line
struct LineScores {
    rows: Vec<Vec<f64>>,
    row_of: Vec<usize>,
    width: usize,
}

impl LineScores {
    fn new(file_lines: &[&str], needle: &[&str]) -> Self {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut rows: Vec<Vec<f64>> = Vec::new();
        let row_of = file_lines
            .iter()
            .map(|l| {
                let line = l.trim();
                *seen.entry(line).or_insert_with(|| {
                    rows.push(needle.iter().map(|b| line_similarity(line, b)).collect());
                    rows.len() - 1
                })
            })
            .collect();
        Self {
            rows,
            row_of,
            width: needle.len(),
        }
    }

    fn get(&self, file_line: usize, needle_line: usize) -> f64 {
        self.rows[self.row_of[file_line]][needle_line]
    }

    /// Best in-order alignment of the snippet against each prefix of the run
    /// starting at `start`; entry `len` covers the first `len` lines.
    fn align(&self, start: usize, longest: usize) -> Vec<f64> {
        let n = self.width;
        let mut prev = vec![0.0; n + 1];
        let mut totals = Vec::with_capacity(longest + 1);
        totals.push(0.0);
        for j in 0..longest {
            let mut row = vec![0.0; n + 1];
            for i in 1..=n {
                let diag = prev[i - 1] + self.get(start + j, i - 1);
                row[i] = diag.max(prev[i]).max(row[i - 1]);
            }
            totals.push(row[n]);
            prev = row;
        }
        totals
    }
}

/// Char-level ratio of two trimmed lines, zero below [`LINE_FLOOR`]
fn line_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if length_bound(a, b) < LINE_FLOOR {
        return 0.0;
    }
    let ratio = f64::from(TextDiff::from_chars(a, b).ratio());
    if ratio >= LINE_FLOOR { ratio } else { 0.0 }
}

/// Upper bound of the diff ratio given only the two lengths
fn length_bound(a: &str, b: &str) -> f64 {
    let (la, lb) = (a.chars().count(), b.chars().count());
    if la + lb == 0 {
        return 1.0;
    }
    2.0 * la.min(lb) as f64 / (la + lb) as f64
}

/// Rebuild the file with lines `[start, end)` replaced by `replacement`.
/// The replaced region keeps its own trailing-newline state.
fn splice(file_lines: &[&str], start: usize, end: usize, replacement: &str) -> String {
    let mut out: String = file_lines[..start].concat();

    let region_has_newline = file_lines[..end].last().is_none_or(|l| l.ends_with('\n'));
    if region_has_newline {
        out.push_str(replacement);
        if !replacement.is_empty() && !replacement.ends_with('\n') {
            out.push('\n');
        }
    } else {
        out.push_str(replacement.strip_suffix('\n').unwrap_or(replacement));
    }

    out.push_str(&file_lines[end..].concat());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_replaces_first_occurrence_only() {
        let content = "a\nb\na\n";
        let out = replace_with(content, "a\n", "x\n", &MatchConfig::default()).unwrap();
        assert_eq!(out.content, "x\nb\na\n");
        assert_eq!(out.strategy, Strategy::Exact);
    }

    #[test]
    fn test_return_value_scenario() {
        let content = "def f():\n    return 1\n";
        let out = locate_and_replace(content, "    return 1\n", "    return 2\n");
        assert_eq!(out.as_deref(), Some("def f():\n    return 2\n"));
    }

    #[test]
    fn test_whitespace_match_reapplies_indentation() {
        let content = "class A:\n    def f(self):\n        return 1\n";
        let before = "def f(self):\n    return 1\n";
        let after = "def f(self):\n    return 2\n";

        let out = replace_with(content, before, after, &MatchConfig::default()).unwrap();
        assert_eq!(out.strategy, Strategy::Whitespace);
        assert_eq!(
            out.content,
            "class A:\n    def f(self):\n        return 2\n"
        );
    }

    #[test]
    fn test_whitespace_match_with_trailing_noise() {
        let content = "fn main() {\n    run();\n}\n";
        let before = "fn main() {   \n    run();\t\n}\n";
        let out = locate_and_replace(content, before, "fn main() {}\n").unwrap();
        assert_eq!(out, "fn main() {}\n");
    }

    #[test]
    fn test_fuzzy_match_absorbs_stale_line() {
        let content = "\
fn alpha() {
    let total = compute_total(&items);
    println!(\"total = {}\", total);
    persist(total);
}

fn beta() {}
";
        // One identifier drifted since the model last saw the file
        let before = "\
fn alpha() {
    let total = compute_total(&item);
    println!(\"total = {}\", total);
    persist(total);
}
";
        let after = "fn alpha() {}\n";

        let out = replace_with(content, before, after, &MatchConfig::default()).unwrap();
        assert!(matches!(out.strategy, Strategy::Fuzzy { score } if score >= 0.8));
        assert_eq!(out.content, "fn alpha() {}\n\nfn beta() {}\n");
    }

    #[test]
    fn test_fuzzy_rejects_low_similarity() {
        let content = "one\ntwo\nthree\n";
        assert!(locate_and_replace(content, "completely\ndifferent\n", "x\n").is_none());
    }

    #[test]
    fn test_fuzzy_ambiguous_duplicates() {
        let block = "let value = read_config(path);\nvalidate(&value);\n";
        let content = format!("{block}\n{block}");
        let before = "let value = read_config(paths);\nvalidate(&value);\n";

        assert!(locate_and_replace(&content, before, "x\n").is_none());
    }

    #[test]
    fn test_no_match_on_large_file_finishes_quickly() {
        let content: String = (0..500)
            .map(|i| format!("    let value_{i} = compute(input_{}, {});\n", i % 13, i % 7))
            .collect();
        let before: String = (0..20)
            .map(|k| format!("SELECT column_{k} FROM table WHERE id = {k};\n"))
            .collect();

        let started = std::time::Instant::now();
        assert!(locate_and_replace(&content, &before, "x\n").is_none());
        assert!(
            started.elapsed() < std::time::Duration::from_secs(10),
            "took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn test_fuzzy_match_tolerates_drift_on_several_lines() {
        let content = "\
def load(path):
    with open(path) as fh:
        data = json.load(fh)
    validate(data)
    return data

def save(path, data):
    pass
";
        let before = "\
def load(filename):
    with open(filename) as fh:
        data = json.load(fh)
    validate(data)
    return data
";
        let after = "def load(path):\n    return {}\n";
        let out = replace_with(content, before, after, &MatchConfig::default()).unwrap();
        assert!(matches!(out.strategy, Strategy::Fuzzy { .. }));
        assert!(out.content.starts_with("def load(path):\n    return {}\n\ndef save"));
    }

    #[test]
    fn test_line_similarity_floor() {
        assert_eq!(line_similarity("same", "same"), 1.0);
        assert_eq!(line_similarity("", "something"), 0.0);
        assert_eq!(line_similarity("abc", "xyz"), 0.0);
        assert!(line_similarity("read(path)", "read(paths)") > 0.9);
    }

    #[test]
    fn test_empty_before_populates_empty_file() {
        assert_eq!(
            locate_and_replace("", "", "hello\n").as_deref(),
            Some("hello\n")
        );
        assert!(locate_and_replace("existing\n", "", "hello\n").is_none());
    }

    #[test]
    fn test_eof_without_newline_is_preserved() {
        let content = "first\nsecond";
        let out = locate_and_replace(content, "  second  \n", "changed\n").unwrap();
        assert_eq!(out, "first\nchanged");
    }

    #[test]
    fn test_splice_adds_newline_to_region() {
        let lines = vec!["a\n", "b\n", "c\n"];
        assert_eq!(splice(&lines, 1, 2, "x"), "a\nx\nc\n");
        assert_eq!(splice(&lines, 1, 2, ""), "a\nc\n");
    }
}
