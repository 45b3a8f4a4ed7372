//! Commit synchronization
//!
//! Turns the current difference between tracked files and HEAD into one
//! commit whose message is drafted by the secondary model.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::git::{Repository, repo_relative};
use crate::core::model::{Message, ModelClient, send_with_retry};
use crate::core::prompts;
use crate::core::tracked::TrackedFiles;
use crate::infra::console::Prompter;

/// A commit created by the synchronizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// Abbreviated hash
    pub hash: String,
    /// Subject line without the appended context
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CommitRequest<'h> {
    /// Turns that led to the change; included in the drafting prompt and
    /// appended to the commit body
    pub history: Option<&'h [Message]>,
    pub prefix: Option<&'h str>,
    /// Use this message instead of drafting one
    pub message: Option<&'h str>,
    /// Show the diff and let the user confirm or override the message
    pub ask: bool,
}

pub struct CommitSync<'a> {
    pub repo: &'a mut dyn Repository,
    pub files: &'a mut TrackedFiles,
    pub model: &'a mut dyn ModelClient,
    pub prompter: &'a mut dyn Prompter,
    /// Model that drafts commit messages
    pub commit_model: &'a str,
}

impl CommitSync<'_> {
    /// Commit dirty tracked files. Returns None when nothing was committed.
    #[instrument(skip_all, fields(ask = req.ask))]
    pub fn commit(&mut self, req: CommitRequest<'_>) -> Result<Option<CommitRecord>> {
        if !self.repo.is_dirty()? {
            return Ok(None);
        }

        let mut diffs = String::new();
        let mut dirty: Vec<PathBuf> = Vec::new();
        let rels: Vec<PathBuf> = self
            .files
            .paths()
            .filter_map(|abs| repo_relative(&*self.repo, abs))
            .collect();
        for rel in rels {
            let diff = self.repo.diff_head(&rel)?;
            if !diff.is_empty() {
                diffs.push_str(&diff);
                diffs.push('\n');
                dirty.push(rel);
            }
        }

        if dirty.is_empty() {
            self.files.mark_synced();
            return Ok(None);
        }

        self.prompter.notify(&diffs);

        let context = render_context(req.history);
        let given = req.message.map(str::trim).filter(|m| !m.is_empty());
        let mut message = match given {
            Some(m) => m.to_string(),
            None => match self.draft(&context, &diffs) {
                Some(m) => m,
                None => return Ok(None),
            },
        };
        if let Some(prefix) = req.prefix {
            message.insert_str(0, prefix);
        }

        if req.ask {
            self.files.mark_synced();

            self.prompter.warn("Files have uncommitted changes.\n");
            self.prompter
                .warn(&format!("Suggested commit message:\n{message}\n"));

            let answer = self
                .prompter
                .ask("Commit before the chat proceeds? [y/n/commit message]")?;
            match answer.to_ascii_lowercase().as_str() {
                "n" | "no" => {
                    self.prompter.warn("Skipped commit.");
                    return Ok(None);
                }
                "" | "y" | "yes" => {}
                _ => message = answer,
            }
        }

        self.repo.stage(&dirty)?;
        let full_message = format!("{message}\n\n{context}");
        self.repo.commit(&full_message, true)?;
        let hash = self.repo.head_short_hash()?;

        info!(%hash, files = dirty.len(), "committed");
        self.prompter.notify(&format!("{hash} {message}"));
        self.files.mark_synced();

        Ok(Some(CommitRecord { hash, message }))
    }

    /// Ask the commit model for a subject line; None abandons the commit
    fn draft(&mut self, context: &str, diffs: &str) -> Option<String> {
        let messages = [
            Message::system(prompts::COMMIT_SYSTEM),
            Message::user(format!("{context}# Diffs:\n{diffs}")),
        ];

        let reply = match send_with_retry(self.model, self.commit_model, &messages, true) {
            Ok(r) => r,
            Err(e) => {
                warn!("commit message drafting failed: {e}");
                self.prompter.warn(&format!("Could not draft a commit message: {e}"));
                return None;
            }
        };
        if reply.interrupted {
            self.prompter.warn("Commit abandoned.");
            return None;
        }
        Some(clean_message(&reply.content))
    }
}

/// `# Context:` section with one `ROLE: content` line per turn
fn render_context(history: Option<&[Message]>) -> String {
    let Some(history) = history.filter(|h| !h.is_empty()) else {
        return String::new();
    };
    let mut out = String::from("# Context:\n");
    for msg in history {
        let _ = writeln!(out, "{}: {}", msg.role.as_upper(), msg.content);
    }
    out
}

/// Drafted messages arrive with stray whitespace or quotes
fn clean_message(raw: &str) -> String {
    let msg = raw.trim().trim_matches('"').trim();
    if msg.is_empty() {
        prompts::FALLBACK_COMMIT_MESSAGE.to_string()
    } else {
        msg.to_string()
    }
}
