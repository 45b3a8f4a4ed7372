//! Per-directive apply state machine
//!
//! Each extracted directive is authorized, matched against the current file
//! content and written back whole. When the chunk matcher has no confident
//! match the directive escalates to a secondary model that rewrites the file.
//! Failures stay local to their directive.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, error, info, instrument, warn};

use crate::core::edit::{EditDirective, strip_wrapping};
use crate::core::matcher::{MatchConfig, Strategy, replace_with};
use crate::core::model::{Message, ModelClient, send_with_retry};
use crate::core::prompts;
use crate::core::tracked::TrackedFiles;
use crate::infra::console::Prompter;
use crate::infra::io::{read_text_or_empty, touch, write_atomic};

/// Terminal state of one directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveState {
    /// User declined an untracked path
    Rejected,
    Applied,
    /// Rewritten by the secondary model
    Escalated,
    /// Nothing written
    Failed(String),
}

impl DirectiveState {
    /// Storage was mutated
    pub fn is_edit(&self) -> bool {
        matches!(self, DirectiveState::Applied | DirectiveState::Escalated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveOutcome {
    /// Path as written in the response
    pub path: PathBuf,
    pub state: DirectiveState,
}

/// Per-directive results of one response, in textual order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub outcomes: Vec<DirectiveOutcome>,
}

impl ApplyReport {
    /// Distinct paths whose content was written
    pub fn edited(&self) -> Vec<&Path> {
        let mut out: Vec<&Path> = Vec::new();
        for o in self.outcomes.iter().filter(|o| o.state.is_edit()) {
            if !out.contains(&o.path.as_path()) {
                out.push(&o.path);
            }
        }
        out
    }

    pub fn any_edited(&self) -> bool {
        self.outcomes.iter().any(|o| o.state.is_edit())
    }
}

/// Decision of the matching step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// New whole-file content
    Matched(String),
    Escalate,
    Failed(String),
}

/// Collaborators borrowed from the session for one apply cycle
pub struct ApplyEngine<'a> {
    pub files: &'a mut TrackedFiles,
    pub prompter: &'a mut dyn Prompter,
    pub model: &'a mut dyn ModelClient,
    /// Secondary model used for escalation
    pub edit_model: &'a str,
    pub matcher: &'a MatchConfig,
}

impl ApplyEngine<'_> {
    /// Apply every directive in order. `request` is the user instruction
    /// that produced them, forwarded verbatim on escalation.
    #[instrument(skip_all, fields(directives = directives.len()))]
    pub fn apply_all(&mut self, directives: &[EditDirective], request: &str) -> ApplyReport {
        let mut report = ApplyReport::default();
        for d in directives {
            let state = match self.apply_one(d, request) {
                Ok(state) => state,
                Err(e) => {
                    error!(path = %d.path.display(), "apply failed: {e:#}");
                    self.prompter
                        .warn(&format!("Failed to apply edit to {}: {e:#}", d.path.display()));
                    DirectiveState::Failed(format!("{e:#}"))
                }
            };
            report.outcomes.push(DirectiveOutcome {
                path: d.path.clone(),
                state,
            });
        }
        report
    }

    fn apply_one(&mut self, d: &EditDirective, request: &str) -> Result<DirectiveState> {
        let abs = self.files.resolve(&d.path)?;

        if !self.files.contains(&abs) {
            if !self.authorize(&d.path, &abs)? {
                self.prompter
                    .warn(&format!("Skipping edit to {}", d.path.display()));
                return Ok(DirectiveState::Rejected);
            }
            self.files.adopt(&abs);
        }

        let (outcome, escalated) = match self.try_replace(&abs, d)? {
            MatchOutcome::Escalate => (self.escalate(&abs, d, request)?, true),
            other => (other, false),
        };

        match outcome {
            MatchOutcome::Matched(content) => {
                write_atomic(&abs, content.as_bytes())?;
                info!(path = %abs.display(), escalated, "applied edit");
                self.prompter
                    .notify(&format!("Applied edit to {}", d.path.display()));
                Ok(if escalated {
                    DirectiveState::Escalated
                } else {
                    DirectiveState::Applied
                })
            }
            MatchOutcome::Failed(reason) => {
                warn!(path = %abs.display(), %reason, "edit not applied");
                self.prompter
                    .warn(&format!("Edit to {} not applied: {reason}", d.path.display()));
                Ok(DirectiveState::Failed(reason))
            }
            MatchOutcome::Escalate => Ok(DirectiveState::Failed("no confident match".into())),
        }
    }

    fn authorize(&mut self, shown: &Path, abs: &Path) -> Result<bool> {
        let question = if abs.exists() {
            format!(
                "Allow edits to {} which was not previously provided?",
                shown.display()
            )
        } else {
            format!("Allow creation of new file {}?", shown.display())
        };
        self.prompter.confirm(&question)
    }

    fn try_replace(&mut self, abs: &Path, d: &EditDirective) -> Result<MatchOutcome> {
        let before = strip_wrapping(&d.original, Some(&d.path));
        let after = strip_wrapping(&d.updated, Some(&d.path));

        if !abs.exists() && before.is_empty() {
            self.prompter
                .notify(&format!("Creating empty file {}", d.path.display()));
            touch(abs)?;
        }

        let content = read_text_or_empty(abs)?;
        let Some(replacement) = replace_with(&content, &before, &after, self.matcher) else {
            debug!(path = %abs.display(), "no confident match");
            return Ok(MatchOutcome::Escalate);
        };

        debug!(path = %abs.display(), strategy = ?replacement.strategy, "matched");
        let new_content = match replacement.strategy {
            Strategy::Populate => single_trailing_newline(&replacement.content),
            _ => replacement.content,
        };
        Ok(MatchOutcome::Matched(new_content))
    }

    /// Ask the secondary model for the complete new file
    fn escalate(&mut self, abs: &Path, d: &EditDirective, request: &str) -> Result<MatchOutcome> {
        self.prompter.notify(&format!(
            "Asking {} to apply ambiguous edit to {}...",
            self.edit_model,
            d.path.display()
        ));

        let content = read_text_or_empty(abs)?;
        let fname = self.files.display_path(abs).display().to_string();
        let messages = [
            Message::system(prompts::EDITOR_SYSTEM),
            Message::user(prompts::editor_user(request, &d.block, &fname, &content)),
        ];

        let reply = match send_with_retry(self.model, self.edit_model, &messages, true) {
            Ok(r) => r,
            Err(e) => return Ok(MatchOutcome::Failed(format!("escalation failed: {e}"))),
        };
        if reply.interrupted {
            return Ok(MatchOutcome::Failed("escalation interrupted".into()));
        }

        let rewritten = strip_wrapping(&reply.content, Some(&d.path));
        if rewritten.trim().is_empty() && !content.trim().is_empty() {
            return Ok(MatchOutcome::Failed("escalation returned no content".into()));
        }
        Ok(MatchOutcome::Matched(rewritten))
    }
}

fn single_trailing_newline(s: &str) -> String {
    let body = s.trim_end_matches(['\n', '\r']);
    if body.is_empty() {
        return String::new();
    }
    format!("{body}\n")
}
