//! Chat session: tracked files, collaborators and the turn loop
//!
//! One [`Session`] owns everything a run mutates. Each turn sends the
//! conversation plus fresh file contents to the main model, applies the edit
//! blocks in the reply and commits the result.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, error, info, instrument, warn};

use crate::core::apply_engine::{ApplyEngine, ApplyReport};
use crate::core::commands::{self, CommandOutcome};
use crate::core::commit::{CommitRecord, CommitRequest, CommitSync};
use crate::core::context::{ConversationContext, render_file_frame};
use crate::core::edit::extract;
use crate::core::git::{Repository, repo_relative};
use crate::core::matcher::MatchConfig;
use crate::core::model::{Message, ModelClient, send_with_retry};
use crate::core::prompts;
use crate::core::tracked::TrackedFiles;
use crate::infra::console::{Input, Prompter};
use crate::infra::io::write_atomic;

/// Per-run knobs resolved from config and CLI
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub main_model: String,
    /// Escalation rewrites and commit messages
    pub edit_model: String,
    /// Where every reply is saved; relative paths resolve against the root
    pub last_edit_path: PathBuf,
    pub matcher: MatchConfig,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            main_model: "gpt-4".into(),
            edit_model: "gpt-3.5-turbo".into(),
            last_edit_path: PathBuf::from(".chatedit.last-edit.md"),
            matcher: MatchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Reply cut short; nothing extracted
    Interrupted,
    /// No directive changed a file; the exchange stays active
    NoEdits,
    Applied {
        edited: Vec<PathBuf>,
        commit: Option<CommitRecord>,
    },
}

pub struct Session {
    pub(crate) files: TrackedFiles,
    pub(crate) repo: Option<Box<dyn Repository>>,
    pub(crate) model: Box<dyn ModelClient>,
    pub(crate) prompter: Box<dyn Prompter>,
    pub(crate) context: ConversationContext,
    pub(crate) settings: SessionSettings,
    /// Latest commit of chat edits; the only one `/undo` may remove
    pub(crate) last_commit: Option<CommitRecord>,
}

impl Session {
    /// Register `paths` (creating missing files) and reconcile them with the
    /// repository. Failing to create a file is fatal.
    pub fn start(
        root: &Path,
        paths: &[PathBuf],
        repo: Option<Box<dyn Repository>>,
        model: Box<dyn ModelClient>,
        prompter: Box<dyn Prompter>,
        settings: SessionSettings,
    ) -> Result<Self> {
        let mut session = Self {
            files: TrackedFiles::new(root)?,
            repo: None,
            model,
            prompter,
            context: ConversationContext::new(),
            settings,
            last_commit: None,
        };

        for p in paths {
            let existed = session.files.resolve(p).is_ok_and(|abs| abs.exists());
            let abs = session.files.register(p)?;
            let shown = session.files.display_path(&abs).display().to_string();
            if existed {
                session.prompter.notify(&format!("Loading {shown}"));
            } else {
                session.prompter.warn(&format!("Creating {shown}"));
            }
        }

        session.repo = session.attach_repo(repo)?;
        if session.repo.is_none() {
            session
                .prompter
                .warn("Will not automatically commit edits as they happen.");
        }
        Ok(session)
    }

    /// Keep the repository only if every tracked file lives in it and the
    /// user lets untracked ones be added
    fn attach_repo(
        &mut self,
        repo: Option<Box<dyn Repository>>,
    ) -> Result<Option<Box<dyn Repository>>> {
        let Some(mut repo) = repo else {
            self.prompter.warn("Files are not in a git repo.");
            return Ok(None);
        };

        let mut rels = Vec::with_capacity(self.files.len());
        for abs in self.files.paths() {
            match repo_relative(&*repo, abs) {
                Some(rel) => rels.push(rel),
                None => {
                    self.prompter.warn(&format!(
                        "{} is outside the git repo at {}.",
                        abs.display(),
                        repo.root().display()
                    ));
                    return Ok(None);
                }
            }
        }

        let known = repo.tracked_files()?;
        let new_files: Vec<PathBuf> = rels.into_iter().filter(|r| !known.contains(r)).collect();
        if new_files.is_empty() {
            return Ok(Some(repo));
        }

        self.prompter.warn(&format!(
            "Files not tracked in {}:",
            repo.root().display()
        ));
        for rel in &new_files {
            self.prompter.warn(&format!("  {}", rel.display()));
        }
        if !self.prompter.confirm("Add them?")? {
            self.prompter
                .warn("Skipped adding new files to the git repo.");
            return Ok(None);
        }

        repo.stage(&new_files)?;
        for rel in &new_files {
            self.prompter
                .warn(&format!("Added {} to the git repo", rel.display()));
        }
        repo.commit(prompts::INITIAL_COMMIT_MESSAGE, true)?;
        info!(files = new_files.len(), "committed new files");
        self.prompter.notify(&format!(
            "Committed new files with message: {}",
            prompts::INITIAL_COMMIT_MESSAGE
        ));
        self.files.mark_synced();
        Ok(Some(repo))
    }

    pub fn files(&self) -> &TrackedFiles {
        &self.files
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn has_repo(&self) -> bool {
        self.repo.is_some()
    }

    pub fn last_commit(&self) -> Option<&CommitRecord> {
        self.last_commit.as_ref()
    }

    /// Commit changes that predate the session under a `WIP: ` prefix
    pub fn commit_dirty_on_start(&mut self, ask: bool) -> Result<Option<CommitRecord>> {
        self.commit(CommitRequest {
            prefix: Some(prompts::WIP_PREFIX),
            ask,
            ..Default::default()
        })
    }

    pub(crate) fn commit(&mut self, req: CommitRequest<'_>) -> Result<Option<CommitRecord>> {
        let Some(repo) = self.repo.as_deref_mut() else {
            return Ok(None);
        };
        CommitSync {
            repo,
            files: &mut self.files,
            model: &mut *self.model,
            prompter: &mut *self.prompter,
            commit_model: &self.settings.edit_model,
        }
        .commit(req)
    }

    /// Read instructions until end of input, `/exit` or two consecutive
    /// interrupts
    pub fn run(&mut self) -> Result<()> {
        let mut interrupts = 0;
        loop {
            match self.prompter.read_input()? {
                Input::Eof => break,
                Input::Interrupted => {
                    interrupts += 1;
                    if interrupts >= 2 {
                        break;
                    }
                    self.prompter.warn("^C again to quit");
                }
                Input::Line(line) => {
                    interrupts = 0;
                    let mut request = line.trim_end().to_string();
                    if request.trim().is_empty() {
                        continue;
                    }
                    if commands::is_command(&request) {
                        match commands::dispatch(self, &request) {
                            Ok(CommandOutcome::Done) => continue,
                            Ok(CommandOutcome::Exit) => break,
                            Ok(CommandOutcome::Send(text)) => request = text,
                            Err(e) => {
                                error!("command failed: {e:#}");
                                self.prompter.warn(&format!("{e:#}"));
                                continue;
                            }
                        }
                    }
                    match self.run_turn(&request) {
                        Ok(outcome) => debug!(?outcome, "turn complete"),
                        Err(e) => {
                            error!("turn failed: {e:#}");
                            self.prompter.warn(&format!("{e:#}"));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// One request/response/apply/commit cycle
    #[instrument(skip_all)]
    pub fn run_turn(&mut self, input: &str) -> Result<TurnOutcome> {
        if self.files.has_out_of_band_edits() {
            debug!("tracked files changed outside the chat");
            if let Err(e) = self.commit(CommitRequest {
                ask: true,
                ..Default::default()
            }) {
                error!("commit of local edits failed: {e:#}");
            }
            self.context.archive_local_edits();
            self.files.mark_synced();
        }

        let frame = render_file_frame(&self.files)?;
        let mut messages = self.context.transcript(&frame);
        messages.push(Message::user(input));

        let reply = send_with_retry(
            &mut *self.model,
            &self.settings.main_model,
            &messages,
            false,
        )?;

        let mut content = reply.content;
        if reply.interrupted {
            content.push_str(prompts::INTERRUPTED_NOTICE);
        }
        self.save_last_reply(&content);

        self.context.push_user(input);
        self.context.push_assistant(content.clone());

        if reply.interrupted {
            self.prompter.warn("Interrupted.");
            return Ok(TurnOutcome::Interrupted);
        }

        let report = self.apply_text(&content, input);
        if !report.any_edited() {
            return Ok(TurnOutcome::NoEdits);
        }
        let edited: Vec<PathBuf> = report.edited().into_iter().map(Path::to_path_buf).collect();
        if let Err(e) = self.stage_new_files(&edited) {
            error!("staging new files failed: {e:#}");
        }

        let history = self.context.active().to_vec();
        let commit = match self.commit(CommitRequest {
            history: Some(history.as_slice()),
            ..Default::default()
        }) {
            Ok(c) => c,
            Err(e) => {
                error!("commit failed: {e:#}");
                None
            }
        };
        if commit.is_some() {
            self.last_commit = commit.clone();
        }

        let marker = match &commit {
            Some(rec) => prompts::files_content_gpt_edits(&rec.hash, &rec.message),
            None => {
                if self.repo.is_some() {
                    self.prompter.warn("No changes found in tracked files.");
                }
                prompts::FILES_CONTENT_NO_EDITS.to_string()
            }
        };
        self.files.mark_synced();
        self.context.fold(marker);

        Ok(TurnOutcome::Applied { edited, commit })
    }

    /// Stage edited files the repository does not know yet so the commit
    /// picks them up
    fn stage_new_files(&mut self, edited: &[PathBuf]) -> Result<()> {
        let Some(repo) = self.repo.as_deref_mut() else {
            return Ok(());
        };
        let known = repo.tracked_files()?;
        let new_files: Vec<PathBuf> = edited
            .iter()
            .filter_map(|p| repo_relative(&*repo, &self.files.root().join(p)))
            .filter(|rel| !known.contains(rel))
            .collect();
        if new_files.is_empty() {
            return Ok(());
        }
        repo.stage(&new_files)?;
        for rel in &new_files {
            self.prompter
                .notify(&format!("Added {} to the git repo", rel.display()));
        }
        Ok(())
    }

    /// Extract and apply every edit block in `content`
    pub fn apply_text(&mut self, content: &str, request: &str) -> ApplyReport {
        let directives = extract(content);
        debug!(count = directives.len(), "extracted edit blocks");
        ApplyEngine {
            files: &mut self.files,
            prompter: &mut *self.prompter,
            model: &mut *self.model,
            edit_model: &self.settings.edit_model,
            matcher: &self.settings.matcher,
        }
        .apply_all(&directives, request)
    }

    fn last_edit_path(&self) -> PathBuf {
        if self.settings.last_edit_path.is_absolute() {
            self.settings.last_edit_path.clone()
        } else {
            self.files.root().join(&self.settings.last_edit_path)
        }
    }

    fn save_last_reply(&self, content: &str) {
        let path = self.last_edit_path();
        if let Err(e) = write_atomic(&path, content.as_bytes())
            .with_context(|| format!("Failed to save reply to {}", path.display()))
        {
            warn!("{e:#}");
        }
    }
}
