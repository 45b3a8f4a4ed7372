//! Three-tier conversation context
//!
//! A transcript is assembled each turn from:
//! - archived turns (settled history, including outcome markers)
//! - the file frame, rebuilt from disk on every send and never archived
//! - active turns (the exchange still in progress)
//!
//! Folding moves active turns behind a short marker pair so settled history
//! never repeats file contents.

use std::fmt::Write as _;

use anyhow::Result;

use crate::core::model::Message;
use crate::core::prompts;
use crate::core::tracked::TrackedFiles;
use crate::infra::io::read_text_or_empty;

#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    archived: Vec<Message>,
    active: Vec<Message>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.active.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.active.push(Message::assistant(content));
    }

    /// Settle the active exchange behind `marker` and an acknowledgement
    pub fn fold(&mut self, marker: impl Into<String>) {
        self.archived.append(&mut self.active);
        self.archived.push(Message::user(marker));
        self.archived.push(Message::assistant(prompts::ACK));
    }

    /// Files changed outside the chat: the active exchange no longer
    /// describes what is on disk
    pub fn archive_local_edits(&mut self) {
        self.fold(prompts::FILES_CONTENT_LOCAL_EDITS);
    }

    /// Full message list for one send
    pub fn transcript(&self, frame: &[Message]) -> Vec<Message> {
        let mut messages =
            Vec::with_capacity(1 + self.archived.len() + frame.len() + self.active.len());
        messages.push(Message::system(format!(
            "{}{}",
            prompts::MAIN_SYSTEM,
            prompts::SYSTEM_REMINDER
        )));
        messages.extend_from_slice(&self.archived);
        messages.extend_from_slice(frame);
        messages.extend_from_slice(&self.active);
        messages
    }

    /// Forget the whole conversation
    pub fn clear(&mut self) {
        self.archived.clear();
        self.active.clear();
    }

    pub fn archived(&self) -> &[Message] {
        &self.archived
    }

    pub fn active(&self) -> &[Message] {
        &self.active
    }
}

/// Render the current content of every tracked file, in registration order
pub fn render_file_frame(files: &TrackedFiles) -> Result<Vec<Message>> {
    let mut body = String::from(prompts::FILES_CONTENT_PREFIX);
    for abs in files.paths() {
        let content = read_text_or_empty(abs)?;
        let _ = write!(body, "\n{}\n```\n{}", files.display_path(abs).display(), content);
        if !content.is_empty() && !content.ends_with('\n') {
            body.push('\n');
        }
        body.push_str("```\n");
    }

    Ok(vec![
        Message::user(body),
        Message::assistant(prompts::ACK),
        Message::system(format!(
            "{}{}",
            prompts::FILES_CONTENT_SUFFIX,
            prompts::SYSTEM_REMINDER
        )),
    ])
}
