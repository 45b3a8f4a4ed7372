//! Shared test utilities for integration tests
//!
//! In-memory stand-ins for the repository, model and terminal. Each fake is
//! a cheap handle over shared state so a test can hand one clone to the
//! session and inspect the other afterwards.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use assert_fs::prelude::*;
use similar::TextDiff;

use chatedit::core::git::Repository;
use chatedit::core::model::{Message, ModelClient, ModelError, Reply};
use chatedit::infra::console::{Input, Prompter};

/// Temp project holding `files` (path, content)
pub fn project(files: &[(&str, &str)]) -> assert_fs::TempDir {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    for (path, content) in files {
        tmp.child(path).write_str(content).expect("write fixture");
    }
    tmp
}

pub fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).expect("read fixture file")
}

/// Edit block in the format the extractor accepts
pub fn block(path: &str, original: &str, updated: &str) -> String {
    format!("{path}\n<<<<<<< ORIGINAL\n{original}=======\n{updated}>>>>>>> UPDATED\n")
}

// ---------------------------------------------------------------- repo

#[derive(Debug, Default)]
pub struct RepoState {
    /// Committed content per repo-relative path
    pub head: BTreeMap<PathBuf, String>,
    /// Staged content not yet committed
    pub index: BTreeMap<PathBuf, String>,
    /// Full messages in commit order
    pub commits: Vec<String>,
    pub no_verify: Vec<bool>,
    /// HEAD content after each commit
    pub snapshots: Vec<BTreeMap<PathBuf, String>>,
    /// Number of commits present on the remote
    pub pushed: Option<usize>,
}

/// Repository whose HEAD lives in memory; the work tree is the real disk
#[derive(Clone)]
pub struct FakeRepo {
    root: PathBuf,
    pub state: Rc<RefCell<RepoState>>,
}

impl FakeRepo {
    pub fn new(root: &Path) -> Self {
        Self {
            root: dunce::canonicalize(root).expect("canonical root"),
            state: Rc::default(),
        }
    }

    /// Commit the current disk content of `rels` as the baseline HEAD
    pub fn with_committed(self, rels: &[&str]) -> Self {
        {
            let mut st = self.state.borrow_mut();
            for rel in rels {
                let content = fs::read_to_string(self.root.join(rel)).unwrap_or_default();
                st.head.insert(PathBuf::from(rel), content);
            }
            st.commits.push("baseline".into());
            st.no_verify.push(true);
            let snapshot = st.head.clone();
            st.snapshots.push(snapshot);
        }
        self
    }

    /// Pretend everything committed so far reached the remote
    pub fn mark_pushed(&self) {
        let mut st = self.state.borrow_mut();
        st.pushed = Some(st.commits.len());
    }

    pub fn commits(&self) -> Vec<String> {
        self.state.borrow().commits.clone()
    }

    pub fn head_content(&self, rel: &str) -> Option<String> {
        self.state.borrow().head.get(Path::new(rel)).cloned()
    }

    fn disk(&self, rel: &Path) -> String {
        fs::read_to_string(self.root.join(rel)).unwrap_or_default()
    }

    /// Snapshot index of the commit abbreviated as `rev`
    fn commit_index(&self, rev: &str) -> Result<usize> {
        let n = self.state.borrow().commits.len();
        (0..n)
            .find(|i| short_hash(i + 1) == rev)
            .ok_or_else(|| anyhow!("unknown revision {rev}"))
    }

    /// (path, before, after) for every path commit `idx` changed
    fn commit_changes(&self, idx: usize) -> Vec<(PathBuf, String, String)> {
        let st = self.state.borrow();
        let empty = BTreeMap::new();
        let before = if idx == 0 { &empty } else { &st.snapshots[idx - 1] };
        let after = &st.snapshots[idx];
        before
            .keys()
            .chain(after.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter_map(|rel| {
                let old = before.get(rel).cloned().unwrap_or_default();
                let new = after.get(rel).cloned().unwrap_or_default();
                (old != new).then(|| (rel.clone(), old, new))
            })
            .collect()
    }
}

fn short_hash(n: usize) -> String {
    format!("{:07x}", 0xabc0000 + n)
}

impl Repository for FakeRepo {
    fn root(&self) -> &Path {
        &self.root
    }

    fn is_dirty(&self) -> Result<bool> {
        let st = self.state.borrow();
        Ok(st.head.iter().any(|(rel, committed)| self.disk(rel) != *committed)
            || !st.index.is_empty())
    }

    fn diff_head(&self, rel: &Path) -> Result<String> {
        let st = self.state.borrow();
        let Some(old) = st.head.get(rel).or_else(|| st.index.get(rel).map(|_| &EMPTY)) else {
            return Ok(String::new());
        };
        let new = self.disk(rel);
        if *old == new {
            return Ok(String::new());
        }
        let name = rel.display().to_string();
        Ok(TextDiff::from_lines(old.as_str(), new.as_str())
            .unified_diff()
            .header(&format!("a/{name}"), &format!("b/{name}"))
            .to_string())
    }

    fn tracked_files(&self) -> Result<BTreeSet<PathBuf>> {
        let st = self.state.borrow();
        Ok(st.head.keys().chain(st.index.keys()).cloned().collect())
    }

    fn stage(&mut self, rels: &[PathBuf]) -> Result<()> {
        for rel in rels {
            let content = self.disk(rel);
            self.state.borrow_mut().index.insert(rel.clone(), content);
        }
        Ok(())
    }

    fn commit(&mut self, message: &str, no_verify: bool) -> Result<()> {
        let mut st = self.state.borrow_mut();
        if st.index.is_empty() {
            return Err(anyhow!("nothing to commit"));
        }
        let staged = std::mem::take(&mut st.index);
        st.head.extend(staged);
        st.commits.push(message.to_string());
        st.no_verify.push(no_verify);
        let snapshot = st.head.clone();
        st.snapshots.push(snapshot);
        Ok(())
    }

    fn head_short_hash(&self) -> Result<String> {
        let n = self.state.borrow().commits.len();
        if n == 0 {
            return Err(anyhow!("no commits yet"));
        }
        Ok(short_hash(n))
    }

    fn dirty_files(&self) -> Result<BTreeSet<PathBuf>> {
        let st = self.state.borrow();
        let mut out = BTreeSet::new();
        for (rel, committed) in &st.head {
            let expected = st.index.get(rel).unwrap_or(committed);
            if self.disk(rel) != *expected {
                out.insert(rel.clone());
            }
        }
        Ok(out)
    }

    fn files_in_commit(&self, rev: &str) -> Result<BTreeSet<PathBuf>> {
        let idx = self.commit_index(rev)?;
        Ok(self
            .commit_changes(idx)
            .into_iter()
            .map(|(rel, _, _)| rel)
            .collect())
    }

    fn commit_diff(&self, rev: &str) -> Result<String> {
        let idx = self.commit_index(rev)?;
        let mut out = String::new();
        for (rel, old, new) in self.commit_changes(idx) {
            let name = rel.display().to_string();
            out.push_str(
                &TextDiff::from_lines(old.as_str(), new.as_str())
                    .unified_diff()
                    .header(&format!("a/{name}"), &format!("b/{name}"))
                    .to_string(),
            );
        }
        Ok(out)
    }

    fn head_is_pushed(&self) -> Result<bool> {
        let st = self.state.borrow();
        Ok(st.pushed == Some(st.commits.len()))
    }

    fn reset_to_parent(&mut self) -> Result<()> {
        let mut st = self.state.borrow_mut();
        if st.commits.len() < 2 {
            return Err(anyhow!("HEAD has no parent"));
        }
        st.commits.pop();
        st.no_verify.pop();
        let dropped = st.snapshots.pop().unwrap_or_default();
        let parent = st.snapshots.last().cloned().unwrap_or_default();

        for rel in dropped.keys().filter(|rel| !parent.contains_key(*rel)) {
            let _ = fs::remove_file(self.root.join(rel));
        }
        for (rel, content) in &parent {
            fs::write(self.root.join(rel), content)?;
        }
        st.head = parent;
        st.index.clear();
        Ok(())
    }
}

static EMPTY: String = String::new();

// ---------------------------------------------------------------- model

#[derive(Debug, Clone)]
pub struct ModelCall {
    pub model: String,
    pub messages: Vec<Message>,
    pub silent: bool,
}

#[derive(Debug, Default)]
pub struct ModelScript {
    pub replies: VecDeque<Result<Reply, ModelError>>,
    pub calls: Vec<ModelCall>,
}

/// Model that answers from a queue and records every request
#[derive(Clone, Default)]
pub struct ScriptedModel {
    pub script: Rc<RefCell<ModelScript>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, text: &str) -> &Self {
        self.script
            .borrow_mut()
            .replies
            .push_back(Ok(Reply::complete(text)));
        self
    }

    pub fn interrupted(&self, partial: &str) -> &Self {
        self.script
            .borrow_mut()
            .replies
            .push_back(Ok(Reply::interrupted(partial)));
        self
    }

    pub fn rate_limited(&self) -> &Self {
        self.script
            .borrow_mut()
            .replies
            .push_back(Err(ModelError::RateLimited {
                retry_after: Duration::ZERO,
            }));
        self
    }

    pub fn fail(&self, reason: &str) -> &Self {
        self.script
            .borrow_mut()
            .replies
            .push_back(Err(ModelError::Request(reason.to_string())));
        self
    }

    pub fn calls(&self) -> Vec<ModelCall> {
        self.script.borrow().calls.clone()
    }
}

impl ModelClient for ScriptedModel {
    fn complete(
        &mut self,
        model: &str,
        messages: &[Message],
        silent: bool,
    ) -> Result<Reply, ModelError> {
        let mut script = self.script.borrow_mut();
        script.calls.push(ModelCall {
            model: model.to_string(),
            messages: messages.to_vec(),
            silent,
        });
        script
            .replies
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Request("no scripted reply".into())))
    }
}

// ---------------------------------------------------------------- prompter

#[derive(Debug, Default)]
pub struct PromptScript {
    pub inputs: VecDeque<Input>,
    pub confirms: VecDeque<bool>,
    pub answers: VecDeque<String>,
    /// Questions asked through `confirm` and `ask`, in order
    pub questions: Vec<String>,
    pub notices: Vec<String>,
    pub warnings: Vec<String>,
}

/// Prompter answering from queues; unanswered confirms are "no", unanswered
/// asks accept the default
#[derive(Clone, Default)]
pub struct ScriptedPrompter {
    pub script: Rc<RefCell<PromptScript>>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(&self, line: &str) -> &Self {
        self.script
            .borrow_mut()
            .inputs
            .push_back(Input::Line(line.to_string()));
        self
    }

    pub fn interrupt(&self) -> &Self {
        self.script.borrow_mut().inputs.push_back(Input::Interrupted);
        self
    }

    pub fn confirm_with(&self, yes: bool) -> &Self {
        self.script.borrow_mut().confirms.push_back(yes);
        self
    }

    pub fn answer(&self, text: &str) -> &Self {
        self.script.borrow_mut().answers.push_back(text.to_string());
        self
    }

    pub fn questions(&self) -> Vec<String> {
        self.script.borrow().questions.clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.script.borrow().warnings.clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.script.borrow().notices.clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn read_input(&mut self) -> Result<Input> {
        Ok(self
            .script
            .borrow_mut()
            .inputs
            .pop_front()
            .unwrap_or(Input::Eof))
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        let mut s = self.script.borrow_mut();
        s.questions.push(question.to_string());
        Ok(s.confirms.pop_front().unwrap_or(false))
    }

    fn ask(&mut self, question: &str) -> Result<String> {
        let mut s = self.script.borrow_mut();
        s.questions.push(question.to_string());
        Ok(s.answers.pop_front().unwrap_or_default())
    }

    fn notify(&mut self, message: &str) {
        self.script.borrow_mut().notices.push(message.to_string());
    }

    fn warn(&mut self, message: &str) {
        self.script.borrow_mut().warnings.push(message.to_string());
    }
}
