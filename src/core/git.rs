//! Repository capability and its git implementation
//!
//! The engine only needs a handful of primitives from version control; they
//! live behind [`Repository`] so the commit logic runs against fakes in tests.
//! [`GitRepo`] shells out to the `git` executable.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Version-control primitives used by the commit synchronizer.
/// All paths are relative to [`Repository::root`].
pub trait Repository {
    /// Absolute work-tree root
    fn root(&self) -> &Path;

    /// Any tracked file differs from HEAD (untracked files ignored)
    fn is_dirty(&self) -> Result<bool>;

    /// Unified diff of one path against HEAD; empty when unchanged
    fn diff_head(&self, rel: &Path) -> Result<String>;

    /// Paths known to the index
    fn tracked_files(&self) -> Result<BTreeSet<PathBuf>>;

    fn stage(&mut self, rels: &[PathBuf]) -> Result<()>;

    /// Commit the index; `no_verify` bypasses pre-commit hooks
    fn commit(&mut self, message: &str, no_verify: bool) -> Result<()>;

    /// Abbreviated hash of HEAD
    fn head_short_hash(&self) -> Result<String>;

    /// Tracked paths whose work-tree content differs from the index
    fn dirty_files(&self) -> Result<BTreeSet<PathBuf>>;

    /// Paths touched by commit `rev`
    fn files_in_commit(&self, rev: &str) -> Result<BTreeSet<PathBuf>>;

    /// Patch introduced by commit `rev`
    fn commit_diff(&self, rev: &str) -> Result<String>;

    /// HEAD is the tip of the current branch's `origin` counterpart
    fn head_is_pushed(&self) -> Result<bool>;

    /// Drop HEAD and reset index and work tree to its parent
    fn reset_to_parent(&mut self) -> Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("git {args} failed: {stderr}")]
    CommandFailed { args: String, stderr: String },
}

/// Hash of git's empty tree, the diff base before the first commit
const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Repository backed by the `git` executable
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    /// Open the work tree containing `start`.
    /// Returns Ok(None) when `start` is not inside a repository or git is
    /// unavailable.
    pub fn discover(start: &Path) -> Result<Option<Self>> {
        let output = match Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(start)
            .output()
        {
            Ok(o) => o,
            Err(e) => {
                tracing::debug!(error = %e, "git executable not available");
                return Ok(None);
            }
        };

        if !output.status.success() {
            return Ok(None);
        }

        let s = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if s.is_empty() {
            return Ok(None);
        }
        let root = dunce::canonicalize(&s)
            .with_context(|| format!("Failed to canonicalize repository root {s}"))?;
        Ok(Some(Self { root }))
    }

    /// Open `root` directly without discovery
    pub fn open(root: &Path) -> Result<Self> {
        Ok(Self {
            root: dunce::canonicalize(root)
                .with_context(|| format!("Failed to open repository {}", root.display()))?,
        })
    }

    fn git<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let args: Vec<std::ffi::OsString> =
            args.into_iter().map(|a| a.as_ref().to_os_string()).collect();

        let output = Command::new("git")
            .args(&args)
            .current_dir(&self.root)
            .output()
            .context("Failed to spawn git")?;

        if !output.status.success() {
            let rendered = args
                .iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ");
            return Err(RepoError::CommandFailed {
                args: rendered,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn has_head(&self) -> bool {
        self.git(["rev-parse", "--verify", "--quiet", "HEAD"]).is_ok()
    }
}

impl Repository for GitRepo {
    fn root(&self) -> &Path {
        &self.root
    }

    fn is_dirty(&self) -> Result<bool> {
        let status = self.git(["status", "--porcelain", "--untracked-files=no"])?;
        Ok(!status.trim().is_empty())
    }

    fn diff_head(&self, rel: &Path) -> Result<String> {
        let base = if self.has_head() { "HEAD" } else { EMPTY_TREE };
        let diff = self.git([
            std::ffi::OsStr::new("diff"),
            std::ffi::OsStr::new(base),
            std::ffi::OsStr::new("--"),
            rel.as_os_str(),
        ])?;
        Ok(diff)
    }

    fn tracked_files(&self) -> Result<BTreeSet<PathBuf>> {
        let listing = self.git(["ls-files"])?;
        Ok(listing.lines().map(PathBuf::from).collect())
    }

    fn stage(&mut self, rels: &[PathBuf]) -> Result<()> {
        if rels.is_empty() {
            return Ok(());
        }
        let mut args = vec![std::ffi::OsString::from("add"), "--".into()];
        args.extend(rels.iter().map(|p| p.as_os_str().to_os_string()));
        self.git(args)?;
        Ok(())
    }

    fn commit(&mut self, message: &str, no_verify: bool) -> Result<()> {
        let mut args = vec!["commit", "-m", message];
        if no_verify {
            args.push("--no-verify");
        }
        self.git(args)?;
        Ok(())
    }

    fn head_short_hash(&self) -> Result<String> {
        Ok(self.git(["rev-parse", "--short=7", "HEAD"])?.trim().to_string())
    }

    fn dirty_files(&self) -> Result<BTreeSet<PathBuf>> {
        let listing = self.git(["diff", "--name-only"])?;
        Ok(listing.lines().map(PathBuf::from).collect())
    }

    fn files_in_commit(&self, rev: &str) -> Result<BTreeSet<PathBuf>> {
        let listing = self.git([
            "diff-tree",
            "--root",
            "--no-commit-id",
            "--name-only",
            "-r",
            rev,
        ])?;
        Ok(listing.lines().map(PathBuf::from).collect())
    }

    fn commit_diff(&self, rev: &str) -> Result<String> {
        self.git(["show", "--format=", "--patch", rev])
    }

    fn head_is_pushed(&self) -> Result<bool> {
        let branch = self.git(["rev-parse", "--abbrev-ref", "HEAD"])?;
        let remote = format!("origin/{}", branch.trim());
        let Ok(remote_head) = self.git(["rev-parse", "--verify", "--quiet", remote.as_str()]) else {
            return Ok(false);
        };
        let local_head = self.git(["rev-parse", "HEAD"])?;
        Ok(local_head.trim() == remote_head.trim())
    }

    fn reset_to_parent(&mut self) -> Result<()> {
        self.git(["reset", "--hard", "HEAD~1"])?;
        Ok(())
    }
}

/// Path of `abs` relative to the repository root, if inside it
pub fn repo_relative(repo: &dyn Repository, abs: &Path) -> Option<PathBuf> {
    abs.strip_prefix(repo.root()).ok().map(Path::to_path_buf)
}
