//! Registry of files participating in the chat
//!
//! Holds canonical paths and the modification times observed at the last
//! sync point. File content is never cached here; callers re-read it.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Result;
use indexmap::IndexMap;

use crate::infra::io::{canonical_path, modified_time, touch};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("cannot create tracked file {}: {reason}", path.display())]
    CreateFailed { path: PathBuf, reason: String },
}

/// Tracked files in registration order plus the out-of-band baseline
#[derive(Debug, Clone)]
pub struct TrackedFiles {
    root: PathBuf,
    files: IndexMap<PathBuf, SystemTime>,
    baseline: SystemTime,
}

impl TrackedFiles {
    /// Empty registry resolving relative paths against `root`
    pub fn new(root: &Path) -> Result<Self> {
        Ok(Self {
            root: canonical_path(root)?,
            files: IndexMap::new(),
            baseline: SystemTime::UNIX_EPOCH,
        })
    }

    /// Startup registration: create missing files, record their mtimes
    /// and move the baseline past them.
    pub fn register(&mut self, path: &Path) -> Result<PathBuf, StartupError> {
        let abs = self.resolve(path).map_err(|e| StartupError::CreateFailed {
            path: path.to_path_buf(),
            reason: format!("{e:#}"),
        })?;
        let existed = abs.exists();
        touch(&abs).map_err(|e| StartupError::CreateFailed {
            path: abs.clone(),
            reason: format!("{e:#}"),
        })?;
        if existed {
            tracing::info!(path = %abs.display(), "loading file");
        } else {
            tracing::info!(path = %abs.display(), "created file");
        }

        let mtime = modified_time(&abs).unwrap_or(SystemTime::UNIX_EPOCH);
        self.files.insert(abs.clone(), mtime);
        self.baseline = self.baseline.max(mtime);
        Ok(abs)
    }

    /// Register a file authorized mid-session. Its current mtime (if it
    /// exists yet) becomes part of the baseline so adopting is never mistaken
    /// for an out-of-band edit.
    pub fn adopt(&mut self, abs: &Path) {
        if self.files.contains_key(abs) {
            return;
        }
        let mtime = modified_time(abs).unwrap_or(SystemTime::UNIX_EPOCH);
        self.files.insert(abs.to_path_buf(), mtime);
        self.baseline = self.baseline.max(mtime);
    }

    /// Stop tracking `abs`; true when it was tracked
    pub fn remove(&mut self, abs: &Path) -> bool {
        self.files.shift_remove(abs).is_some()
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    /// Canonical absolute form of a (possibly relative) path
    pub fn resolve(&self, path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            canonical_path(path)
        } else {
            canonical_path(&self.root.join(path))
        }
    }

    pub fn contains(&self, abs: &Path) -> bool {
        self.files.contains_key(abs)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path relative to the session root when inside it, else as given
    pub fn display_path<'a>(&self, abs: &'a Path) -> &'a Path {
        abs.strip_prefix(&self.root).unwrap_or(abs)
    }

    /// Newest on-disk modification time over all tracked files
    pub fn latest_mtime(&self) -> SystemTime {
        self.files
            .keys()
            .filter_map(|p| modified_time(p))
            .max()
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }

    pub fn baseline(&self) -> SystemTime {
        self.baseline
    }

    /// A tracked file changed on disk after the last sync point
    pub fn has_out_of_band_edits(&self) -> bool {
        self.latest_mtime() > self.baseline
    }

    /// Re-observe every file and advance the baseline to the newest mtime
    pub fn mark_synced(&mut self) {
        for (path, mtime) in self.files.iter_mut() {
            if let Some(t) = modified_time(path) {
                *mtime = t;
            }
        }
        self.baseline = self.baseline.max(self.latest_mtime());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_register_creates_and_keeps_order() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.py"), "x = 1\n").unwrap();

        let mut files = TrackedFiles::new(dir.path()).unwrap();
        files.register(Path::new("b.py")).unwrap();
        files.register(Path::new("sub/a.py")).unwrap();

        assert!(dir.path().join("sub/a.py").exists());
        let names: Vec<_> = files
            .paths()
            .map(|p| files.display_path(p).to_path_buf())
            .collect();
        assert_eq!(names, vec![PathBuf::from("b.py"), PathBuf::from("sub/a.py")]);
        assert!(!files.has_out_of_band_edits());
    }

    #[test]
    fn test_out_of_band_edit_detected_until_synced() {
        let dir = tempdir().unwrap();
        let mut files = TrackedFiles::new(dir.path()).unwrap();
        let abs = files.register(Path::new("main.rs")).unwrap();

        let later = files.baseline() + Duration::from_secs(30);
        let f = fs::OpenOptions::new().write(true).open(&abs).unwrap();
        f.set_modified(later).unwrap();

        assert!(files.has_out_of_band_edits());
        files.mark_synced();
        assert!(!files.has_out_of_band_edits());
        assert_eq!(files.baseline(), later);
    }

    #[test]
    fn test_adopt_missing_file_keeps_baseline() {
        let dir = tempdir().unwrap();
        let mut files = TrackedFiles::new(dir.path()).unwrap();
        files.register(Path::new("a.rs")).unwrap();
        let before = files.baseline();

        let extra = files.resolve(Path::new("b.rs")).unwrap();
        files.adopt(&extra);
        assert!(files.contains(&extra));
        assert_eq!(files.baseline(), before);
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_adopting_newer_file_is_not_an_out_of_band_edit() {
        let dir = tempdir().unwrap();
        let mut files = TrackedFiles::new(dir.path()).unwrap();
        files.register(Path::new("a.rs")).unwrap();

        let extra = dir.path().join("b.rs");
        fs::write(&extra, "fn b() {}\n").unwrap();
        let later = files.baseline() + Duration::from_secs(30);
        fs::OpenOptions::new()
            .write(true)
            .open(&extra)
            .unwrap()
            .set_modified(later)
            .unwrap();

        let extra = files.resolve(&extra).unwrap();
        files.adopt(&extra);
        assert_eq!(files.baseline(), later);
        assert!(!files.has_out_of_band_edits());
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = tempdir().unwrap();
        let mut files = TrackedFiles::new(dir.path()).unwrap();
        let a = files.register(Path::new("a.rs")).unwrap();
        let b = files.register(Path::new("b.rs")).unwrap();

        assert!(files.remove(&a));
        assert!(!files.remove(&a));
        assert_eq!(files.paths().collect::<Vec<_>>(), vec![b.as_path()]);
        files.clear();
        assert!(files.is_empty());
    }
}
