use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Read a text file, treating a missing file as empty
pub fn read_text_or_empty(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read file {}", path.display())),
    }
}

/// Modification time, or `None` when the file is gone or unreadable
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Canonical absolute path that also works for files not created yet:
/// the parent is canonicalized and the file name re-attached.
pub fn canonical_path(path: &Path) -> Result<PathBuf> {
    if let Ok(p) = dunce::canonicalize(path) {
        return Ok(p);
    }

    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(path)
    };

    match (abs.parent(), abs.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = dunce::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf());
            Ok(parent.join(name))
        }
        _ => Ok(abs),
    }
}

/// Create an empty file (and its parent directories) when absent
pub fn touch(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(path, b"").with_context(|| format!("Failed to create file {}", path.display()))
}

/// Atomic write with robust temp file strategy
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    // Prefer same-dir tempfile; fall back to OS temp on EPERM/ENOENT
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    if !dir.as_os_str().is_empty() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    // Preserve original permissions
    #[cfg(unix)]
    let perms = fs::metadata(path)
        .map(|m| m.permissions())
        .unwrap_or_else(|_| std::os::unix::fs::PermissionsExt::from_mode(0o644));
    #[cfg(not(unix))]
    let perms = fs::metadata(path).map(|m| m.permissions()).ok();

    let tmp = match tempfile::NamedTempFile::new_in(dir) {
        Ok(t) => t,
        Err(_) => tempfile::NamedTempFile::new()?, // fallback to /tmp
    };

    // Write the content fully
    use std::io::Write;
    let mut file = tmp.as_file();
    file.write_all(data)?;
    file.sync_all()?;

    #[cfg(unix)]
    fs::set_permissions(tmp.path(), perms).context("set temp permissions")?;
    #[cfg(not(unix))]
    if let Some(perms) = perms {
        fs::set_permissions(tmp.path(), perms).context("set temp permissions")?;
    }

    // Atomically replace the destination
    if let Err(e) = tmp.persist(path) {
        // Different filesystem? Try copy fallback
        fs::copy(e.file.path(), path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    Ok(())
}
