//! Working directory setup.
//!
//! Directories are resolved to absolute paths and created on demand. An
//! existing directory is left alone unless a clean one is requested, which
//! keeps CMake build trees around between runs for incremental builds.
//!
//! Nothing here locks: one pipeline is expected per build/install root.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::types::{BuildError, Result};

/// An existing directory and a label used in logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryHandle {
    label: String,
    path: PathBuf,
}

impl DirectoryHandle {
    /// Ensures the directory exists and returns a handle to it.
    ///
    /// See [`ensure_directory`] for how `name`, `prefix` and `clean` are
    /// interpreted.
    pub fn acquire(
        label: impl Into<String>,
        name: &Path,
        prefix: Option<&Path>,
        clean: bool,
    ) -> Result<Self> {
        let label = label.into();
        let path = ensure_directory(name, prefix, clean)?;
        debug!(label = %label, path = %path.display(), clean, "directory ready");
        Ok(Self { label, path })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Joins `segment` onto the directory path.
    pub fn join(&self, segment: impl AsRef<Path>) -> PathBuf {
        self.path.join(segment)
    }
}

/// Computes the absolute path for `prefix/name` (or `name` alone) without
/// touching the filesystem.
///
/// An absolute `name` ignores `prefix`, as [`Path::join`] does. Relative
/// results are anchored at the current directory. `.` and `..` segments are
/// collapsed lexically.
pub fn resolve_directory(name: &Path, prefix: Option<&Path>) -> Result<PathBuf> {
    let path = match prefix {
        Some(prefix) => prefix.join(name),
        None => name.to_path_buf(),
    };
    std::path::absolute(&path)
        .map(|absolute| normalize(&absolute))
        .map_err(|e| BuildError::io(format!("failed to resolve path {}", path.display()), e))
}

/// Drops `.` segments and pops the parent for each `..`, without consulting
/// the filesystem. `..` at the root stays at the root.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Creates the directory at `prefix/name` if needed and returns its absolute
/// path.
///
/// * missing: created along with any missing parents
/// * present, `clean == false`: contents untouched
/// * present, `clean == true`: removed and recreated empty
pub fn ensure_directory(name: &Path, prefix: Option<&Path>, clean: bool) -> Result<PathBuf> {
    let path = resolve_directory(name, prefix)?;

    if path.is_dir() {
        if clean {
            remove_directory(&path)?;
            create(&path)?;
        }
    } else {
        create(&path)?;
    }

    Ok(path)
}

/// Deletes a directory tree. Errors are returned, never swallowed.
pub fn remove_directory(path: &Path) -> Result<()> {
    fs::remove_dir_all(path)
        .map_err(|e| BuildError::io(format!("failed to remove directory {}", path.display()), e))
}

/// Whether two paths name the same location.
///
/// Compares the lexically normalized paths and, when both exist, their
/// canonical forms so symlinks are seen through.
pub fn same_location(a: &Path, b: &Path) -> bool {
    if normalize(a) == normalize(b) {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn create(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .map_err(|e| BuildError::io(format!("failed to create directory {}", path.display()), e))
}
