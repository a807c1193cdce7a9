#[cfg(target_os = "windows")]
pub mod windows;

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Resolve `path` to the canonical key used for caches and folder rows.
///
/// Existing paths are resolved through the filesystem (symlinks, `..`). Paths that do
/// not exist yet are made absolute and cleaned lexically so they still compare equal
/// across spellings.
pub fn canonical_path(path: &Path) -> io::Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty path"));
    }
    let resolved = match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(_) => normalize_lexically(&std::path::absolute(path)?),
    };
    Ok(strip_platform_prefix(resolved))
}

#[cfg(target_os = "windows")]
fn strip_platform_prefix(path: PathBuf) -> PathBuf {
    windows::strip_verbatim_prefix(&path)
}

#[cfg(not(target_os = "windows"))]
fn strip_platform_prefix(path: PathBuf) -> PathBuf {
    path
}

/// Drop `.` components, fold `..` into its parent and discard trailing separators.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push(component.as_os_str());
                }
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}
