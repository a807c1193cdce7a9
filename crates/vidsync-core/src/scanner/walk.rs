use super::DirEntryInfo;
use glob::Pattern;
use std::io;
use std::path::Path;
use tracing::{error, warn};
use walkdir::WalkDir;

pub fn compile_ignore_patterns(ignore_globs: &[String]) -> Vec<Pattern> {
    ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect()
}

/// List regular files below `root`, at most `max_depth` levels deep.
/// Skips symlinks, ignored paths and unreadable subdirectories.
pub fn list_files(
    root: &Path,
    max_depth: usize,
    ignore_patterns: &[Pattern],
) -> io::Result<Vec<DirEntryInfo>> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Not a directory: {}", root.display()),
        ));
    }

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth.max(1))
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !ignore_patterns
                .iter()
                .any(|pattern| pattern.matches_path(entry.path()))
        });

    let mut entries = Vec::new();
    for entry_result in walker {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                if err.depth() == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::Other,
                        format!("Error reading directory {}: {}", root.display(), err),
                    ));
                }
                warn!(
                    "Skipping unreadable entry under {}: {}",
                    root.display(),
                    err
                );
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        entries.push(DirEntryInfo {
            path: path.to_path_buf(),
            file_name,
            extension,
        });
    }

    Ok(entries)
}
