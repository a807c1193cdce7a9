pub mod probe;
pub mod walk;

use crate::config::{normalize_extensions, AppConfig};
use crate::error::Error;
use crate::filename;
use crate::model::{MediaRecord, SidecarRecord};
use ahash::AHashSet;
use glob::Pattern;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One file found under a watched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub path: PathBuf,
    pub file_name: String,
    /// Lower-case, without the leading dot.
    pub extension: String,
}

/// Filesystem collaborator. Shared with pool threads, so it must be `Send + Sync`.
pub trait Filesystem: Send + Sync {
    fn list_directory(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>>;

    /// Duration in seconds. `Ok(None)` when the file declares none; errors are soft.
    fn probe_duration(&self, path: &Path) -> Result<Option<f64>, Error>;
}

/// Local disk: `walkdir` listing and `ffprobe` durations.
pub struct LocalFilesystem {
    max_depth: usize,
    ignore_patterns: Vec<Pattern>,
    ffprobe_path: String,
}

impl LocalFilesystem {
    pub fn new(max_depth: usize, ignore_globs: &[String], ffprobe_path: &str) -> Self {
        Self {
            max_depth,
            ignore_patterns: walk::compile_ignore_patterns(ignore_globs),
            ffprobe_path: ffprobe_path.to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.scan_depth,
            &config.ignore_patterns,
            &config.ffprobe_path,
        )
    }
}

impl Filesystem for LocalFilesystem {
    fn list_directory(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>> {
        walk::list_files(path, self.max_depth, &self.ignore_patterns)
    }

    fn probe_duration(&self, path: &Path) -> Result<Option<f64>, Error> {
        probe::ffprobe_duration(&self.ffprobe_path, path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Media,
    Sidecar,
}

/// Known extensions, split into primary media and sidecar artifacts.
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    media: Vec<String>,
    sidecar: Vec<String>,
}

impl ExtensionFilter {
    pub fn new(media: &[String], sidecar: &[String]) -> Self {
        Self {
            media: normalize_extensions(media),
            sidecar: normalize_extensions(sidecar),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.media_extensions, &config.sidecar_extensions)
    }

    pub fn classify(&self, extension: &str) -> Option<EntryKind> {
        if self.media.iter().any(|e| e == extension) {
            Some(EntryKind::Media)
        } else if self.sidecar.iter().any(|e| e == extension) {
            Some(EntryKind::Sidecar)
        } else {
            None
        }
    }
}

/// Immutable result of scanning one watched path.
#[derive(Debug, Clone, Default)]
pub struct PathScan {
    pub path: PathBuf,
    pub records: Vec<MediaRecord>,
    pub sidecars: Vec<SidecarRecord>,
    /// Media files whose names matched no known pattern.
    pub unparsed: Vec<String>,
    /// Entries with an extension that is neither media nor sidecar.
    pub skipped: usize,
    /// Listing failed; the other fields are empty.
    pub error: Option<String>,
}

impl PathScan {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// List `root`, keep known extensions and run media names through the filename cascade.
pub fn scan_directory(fs: &dyn Filesystem, root: &Path, filter: &ExtensionFilter) -> PathScan {
    let mut scan = PathScan {
        path: root.to_path_buf(),
        ..PathScan::default()
    };

    let entries = match fs.list_directory(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Scan of {} failed: {}", root.display(), e);
            scan.error = Some(e.to_string());
            return scan;
        }
    };

    let mut sidecar_paths = Vec::new();
    for entry in entries {
        match filter.classify(&entry.extension) {
            Some(EntryKind::Media) => match filename::parse(&entry.file_name) {
                Some(parsed) => {
                    let parent = entry
                        .path
                        .parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.to_path_buf());
                    let mut record =
                        MediaRecord::new(parsed.basename, &parsed.extension, parent, parsed.start);
                    record.group_id = parsed.group_id;
                    record.derived = parsed.derived;
                    scan.records.push(record);
                }
                None => {
                    warn!(
                        "Parse failure, excluding {}: name matches no known pattern",
                        entry.path.display()
                    );
                    scan.unparsed.push(entry.file_name);
                }
            },
            Some(EntryKind::Sidecar) => sidecar_paths.push(entry),
            None => scan.skipped += 1,
        }
    }

    // A sidecar sharing its full stem with a media file belongs to that file, even when
    // the stem runs past the matched prefix.
    let media_basenames: AHashSet<&str> =
        scan.records.iter().map(|r| r.basename.as_str()).collect();
    let sidecars: Vec<SidecarRecord> = sidecar_paths
        .iter()
        .map(|entry| {
            let stem = Path::new(&entry.file_name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let owner = if media_basenames.contains(stem.as_str()) {
                stem
            } else {
                filename::owner_key(&entry.file_name)
            };
            SidecarRecord::new(owner, &entry.path)
        })
        .collect();
    scan.sidecars = sidecars;

    debug!(
        "Scanned {}: {} media, {} sidecars, {} unparsed, {} skipped",
        root.display(),
        scan.records.len(),
        scan.sidecars.len(),
        scan.unparsed.len(),
        scan.skipped
    );
    scan
}
