use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Which source is authoritative for a record after a merge pass.
///
/// Never persisted; recomputed every time a cache merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Provenance {
    OnlyFromStore,
    OnlyFromDisk,
    NewestFromStore,
    NewestFromDisk,
    /// Reserved for exact-content matches. Assigning it never changes the winner.
    Identical,
    #[default]
    Unknown,
}

impl Provenance {
    /// True when the winning record came from the persistent store.
    pub fn is_store_side(self) -> bool {
        matches!(self, Provenance::OnlyFromStore | Provenance::NewestFromStore)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::OnlyFromStore => "only-store",
            Provenance::OnlyFromDisk => "only-disk",
            Provenance::NewestFromStore => "newest-store",
            Provenance::NewestFromDisk => "newest-disk",
            Provenance::Identical => "identical",
            Provenance::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a media record inside one watched path: basename plus extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RecordKey {
    pub basename: String,
    pub extension: String,
}

impl RecordKey {
    pub fn new(basename: impl Into<String>, extension: impl AsRef<str>) -> Self {
        Self {
            basename: basename.into(),
            extension: normalize_extension(extension.as_ref()),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extension.is_empty() {
            f.write_str(&self.basename)
        } else {
            write!(f, "{}.{}", self.basename, self.extension)
        }
    }
}

pub fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

/// A time-stamped media file, as known to either the store or the disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaRecord {
    pub basename: String,
    pub extension: String,
    pub parent: PathBuf,
    pub start: DateTime<Utc>,
    pub duration_secs: Option<f64>,
    pub group_id: Option<u32>,
    /// `Some(true)` for derived/labeled outputs, `None` when it cannot be told.
    pub derived: Option<bool>,
    pub provenance: Provenance,
    /// Row id once the record exists in the store.
    pub store_id: Option<i64>,
}

impl MediaRecord {
    pub fn new(
        basename: impl Into<String>,
        extension: impl AsRef<str>,
        parent: impl Into<PathBuf>,
        start: DateTime<Utc>,
    ) -> Self {
        Self {
            basename: basename.into(),
            extension: normalize_extension(extension.as_ref()),
            parent: parent.into(),
            start,
            duration_secs: None,
            group_id: None,
            derived: None,
            provenance: Provenance::Unknown,
            store_id: None,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            basename: self.basename.clone(),
            extension: self.extension.clone(),
        }
    }

    pub fn file_name(&self) -> String {
        self.key().to_string()
    }

    pub fn path(&self) -> PathBuf {
        self.parent.join(self.file_name())
    }

    pub fn has_duration(&self) -> bool {
        self.duration_secs.is_some()
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        let secs = self.duration_secs?;
        let micros = (secs * 1_000_000.0).round();
        if !micros.is_finite() || micros < 0.0 || micros >= i64::MAX as f64 {
            return None;
        }
        self.start
            .checked_add_signed(ChronoDuration::microseconds(micros as i64))
    }
}

/// A secondary artifact owned by the media record whose basename it declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SidecarRecord {
    pub owner_basename: String,
    pub file_name: String,
    pub path: PathBuf,
    pub extension: String,
}

impl SidecarRecord {
    pub fn new(owner_basename: impl Into<String>, path: &Path) -> Self {
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| normalize_extension(&e.to_string_lossy()))
            .unwrap_or_default();
        Self {
            owner_basename: owner_basename.into(),
            file_name,
            path: path.to_path_buf(),
            extension,
        }
    }
}

/// Store-backed entity for one watched path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistentFolder {
    pub id: i64,
    pub path: String,
}

/// Extension lookup row referenced by stored media records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRow {
    pub id: i64,
    pub name: String,
}

pub type BatchId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchKind {
    Scan,
    Probe,
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchKind::Scan => f.write_str("scan"),
            BatchKind::Probe => f.write_str("probe"),
        }
    }
}

/// Progress of one in-flight batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperationStatus {
    pub batch: BatchId,
    pub kind: BatchKind,
    pub done: usize,
    pub total: usize,
}

impl PendingOperationStatus {
    pub fn new(batch: BatchId, kind: BatchKind, total: usize) -> Self {
        Self {
            batch,
            kind,
            done: 0,
            total,
        }
    }

    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.done.min(self.total)) as f64 / self.total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_end_out_of_range_is_none() {
        let start = Utc.with_ymd_and_hms(2019, 9, 19, 11, 16, 32).unwrap();
        let mut record = MediaRecord::new("clip", "mp4", "/videos", start);

        record.duration_secs = Some(90.25);
        assert_eq!(
            record.end(),
            Some(start + ChronoDuration::milliseconds(90_250))
        );

        record.duration_secs = Some(1e15);
        assert_eq!(record.end(), None);
        record.duration_secs = Some(9e12);
        assert_eq!(record.end(), None);
        record.duration_secs = Some(f64::INFINITY);
        assert_eq!(record.end(), None);
    }

    #[test]
    fn test_record_key_normalizes_extension() {
        let key = RecordKey::new("clip", ".MP4");
        assert_eq!(key.extension, "mp4");
        assert_eq!(key.to_string(), "clip.mp4");
    }

    #[test]
    fn test_end_time_from_duration() {
        let start = Utc.with_ymd_and_hms(2019, 9, 19, 11, 0, 0).unwrap();
        let mut record = MediaRecord::new("clip", "mp4", "/videos", start);
        assert_eq!(record.end(), None);

        record.duration_secs = Some(90.5);
        let end = record.end().unwrap();
        assert_eq!((end - start).num_milliseconds(), 90_500);
    }

    #[test]
    fn test_pending_fraction() {
        let mut status = PendingOperationStatus::new(1, BatchKind::Scan, 4);
        assert_eq!(status.fraction(), 0.0);
        status.done = 3;
        assert_eq!(status.fraction(), 0.75);

        let empty = PendingOperationStatus::new(2, BatchKind::Probe, 0);
        assert_eq!(empty.fraction(), 1.0);
    }

    #[test]
    fn test_sidecar_from_path() {
        let sidecar = SidecarRecord::new(
            "BehavioralBox_B01_T20190918-0153290345",
            Path::new("/videos/BehavioralBox_B01_T20190918-0153290345DLC.CSV"),
        );
        assert_eq!(sidecar.extension, "csv");
        assert_eq!(
            sidecar.file_name,
            "BehavioralBox_B01_T20190918-0153290345DLC.CSV"
        );
    }
}
