use crate::model::{normalize_extension, MediaRecord, Provenance};
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;

/// A `media_record` row joined with its extension name.
#[derive(Debug, Clone)]
pub struct MediaRow {
    pub id: i64,
    pub folder_id: i64,
    pub basename: String,
    pub extension: String,
    pub start_time: DateTime<Utc>,
    pub duration_secs: Option<f64>,
    pub group_id: Option<u32>,
    pub derived: Option<bool>,
}

impl MediaRow {
    pub fn into_record(self, parent: &Path) -> MediaRecord {
        MediaRecord {
            basename: self.basename,
            extension: normalize_extension(&self.extension),
            parent: parent.to_path_buf(),
            start: self.start_time,
            duration_secs: self.duration_secs,
            group_id: self.group_id,
            derived: self.derived,
            provenance: Provenance::Unknown,
            store_id: Some(self.id),
        }
    }
}

/// Timestamps are stored as RFC 3339 text with full sub-second precision.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|ts| ts.with_timezone(&Utc))
}
