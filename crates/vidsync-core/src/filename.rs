//! Filename cascade: extracts start time, group id and derived flag from a media filename.
//!
//! Matchers are tried oldest naming scheme first. Each one is anchored at the start of the
//! file stem, and the text it matched becomes the owner key sidecars refer to.

use chrono::{DateTime, NaiveDate, Utc};
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilenameFormat {
    /// `20180304_123000.avi`
    CameraLegacy,
    /// `BehavioralBox_B01_2019-09-19_11-16-32.mp4`
    BoxDashed,
    /// `BehavioralBox_B01_T20190919-1116320827.mp4`
    BoxCompact,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFilename {
    pub format: FilenameFormat,
    pub basename: String,
    pub extension: String,
    pub owner_key: String,
    pub start: DateTime<Utc>,
    pub group_id: Option<u32>,
    pub derived: Option<bool>,
}

struct Matcher {
    format: FilenameFormat,
    regex: Regex,
}

fn matchers() -> &'static [Matcher] {
    static MATCHERS: OnceLock<Vec<Matcher>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        let table = [
            (
                FilenameFormat::CameraLegacy,
                r"^(?P<y>\d{4})(?P<mo>\d{2})(?P<d>\d{2})_(?P<h>\d{2})(?P<mi>\d{2})(?P<s>\d{2})",
            ),
            (
                FilenameFormat::BoxDashed,
                r"^BehavioralBox_B(?P<group>\d+)_(?P<y>\d{4})-(?P<mo>\d{2})-(?P<d>\d{2})_(?P<h>\d{2})-(?P<mi>\d{2})-(?P<s>\d{2})",
            ),
            (
                FilenameFormat::BoxCompact,
                r"^BehavioralBox_B(?P<group>\d+)_T(?P<y>\d{4})(?P<mo>\d{2})(?P<d>\d{2})-(?P<h>\d{2})(?P<mi>\d{2})(?P<s>\d{2})(?P<frac>\d{4})",
            ),
        ];
        table
            .into_iter()
            .map(|(format, pattern)| Matcher {
                format,
                regex: Regex::new(pattern).expect("filename pattern must compile"),
            })
            .collect()
    })
}

/// Run the cascade over `file_name`. `None` means no matcher produced a valid timestamp.
pub fn parse(file_name: &str) -> Option<ParsedFilename> {
    let path = Path::new(file_name);
    let basename = path.file_stem()?.to_string_lossy().into_owned();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    matchers().iter().find_map(|matcher| {
        let caps = matcher.regex.captures(&basename)?;
        let start = timestamp_from(&caps)?;
        let group_id = caps.name("group").and_then(|g| g.as_str().parse().ok());
        let matched = caps.get(0)?;
        let owner_key = matched.as_str().to_string();
        let derived = derived_flag(&basename[matched.end()..]);

        Some(ParsedFilename {
            format: matcher.format,
            basename: basename.clone(),
            extension: extension.clone(),
            owner_key,
            start,
            group_id,
            derived,
        })
    })
}

/// Owner key a file declares: the cascade's matched prefix, or the whole stem when
/// nothing matches.
pub fn owner_key(file_name: &str) -> String {
    match parse(file_name) {
        Some(parsed) => parsed.owner_key,
        None => Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

fn timestamp_from(caps: &Captures<'_>) -> Option<DateTime<Utc>> {
    let num = |name: &str| -> Option<u32> { caps.name(name)?.as_str().parse().ok() };
    let year: i32 = caps.name("y")?.as_str().parse().ok()?;
    // Four digits of sub-second precision: ten-thousandths of a second.
    let nanos = match caps.name("frac") {
        Some(frac) => frac.as_str().parse::<u32>().ok()? * 100_000,
        None => 0,
    };
    let naive = NaiveDate::from_ymd_opt(year, num("mo")?, num("d")?)?.and_hms_nano_opt(
        num("h")?,
        num("mi")?,
        num("s")?,
        nanos,
    )?;
    Some(naive.and_utc())
}

fn derived_flag(remainder: &str) -> Option<bool> {
    if remainder.is_empty() {
        Some(false)
    } else if remainder.ends_with("_labeled") {
        Some(true)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_parse_labeled_compact_name() {
        let parsed = parse(
            "BehavioralBox_B01_T20190919-1116320827DLC_resnet50_v3_oct29Oct29shuffle1_1030000_labeled.mp4",
        )
        .unwrap();
        assert_eq!(parsed.format, FilenameFormat::BoxCompact);
        assert_eq!(parsed.group_id, Some(1));
        assert_eq!(parsed.derived, Some(true));
        assert_eq!(parsed.extension, "mp4");
        assert_eq!(parsed.owner_key, "BehavioralBox_B01_T20190919-1116320827");

        let expected = Utc.with_ymd_and_hms(2019, 9, 19, 11, 16, 32).unwrap();
        assert_eq!(parsed.start.with_nanosecond(0).unwrap(), expected);
        assert_eq!(parsed.start.nanosecond(), 82_700_000);
    }

    #[test]
    fn test_parse_raw_compact_name_is_not_derived() {
        let parsed = parse("BehavioralBox_B12_T20190918-0153290345.mp4").unwrap();
        assert_eq!(parsed.group_id, Some(12));
        assert_eq!(parsed.derived, Some(false));
        assert_eq!(parsed.basename, "BehavioralBox_B12_T20190918-0153290345");
    }

    #[test]
    fn test_parse_unlabeled_suffix_is_unknown() {
        let parsed =
            parse("BehavioralBox_B01_T20190918-0153290345DLC_resnet50_v3shuffle1_1030000.h5")
                .unwrap();
        assert_eq!(parsed.derived, None);
    }

    #[test]
    fn test_parse_dashed_and_legacy_formats() {
        let dashed = parse("BehavioralBox_B03_2019-02-01_08-30-15.avi").unwrap();
        assert_eq!(dashed.format, FilenameFormat::BoxDashed);
        assert_eq!(dashed.group_id, Some(3));
        assert_eq!(
            dashed.start,
            Utc.with_ymd_and_hms(2019, 2, 1, 8, 30, 15).unwrap()
        );

        let legacy = parse("20180304_123000.avi").unwrap();
        assert_eq!(legacy.format, FilenameFormat::CameraLegacy);
        assert_eq!(legacy.group_id, None);
        assert_eq!(
            legacy.start,
            Utc.with_ymd_and_hms(2018, 3, 4, 12, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_invalid_dates() {
        assert!(parse("holiday.mp4").is_none());
        assert!(parse("BehavioralBox_B01_T20191319-1116320827.mp4").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn test_owner_key_falls_back_to_stem() {
        assert_eq!(owner_key("notes.txt"), "notes");
        assert_eq!(
            owner_key("BehavioralBox_B01_T20190918-0153290345_events.csv"),
            "BehavioralBox_B01_T20190918-0153290345"
        );
    }
}
