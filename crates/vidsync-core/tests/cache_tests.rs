use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;

use vidsync_core::model::{RecordKey, SidecarRecord};
use vidsync_core::{DirectoryCache, MediaRecord, Provenance};

const ROOT: &str = "/data/box01";

fn at(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 9, 19, hour, min, 0).unwrap()
}

fn record(basename: &str, start: DateTime<Utc>, duration: Option<f64>) -> MediaRecord {
    let mut record = MediaRecord::new(basename, "mp4", ROOT, start);
    record.duration_secs = duration;
    record
}

fn stored(basename: &str, start: DateTime<Utc>, id: i64) -> MediaRecord {
    let mut record = record(basename, start, None);
    record.store_id = Some(id);
    record
}

fn find<'a>(unified: &'a [MediaRecord], basename: &str) -> &'a MediaRecord {
    unified
        .iter()
        .find(|r| r.basename == basename)
        .unwrap_or_else(|| panic!("{} missing from unified list", basename))
}

#[test]
fn test_disk_record_with_duration_replaces_store_record() {
    let mut cache = DirectoryCache::new(ROOT);
    cache.set_store_records(vec![stored("vidA", at(10, 0), 5)]);
    cache.set_disk_records(vec![record("vidA", at(10, 0), Some(120.0))]);

    let unified = cache.merge().to_vec();
    assert_eq!(unified.len(), 1);
    assert_eq!(unified[0].provenance, Provenance::NewestFromDisk);
    assert_eq!(unified[0].duration_secs, Some(120.0));
    assert_eq!(unified[0].store_id, Some(5));
}

#[test]
fn test_store_record_survives_file_removal() {
    let mut cache = DirectoryCache::new(ROOT);
    cache.set_store_records(vec![stored("vidB", at(10, 0), 1)]);
    cache.set_disk_records(Vec::new());

    let unified = cache.merge();
    assert_eq!(unified.len(), 1);
    assert_eq!(unified[0].basename, "vidB");
    assert_eq!(unified[0].provenance, Provenance::OnlyFromStore);
}

#[test]
fn test_disk_record_without_duration_keeps_store_version() {
    let mut cache = DirectoryCache::new(ROOT);
    let mut known = stored("vidA", at(10, 0), 2);
    known.duration_secs = Some(90.0);
    cache.set_store_records(vec![known]);
    cache.set_disk_records(vec![record("vidA", at(10, 0), None)]);

    let unified = cache.merge();
    assert_eq!(unified.len(), 1);
    assert_eq!(unified[0].provenance, Provenance::NewestFromStore);
    assert_eq!(unified[0].duration_secs, Some(90.0));
}

#[test]
fn test_new_disk_record_is_only_from_disk() {
    let mut cache = DirectoryCache::new(ROOT);
    cache.set_disk_records(vec![record("vidC", at(9, 0), None)]);

    let unified = cache.merge();
    assert_eq!(unified.len(), 1);
    assert_eq!(unified[0].provenance, Provenance::OnlyFromDisk);
}

#[test]
fn test_merge_is_idempotent() {
    let mut cache = DirectoryCache::new(ROOT);
    cache.set_store_records(vec![stored("a", at(8, 0), 1), stored("b", at(9, 0), 2)]);
    cache.set_disk_records(vec![
        record("b", at(9, 0), Some(30.0)),
        record("c", at(7, 0), None),
    ]);

    let first = cache.merge().to_vec();
    let second = cache.merge().to_vec();
    assert_eq!(first, second);
    assert!(!cache.is_dirty());
}

#[test]
fn test_unified_has_one_record_per_identity() {
    let mut cache = DirectoryCache::new(ROOT);
    cache.set_store_records(vec![stored("a", at(8, 0), 1)]);
    let mut nested = record("a", at(8, 0), Some(12.0));
    nested.parent = Path::new(ROOT).join("nested");
    cache.set_disk_records(vec![
        record("a", at(8, 0), Some(10.0)),
        nested,
        record("b", at(9, 0), None),
        record("b", at(9, 0), None),
    ]);

    let unified = cache.merge();
    assert_eq!(unified.len(), 2);
    let a = find(unified, "a");
    assert_eq!(a.duration_secs, Some(10.0));
    assert_eq!(a.parent, Path::new(ROOT));
}

#[test]
fn test_same_basename_different_extension_are_distinct() {
    let mut cache = DirectoryCache::new(ROOT);
    let avi = MediaRecord::new("clip", "AVI", ROOT, at(8, 0));
    let mp4 = MediaRecord::new("clip", "mp4", ROOT, at(8, 0));
    cache.set_disk_records(vec![mp4, avi]);

    let unified = cache.merge();
    let extensions: Vec<&str> = unified.iter().map(|r| r.extension.as_str()).collect();
    assert_eq!(extensions, vec!["avi", "mp4"]);
}

#[test]
fn test_unified_is_sorted_by_start_time() {
    let mut cache = DirectoryCache::new(ROOT);
    cache.set_store_records(vec![stored("late", at(12, 0), 1)]);
    cache.set_disk_records(vec![
        record("middle", at(11, 0), None),
        record("early", at(9, 30), None),
    ]);

    let names: Vec<String> = cache.merge().iter().map(|r| r.basename.clone()).collect();
    assert_eq!(names, vec!["early", "middle", "late"]);
}

#[test]
fn test_equal_start_orders_by_basename_then_store_first() {
    let mut cache = DirectoryCache::new(ROOT);
    cache.set_store_records(vec![stored("b", at(9, 0), 1)]);
    cache.set_disk_records(vec![record("a", at(9, 0), None), record("c", at(9, 0), None)]);

    let names: Vec<String> = cache.merge().iter().map(|r| r.basename.clone()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn test_sidecar_attaches_to_exact_basename_only() {
    let owner = "BehavioralBox_B01_T20190918-0153290345";
    let mut cache = DirectoryCache::new(ROOT);
    cache.set_disk_records(vec![
        record(owner, at(1, 53), None),
        record("BehavioralBox_B01_T20190918-0153290346", at(1, 53), None),
        record(
            "BehavioralBox_B01_T20190918-0153290345_labeled",
            at(1, 53),
            None,
        ),
    ]);
    let sidecar_path = Path::new(ROOT).join(format!("{}_events.csv", owner));
    cache.associate_sidecars(vec![SidecarRecord::new(owner, &sidecar_path)]);
    cache.merge();

    for (record, sidecars) in cache.entries() {
        if record.basename == owner {
            assert_eq!(sidecars.len(), 1);
            assert_eq!(sidecars[0].file_name, format!("{}_events.csv", owner));
        } else {
            assert!(sidecars.is_empty(), "{} got a sidecar", record.basename);
        }
    }
    assert!(cache.orphan_sidecars().is_empty());
}

#[test]
fn test_sidecar_without_owner_is_orphaned() {
    let mut cache = DirectoryCache::new(ROOT);
    cache.set_disk_records(vec![record("vidA", at(10, 0), None)]);
    cache.associate_sidecars(vec![SidecarRecord::new(
        "nobody",
        &Path::new(ROOT).join("nobody.csv"),
    )]);
    cache.merge();

    let orphans = cache.orphan_sidecars();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].owner_basename, "nobody");
    assert!(cache.sidecars_for("vidA").is_empty());
}

#[test]
fn test_applied_durations_flip_winner_on_next_merge() {
    let mut cache = DirectoryCache::new(ROOT);
    cache.set_store_records(vec![stored("vidA", at(10, 0), 1)]);
    cache.set_disk_records(vec![record("vidA", at(10, 0), None), record("vidD", at(11, 0), None)]);
    cache.merge();

    let missing: Vec<RecordKey> = cache
        .records_missing_duration()
        .iter()
        .map(MediaRecord::key)
        .collect();
    assert_eq!(missing.len(), 2);

    let changed = cache.apply_durations(&[
        (RecordKey::new("vidA", "mp4"), Some(60.0)),
        (RecordKey::new("vidD", "mp4"), None),
    ]);
    assert_eq!(changed, 1);
    assert!(cache.is_dirty());

    let unified = cache.merge();
    assert_eq!(find(unified, "vidA").provenance, Provenance::NewestFromDisk);
    assert_eq!(find(unified, "vidD").duration_secs, None);
}

#[test]
fn test_record_stored_makes_identity_store_known() {
    let mut cache = DirectoryCache::new(ROOT);
    cache.set_disk_records(vec![record("vidC", at(10, 0), None)]);
    cache.merge();
    let key = RecordKey::new("vidC", "mp4");
    assert!(!cache.knows_in_store(&key));

    let mut persisted = record("vidC", at(10, 0), None);
    persisted.store_id = Some(3);
    cache.record_stored(persisted.clone());
    cache.record_stored(persisted);
    assert_eq!(cache.store_records().len(), 1);

    let unified = cache.merge();
    assert_eq!(unified.len(), 1);
    assert_eq!(unified[0].provenance, Provenance::NewestFromStore);
    assert!(cache.knows_in_store(&key));
}
