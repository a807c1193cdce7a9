use crate::model::{MediaRecord, Provenance, RecordKey, SidecarRecord};
use ahash::{AHashMap, AHashSet};
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reconciled view of one watched path.
///
/// Holds the raw store-side and disk-side record sets and the unified, time-ordered list
/// built from them by [`DirectoryCache::merge`]. Only the controlling thread touches a
/// cache, so nothing in here is synchronised.
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    path: PathBuf,
    store_records: Vec<MediaRecord>,
    disk_records: Vec<MediaRecord>,
    sidecars: BTreeMap<String, Vec<SidecarRecord>>,
    unified: Vec<MediaRecord>,
    dirty: bool,
}

impl DirectoryCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            store_records: Vec::new(),
            disk_records: Vec::new(),
            sidecars: BTreeMap::new(),
            unified: Vec::new(),
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_store_records(&mut self, records: Vec<MediaRecord>) {
        self.store_records = records;
        self.dirty = true;
    }

    /// Replace the disk side with one scan pass worth of records.
    pub fn set_disk_records(&mut self, records: Vec<MediaRecord>) {
        self.disk_records = records;
        self.dirty = true;
    }

    /// Replace the sidecar index with one scan pass, keyed by declared owner basename.
    /// Owners that match no record are kept so they surface once the owner appears.
    pub fn associate_sidecars(&mut self, sidecars: Vec<SidecarRecord>) {
        self.sidecars.clear();
        for sidecar in sidecars {
            self.sidecars
                .entry(sidecar.owner_basename.clone())
                .or_default()
                .push(sidecar);
        }
        for owned in self.sidecars.values_mut() {
            owned.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        }
        self.dirty = true;
    }

    /// Rebuild the unified list from the raw store and disk sets.
    ///
    /// Store records enter first as `OnlyFromStore`. A disk record with a new identity
    /// enters as `OnlyFromDisk`. When both sides know an identity, the disk record wins
    /// (`NewestFromDisk`) only if it carries a computed duration; otherwise the store
    /// record stays (`NewestFromStore`). Merging unchanged inputs twice yields the same
    /// list.
    pub fn merge(&mut self) -> &[MediaRecord] {
        let mut by_key: AHashMap<RecordKey, MediaRecord> =
            AHashMap::with_capacity(self.store_records.len() + self.disk_records.len());

        for record in &self.store_records {
            by_key.entry(record.key()).or_insert_with(|| {
                let mut winner = record.clone();
                winner.provenance = Provenance::OnlyFromStore;
                winner
            });
        }

        for record in &self.disk_records {
            match by_key.entry(record.key()) {
                Entry::Vacant(slot) => {
                    let mut winner = record.clone();
                    winner.provenance = Provenance::OnlyFromDisk;
                    slot.insert(winner);
                }
                Entry::Occupied(mut slot) => {
                    let existing = slot.get_mut();
                    if !existing.provenance.is_store_side() {
                        // Same identity twice on disk (nested folders): first one stays.
                        continue;
                    }
                    if record.has_duration() {
                        let store_id = existing.store_id;
                        let mut winner = record.clone();
                        winner.provenance = Provenance::NewestFromDisk;
                        winner.store_id = store_id;
                        *existing = winner;
                    } else {
                        existing.provenance = Provenance::NewestFromStore;
                    }
                }
            }
        }

        let mut unified: Vec<MediaRecord> = by_key.into_iter().map(|(_, record)| record).collect();
        unified.sort_by(timeline_order);
        self.unified = unified;
        self.dirty = false;

        debug!(
            "Merged {}: {} store, {} disk -> {} unified",
            self.path.display(),
            self.store_records.len(),
            self.disk_records.len(),
            self.unified.len()
        );
        &self.unified
    }

    pub fn unified(&self) -> &[MediaRecord] {
        &self.unified
    }

    pub fn store_records(&self) -> &[MediaRecord] {
        &self.store_records
    }

    pub fn disk_records(&self) -> &[MediaRecord] {
        &self.disk_records
    }

    /// The unified list paired with the sidecars each record owns.
    pub fn entries(&self) -> Vec<(&MediaRecord, &[SidecarRecord])> {
        self.unified
            .iter()
            .map(|record| (record, self.sidecars_for(&record.basename)))
            .collect()
    }

    pub fn sidecars_for(&self, basename: &str) -> &[SidecarRecord] {
        self.sidecars
            .get(basename)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Sidecars whose declared owner is not in the unified list.
    pub fn orphan_sidecars(&self) -> Vec<&SidecarRecord> {
        let owners: AHashSet<&str> = self.unified.iter().map(|r| r.basename.as_str()).collect();
        self.sidecars
            .iter()
            .filter(|(owner, _)| !owners.contains(owner.as_str()))
            .flat_map(|(_, sidecars)| sidecars.iter())
            .collect()
    }

    /// Disk records that still need a duration probe: those whose unified winner has no
    /// duration either.
    pub fn records_missing_duration(&self) -> Vec<MediaRecord> {
        let unresolved: AHashSet<RecordKey> = self
            .unified
            .iter()
            .filter(|r| !r.has_duration() && r.provenance != Provenance::OnlyFromStore)
            .map(MediaRecord::key)
            .collect();
        self.disk_records
            .iter()
            .filter(|r| !r.has_duration() && unresolved.contains(&r.key()))
            .cloned()
            .collect()
    }

    /// Fill in probed durations on the disk side. Returns how many records changed.
    pub fn apply_durations(&mut self, durations: &[(RecordKey, Option<f64>)]) -> usize {
        let probed: AHashMap<&RecordKey, f64> = durations
            .iter()
            .filter_map(|(key, secs)| secs.map(|secs| (key, secs)))
            .collect();

        let mut changed = 0;
        for record in &mut self.disk_records {
            if let Some(secs) = probed.get(&record.key()) {
                if record.duration_secs != Some(*secs) {
                    record.duration_secs = Some(*secs);
                    changed += 1;
                }
            }
        }
        if changed > 0 {
            self.dirty = true;
        }
        changed
    }

    pub fn knows_in_store(&self, key: &RecordKey) -> bool {
        self.store_records.iter().any(|r| &r.key() == key)
    }

    /// Record that `record` now has a store row, so later write-backs skip it.
    pub fn record_stored(&mut self, record: MediaRecord) {
        if self.knows_in_store(&record.key()) {
            return;
        }
        self.store_records.push(record);
        self.dirty = true;
    }
}

fn source_rank(record: &MediaRecord) -> u8 {
    if record.provenance.is_store_side() {
        0
    } else {
        1
    }
}

/// Start time, then basename, then store before disk, then extension.
fn timeline_order(a: &MediaRecord, b: &MediaRecord) -> Ordering {
    a.start
        .cmp(&b.start)
        .then_with(|| a.basename.cmp(&b.basename))
        .then_with(|| source_rank(a).cmp(&source_rank(b)))
        .then_with(|| a.extension.cmp(&b.extension))
}
