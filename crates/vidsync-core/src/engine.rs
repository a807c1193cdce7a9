use crate::cache::DirectoryCache;
use crate::config::AppConfig;
use crate::error::Error;
use crate::model::{
    normalize_extension, BatchId, BatchKind, ExtensionRow, MediaRecord, PendingOperationStatus,
    PersistentFolder, Provenance, RecordKey, SidecarRecord,
};
use crate::platform;
use crate::progress::{ReconcileObserver, SilentObserver};
use crate::scanner::{self, ExtensionFilter, Filesystem, PathScan};
use crate::storage::Store;
use crate::worker::{BackgroundWorker, WorkerEvent, WorkerPool};
use ahash::{AHashMap, AHashSet};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle of one watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    /// Cache allocated, folder row not looked up yet.
    Unresolved,
    /// Folder known and store records loaded.
    Loaded,
    Scanning,
    /// Scan merged; durations are being probed.
    MetadataPending,
    Settled,
}

/// What a single scan or probe target produces on a pool thread.
#[derive(Debug)]
pub enum JobOutput {
    Scan(PathScan),
    Probe(ProbeOutcome),
}

#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// Canonical watched path the record belongs to.
    pub path: PathBuf,
    pub key: RecordKey,
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub filter: ExtensionFilter,
    pub worker_threads: usize,
    pub auto_write_back: bool,
}

impl LoaderOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            filter: ExtensionFilter::from_config(config),
            worker_threads: config.effective_worker_threads(),
            auto_write_back: config.auto_write_back,
        }
    }
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

struct TrackedPath {
    cache: DirectoryCache,
    state: PathState,
    folder: Option<PersistentFolder>,
    rescan_requested: bool,
    probes_in_flight: usize,
}

impl TrackedPath {
    fn new(key: &Path) -> Self {
        Self {
            cache: DirectoryCache::new(key),
            state: PathState::Unresolved,
            folder: None,
            rescan_requested: false,
            probes_in_flight: 0,
        }
    }
}

struct BatchInfo {
    kind: BatchKind,
    paths: Vec<PathBuf>,
    reported: AHashSet<PathBuf>,
}

/// Owns every watched path's cache and drives the scan → probe → write-back pipeline.
///
/// Pool threads only compute results. They reach the loader as [`WorkerEvent`]s, and
/// all cache mutation happens inside [`process_pending`](Self::process_pending) or
/// [`run_until_idle`](Self::run_until_idle) on the thread that owns the loader.
pub struct ReconciliationLoader<S, F> {
    store: S,
    fs: Arc<F>,
    pool: WorkerPool,
    options: LoaderOptions,
    observer: Box<dyn ReconcileObserver>,
    paths: BTreeMap<PathBuf, TrackedPath>,
    known_folders: Vec<PersistentFolder>,
    folders_loaded: bool,
    extensions: AHashMap<String, ExtensionRow>,
    extensions_loaded: bool,
    events_tx: Sender<WorkerEvent<JobOutput>>,
    events_rx: Receiver<WorkerEvent<JobOutput>>,
    batches: AHashMap<BatchId, BatchInfo>,
    pending: BTreeMap<BatchId, PendingOperationStatus>,
    next_batch: BatchId,
}

impl<S, F> ReconciliationLoader<S, F>
where
    S: Store,
    F: Filesystem + 'static,
{
    pub fn new(store: S, fs: F, options: LoaderOptions) -> Result<Self, Error> {
        let pool = WorkerPool::new(options.worker_threads)?;
        let (events_tx, events_rx) = mpsc::channel();
        Ok(Self {
            store,
            fs: Arc::new(fs),
            pool,
            options,
            observer: Box::new(SilentObserver),
            paths: BTreeMap::new(),
            known_folders: Vec::new(),
            folders_loaded: false,
            extensions: AHashMap::new(),
            extensions_loaded: false,
            events_tx,
            events_rx,
            batches: AHashMap::new(),
            pending: BTreeMap::new(),
            next_batch: 1,
        })
    }

    pub fn with_observer(mut self, observer: Box<dyn ReconcileObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Watch list ───────────────────────────────────────────────

    /// Start watching `path`. Returns its canonical key.
    ///
    /// A path that is already tracked (under any spelling) only gets a refresh scan.
    pub fn add_path(&mut self, path: &Path) -> Result<PathBuf, Error> {
        let key = canonical_key(path)?;
        if self.paths.contains_key(&key) {
            debug!("{} already tracked, scheduling refresh", key.display());
            self.scan(&[key.clone()])?;
            return Ok(key);
        }
        info!("Watching {}", key.display());
        self.paths.insert(key.clone(), TrackedPath::new(&key));
        Ok(key)
    }

    /// Load every stored folder and its records into the matching caches.
    /// Folders not yet watched are adopted. Returns the number of folders loaded.
    pub fn reload_from_store(&mut self) -> Result<usize, Error> {
        let folders = self.store.load_folders()?;
        self.known_folders = folders.clone();
        self.folders_loaded = true;

        // Several stored spellings may resolve to one canonical path.
        let mut grouped: BTreeMap<PathBuf, (PersistentFolder, Vec<MediaRecord>)> =
            BTreeMap::new();
        for folder in &folders {
            let key = folder_key(folder);
            let records = self.store.load_records(folder)?;
            let entry = grouped
                .entry(key)
                .or_insert_with(|| (folder.clone(), Vec::new()));
            entry.1.extend(records);
        }

        let loaded = grouped.len();
        for (key, (folder, records)) in grouped {
            let tracked = self.paths.entry(key.clone()).or_insert_with(|| {
                info!("Adopting stored folder {}", key.display());
                TrackedPath::new(&key)
            });
            let records = records
                .into_iter()
                .map(|mut record| {
                    record.parent = key.clone();
                    record
                })
                .collect();
            tracked.folder = Some(folder);
            tracked.cache.set_store_records(records);
            tracked.cache.merge();
            if tracked.state == PathState::Unresolved {
                tracked.state = PathState::Loaded;
            }
            self.observer.on_cache_updated(&key);
        }

        info!("Loaded {} folders from store", loaded);
        Ok(loaded)
    }

    /// Find or create the single folder row for `path`.
    ///
    /// Matching compares canonical full paths, so differently spelled rows for the same
    /// directory are recognised.
    pub fn persist_new_folder(&mut self, path: &Path) -> Result<PersistentFolder, Error> {
        let key = canonical_key(path)?;
        self.ensure_folders_loaded()?;

        if let Some(existing) = self
            .known_folders
            .iter()
            .find(|folder| folder_key(folder) == key)
        {
            return Ok(existing.clone());
        }

        let folder = self.store.save_folder(&key.to_string_lossy())?;
        info!("Created folder {} for {}", folder.id, key.display());
        self.known_folders.push(folder.clone());
        if let Some(tracked) = self.paths.get_mut(&key) {
            tracked.folder = Some(folder.clone());
        }
        Ok(folder)
    }

    // ── Scan / probe ─────────────────────────────────────────────

    /// Queue a scan batch for each of `paths`. Returns immediately.
    ///
    /// Paths with a scan or probe still in flight are not scanned again now; they are
    /// rescanned once they settle. Returns the ids of the batches queued.
    pub fn scan(&mut self, paths: &[PathBuf]) -> Result<Vec<BatchId>, Error> {
        let mut keys = Vec::with_capacity(paths.len());
        for path in paths {
            let key = self.tracked_key(path)?;
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let mut targets = Vec::with_capacity(keys.len());
        for key in keys {
            match self.state(&key) {
                Some(PathState::Scanning) | Some(PathState::MetadataPending) => {
                    if let Some(tracked) = self.paths.get_mut(&key) {
                        tracked.rescan_requested = true;
                    }
                    debug!("Deferring scan of {} until it settles", key.display());
                    continue;
                }
                Some(PathState::Unresolved) => self.resolve_folder(&key)?,
                _ => {}
            }
            targets.push(key);
        }

        // One batch per path, so a listing that panics cannot take its siblings down.
        let mut batches = Vec::with_capacity(targets.len());
        for key in targets {
            if let Some(tracked) = self.paths.get_mut(&key) {
                tracked.state = PathState::Scanning;
            }
            let batch = self.next_batch_id();
            let fs = Arc::clone(&self.fs);
            let filter = self.options.filter.clone();
            info!("Scan batch {} queued for {}", batch, key.display());
            let worker = BackgroundWorker::new(batch, vec![key.clone()], move |root: &PathBuf| {
                JobOutput::Scan(scanner::scan_directory(&*fs, root, &filter))
            });
            self.start_batch(worker, BatchKind::Scan, vec![key]);
            batches.push(batch);
        }
        Ok(batches)
    }

    /// Scan every tracked path.
    pub fn refresh_all(&mut self) -> Result<Vec<BatchId>, Error> {
        let keys: Vec<PathBuf> = self.paths.keys().cloned().collect();
        self.scan(&keys)
    }

    /// Queue a duration probe for those `records` of `path` that have no duration.
    ///
    /// Ignored while the path's scan is still running; the probe is queued
    /// automatically once that scan lands. Several probes may overlap; the path
    /// settles when the last one finishes.
    pub fn extract_metadata(
        &mut self,
        path: &Path,
        records: &[MediaRecord],
    ) -> Result<Option<BatchId>, Error> {
        let key = self.tracked_key(path)?;
        if self.state(&key) == Some(PathState::Scanning) {
            debug!("Scan of {} in flight, probe will follow it", key.display());
            return Ok(None);
        }

        let targets: Vec<(PathBuf, RecordKey)> = records
            .iter()
            .filter(|record| !record.has_duration())
            .map(|record| (record.path(), record.key()))
            .collect();

        let in_flight = match self.paths.get_mut(&key) {
            Some(tracked) => {
                tracked.state = PathState::MetadataPending;
                if !targets.is_empty() {
                    tracked.probes_in_flight += 1;
                }
                tracked.probes_in_flight
            }
            None => 0,
        };
        if targets.is_empty() {
            if in_flight == 0 {
                self.settle(&key);
            }
            return Ok(None);
        }

        let batch = self.next_batch_id();
        let fs = Arc::clone(&self.fs);
        let owner = key.clone();
        debug!(
            "Probe batch {} queued for {} records under {}",
            batch,
            targets.len(),
            key.display()
        );
        let worker = BackgroundWorker::new(
            batch,
            targets,
            move |(file, record_key): &(PathBuf, RecordKey)| {
                let duration_secs = match fs.probe_duration(file) {
                    Ok(secs) => secs,
                    Err(e) => {
                        warn!("Probe failure, keeping {} without duration: {}", file.display(), e);
                        None
                    }
                };
                JobOutput::Probe(ProbeOutcome {
                    path: owner.clone(),
                    key: record_key.clone(),
                    duration_secs,
                })
            },
        );
        self.start_batch(worker, BatchKind::Probe, vec![key]);
        Ok(Some(batch))
    }

    // ── Write-back ───────────────────────────────────────────────

    /// Persist every `OnlyFromDisk` record of `unified` that the store does not know yet.
    /// Store-known records are never touched. Returns the number of rows inserted.
    pub fn write_back(&mut self, path: &Path, unified: &[MediaRecord]) -> Result<usize, Error> {
        let key = self.tracked_key(path)?;
        let folder = match self.paths.get(&key).and_then(|t| t.folder.clone()) {
            Some(folder) => folder,
            None => self.persist_new_folder(&key)?,
        };

        let mut written = 0;
        for record in unified
            .iter()
            .filter(|r| r.provenance == Provenance::OnlyFromDisk)
        {
            let already_stored = self
                .paths
                .get(&key)
                .is_some_and(|t| t.cache.knows_in_store(&record.key()));
            if already_stored {
                continue;
            }

            let extension = self.ensure_extension(&record.extension)?;
            match self.store.save_record(&folder, &extension, record) {
                Ok(id) => {
                    let mut stored = record.clone();
                    stored.store_id = Some(id);
                    stored.provenance = Provenance::Unknown;
                    stored.parent = key.clone();
                    if let Some(tracked) = self.paths.get_mut(&key) {
                        tracked.cache.record_stored(stored);
                    }
                    written += 1;
                }
                Err(e) if e.is_conflict() => {
                    warn!(
                        "Persistence conflict, skipping {}: {}",
                        record.file_name(),
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }

        if written > 0 {
            if let Some(tracked) = self.paths.get_mut(&key) {
                tracked.cache.merge();
            }
            info!("Wrote {} new records for {}", written, key.display());
            self.observer.on_write_back(&key, written);
            self.observer.on_cache_updated(&key);
        }
        Ok(written)
    }

    /// Write back the current unified list of `path`.
    pub fn write_back_path(&mut self, path: &Path) -> Result<usize, Error> {
        let key = self.tracked_key(path)?;
        let unified = self
            .paths
            .get(&key)
            .map(|t| t.cache.unified().to_vec())
            .unwrap_or_default();
        self.write_back(&key, &unified)
    }

    // ── Event pump ───────────────────────────────────────────────

    /// Apply every worker event already waiting. Returns how many were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Block until no batch is in flight, including batches queued along the way.
    pub fn run_until_idle(&mut self) {
        while !self.batches.is_empty() {
            match self.events_rx.recv() {
                Ok(event) => self.handle_event(event),
                Err(_) => break,
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        self.batches.is_empty()
    }

    fn handle_event(&mut self, event: WorkerEvent<JobOutput>) {
        match event {
            WorkerEvent::Progress { batch, done, total } => {
                if let Some(status) = self.pending.get_mut(&batch) {
                    status.done = done;
                    status.total = total;
                    self.observer.on_batch_progress(status);
                }
            }
            WorkerEvent::Output { batch, results } => {
                let mut probes = Vec::new();
                for output in results {
                    match output {
                        JobOutput::Scan(scan) => self.apply_scan(batch, scan),
                        JobOutput::Probe(outcome) => probes.push(outcome),
                    }
                }
                if !probes.is_empty() {
                    self.apply_probes(probes);
                }
            }
            WorkerEvent::Failed { batch, failure } => {
                error!(
                    "Worker failure in batch {} at item {}: {}",
                    batch, failure.item_index, failure.message
                );
                debug!("Backtrace for batch {}:\n{}", batch, failure.backtrace);
                self.observer.on_batch_failed(batch, &failure);
            }
            WorkerEvent::Finished { batch } => self.finish_batch(batch),
        }
    }

    fn apply_scan(&mut self, batch: BatchId, scan: PathScan) {
        let key = scan.path.clone();
        if let Some(info) = self.batches.get_mut(&batch) {
            info.reported.insert(key.clone());
        }

        let Some(tracked) = self.paths.get_mut(&key) else {
            warn!("Scan result for untracked path {}", key.display());
            return;
        };
        if let Some(reason) = scan.error {
            warn!("Scan of {} failed, keeping previous view: {}", key.display(), reason);
            self.reopen(&key);
            return;
        }

        if !scan.unparsed.is_empty() {
            info!(
                "{} files under {} match no filename pattern",
                scan.unparsed.len(),
                key.display()
            );
        }
        tracked.cache.set_disk_records(scan.records);
        tracked.cache.associate_sidecars(scan.sidecars);
        tracked.cache.merge();
        tracked.state = PathState::MetadataPending;
        let missing = tracked.cache.records_missing_duration();
        self.observer.on_cache_updated(&key);

        if let Err(e) = self.extract_metadata(&key, &missing) {
            warn!("Could not queue probe for {}: {}", key.display(), e);
            self.settle(&key);
        }
    }

    fn apply_probes(&mut self, outcomes: Vec<ProbeOutcome>) {
        let mut by_path: BTreeMap<PathBuf, Vec<(RecordKey, Option<f64>)>> = BTreeMap::new();
        for outcome in outcomes {
            by_path
                .entry(outcome.path)
                .or_default()
                .push((outcome.key, outcome.duration_secs));
        }

        for (key, durations) in by_path {
            let Some(tracked) = self.paths.get_mut(&key) else {
                continue;
            };
            let changed = tracked.cache.apply_durations(&durations);
            debug!(
                "Probed {} records under {}, {} gained a duration",
                durations.len(),
                key.display(),
                changed
            );
            if changed > 0 {
                tracked.cache.merge();
                self.observer.on_cache_updated(&key);
            }
        }
    }

    fn finish_batch(&mut self, batch: BatchId) {
        self.pending.remove(&batch);
        let Some(info) = self.batches.remove(&batch) else {
            return;
        };
        self.observer.on_batch_finished(batch);

        match info.kind {
            BatchKind::Scan => {
                for key in info.paths {
                    if !info.reported.contains(&key) {
                        warn!(
                            "Scan batch {} ended before reporting {}",
                            batch,
                            key.display()
                        );
                        self.reopen(&key);
                    }
                }
            }
            BatchKind::Probe => {
                for key in info.paths {
                    let remaining = match self.paths.get_mut(&key) {
                        Some(tracked) => {
                            tracked.probes_in_flight = tracked.probes_in_flight.saturating_sub(1);
                            tracked.probes_in_flight
                        }
                        None => continue,
                    };
                    if remaining == 0 {
                        self.settle(&key);
                    } else {
                        debug!("{} still has {} probes in flight", key.display(), remaining);
                    }
                }
            }
        }
    }

    fn settle(&mut self, key: &Path) {
        let Some(tracked) = self.paths.get_mut(key) else {
            return;
        };
        tracked.state = PathState::Settled;
        if tracked.cache.is_dirty() {
            tracked.cache.merge();
            self.observer.on_cache_updated(key);
        }
        debug!("{} settled", key.display());

        if self.options.auto_write_back {
            if let Err(e) = self.write_back_path(key) {
                warn!("Write-back for {} failed: {}", key.display(), e);
            }
        }
        self.run_deferred_scan(key);
    }

    /// A scan that produced nothing leaves the path as loaded, not settled.
    fn reopen(&mut self, key: &Path) {
        if let Some(tracked) = self.paths.get_mut(key) {
            tracked.state = PathState::Loaded;
        }
        self.run_deferred_scan(key);
    }

    fn run_deferred_scan(&mut self, key: &Path) {
        let requested = match self.paths.get_mut(key) {
            Some(tracked) => std::mem::take(&mut tracked.rescan_requested),
            None => false,
        };
        if requested {
            if let Err(e) = self.scan(&[key.to_path_buf()]) {
                warn!("Deferred scan of {} failed to start: {}", key.display(), e);
            }
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn cache(&self, path: &Path) -> Option<&DirectoryCache> {
        let key = self.lookup(path)?;
        self.paths.get(&key).map(|t| &t.cache)
    }

    /// The unified, time-ordered list of `path` with each record's sidecars.
    pub fn entries(&self, path: &Path) -> Option<Vec<(&MediaRecord, &[SidecarRecord])>> {
        self.cache(path).map(DirectoryCache::entries)
    }

    pub fn state(&self, path: &Path) -> Option<PathState> {
        let key = self.lookup(path)?;
        self.paths.get(&key).map(|t| t.state)
    }

    pub fn tracked_paths(&self) -> Vec<&Path> {
        self.paths.keys().map(PathBuf::as_path).collect()
    }

    pub fn pending_operations(&self) -> Vec<PendingOperationStatus> {
        self.pending.values().cloned().collect()
    }

    pub fn known_folders(&self) -> &[PersistentFolder] {
        &self.known_folders
    }

    // ── Internals ────────────────────────────────────────────────

    fn lookup(&self, path: &Path) -> Option<PathBuf> {
        if self.paths.contains_key(path) {
            return Some(path.to_path_buf());
        }
        platform::canonical_path(path)
            .ok()
            .filter(|key| self.paths.contains_key(key))
    }

    fn tracked_key(&self, path: &Path) -> Result<PathBuf, Error> {
        self.lookup(path)
            .ok_or_else(|| Error::UntrackedPath(path.to_path_buf()))
    }

    fn next_batch_id(&mut self) -> BatchId {
        let id = self.next_batch;
        self.next_batch += 1;
        id
    }

    fn start_batch<T>(
        &mut self,
        worker: BackgroundWorker<T, JobOutput>,
        kind: BatchKind,
        paths: Vec<PathBuf>,
    ) where
        T: Send + 'static,
    {
        let batch = worker.batch();
        let status = PendingOperationStatus::new(batch, kind, worker.len());
        self.observer.on_batch_started(&status);
        self.pending.insert(batch, status);
        self.batches.insert(
            batch,
            BatchInfo {
                kind,
                paths,
                reported: AHashSet::new(),
            },
        );
        worker.run(&self.pool, self.events_tx.clone());
    }

    fn ensure_folders_loaded(&mut self) -> Result<(), Error> {
        if !self.folders_loaded {
            self.known_folders = self.store.load_folders()?;
            self.folders_loaded = true;
        }
        Ok(())
    }

    /// Look up the folder row for an unresolved path and load its stored records.
    fn resolve_folder(&mut self, key: &Path) -> Result<(), Error> {
        let folder = self.persist_new_folder(key)?;
        let records: Vec<MediaRecord> = self
            .store
            .load_records(&folder)?
            .into_iter()
            .map(|mut record| {
                record.parent = key.to_path_buf();
                record
            })
            .collect();

        if let Some(tracked) = self.paths.get_mut(key) {
            tracked.folder = Some(folder);
            tracked.cache.set_store_records(records);
            tracked.cache.merge();
            tracked.state = PathState::Loaded;
        }
        self.observer.on_cache_updated(key);
        Ok(())
    }

    fn ensure_extension(&mut self, name: &str) -> Result<ExtensionRow, Error> {
        if !self.extensions_loaded {
            self.reload_extensions()?;
        }
        if let Some(row) = self.extensions.get(name) {
            return Ok(row.clone());
        }
        match self.store.save_extension(name) {
            Ok(row) => {
                debug!("Created extension row {} for '{}'", row.id, name);
                self.extensions.insert(row.name.clone(), row.clone());
                Ok(row)
            }
            Err(e) if e.is_conflict() => {
                self.reload_extensions()?;
                self.extensions.get(name).cloned().ok_or(e)
            }
            Err(e) => Err(e),
        }
    }

    fn reload_extensions(&mut self) -> Result<(), Error> {
        self.extensions = self
            .store
            .load_extensions()?
            .into_iter()
            .map(|row| (normalize_extension(&row.name), row))
            .collect();
        self.extensions_loaded = true;
        Ok(())
    }
}

fn canonical_key(path: &Path) -> Result<PathBuf, Error> {
    platform::canonical_path(path).map_err(|e| Error::InvalidPath {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn folder_key(folder: &PersistentFolder) -> PathBuf {
    let raw = Path::new(&folder.path);
    platform::canonical_path(raw).unwrap_or_else(|_| raw.to_path_buf())
}
