use crate::model::{BatchId, PendingOperationStatus};
use crate::worker::WorkerFailure;
use std::path::Path;

/// Trait for the presentation side of the loader.
///
/// CLI implements with indicatif bars. Every callback runs on the controlling thread.
/// All methods have default no-op implementations.
pub trait ReconcileObserver {
    fn on_cache_updated(&self, _path: &Path) {}
    fn on_batch_started(&self, _status: &PendingOperationStatus) {}
    fn on_batch_progress(&self, _status: &PendingOperationStatus) {}
    fn on_batch_finished(&self, _batch: BatchId) {}
    fn on_batch_failed(&self, _batch: BatchId, _failure: &WorkerFailure) {}
    fn on_write_back(&self, _path: &Path, _rows: usize) {}
}

/// No-op observer for silent operation.
pub struct SilentObserver;

impl ReconcileObserver for SilentObserver {}
