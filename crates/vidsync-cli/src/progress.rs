use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use vidsync_core::model::{BatchId, BatchKind, PendingOperationStatus};
use vidsync_core::worker::WorkerFailure;
use vidsync_core::ReconcileObserver;

/// One indicatif bar per in-flight batch.
///
/// Callbacks arrive on the thread that drives the loader, so a `RefCell` is enough.
pub struct CliObserver {
    bars: MultiProgress,
    active: RefCell<HashMap<BatchId, ProgressBar>>,
}

impl CliObserver {
    pub fn new() -> Self {
        Self {
            bars: MultiProgress::new(),
            active: RefCell::new(HashMap::new()),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(
            "  {spinner:.cyan} {msg:<10} [{bar:30.cyan/dim}] {pos}/{len}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸─")
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn finish(&self, batch: BatchId) {
        if let Some(pb) = self.active.borrow_mut().remove(&batch) {
            pb.finish_and_clear();
        }
    }
}

impl ReconcileObserver for CliObserver {
    fn on_batch_started(&self, status: &PendingOperationStatus) {
        let pb = self.bars.add(ProgressBar::new(status.total as u64));
        pb.set_style(Self::style());
        pb.set_message(match status.kind {
            BatchKind::Scan => "Scanning",
            BatchKind::Probe => "Probing",
        });
        pb.enable_steady_tick(Duration::from_millis(80));
        self.active.borrow_mut().insert(status.batch, pb);
    }

    fn on_batch_progress(&self, status: &PendingOperationStatus) {
        if let Some(pb) = self.active.borrow().get(&status.batch) {
            if pb.length() != Some(status.total as u64) {
                pb.set_length(status.total as u64);
            }
            pb.set_position(status.done as u64);
        }
    }

    fn on_batch_finished(&self, batch: BatchId) {
        self.finish(batch);
    }

    fn on_batch_failed(&self, batch: BatchId, failure: &WorkerFailure) {
        let _ = self.bars.println(format!(
            "  \x1b[31m✗\x1b[0m Batch {} stopped at item {}: {}",
            batch,
            failure.item_index + 1,
            failure.message
        ));
    }

    fn on_write_back(&self, path: &Path, rows: usize) {
        let _ = self.bars.println(format!(
            "  \x1b[32m✓\x1b[0m Stored {} new records for {}",
            rows,
            path.display()
        ));
    }
}
