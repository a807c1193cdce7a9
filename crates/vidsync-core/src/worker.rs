use crate::error::Error;
use crate::model::BatchId;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tracing::{debug, error};

/// Bounded pool shared by every scan and probe batch.
#[derive(Clone)]
pub struct WorkerPool {
    pool: Arc<ThreadPool>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self, Error> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("vidsync-worker-{}", i))
            .build()
            .map_err(|e| Error::Other(format!("Failed to build worker pool: {}", e)))?;
        debug!("Worker pool started with {} threads", pool.current_num_threads());
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

/// A panic raised by a batch task, caught before it reached the pool.
#[derive(Debug, Clone)]
pub struct WorkerFailure {
    /// Index of the target whose task panicked.
    pub item_index: usize,
    pub message: String,
    pub backtrace: String,
}

/// Messages a worker sends back to the controlling thread.
///
/// For one batch the order is: zero or more `Progress`, one `Output`, at most one
/// `Failed`, then exactly one `Finished`.
#[derive(Debug)]
pub enum WorkerEvent<R> {
    Progress {
        batch: BatchId,
        done: usize,
        total: usize,
    },
    Output {
        batch: BatchId,
        results: Vec<R>,
    },
    Failed {
        batch: BatchId,
        failure: WorkerFailure,
    },
    Finished {
        batch: BatchId,
    },
}

impl<R> WorkerEvent<R> {
    pub fn batch(&self) -> BatchId {
        match self {
            WorkerEvent::Progress { batch, .. }
            | WorkerEvent::Output { batch, .. }
            | WorkerEvent::Failed { batch, .. }
            | WorkerEvent::Finished { batch } => *batch,
        }
    }
}

type Task<T, R> = Box<dyn FnMut(&T) -> R + Send>;

/// One batch of targets plus the task applied to each. Consumed by `run`.
pub struct BackgroundWorker<T, R> {
    batch: BatchId,
    targets: Vec<T>,
    task: Task<T, R>,
}

impl<T, R> BackgroundWorker<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    pub fn new<F>(batch: BatchId, targets: Vec<T>, task: F) -> Self
    where
        F: FnMut(&T) -> R + Send + 'static,
    {
        Self {
            batch,
            targets,
            task: Box::new(task),
        }
    }

    pub fn batch(&self) -> BatchId {
        self.batch
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Queue the batch on the pool and return immediately.
    pub fn run(self, pool: &WorkerPool, events: Sender<WorkerEvent<R>>) {
        pool.pool.spawn(move || self.execute(&events));
    }

    /// Run the batch on the calling thread, reporting through `events`.
    pub fn execute(mut self, events: &Sender<WorkerEvent<R>>) {
        let batch = self.batch;
        let total = self.targets.len();
        let mut results = Vec::with_capacity(total);
        let mut failure = None;

        for (index, target) in self.targets.iter().enumerate() {
            let task = &mut self.task;
            match panic::catch_unwind(AssertUnwindSafe(|| task(target))) {
                Ok(result) => results.push(result),
                Err(payload) => {
                    let captured = WorkerFailure {
                        item_index: index,
                        message: panic_message(payload.as_ref()),
                        backtrace: Backtrace::force_capture().to_string(),
                    };
                    error!(
                        "Batch {} failed on item {} of {}: {}",
                        batch,
                        index + 1,
                        total,
                        captured.message
                    );
                    failure = Some(captured);
                    break;
                }
            }
            let _ = events.send(WorkerEvent::Progress {
                batch,
                done: index + 1,
                total,
            });
        }

        let _ = events.send(WorkerEvent::Output { batch, results });
        if let Some(failure) = failure {
            let _ = events.send(WorkerEvent::Failed { batch, failure });
        }
        let _ = events.send(WorkerEvent::Finished { batch });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker task panicked".to_string()
    }
}
