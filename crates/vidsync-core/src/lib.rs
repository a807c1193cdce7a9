pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod filename;
pub mod model;
pub mod platform;
pub mod progress;
pub mod scanner;
pub mod storage;
pub mod worker;

pub use cache::DirectoryCache;
pub use config::AppConfig;
pub use engine::{LoaderOptions, PathState, ReconciliationLoader};
pub use error::Error;
pub use model::{MediaRecord, Provenance, RecordKey, SidecarRecord};
pub use progress::{ReconcileObserver, SilentObserver};
pub use scanner::{Filesystem, LocalFilesystem};
pub use storage::{Database, Store};
