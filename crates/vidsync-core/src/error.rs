use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// An insert collided with a row that already carries the same unique identity.
    #[error("Persistence conflict: {0}")]
    PersistenceConflict(String),

    #[error("Duration probe failed for {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("Path is not tracked: {0}")]
    UntrackedPath(PathBuf),

    #[error("{0}")]
    Other(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref code, ref message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::PersistenceConflict(
                    message.clone().unwrap_or_else(|| code.to_string()),
                )
            }
            other => Error::Database(other),
        }
    }
}

impl Error {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::PersistenceConflict(_))
    }
}
