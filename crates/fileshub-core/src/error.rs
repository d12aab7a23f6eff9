use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A record failed the persisted-record checks and was not written.
    #[error("Invalid document: {reason} [{document}]")]
    Validation { reason: String, document: String },

    /// The canonical path is already in the catalog.
    #[error("'{0}' already exists in the catalog")]
    Conflict(String),

    #[error("'{}' is locked by another process", .0.display())]
    Locked(PathBuf),

    #[error("Cannot read '{}': {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for failures that only concern one file and must not stop a scan.
    pub fn is_file_level(&self) -> bool {
        matches!(
            self,
            Error::Locked(_) | Error::Unreadable { .. } | Error::Validation { .. }
        )
    }
}
