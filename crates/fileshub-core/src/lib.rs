pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod progress;
pub mod report;
pub mod rescan;
pub mod scanner;
pub mod search;
pub mod storage;

pub use config::{AppConfig, HashAlgorithm};
pub use document::{Document, Relation};
pub use engine::{BatchKind, BatchResult, Classification, DedupEngine, FileOutcome, MarkOutcome};
pub use error::Error;
pub use hasher::{Fingerprinter, FsFingerprinter};
pub use progress::{ProgressReporter, SilentReporter};
pub use report::{DuplicateReport, DuplicateSink, NullSink};
pub use search::SearchQuery;
