use crate::engine::{BatchKind, BatchResult, Classification, DedupEngine};
use crate::error::Error;
use crate::hasher::Fingerprinter;
use crate::progress::ProgressReporter;
use crate::report::DuplicateSink;
use crate::storage::catalog;
use std::path::PathBuf;
use tracing::{info, warn};

impl<F: Fingerprinter> DedupEngine<F> {
    /// Re-examine every catalog entry against the disk.
    ///
    /// Entries whose mtime is unchanged are not hashed again. Files that no
    /// longer exist are reported as `Missing` and stay in the catalog.
    pub fn rescan_all(
        &self,
        sink: &mut dyn DuplicateSink,
        reporter: &dyn ProgressReporter,
    ) -> Result<BatchResult, Error> {
        let paths: Vec<PathBuf> = {
            let db = self.lock_db()?;
            catalog::all(db.connection())?
                .into_iter()
                .map(|doc| PathBuf::from(doc.canonical_path))
                .collect()
        };
        info!("Rescanning {} catalogued files", paths.len());

        let result = self.process(BatchKind::Rescan, &paths, sink, reporter)?;

        let missing = result.count(Classification::Missing);
        if missing > 0 {
            warn!(
                "{} catalogued files are missing on disk; their entries were kept",
                missing
            );
        }
        Ok(result)
    }
}
