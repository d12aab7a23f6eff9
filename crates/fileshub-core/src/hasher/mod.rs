pub mod digest;

use crate::config::HashAlgorithm;
use crate::error::Error;
use fs4::FileExt;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Computes file identity for the engine.
pub trait Fingerprinter: Send + Sync {
    /// Fully resolved absolute path.
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// Content digest. Fails with `Error::Locked` when another process holds
    /// the file, `Error::Unreadable` for any other read failure.
    fn hash(&self, path: &Path) -> Result<String, Error>;

    /// Probed before hashing; a locked file is skipped without being read.
    fn is_locked(&self, path: &Path) -> bool;
}

/// Fingerprinter over the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsFingerprinter {
    algorithm: HashAlgorithm,
}

impl FsFingerprinter {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

impl Fingerprinter for FsFingerprinter {
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }

    fn hash(&self, path: &Path) -> Result<String, Error> {
        let unreadable = |source: io::Error| Error::Unreadable {
            path: path.to_path_buf(),
            source,
        };

        // The handle (and the shared lock on it) is released when `file` drops,
        // including on the error returns below.
        let file = File::open(path).map_err(unreadable)?;
        if FileExt::try_lock_shared(&file).is_err() {
            return Err(Error::Locked(path.to_path_buf()));
        }
        trace!("Hashing {}", path.display());
        let digest = digest::hash_reader(BufReader::new(&file), self.algorithm).map_err(unreadable)?;
        let _ = FileExt::unlock(&file);
        Ok(digest)
    }

    /// Only lock contention counts; a file that can't be opened at all is
    /// reported by `hash` as unreadable.
    fn is_locked(&self, path: &Path) -> bool {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(_) => return false,
        };
        match FileExt::try_lock_shared(&file) {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                false
            }
            Err(_) => true,
        }
    }
}

/// Bounded pool for hashing; 0 workers lets rayon pick one per core.
pub fn hash_pool(workers: usize) -> Result<ThreadPool, Error> {
    Ok(ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("fileshub-hash-{}", i))
        .build()?)
}

/// Fingerprint paths on `pool` without touching either store. Results keep
/// input order.
pub fn hash_files<F: Fingerprinter>(
    fingerprinter: &F,
    paths: &[PathBuf],
    pool: &ThreadPool,
) -> Vec<(PathBuf, Result<String, Error>)> {
    pool.install(|| {
        paths
            .par_iter()
            .map(|path| (path.clone(), fingerprinter.hash(path)))
            .collect()
    })
}
