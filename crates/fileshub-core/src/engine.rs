use crate::config::AppConfig;
use crate::document::{Document, Relation};
use crate::error::Error;
use crate::hasher::{hash_pool, Fingerprinter, FsFingerprinter};
use crate::progress::{update_frequency, ProgressReporter, SilentReporter};
use crate::report::DuplicateSink;
use crate::storage::{catalog, quarantine, Database};
use rayon::prelude::*;
use rusqlite::Connection;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What the engine decided for one candidate path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Inserted into the catalog.
    New,
    /// Content already catalogued under another path; quarantined.
    Duplicate,
    /// Catalogued file changed in place; its row now carries the new hash.
    Modified,
    /// Already known and unchanged. Nothing written beyond a refreshed mtime.
    Unchanged,
    /// Could not be read (locked, permissions, not a regular file). Nothing written.
    Skipped,
    /// Does not exist on disk. Nothing written.
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Add,
    Rescan,
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub classification: Classification,
    /// Row the file lives in afterwards: a catalog id, or a quarantine id for duplicates.
    pub id: Option<i64>,
    pub detail: Option<String>,
}

impl FileOutcome {
    fn new(path: PathBuf, classification: Classification, id: Option<i64>) -> Self {
        Self {
            path,
            classification,
            id,
            detail: None,
        }
    }

    fn problem(path: PathBuf, classification: Classification, detail: String) -> Self {
        Self {
            path,
            classification,
            id: None,
            detail: Some(detail),
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchResult {
    /// One entry per processed path, in input order.
    pub outcomes: Vec<FileOutcome>,
    /// Set when the batch stopped early; everything before that point is committed.
    pub cancelled: bool,
    pub duration: Duration,
}

impl BatchResult {
    pub fn count(&self, classification: Classification) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.classification == classification)
            .count()
    }

    pub fn classification_of(&self, path: &Path) -> Option<Classification> {
        self.outcomes
            .iter()
            .find(|o| o.path == path)
            .map(|o| o.classification)
    }
}

/// Result of a manual duplicate declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The file was already quarantined under that original.
    AlreadyMarked,
    /// The file was quarantined under another original and now points at the new one.
    Relinked,
    /// The file was a catalog entry. Its quarantine children moved to the new
    /// original and it was quarantined itself.
    Demoted { relinked: usize },
}

struct Candidate {
    doc: Document,
    size: u64,
}

enum Staged {
    Done(FileOutcome),
    Pending(Candidate),
}

struct Committed {
    outcome: FileOutcome,
    pair: Option<(Document, Document)>,
}

/// Classifies files against the catalog and the quarantine.
///
/// Observation and hashing run on a bounded worker pool. Commits happen one
/// file at a time, in input order, each inside its own immediate transaction,
/// so two files with the same content can never both become catalog entries
/// and the first one in a batch is always the original.
pub struct DedupEngine<F: Fingerprinter = FsFingerprinter> {
    db: Mutex<Database>,
    fingerprinter: F,
    pool: rayon::ThreadPool,
    batch_size: usize,
    cancel_token: Arc<AtomicBool>,
}

impl DedupEngine<FsFingerprinter> {
    pub fn open(config: &AppConfig) -> Result<Self, Error> {
        let db = Database::open(&config.database_path)?;
        Self::with_fingerprinter(db, FsFingerprinter::new(config.hash_algorithm), config)
    }
}

impl<F: Fingerprinter> DedupEngine<F> {
    pub fn with_fingerprinter(db: Database, fingerprinter: F, config: &AppConfig) -> Result<Self, Error> {
        let pool = hash_pool(config.hash_workers)?;
        Ok(Self {
            db: Mutex::new(db),
            fingerprinter,
            pool,
            batch_size: config.commit_batch_size.max(1),
            cancel_token: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Setting the returned flag stops the running batch before its next file,
    /// or the next batch if none is running. The batch it stops clears it.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel_token)
    }

    pub fn fingerprinter(&self) -> &F {
        &self.fingerprinter
    }

    pub(crate) fn lock_db(&self) -> Result<MutexGuard<'_, Database>, Error> {
        self.db
            .lock()
            .map_err(|e| Error::Other(format!("Failed to lock database: {}", e)))
    }

    /// Run read-only queries against the stores.
    pub fn with_connection<R>(
        &self,
        f: impl FnOnce(&Connection) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let db = self.lock_db()?;
        f(db.connection())
    }

    /// (catalog rows, quarantine rows)
    pub fn store_counts(&self) -> Result<(i64, i64), Error> {
        self.with_connection(|conn| Ok((catalog::count(conn)?, quarantine::count(conn)?)))
    }

    /// Classify and commit every path. Paths should already be de-duplicated;
    /// they are canonicalized here.
    pub fn add_files(
        &self,
        paths: &[PathBuf],
        sink: &mut dyn DuplicateSink,
        reporter: &dyn ProgressReporter,
    ) -> Result<BatchResult, Error> {
        self.process(BatchKind::Add, paths, sink, reporter)
    }

    pub(crate) fn process(
        &self,
        kind: BatchKind,
        paths: &[PathBuf],
        sink: &mut dyn DuplicateSink,
        reporter: &dyn ProgressReporter,
    ) -> Result<BatchResult, Error> {
        let start = Instant::now();

        let total = paths.len();
        let frequency = update_frequency(total);
        reporter.on_batch_start(kind, total);
        info!("{:?}: processing {} files", kind, total);

        let mut result = BatchResult::default();
        let mut duplicate_count = 0usize;
        let mut duplicate_bytes = 0u64;

        'chunks: for chunk in paths.chunks(self.batch_size) {
            if self.is_cancelled() {
                result.cancelled = true;
                break;
            }

            let staged = self.stage(kind, chunk)?;

            for item in staged {
                if self.is_cancelled() {
                    result.cancelled = true;
                    break 'chunks;
                }

                let outcome = match item {
                    Staged::Done(outcome) => outcome,
                    Staged::Pending(candidate) => {
                        let size = candidate.size;
                        // Held for the commit only; callbacks below may query the engine.
                        let committed = {
                            let db = self.lock_db()?;
                            commit(&db, candidate.doc)?
                        };
                        if let Some((duplicate, original)) = &committed.pair {
                            duplicate_count += 1;
                            duplicate_bytes += size;
                            sink.on_duplicate_found(duplicate, original);
                        }
                        committed.outcome
                    }
                };

                match outcome.classification {
                    Classification::Skipped | Classification::Missing => {
                        warn!(
                            "{:?}: {} ({})",
                            outcome.classification,
                            outcome.path.display(),
                            outcome.detail.as_deref().unwrap_or("")
                        );
                        reporter.on_file_problem(&outcome);
                    }
                    classification => {
                        debug!("{:?}: {}", classification, outcome.path.display());
                    }
                }

                result.outcomes.push(outcome);
                let done = result.outcomes.len();
                if done % frequency == 0 || done == total {
                    reporter.on_batch_progress(done, total);
                }
            }
        }

        sink.on_summary(duplicate_count, duplicate_bytes);
        result.duration = start.elapsed();
        if result.cancelled {
            self.cancel_token.store(false, Ordering::SeqCst);
            info!(
                "{:?} cancelled after {} of {} files",
                kind,
                result.outcomes.len(),
                total
            );
        }
        info!(
            "{:?} finished in {:.2}s: {} new, {} duplicate, {} modified, {} unchanged, {} skipped, {} missing",
            kind,
            result.duration.as_secs_f64(),
            result.count(Classification::New),
            result.count(Classification::Duplicate),
            result.count(Classification::Modified),
            result.count(Classification::Unchanged),
            result.count(Classification::Skipped),
            result.count(Classification::Missing),
        );
        reporter.on_batch_complete(&result);
        Ok(result)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_token.load(Ordering::SeqCst)
    }

    /// Observe and hash one chunk. The database lock is only taken for the
    /// mtime pre-check, never while files are read.
    fn stage(&self, kind: BatchKind, chunk: &[PathBuf]) -> Result<Vec<Staged>, Error> {
        let mut observed: Vec<Staged> = self
            .pool
            .install(|| chunk.par_iter().map(|path| self.observe(kind, path)).collect());

        {
            let db = self.lock_db()?;
            for item in observed.iter_mut() {
                if let Staged::Pending(candidate) = item {
                    if let Some(id) = unchanged_id(db.connection(), &candidate.doc)? {
                        *item = Staged::Done(FileOutcome::new(
                            PathBuf::from(&candidate.doc.canonical_path),
                            Classification::Unchanged,
                            Some(id),
                        ));
                    }
                }
            }
        }

        let hashed: Vec<Staged> = self.pool.install(|| {
            observed
                .into_par_iter()
                .map(|item| match item {
                    Staged::Pending(candidate) => self.fingerprint(candidate),
                    done => done,
                })
                .collect()
        });
        Ok(hashed)
    }

    fn observe(&self, kind: BatchKind, path: &Path) -> Staged {
        let canonical = match kind {
            // Catalog paths are canonical already; resolving them again could
            // move a row to wherever a symlink now points.
            BatchKind::Rescan => Ok(path.to_path_buf()),
            BatchKind::Add => self.fingerprinter.canonicalize(path),
        };
        let metadata = canonical.and_then(|canonical| {
            fs::metadata(&canonical).map(|metadata| (canonical, metadata))
        });

        match metadata {
            Ok((canonical, metadata)) if metadata.is_file() => Staged::Pending(Candidate {
                doc: Document::observed(&canonical, &metadata),
                size: metadata.len(),
            }),
            Ok((canonical, _)) => Staged::Done(FileOutcome::problem(
                canonical,
                Classification::Skipped,
                "not a regular file".to_string(),
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Staged::Done(FileOutcome::problem(
                path.to_path_buf(),
                Classification::Missing,
                e.to_string(),
            )),
            Err(e) => Staged::Done(FileOutcome::problem(
                path.to_path_buf(),
                Classification::Skipped,
                e.to_string(),
            )),
        }
    }

    fn fingerprint(&self, candidate: Candidate) -> Staged {
        let path = PathBuf::from(&candidate.doc.canonical_path);
        if self.fingerprinter.is_locked(&path) {
            let detail = Error::Locked(path.clone()).to_string();
            return Staged::Done(FileOutcome::problem(path, Classification::Skipped, detail));
        }
        match self.fingerprinter.hash(&path) {
            Ok(hash) => Staged::Pending(Candidate {
                doc: candidate.doc.with_hash(hash),
                size: candidate.size,
            }),
            Err(e) => Staged::Done(FileOutcome::problem(path, Classification::Skipped, e.to_string())),
        }
    }

    /// Declare `duplicate` a duplicate of `original`, whatever their content.
    ///
    /// Files not yet known are classified first. The first argument is the one
    /// demoted: if it was a catalog entry, its quarantine children are relinked
    /// to `original` before it is moved into the quarantine.
    pub fn mark_duplicate(
        &self,
        duplicate: &Path,
        original: &Path,
        sink: &mut dyn DuplicateSink,
    ) -> Result<MarkOutcome, Error> {
        let resolve = |path: &Path| {
            self.fingerprinter
                .canonicalize(path)
                .map_err(|e| Error::NotFound(format!("{}: {}", path.display(), e)))
        };
        let duplicate = resolve(duplicate)?;
        let original = resolve(original)?;
        if duplicate == original {
            return Err(Error::Validation {
                reason: "a file can't be marked as a duplicate of itself".to_string(),
                document: duplicate.display().to_string(),
            });
        }

        let known = self.add_files(&[duplicate.clone(), original.clone()], sink, &SilentReporter)?;
        if known.cancelled {
            return Err(Error::Other(format!(
                "cancelled before {} could be marked",
                duplicate.display()
            )));
        }
        for outcome in &known.outcomes {
            if matches!(
                outcome.classification,
                Classification::Skipped | Classification::Missing
            ) {
                return Err(Error::NotFound(format!(
                    "{} could not be catalogued: {}",
                    outcome.path.display(),
                    outcome.detail.as_deref().unwrap_or("unknown reason")
                )));
            }
        }

        let (outcome, pair) = {
            let db = self.lock_db()?;
            let tx = db.immediate_transaction()?;
            let marked = mark_in(
                &tx,
                &duplicate.to_string_lossy(),
                &original.to_string_lossy(),
            )?;
            tx.commit()?;
            marked
        };

        if let Some((demoted, target)) = pair {
            sink.on_duplicate_found(&demoted, &target);
        }
        info!(
            "Marked {} as duplicate of {}: {:?}",
            duplicate.display(),
            original.display(),
            outcome
        );
        Ok(outcome)
    }
}

/// Id of the catalog or quarantine row that already describes this path at
/// this mtime.
fn unchanged_id(conn: &Connection, doc: &Document) -> Result<Option<i64>, Error> {
    if let Some(existing) = catalog::find_by_path(conn, &doc.canonical_path)? {
        return Ok((existing.last_modified == doc.last_modified).then_some(existing.id));
    }
    if let Some(existing) = quarantine::find_by_path(conn, &doc.canonical_path)? {
        return Ok((existing.last_modified == doc.last_modified).then_some(existing.id));
    }
    Ok(None)
}

/// Classify one hashed document inside its own transaction. File-level
/// failures roll back and skip the file; store failures abort the batch.
fn commit(db: &Database, doc: Document) -> Result<Committed, Error> {
    let path = PathBuf::from(&doc.canonical_path);
    let tx = db.immediate_transaction()?;
    match classify(&tx, doc) {
        Ok(committed) => {
            tx.commit()?;
            Ok(committed)
        }
        Err(Error::Conflict(existing)) => {
            debug!("{} is already catalogued", existing);
            Ok(Committed {
                outcome: FileOutcome::new(path, Classification::Unchanged, None),
                pair: None,
            })
        }
        Err(e) if e.is_file_level() => Ok(Committed {
            outcome: FileOutcome::problem(path, Classification::Skipped, e.to_string()),
            pair: None,
        }),
        Err(e) => Err(e),
    }
}

fn classify(conn: &Connection, mut doc: Document) -> Result<Committed, Error> {
    let path = PathBuf::from(&doc.canonical_path);
    let unchanged = |id: i64| Committed {
        outcome: FileOutcome::new(path.clone(), Classification::Unchanged, Some(id)),
        pair: None,
    };

    if let Some(stale) = quarantine::find_by_path(conn, &doc.canonical_path)? {
        if stale.last_modified == doc.last_modified {
            return Ok(unchanged(stale.id));
        }
        if stale.content_hash == doc.content_hash {
            quarantine::update_content(conn, stale.id, &doc.content_hash, doc.last_modified)?;
            return Ok(unchanged(stale.id));
        }
        debug!(
            "Quarantined {} changed content, classifying it again",
            doc.canonical_path
        );
        quarantine::remove(conn, &stale)?;
        doc.comment = stale.comment;
    }

    if let Some(existing) = catalog::find_by_path(conn, &doc.canonical_path)? {
        if existing.last_modified == doc.last_modified {
            return Ok(unchanged(existing.id));
        }
        if existing.content_hash == doc.content_hash {
            catalog::update_content(conn, existing.id, &doc.content_hash, doc.last_modified)?;
            return Ok(unchanged(existing.id));
        }
        return modified_in_place(conn, existing, doc);
    }

    match catalog::find_by_hash(conn, &doc.content_hash)? {
        Some(original) => {
            doc.id = quarantine::insert(conn, &doc, original.id)?;
            doc.relation = Relation::DuplicateOf(original.id);
            doc.validate()?;
            Ok(Committed {
                outcome: FileOutcome::new(path, Classification::Duplicate, Some(doc.id)),
                pair: Some((doc, original)),
            })
        }
        None => {
            doc.id = catalog::insert(conn, &doc)?;
            doc.validate()?;
            Ok(Committed {
                outcome: FileOutcome::new(path, Classification::New, Some(doc.id)),
                pair: None,
            })
        }
    }
}

/// A catalogued file now has different content.
///
/// If no other catalog entry holds the new content the row is updated in
/// place. Otherwise the existing holder stays the original and this row is
/// demoted into the quarantine under it.
fn modified_in_place(conn: &Connection, existing: Document, mut doc: Document) -> Result<Committed, Error> {
    let path = PathBuf::from(&doc.canonical_path);
    doc.comment = existing.comment.clone();

    let holder = catalog::find_by_hash(conn, &doc.content_hash)?.filter(|o| o.id != existing.id);
    match holder {
        None => {
            catalog::update_content(conn, existing.id, &doc.content_hash, doc.last_modified)?;
            rehome_children(conn, &existing, None)?;
            Ok(Committed {
                outcome: FileOutcome::new(path, Classification::Modified, Some(existing.id)),
                pair: None,
            })
        }
        Some(original) => {
            rehome_children(conn, &existing, Some(original.id))?;
            catalog::remove(conn, &existing)?;
            doc.id = quarantine::insert(conn, &doc, original.id)?;
            doc.relation = Relation::DuplicateOf(original.id);
            doc.validate()?;
            info!(
                "{} now duplicates {}, demoted from the catalog",
                doc.canonical_path, original.canonical_path
            );
            Ok(Committed {
                outcome: FileOutcome::new(path, Classification::Duplicate, Some(doc.id)),
                pair: Some((doc, original)),
            })
        }
    }
}

/// Re-home the quarantine children of a catalog entry whose content changed.
///
/// `former` must still carry the old hash. Children with that hash follow their
/// content: the oldest is promoted into the catalog and the others point at it.
/// Remaining children move to `fallback` when the entry is about to be removed.
fn rehome_children(conn: &Connection, former: &Document, fallback: Option<i64>) -> Result<usize, Error> {
    let children = quarantine::find_by_duplicate_of(conn, former.id)?;
    if children.is_empty() {
        return Ok(0);
    }

    let (same_content, other): (Vec<Document>, Vec<Document>) = children
        .into_iter()
        .partition(|child| child.content_hash == former.content_hash);

    let mut moved = 0;
    if let Some((first, rest)) = same_content.split_first() {
        quarantine::remove(conn, first)?;
        let successor = Document {
            id: 0,
            relation: Relation::Kept,
            ..first.clone()
        };
        let successor_id = catalog::insert(conn, &successor)?;
        for child in rest {
            moved += quarantine::set_duplicate_of(conn, child.id, successor_id)?;
        }
        info!(
            "Promoted {} to the catalog in place of {}",
            successor.canonical_path, former.canonical_path
        );
    }

    if let Some(target) = fallback {
        for child in &other {
            moved += quarantine::set_duplicate_of(conn, child.id, target)?;
        }
    }
    Ok(moved)
}

/// Catalog entry that `path` stands for: its own row, or the original it is
/// quarantined under.
fn resolve_original(conn: &Connection, path: &str) -> Result<Document, Error> {
    if let Some(doc) = catalog::find_by_path(conn, path)? {
        return Ok(doc);
    }
    let entry = quarantine::find_by_path(conn, path)?
        .ok_or_else(|| Error::NotFound(path.to_string()))?;
    let target = entry.duplicate_of().unwrap_or_default();
    catalog::find_by_id(conn, target)?
        .ok_or_else(|| Error::NotFound(format!("catalog entry {} for {}", target, path)))
}

fn mark_in(
    conn: &Connection,
    duplicate: &str,
    original: &str,
) -> Result<(MarkOutcome, Option<(Document, Document)>), Error> {
    let mut target = resolve_original(conn, original)?;

    if let Some(entry) = quarantine::find_by_path(conn, duplicate)? {
        if entry.duplicate_of() == Some(target.id) {
            return Ok((MarkOutcome::AlreadyMarked, None));
        }
        quarantine::set_duplicate_of(conn, entry.id, target.id)?;
        let entry = Document {
            relation: Relation::DuplicateOf(target.id),
            ..entry
        };
        return Ok((MarkOutcome::Relinked, Some((entry, target))));
    }

    let demoted = catalog::find_by_path(conn, duplicate)?
        .ok_or_else(|| Error::NotFound(duplicate.to_string()))?;

    if target.id == demoted.id {
        // `original` is quarantined under `duplicate`; swap them.
        let entry = quarantine::find_by_path(conn, original)?
            .ok_or_else(|| Error::NotFound(original.to_string()))?;
        quarantine::remove(conn, &entry)?;
        let promoted = Document {
            id: 0,
            relation: Relation::Kept,
            ..entry
        };
        let id = catalog::insert(conn, &promoted)?;
        target = Document { id, ..promoted };
    }

    let relinked = quarantine::relink(conn, demoted.id, target.id)?;
    catalog::remove(conn, &demoted)?;
    let quarantine_id = quarantine::insert(conn, &demoted, target.id)?;
    let demoted = Document {
        id: quarantine_id,
        relation: Relation::DuplicateOf(target.id),
        ..demoted
    };
    Ok((MarkOutcome::Demoted { relinked }, Some((demoted, target))))
}
