use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};
use tempfile::{tempdir, TempDir};

use fileshub_core::storage::{catalog, quarantine, Database};
use fileshub_core::{
    AppConfig, Classification, DedupEngine, DuplicateReport, Error, Fingerprinter,
    FsFingerprinter, NullSink, SilentReporter,
};

/// Counts how many files were actually read.
#[derive(Default)]
struct CountingFingerprinter {
    inner: FsFingerprinter,
    hashed: AtomicUsize,
}

impl Fingerprinter for CountingFingerprinter {
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        self.inner.canonicalize(path)
    }

    fn hash(&self, path: &Path) -> Result<String, Error> {
        self.hashed.fetch_add(1, Ordering::SeqCst);
        self.inner.hash(path)
    }

    fn is_locked(&self, path: &Path) -> bool {
        self.inner.is_locked(path)
    }
}

fn engine() -> DedupEngine<CountingFingerprinter> {
    let config = AppConfig {
        hash_workers: 2,
        ..AppConfig::default()
    };
    DedupEngine::with_fingerprinter(
        Database::open_in_memory().unwrap(),
        CountingFingerprinter::default(),
        &config,
    )
    .unwrap()
}

fn write_file(path: &Path, content: &str, mtime_secs: u64) -> PathBuf {
    fs::write(path, content).unwrap();
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(mtime_secs))
        .unwrap();
    fs::canonicalize(path).unwrap()
}

fn setup(files: &[(&str, &str)]) -> (TempDir, DedupEngine<CountingFingerprinter>, Vec<PathBuf>) {
    let tmp = tempdir().unwrap();
    let paths: Vec<PathBuf> = files
        .iter()
        .map(|(name, content)| write_file(&tmp.path().join(name), content, 1_700_000_000))
        .collect();
    let engine = engine();
    engine.add_files(&paths, &mut NullSink, &SilentReporter).unwrap();
    (tmp, engine, paths)
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn test_unchanged_files_are_not_hashed_again() {
    let (_tmp, engine, _paths) = setup(&[("a.txt", "a"), ("b.txt", "b")]);
    assert_eq!(engine.fingerprinter().hashed.load(Ordering::SeqCst), 2);

    let result = engine.rescan_all(&mut NullSink, &SilentReporter).unwrap();
    assert_eq!(result.count(Classification::Unchanged), 2);
    assert_eq!(engine.fingerprinter().hashed.load(Ordering::SeqCst), 2);
}

#[test]
fn test_modified_file_keeps_its_id() {
    let (_tmp, engine, paths) = setup(&[("a.txt", "first version")]);
    let before = engine
        .with_connection(|conn| catalog::find_by_path(conn, &path_str(&paths[0])))
        .unwrap()
        .unwrap();

    write_file(&paths[0], "second version", 1_700_000_900);
    let result = engine.rescan_all(&mut NullSink, &SilentReporter).unwrap();
    assert_eq!(result.classification_of(&paths[0]), Some(Classification::Modified));

    let after = engine
        .with_connection(|conn| catalog::find_by_path(conn, &path_str(&paths[0])))
        .unwrap()
        .unwrap();
    assert_eq!(after.id, before.id);
    assert_ne!(after.content_hash, before.content_hash);
    assert_eq!(after.last_modified, 1_700_000_900_000);
    assert_eq!(engine.store_counts().unwrap(), (1, 0));
}

#[test]
fn test_touched_but_identical_file_is_unchanged() {
    let (_tmp, engine, paths) = setup(&[("a.txt", "stable")]);
    write_file(&paths[0], "stable", 1_700_000_900);

    let result = engine.rescan_all(&mut NullSink, &SilentReporter).unwrap();
    assert_eq!(result.classification_of(&paths[0]), Some(Classification::Unchanged));

    let doc = engine
        .with_connection(|conn| catalog::find_by_path(conn, &path_str(&paths[0])))
        .unwrap()
        .unwrap();
    assert_eq!(doc.last_modified, 1_700_000_900_000);
}

#[test]
fn test_deleted_file_is_missing_and_kept() {
    let (_tmp, engine, paths) = setup(&[("a.txt", "a"), ("b.txt", "b")]);
    fs::remove_file(&paths[1]).unwrap();

    let result = engine.rescan_all(&mut NullSink, &SilentReporter).unwrap();
    assert_eq!(result.classification_of(&paths[1]), Some(Classification::Missing));
    assert_eq!(result.classification_of(&paths[0]), Some(Classification::Unchanged));
    assert_eq!(engine.store_counts().unwrap(), (2, 0));
}

#[test]
fn test_file_changed_into_existing_content_is_demoted() {
    let (_tmp, engine, paths) = setup(&[("x.txt", "alpha"), ("z.txt", "beta")]);
    let x_id = engine
        .with_connection(|conn| catalog::find_by_path(conn, &path_str(&paths[0])))
        .unwrap()
        .unwrap()
        .id;

    write_file(&paths[1], "alpha", 1_700_000_900);
    let mut report = DuplicateReport::new();
    let result = engine.rescan_all(&mut report, &SilentReporter).unwrap();

    assert_eq!(result.classification_of(&paths[1]), Some(Classification::Duplicate));
    assert_eq!(engine.store_counts().unwrap(), (1, 1));
    let entry = engine
        .with_connection(|conn| quarantine::find_by_path(conn, &path_str(&paths[1])))
        .unwrap()
        .unwrap();
    assert_eq!(entry.duplicate_of(), Some(x_id));
    assert_eq!(report.pairs().len(), 1);
    assert_eq!(report.pairs()[0].original_path, path_str(&paths[0]));
}

#[test]
fn test_oldest_duplicate_takes_over_modified_original() {
    let (_tmp, engine, paths) = setup(&[("x.txt", "alpha"), ("y1.txt", "alpha"), ("y2.txt", "alpha")]);
    assert_eq!(engine.store_counts().unwrap(), (1, 2));

    write_file(&paths[0], "rewritten", 1_700_000_900);
    let result = engine.rescan_all(&mut NullSink, &SilentReporter).unwrap();
    assert_eq!(result.classification_of(&paths[0]), Some(Classification::Modified));

    let successor = engine
        .with_connection(|conn| catalog::find_by_path(conn, &path_str(&paths[1])))
        .unwrap()
        .expect("oldest duplicate promoted");
    let remaining = engine
        .with_connection(|conn| quarantine::find_by_path(conn, &path_str(&paths[2])))
        .unwrap()
        .unwrap();
    assert_eq!(remaining.duplicate_of(), Some(successor.id));
    assert_eq!(engine.store_counts().unwrap(), (2, 1));
}

#[test]
fn test_demoted_original_hands_children_to_successor() {
    let (_tmp, engine, paths) = setup(&[("x.txt", "alpha"), ("z.txt", "beta"), ("w.txt", "beta")]);
    assert_eq!(engine.store_counts().unwrap(), (2, 1));

    write_file(&paths[1], "alpha", 1_700_000_900);
    let result = engine.rescan_all(&mut NullSink, &SilentReporter).unwrap();
    assert_eq!(result.classification_of(&paths[1]), Some(Classification::Duplicate));

    assert!(engine
        .with_connection(|conn| catalog::exists(conn, &path_str(&paths[2])))
        .unwrap());
    assert_eq!(engine.store_counts().unwrap(), (2, 1));
}

#[test]
fn test_add_duplicate_then_rescan_changes_nothing() {
    let tmp = tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("a")).unwrap();
    fs::create_dir_all(tmp.path().join("b")).unwrap();
    let x = write_file(&tmp.path().join("a/x.txt"), "hello", 1_700_000_000);
    let y = write_file(&tmp.path().join("b/y.txt"), "hello", 1_700_000_100);
    let engine = engine();

    let first = engine.add_files(&[x.clone()], &mut NullSink, &SilentReporter).unwrap();
    assert_eq!(first.classification_of(&x), Some(Classification::New));

    let mut report = DuplicateReport::new();
    let second = engine.add_files(&[y.clone()], &mut report, &SilentReporter).unwrap();
    assert_eq!(second.classification_of(&y), Some(Classification::Duplicate));
    assert_eq!(report.pairs().len(), 1);
    assert_eq!(report.pairs()[0].duplicate_path, path_str(&y));
    assert_eq!(report.pairs()[0].original_path, path_str(&x));

    let snapshot = |engine: &DedupEngine<CountingFingerprinter>| {
        engine
            .with_connection(|conn| {
                let quarantined = quarantine::find_by_path(conn, &path_str(&y))?;
                Ok((catalog::all(conn)?, quarantined))
            })
            .unwrap()
    };
    let before = snapshot(&engine);
    let hashed = engine.fingerprinter().hashed.load(Ordering::SeqCst);

    let mut rescan_report = DuplicateReport::new();
    let rescan = engine.rescan_all(&mut rescan_report, &SilentReporter).unwrap();

    assert_eq!(rescan.outcomes.len(), 1);
    assert_eq!(rescan.classification_of(&x), Some(Classification::Unchanged));
    assert!(rescan_report.is_empty());
    assert_eq!(snapshot(&engine), before);
    assert_eq!(engine.fingerprinter().hashed.load(Ordering::SeqCst), hashed);
    assert_eq!(engine.store_counts().unwrap(), (1, 1));
}
