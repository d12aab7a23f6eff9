use glob::Pattern;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, warn};
use walkdir::WalkDir;

/// Expand command-line arguments into a de-duplicated list of file paths.
///
/// Directories are walked recursively (symlinks are not followed), plain files
/// are kept as given. Paths matching an ignore glob are dropped. Paths are
/// canonicalized where possible and the first occurrence wins, so the result
/// keeps the caller's order. Arguments that don't exist are passed through so
/// the engine can report them as missing.
pub fn collect_files(inputs: &[PathBuf], ignore_globs: &[String]) -> Vec<PathBuf> {
    let ignore_patterns: Vec<Pattern> = ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect();
    let ignored = |path: &Path| ignore_patterns.iter().any(|p| p.matches_path(path));

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut files: Vec<PathBuf> = Vec::new();
    let mut push = |path: PathBuf| {
        let canonical = fs::canonicalize(&path).unwrap_or(path);
        if seen.insert(canonical.clone()) {
            files.push(canonical);
        }
    };

    let dirs = non_overlapping_directories(inputs.iter().filter(|p| p.is_dir()).cloned().collect());

    for input in inputs {
        if input.is_dir() {
            if !dirs.contains(input) {
                continue;
            }
            let walker = WalkDir::new(input)
                .follow_links(false)
                .into_iter()
                .filter_entry(|entry| !ignored(entry.path()));
            for entry in walker {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => push(entry.into_path()),
                    Ok(_) => {}
                    Err(e) => warn!("Skipping unreadable entry under {}: {}", input.display(), e),
                }
            }
        } else if !ignored(input) {
            push(input.clone());
        }
    }

    files
}

/// Remove directories that are subdirectories of other directories in the list.
pub fn non_overlapping_directories(dirs: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for dir in dirs {
        if result.iter().any(|kept| dir.starts_with(kept)) {
            continue;
        }
        result.retain(|kept| !kept.starts_with(&dir));
        result.push(dir);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_overlapping_with_subdirectory() {
        let dirs = vec![
            PathBuf::from("/home/user/docs"),
            PathBuf::from("/home/user"),
            PathBuf::from("/var/data"),
        ];
        let result = non_overlapping_directories(dirs);
        assert_eq!(result.len(), 2);
        assert!(result.contains(&PathBuf::from("/home/user")));
        assert!(result.contains(&PathBuf::from("/var/data")));
    }

    #[test]
    fn test_collect_files_walks_and_dedupes() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("sub/b.txt"), "b").unwrap();
        fs::write(root.join("sub/skip.tmp"), "tmp").unwrap();

        let inputs = vec![root.join("sub"), root.clone(), root.join("a.txt")];
        let files = collect_files(&inputs, &["*.tmp".to_string()]);

        assert_eq!(files.len(), 2, "{:?}", files);
        assert!(files.iter().any(|p| p.ends_with("a.txt")));
        assert!(files.iter().any(|p| p.ends_with("sub/b.txt")));
    }

    #[test]
    fn test_collect_files_passes_missing_paths_through() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("gone.txt");
        let files = collect_files(&[missing.clone()], &[]);
        assert_eq!(files, vec![missing]);
    }
}
