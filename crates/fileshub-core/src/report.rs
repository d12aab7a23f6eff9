use crate::document::Document;
use crate::error::Error;
use colored::*;
use std::path::Path;

/// Receives duplicate pairs as the engine commits them.
pub trait DuplicateSink {
    fn on_duplicate_found(&mut self, duplicate: &Document, original: &Document);

    /// Called once per batch with the number of duplicates found and their size on disk.
    fn on_summary(&mut self, _count: usize, _total_bytes: u64) {}
}

/// Sink that drops everything.
pub struct NullSink;

impl DuplicateSink for NullSink {
    fn on_duplicate_found(&mut self, _duplicate: &Document, _original: &Document) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatePair {
    pub duplicate_path: String,
    pub original_path: String,
}

/// Collects the duplicate pairs of a run for console and CSV output.
#[derive(Debug, Default)]
pub struct DuplicateReport {
    pairs: Vec<DuplicatePair>,
    total_bytes: u64,
}

impl DuplicateReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pairs(&self) -> &[DuplicatePair] {
        &self.pairs
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn display(&self) {
        if self.pairs.is_empty() {
            println!("There is no duplicate file.");
            return;
        }

        println!("{}", "Duplicate files:".bold());
        println!("=================");
        for pair in &self.pairs {
            println!("{}", pair.duplicate_path);
        }
        println!("========================================================");
        println!(
            "Total size of {} duplicate files = {}.",
            format!("{}", self.pairs.len()).red(),
            readable_size(self.total_bytes).red(),
        );
    }

    /// Write `Duplicate,From Database` rows, one per pair.
    pub fn write_csv(&self, path: &Path) -> Result<(), Error> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["Duplicate", "From Database"])?;
        for pair in &self.pairs {
            writer.write_record([pair.duplicate_path.as_str(), pair.original_path.as_str()])?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl DuplicateSink for DuplicateReport {
    fn on_duplicate_found(&mut self, duplicate: &Document, original: &Document) {
        self.pairs.push(DuplicatePair {
            duplicate_path: duplicate.canonical_path.clone(),
            original_path: original.canonical_path.clone(),
        });
    }

    fn on_summary(&mut self, _count: usize, total_bytes: u64) {
        self.total_bytes += total_bytes;
    }
}

pub fn readable_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}
