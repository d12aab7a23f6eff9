use crate::engine::{BatchKind, BatchResult, FileOutcome};

/// Trait for reporting batch progress.
///
/// CLI implements with indicatif. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_batch_start(&self, _kind: BatchKind, _total: usize) {}
    /// Called every `update_frequency(total)` files and once at the end.
    fn on_batch_progress(&self, _done: usize, _total: usize) {}
    /// Called for every file that was skipped or is missing.
    fn on_file_problem(&self, _outcome: &FileOutcome) {}
    fn on_batch_complete(&self, _result: &BatchResult) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// How many files pass between progress updates: about a hundred updates for
/// large batches, never more often than every 11 files.
pub fn update_frequency(total: usize) -> usize {
    (total / 107).max(11)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_frequency_floor() {
        assert_eq!(update_frequency(0), 11);
        assert_eq!(update_frequency(500), 11);
    }

    #[test]
    fn test_update_frequency_scales_with_total() {
        assert_eq!(update_frequency(107_000), 1000);
    }
}
