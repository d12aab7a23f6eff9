use fileshub_core::{BatchKind, BatchResult, Classification, FileOutcome, ProgressReporter};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// Progress bar per batch, plus a line for every file that couldn't be processed.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                f(pb);
            }
        }
    }

    fn take_bar(&self) -> Option<ProgressBar> {
        self.bar.lock().ok().and_then(|mut guard| guard.take())
    }
}

impl ProgressReporter for CliReporter {
    fn on_batch_start(&self, kind: BatchKind, total: usize) {
        let label = match kind {
            BatchKind::Add => "Adding",
            BatchKind::Rescan => "Rescanning",
        };
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "  {spinner:.cyan} {msg} [{bar:30.cyan/dim}] {pos}/{len} files ({eta} remaining)",
        ) {
            pb.set_style(
                style
                    .progress_chars("━╸─")
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
            );
        }
        pb.set_message(label);
        pb.enable_steady_tick(Duration::from_millis(80));

        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.replace(pb) {
                old.finish_and_clear();
            }
        }
    }

    fn on_batch_progress(&self, done: usize, _total: usize) {
        self.with_bar(|pb| pb.set_position(done as u64));
    }

    fn on_file_problem(&self, outcome: &FileOutcome) {
        let line = format!(
            "  \x1b[33m!\x1b[0m {:?}: {} {}",
            outcome.classification,
            outcome.path.display(),
            outcome.detail.as_deref().unwrap_or("")
        );
        match self.bar.lock().ok().and_then(|guard| guard.clone()) {
            Some(pb) => pb.println(line),
            None => eprintln!("{}", line),
        }
    }

    fn on_batch_complete(&self, result: &BatchResult) {
        if let Some(pb) = self.take_bar() {
            pb.finish_and_clear();
        }
        let status = if result.cancelled { "cancelled" } else { "complete" };
        eprintln!(
            "  \x1b[32m✓\x1b[0m Batch {}: {} new, {} duplicate, {} modified, {} unchanged, {} skipped, {} missing in {:.2}s",
            status,
            result.count(Classification::New),
            result.count(Classification::Duplicate),
            result.count(Classification::Modified),
            result.count(Classification::Unchanged),
            result.count(Classification::Skipped),
            result.count(Classification::Missing),
            result.duration.as_secs_f64()
        );
    }
}
