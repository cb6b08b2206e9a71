//! Batch driving and temp-dir lifetime.
//!
//! Files are converted strictly one after another. A failure is recorded and
//! the batch moves on; only a cancel stops the run early. Temporary
//! directories created along the way are parked in a [`CleanupRegistry`] so
//! they outlive every conversion and are deleted together at batch exit.

use tracing::{error, info, warn};

use crate::engine::{CancelFlag, MediaEngine};
use crate::errors::PressError;
use crate::orchestrate::{self, ConversionOutcome, ConversionRequest};
use crate::retry::DecisionProvider;
use crate::ui;

/// Holds [`tempfile::TempDir`] guards until the batch is over. Dropping the
/// registry removes every registered directory.
#[derive(Default)]
pub struct CleanupRegistry {
    dirs: Vec<tempfile::TempDir>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a temp dir; it stays on disk until [`release`](Self::release).
    pub fn register(&mut self, dir: tempfile::TempDir) {
        self.dirs.push(dir);
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// Delete everything now instead of waiting for drop, logging failures.
    pub fn release(&mut self) {
        for dir in self.dirs.drain(..) {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("Failed to remove temp dir {}: {}", path.display(), e);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<ConversionOutcome>,
    pub failed: Vec<(std::path::PathBuf, String)>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    pub fn total_saved_bytes(&self) -> i64 {
        self.succeeded
            .iter()
            .map(|o| o.original_size as i64 - o.compressed_size as i64)
            .sum()
    }
}

/// Convert every request in order. One file failing does not abort the rest;
/// cancellation does. The registry is released before returning, whatever
/// happened to the individual files.
pub fn run_batch(
    engine: &dyn MediaEngine,
    decisions: &mut dyn DecisionProvider,
    requests: &mut [ConversionRequest],
    cancel: &CancelFlag,
    cleanup: &mut CleanupRegistry,
) -> BatchReport {
    let mut report = BatchReport::default();

    for request in requests.iter_mut() {
        if cancel.is_cancelled() {
            info!("Cancelled; skipping remaining files");
            report.cancelled = true;
            break;
        }

        match orchestrate::convert(engine, decisions, request) {
            Ok(outcome) => report.succeeded.push(outcome),
            Err(PressError::Cancelled) => {
                report.cancelled = true;
                report
                    .failed
                    .push((request.input.clone(), "cancelled".to_string()));
                break;
            }
            Err(e) => {
                error!("{}: {}", request.input.display(), e);
                report.failed.push((request.input.clone(), e.to_string()));
            }
        }
    }

    cleanup.release();
    report
}

pub fn print_report(report: &BatchReport) {
    info!(
        "📊 {} file(s): {} succeeded, {} failed",
        report.total(),
        report.succeeded.len(),
        report.failed.len()
    );

    let saved = report.total_saved_bytes();
    if saved > 0 {
        info!("   Total saved: {}", ui::format_size(saved as u64));
    } else if saved < 0 {
        warn!("   Total grew by: {}", ui::format_size((-saved) as u64));
    }

    for (path, reason) in &report.failed {
        warn!("   ❌ {}: {}", path.display(), reason);
    }
}
