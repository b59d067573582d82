//! In-memory run counters reported in the digest and zeroed daily.

use std::sync::atomic::{AtomicU64, Ordering};

use jobwatch_db::ReconcileSummary;
use jobwatch_notify::RunSummary;

#[derive(Debug, Default)]
pub struct DailyStats {
    runs_succeeded: AtomicU64,
    runs_failed: AtomicU64,
    postings_added: AtomicU64,
    postings_removed: AtomicU64,
}

impl DailyStats {
    pub fn record_success(&self, summary: ReconcileSummary) {
        self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
        self.postings_added
            .fetch_add(summary.inserted as u64, Ordering::Relaxed);
        self.postings_removed
            .fetch_add(summary.removed as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            runs_succeeded: self.runs_succeeded.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            postings_added: self.postings_added.load(Ordering::Relaxed),
            postings_removed: self.postings_removed.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter and return the values they held.
    pub fn reset(&self) -> RunSummary {
        RunSummary {
            runs_succeeded: self.runs_succeeded.swap(0, Ordering::Relaxed),
            runs_failed: self.runs_failed.swap(0, Ordering::Relaxed),
            postings_added: self.postings_added.swap(0, Ordering::Relaxed),
            postings_removed: self.postings_removed.swap(0, Ordering::Relaxed),
        }
    }
}
