use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Cancellation flag shared between an overdue sweep and the view that
/// started it. Once cancelled, the sweep applies no further updates.
#[derive(Debug, Clone, Default)]
pub struct SweepToken {
    cancelled: Arc<AtomicBool>,
}

impl SweepToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub item_id: String,
    pub message: String,
}

/// Outcome of one overdue sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub repaired: Vec<String>,
    pub failed: Vec<SweepFailure>,
    /// Candidates left untouched because the sweep was cancelled.
    pub skipped: Vec<String>,
    pub cancelled: bool,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }
}
