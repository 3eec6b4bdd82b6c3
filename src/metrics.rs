use serde::Serialize;

use crate::state::LoopState;

/// Counters accumulated over a run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct LoopMetrics {
    pub steps: u64,
    pub epochs: u64,
    pub user_events: u64,
}

impl LoopMetrics {
    #[inline]
    pub fn bump_step(&mut self) {
        self.steps += 1;
    }

    #[inline]
    pub fn bump_epoch(&mut self) {
        self.epochs += 1;
    }

    #[inline]
    pub fn add_user_events(&mut self, n: usize) {
        self.user_events += n as u64;
    }
}

/// Why a loop was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The batch with `training_end` was yielded.
    Completed,
    /// The driver reported an error.
    Failed,
    /// Dropped before training end.
    Abandoned,
    /// Dropped while the thread was unwinding from a panic.
    Panicked,
}

/// What a close hook gets to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopSummary {
    pub reason: CloseReason,
    pub metrics: LoopMetrics,
    pub last_state: Option<LoopState>,
}

/// Runs exactly once when a loop goes out of scope.
pub type CloseHook = Box<dyn FnOnce(&LoopSummary)>;
