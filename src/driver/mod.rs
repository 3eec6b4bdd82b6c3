//! Bounded iteration over a batch source.
//!
//! Both drivers yield `(batch, LoopState)` pairs and stop right after the pair whose
//! state has `training_end` set. They differ in how they detect the last batch of an
//! epoch: `KnownLen` compares indices against a declared length, `Pairwise` reads one
//! batch ahead.

mod known;
mod pairwise;

use std::time::Instant;

pub use known::KnownLen;
pub use pairwise::Pairwise;

use crate::{
    clock::SharedClock,
    config::{NoLenStrategy, Stopping},
    error::Result,
    source::BatchSource,
    state::{Counters, LoopState},
};

/// Item produced by a driver.
pub type Step<B> = Result<(B, LoopState)>;

/// Counters and stopping bookkeeping shared by both drivers.
pub(crate) struct Progress {
    pub counters: Counters,
    pub stopping: Stopping,
    started: Option<Instant>,
    pub finished: bool,
}

impl Progress {
    pub fn new(stopping: Stopping) -> Self {
        Self {
            counters: Counters::default(),
            stopping,
            started: None,
            finished: false,
        }
    }

    pub fn set_clock(&mut self, clock: SharedClock) {
        self.stopping.clock = clock;
    }

    /// Marks the start of the run on the first pull.
    #[inline]
    pub fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(self.stopping.clock.now());
        }
    }

    #[inline]
    pub fn max_steps_reached(&self) -> bool {
        self.stopping.bound.max_steps_reached(self.counters.global_step)
    }

    #[inline]
    pub fn is_last_epoch(&self) -> bool {
        self.stopping.bound.is_last_epoch(self.counters.epoch)
    }

    /// Whether the time budget has run out.
    pub fn max_seconds_reached(&self) -> bool {
        let (Some(max_seconds), Some(started)) = (self.stopping.max_seconds, self.started) else {
            return false;
        };

        self.stopping.clock.now().saturating_duration_since(started) >= max_seconds
    }

    /// Snapshots the state of the batch about to be yielded and moves past it.
    pub fn step(&mut self, epoch_end: bool, training_end: bool) -> LoopState {
        let state = self.counters.snapshot(epoch_end, training_end);
        if training_end {
            self.finished = true;
        } else {
            self.counters.advance(epoch_end);
        }
        state
    }
}

/// Runtime-selected driver.
pub enum Driver<S: BatchSource> {
    Known(KnownLen<S>),
    Pairwise(Pairwise<S>),
}

impl<S: BatchSource> Driver<S> {
    /// Picks the driver for a source.
    ///
    /// # Args
    /// * `source` - The batch source.
    /// * `len` - Known number of batches per epoch, if any.
    /// * `strategy` - How to walk the source when `len` is `None`.
    /// * `stopping` - Validated stopping conditions.
    ///
    /// # Errors
    /// Returns `LoopErr::InvalidLength` if `len` is `Some(0)`.
    pub(crate) fn select(
        source: S,
        len: Option<usize>,
        strategy: NoLenStrategy,
        stopping: Stopping,
    ) -> Result<Self> {
        Ok(match (len, strategy) {
            (Some(len), _) => Self::Known(KnownLen::from_stopping(source, len, stopping)?),
            (None, NoLenStrategy::Pairwise) => {
                Self::Pairwise(Pairwise::from_stopping(source, stopping))
            }
        })
    }

    /// Returns a stable identifier for the driver kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Driver::Known(_) => "known_len",
            Driver::Pairwise(_) => "pairwise",
        }
    }
}

impl<S: BatchSource> Iterator for Driver<S> {
    type Item = Step<S::Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Driver::Known(d) => d.next(),
            Driver::Pairwise(d) => d.next(),
        }
    }
}
