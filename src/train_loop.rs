use std::{hash::Hash, thread};

use log::{debug, info, warn};

use crate::{
    builder::LoopBuilder,
    driver::Driver,
    error::Result,
    events::{Event, EventSet},
    metrics::{CloseHook, CloseReason, LoopMetrics, LoopSummary},
    source::BatchSource,
    state::LoopState,
    trigger::Trigger,
};

/// A training loop over a batch source.
///
/// Iterating yields `(batch, events)` for every batch until the batch that ends training.
/// Each registered trigger is evaluated exactly once per batch. Once the final batch (or
/// an error) has been yielded the loop is exhausted for good; a new loop starts over at
/// epoch 0, step 0.
///
/// Dropping the loop, whether after completion, on an early `break`, or while unwinding
/// from a panic, runs the close hook (if any) and logs a summary.
pub struct Loop<S: BatchSource, K> {
    driver: Driver<S>,
    triggers: Vec<(K, Trigger)>,
    state: Option<LoopState>,
    metrics: LoopMetrics,
    outcome: Option<CloseReason>,
    on_close: Option<CloseHook>,
}

impl<S, K> Loop<S, K>
where
    S: BatchSource,
    K: Eq + Hash + Clone,
{
    /// Returns a `LoopBuilder` over `source`.
    pub fn builder(source: S) -> LoopBuilder<S, K> {
        LoopBuilder::new(source)
    }

    pub(crate) fn new(
        driver: Driver<S>,
        triggers: Vec<(K, Trigger)>,
        on_close: Option<CloseHook>,
    ) -> Self {
        Self {
            driver,
            triggers,
            state: None,
            metrics: LoopMetrics::default(),
            outcome: None,
            on_close,
        }
    }

    /// Builds the event set of a batch, evaluating every trigger once in registration
    /// order.
    fn collect_events(&mut self, state: &LoopState) -> EventSet<K> {
        let mut events = EventSet::new();

        if state.epoch_end {
            events.insert(Event::EpochEnd);
        }
        if state.training_end {
            events.insert(Event::TrainingEnd);
        }

        let mut fired = 0;
        for (key, trigger) in self.triggers.iter_mut() {
            if trigger.should_trigger(state) {
                events.insert(Event::Custom(key.clone()));
                fired += 1;
            }
        }

        if fired > 0 {
            debug!(global_step = state.global_step, fired = fired; "user events fired");
        }
        self.metrics.add_user_events(fired);

        events
    }
}

impl<S: BatchSource, K> Loop<S, K> {
    /// The state of the last yielded batch.
    pub fn state(&self) -> Option<LoopState> {
        self.state
    }

    pub fn metrics(&self) -> &LoopMetrics {
        &self.metrics
    }

    /// Whether the loop reached its terminal state (training end or error).
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// The kind of driver walking the source.
    pub fn driver_kind(&self) -> &'static str {
        self.driver.kind()
    }

    fn summary(&self) -> LoopSummary {
        let reason = match self.outcome {
            _ if thread::panicking() => CloseReason::Panicked,
            Some(reason) => reason,
            None => CloseReason::Abandoned,
        };

        LoopSummary {
            reason,
            metrics: self.metrics.clone(),
            last_state: self.state,
        }
    }
}

impl<S, K> Iterator for Loop<S, K>
where
    S: BatchSource,
    K: Eq + Hash + Clone,
{
    type Item = Result<(S::Batch, EventSet<K>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.outcome.is_some() {
            return None;
        }

        let (batch, state) = match self.driver.next()? {
            Ok(step) => step,
            Err(e) => {
                self.outcome = Some(CloseReason::Failed);
                return Some(Err(e));
            }
        };

        let events = self.collect_events(&state);

        self.metrics.bump_step();
        if state.epoch_end {
            self.metrics.bump_epoch();
            debug!(epoch = state.epoch, global_step = state.global_step; "epoch end");
        }
        if state.training_end {
            self.outcome = Some(CloseReason::Completed);
            info!(
                epoch = state.epoch,
                global_step = state.global_step;
                "training end"
            );
        }
        self.state = Some(state);

        Some(Ok((batch, events)))
    }
}

impl<S: BatchSource, K> Drop for Loop<S, K> {
    fn drop(&mut self) {
        let summary = self.summary();
        let steps = summary.metrics.steps;

        match summary.reason {
            CloseReason::Completed => debug!(steps = steps; "loop closed"),
            CloseReason::Failed => warn!(steps = steps; "loop closed after an error"),
            CloseReason::Abandoned => info!(steps = steps; "loop closed before training end"),
            CloseReason::Panicked => warn!(steps = steps; "loop dropped while panicking"),
        }

        if let Some(hook) = self.on_close.take() {
            hook(&summary);
        }
    }
}
