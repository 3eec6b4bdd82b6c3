use std::{
    fmt,
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use crate::{
    clock::{self, SharedClock},
    config::positive_secs,
    error::{LoopErr, Result},
    state::LoopState,
};

/// Custom trigger predicate.
pub type Predicate = Box<dyn FnMut(&LoopState) -> bool>;

/// Fires every `interval`, measured from the previous firing.
#[derive(Debug, Clone, Copy)]
struct Recurring {
    interval: Duration,
    last: Instant,
}

/// Fires once, the first time `after` has elapsed since creation.
#[derive(Debug, Clone, Copy)]
struct Once {
    after: Duration,
    created: Instant,
    fired: bool,
}

/// A condition deciding whether a named event fires for a given `LoopState`.
///
/// Every configured sub-condition is OR'd. Time-based sub-conditions keep memory of
/// when they last fired, so a trigger must be evaluated at most once per batch.
pub struct Trigger {
    every_n_steps: Option<NonZeroUsize>,
    at_step: Option<usize>,
    every: Option<Recurring>,
    at_time: Option<Once>,
    predicate: Option<Predicate>,
    clock: SharedClock,
}

impl Trigger {
    /// Returns a `TriggerBuilder` with nothing configured.
    pub fn builder() -> TriggerBuilder {
        TriggerBuilder::default()
    }

    /// A trigger that never fires.
    pub fn never() -> Self {
        Self::builder().assemble()
    }

    /// Fires when `(global_step + 1) % n == 0`.
    pub fn every_n_steps(n: NonZeroUsize) -> Self {
        let mut builder = Self::builder();
        builder.every_n_steps = Some(n.get());
        builder.assemble()
    }

    /// Fires when `global_step == step`.
    pub fn at_step(step: usize) -> Self {
        Self::builder().at_step(step).assemble()
    }

    /// Fires whenever `predicate` returns true.
    pub fn when<F>(predicate: F) -> Self
    where
        F: FnMut(&LoopState) -> bool + 'static,
    {
        Self::builder().predicate(predicate).assemble()
    }

    /// Evaluates the trigger against `state`, reading the clock once.
    ///
    /// # Args
    /// * `state` - The state of the batch about to be yielded.
    ///
    /// # Returns
    /// Whether any sub-condition fired.
    pub fn should_trigger(&mut self, state: &LoopState) -> bool {
        let now = self.clock.now();
        self.should_trigger_at(state, now)
    }

    /// Evaluates the trigger against `state` as of `now`.
    ///
    /// All sub-conditions are evaluated, so time-based ones update their memory even
    /// when a step-based one already fired.
    pub fn should_trigger_at(&mut self, state: &LoopState, now: Instant) -> bool {
        let mut fired = false;

        if let Some(n) = self.every_n_steps {
            fired |= (state.global_step + 1) % n.get() == 0;
        }

        if let Some(step) = self.at_step {
            fired |= state.global_step == step;
        }

        if let Some(every) = &mut self.every {
            if now.saturating_duration_since(every.last) >= every.interval {
                every.last = now;
                fired = true;
            }
        }

        if let Some(once) = &mut self.at_time {
            if !once.fired && now.saturating_duration_since(once.created) >= once.after {
                once.fired = true;
                fired = true;
            }
        }

        if let Some(predicate) = &mut self.predicate {
            fired |= predicate(state);
        }

        fired
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("every_n_steps", &self.every_n_steps)
            .field("at_step", &self.at_step)
            .field("every", &self.every.map(|r| r.interval))
            .field("at_time", &self.at_time.map(|o| o.after))
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Builder for a `Trigger` combining any number of sub-conditions.
#[derive(Default)]
pub struct TriggerBuilder {
    every_n_steps: Option<usize>,
    at_step: Option<usize>,
    every_n_seconds: Option<f64>,
    at_time: Option<f64>,
    predicate: Option<Predicate>,
    clock: Option<SharedClock>,
}

impl TriggerBuilder {
    pub fn every_n_steps(mut self, n: usize) -> Self {
        self.every_n_steps = Some(n);
        self
    }

    pub fn at_step(mut self, step: usize) -> Self {
        self.at_step = Some(step);
        self
    }

    /// Fires every `secs` seconds, measured from the previous firing (or from `build`).
    pub fn every_n_seconds(mut self, secs: f64) -> Self {
        self.every_n_seconds = Some(secs);
        self
    }

    /// Fires once, the first time `secs` seconds have elapsed since `build`.
    pub fn at_time(mut self, secs: f64) -> Self {
        self.at_time = Some(secs);
        self
    }

    pub fn predicate<F>(mut self, predicate: F) -> Self
    where
        F: FnMut(&LoopState) -> bool + 'static,
    {
        self.predicate = Some(Box::new(predicate));
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the trigger. Time-based conditions start counting now.
    ///
    /// # Errors
    /// Returns `LoopErr::InvalidTrigger` if `every_n_steps` is zero or a number of
    /// seconds is not a finite positive value.
    pub fn build(self) -> Result<Trigger> {
        let every_n_steps = match self.every_n_steps {
            Some(n) => Some(NonZeroUsize::new(n).ok_or_else(|| LoopErr::InvalidTrigger {
                what: "every_n_steps",
                detail: "must be greater than 0".into(),
            })?),
            None => None,
        };

        let every = self
            .every_n_seconds
            .map(|s| trigger_secs("every_n_seconds", s))
            .transpose()?;
        let at_time = self
            .at_time
            .map(|s| trigger_secs("at_time", s))
            .transpose()?;

        let clock = self.clock.unwrap_or_else(clock::system);
        let now = clock.now();

        Ok(Trigger {
            every_n_steps,
            at_step: self.at_step,
            every: every.map(|interval| Recurring { interval, last: now }),
            at_time: at_time.map(|after| Once {
                after,
                created: now,
                fired: false,
            }),
            predicate: self.predicate,
            clock,
        })
    }

    /// Builds a trigger whose configuration can't be invalid.
    fn assemble(self) -> Trigger {
        debug_assert!(self.every_n_seconds.is_none() && self.at_time.is_none());
        let clock = self.clock.unwrap_or_else(clock::system);

        Trigger {
            every_n_steps: self.every_n_steps.and_then(NonZeroUsize::new),
            at_step: self.at_step,
            every: None,
            at_time: None,
            predicate: self.predicate,
            clock,
        }
    }
}

fn trigger_secs(what: &'static str, secs: f64) -> Result<Duration> {
    positive_secs(secs).map_err(|detail| LoopErr::InvalidTrigger { what, detail })
}
