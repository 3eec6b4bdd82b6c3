use std::{hash::Hash, num::NonZeroUsize};

use log::info;

use crate::{
    clock::{self, SharedClock},
    config::{positive_secs, LoopConfig, NoLenStrategy, Stopping, StoppingConfig},
    driver::Driver,
    error::{LoopErr, Result},
    metrics::{CloseHook, LoopSummary},
    source::BatchSource,
    train_loop::Loop,
    trigger::Trigger,
};

/// Collects a loop's source, stopping conditions and events. Nothing is validated
/// until `build`.
pub struct LoopBuilder<S, K> {
    source: S,
    len: Option<usize>,
    max_epochs: Option<usize>,
    max_steps: Option<usize>,
    max_seconds: Option<f64>,
    strategy: NoLenStrategy,
    triggers: Vec<(K, Trigger)>,
    clock: Option<SharedClock>,
    on_close: Option<CloseHook>,
}

impl<S, K> LoopBuilder<S, K>
where
    S: BatchSource,
    K: Eq + Hash + Clone,
{
    pub fn new(source: S) -> Self {
        Self {
            source,
            len: None,
            max_epochs: None,
            max_steps: None,
            max_seconds: None,
            strategy: NoLenStrategy::default(),
            triggers: Vec::new(),
            clock: None,
            on_close: None,
        }
    }

    /// Number of batches per epoch. Takes precedence over the source's own length.
    pub fn len(mut self, len: usize) -> Self {
        self.len = Some(len);
        self
    }

    pub fn max_epochs(mut self, n: usize) -> Self {
        self.max_epochs = Some(n);
        self
    }

    pub fn max_steps(mut self, n: usize) -> Self {
        self.max_steps = Some(n);
        self
    }

    /// Wall-clock budget, measured from the first pull.
    pub fn max_seconds(mut self, secs: f64) -> Self {
        self.max_seconds = Some(secs);
        self
    }

    /// Strategy used when no length is known.
    pub fn strategy(mut self, strategy: NoLenStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Registers `trigger` under `key`, replacing any trigger already there.
    ///
    /// Triggers are evaluated in registration order; a replaced trigger keeps its slot.
    pub fn event(mut self, key: K, trigger: Trigger) -> Self {
        match self.triggers.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = trigger,
            None => self.triggers.push((key, trigger)),
        }
        self
    }

    pub fn events<I>(self, events: I) -> Self
    where
        I: IntoIterator<Item = (K, Trigger)>,
    {
        events
            .into_iter()
            .fold(self, |builder, (key, trigger)| builder.event(key, trigger))
    }

    /// Clock measuring `max_seconds`. Triggers carry their own clock.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Runs `hook` once when the loop is dropped, however that happens.
    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&LoopSummary) + 'static,
    {
        self.on_close = Some(Box::new(hook));
        self
    }

    /// Validates the configuration and picks a driver.
    ///
    /// A known length (given explicitly, or reported by the source) selects the
    /// known-length driver, otherwise the configured no-length strategy is used.
    ///
    /// # Errors
    /// * `LoopErr::InvalidBound` for zero epochs/steps or non-positive seconds.
    /// * `LoopErr::ConflictingBounds` / `LoopErr::NoStoppingCondition`.
    /// * `LoopErr::InvalidLength` for a zero length.
    pub fn build(self) -> Result<Loop<S, K>> {
        let stopping = StoppingConfig {
            max_epochs: nonzero("max_epochs", self.max_epochs)?,
            max_steps: nonzero("max_steps", self.max_steps)?,
            max_seconds: self
                .max_seconds
                .map(|s| {
                    positive_secs(s).map_err(|detail| LoopErr::InvalidBound {
                        what: "max_seconds",
                        detail,
                    })
                })
                .transpose()?,
        };

        let clock = self.clock.unwrap_or_else(clock::system);
        let stopping = Stopping::new(&stopping, clock)?;

        let len = self.len.or_else(|| self.source.len_hint());
        let driver = Driver::select(self.source, len, self.strategy, stopping)?;

        info!(
            driver = driver.kind(),
            events = self.triggers.len();
            "loop configured"
        );

        Ok(Loop::new(driver, self.triggers, self.on_close))
    }
}

impl<S: BatchSource> LoopBuilder<S, String> {
    /// Creates a builder from a declarative config, keying events by name.
    ///
    /// # Args
    /// * `source` - The batch source.
    /// * `config` - Parsed loop config.
    /// * `clock` - Clock for the time budget and the time-based triggers.
    ///
    /// # Errors
    /// Returns the first invalid setting found in `config`.
    pub fn from_config(
        source: S,
        config: &LoopConfig,
        clock: Option<SharedClock>,
    ) -> Result<Self> {
        let stopping = config.stopping()?;
        let strategy = config.strategy()?;
        let triggers = config.triggers(clock.as_ref())?;

        let mut builder = Self::new(source).strategy(strategy).events(triggers);

        builder.max_epochs = stopping.max_epochs.map(NonZeroUsize::get);
        builder.max_steps = stopping.max_steps.map(NonZeroUsize::get);
        builder.max_seconds = config.max_seconds;
        builder.len = config.dataloader_len;
        builder.clock = clock;

        Ok(builder)
    }
}

fn nonzero(what: &'static str, n: Option<usize>) -> Result<Option<NonZeroUsize>> {
    n.map(|n| {
        NonZeroUsize::new(n).ok_or_else(|| LoopErr::InvalidBound {
            what,
            detail: "must be greater than 0".into(),
        })
    })
    .transpose()
}
