use std::{
    collections::BTreeMap, fmt, fs, num::NonZeroUsize, path::Path, str::FromStr, time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    clock::SharedClock,
    error::{LoopErr, Result},
    trigger::Trigger,
};

/// The primary bound of a run, after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Epochs(NonZeroUsize),
    Steps(NonZeroUsize),
    /// Only a time budget was given; epochs continue until it runs out.
    Unbounded,
}

impl Bound {
    /// Whether the batch at `global_step` is the last one allowed by a step bound.
    #[inline]
    pub fn max_steps_reached(&self, global_step: usize) -> bool {
        matches!(self, Bound::Steps(n) if global_step == n.get() - 1)
    }

    /// Whether `epoch` is the last one allowed by an epoch bound.
    #[inline]
    pub fn is_last_epoch(&self, epoch: usize) -> bool {
        matches!(self, Bound::Epochs(n) if epoch == n.get() - 1)
    }
}

/// Stopping conditions of a run: one of `max_epochs`/`max_steps`, combinable with a
/// `max_seconds` wall-clock ceiling.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct StoppingConfig {
    pub max_epochs: Option<NonZeroUsize>,
    pub max_steps: Option<NonZeroUsize>,
    pub max_seconds: Option<Duration>,
}

impl StoppingConfig {
    pub fn epochs(n: NonZeroUsize) -> Self {
        Self {
            max_epochs: Some(n),
            ..Self::default()
        }
    }

    pub fn steps(n: NonZeroUsize) -> Self {
        Self {
            max_steps: Some(n),
            ..Self::default()
        }
    }

    pub fn with_max_seconds(mut self, max_seconds: Duration) -> Self {
        self.max_seconds = Some(max_seconds);
        self
    }

    /// Resolves the primary bound.
    ///
    /// # Errors
    /// * `LoopErr::ConflictingBounds` if both `max_epochs` and `max_steps` are set.
    /// * `LoopErr::NoStoppingCondition` if nothing is set.
    /// * `LoopErr::InvalidBound` if `max_seconds` is zero.
    pub fn bound(&self) -> Result<Bound> {
        if self.max_seconds.is_some_and(|s| s.is_zero()) {
            return Err(LoopErr::InvalidBound {
                what: "max_seconds",
                detail: "must be greater than 0".into(),
            });
        }

        match (self.max_epochs, self.max_steps, self.max_seconds) {
            (Some(max_epochs), Some(max_steps), _) => Err(LoopErr::ConflictingBounds {
                max_epochs: max_epochs.get(),
                max_steps: max_steps.get(),
            }),
            (Some(epochs), None, _) => Ok(Bound::Epochs(epochs)),
            (None, Some(steps), _) => Ok(Bound::Steps(steps)),
            (None, None, Some(_)) => Ok(Bound::Unbounded),
            (None, None, None) => Err(LoopErr::NoStoppingCondition),
        }
    }
}

/// Validated stopping conditions plus the clock used to measure the time budget.
#[derive(Clone)]
pub(crate) struct Stopping {
    pub bound: Bound,
    pub max_seconds: Option<Duration>,
    pub clock: SharedClock,
}

impl Stopping {
    pub fn new(config: &StoppingConfig, clock: SharedClock) -> Result<Self> {
        Ok(Self {
            bound: config.bound()?,
            max_seconds: config.max_seconds,
            clock,
        })
    }
}

/// How to detect epoch ends when the source length is unknown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum NoLenStrategy {
    /// Read one batch ahead; the epoch ends when the look-ahead read fails.
    #[default]
    Pairwise,
}

impl NoLenStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            NoLenStrategy::Pairwise => "pairwise",
        }
    }
}

impl FromStr for NoLenStrategy {
    type Err = LoopErr;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pairwise" => Ok(NoLenStrategy::Pairwise),
            other => Err(LoopErr::UnknownStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for NoLenStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declarative trigger, as found in a loop config file.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerSpec {
    #[serde(default)]
    pub every_n_steps: Option<usize>,
    #[serde(default)]
    pub at_step: Option<usize>,
    #[serde(default)]
    pub every_n_seconds: Option<f64>,
    #[serde(default)]
    pub at_time: Option<f64>,
}

impl TriggerSpec {
    /// Builds the described trigger.
    ///
    /// # Errors
    /// Returns `LoopErr::InvalidTrigger` on out of range values.
    pub fn build(&self, clock: Option<SharedClock>) -> Result<Trigger> {
        let mut builder = Trigger::builder();
        if let Some(n) = self.every_n_steps {
            builder = builder.every_n_steps(n);
        }
        if let Some(step) = self.at_step {
            builder = builder.at_step(step);
        }
        if let Some(secs) = self.every_n_seconds {
            builder = builder.every_n_seconds(secs);
        }
        if let Some(secs) = self.at_time {
            builder = builder.at_time(secs);
        }
        if let Some(clock) = clock {
            builder = builder.clock(clock);
        }
        builder.build()
    }
}

/// A loop configuration as read from JSON.
///
/// ```json
/// {
///   "max_epochs": 2,
///   "max_seconds": 3600.0,
///   "dataloader_len": 128,
///   "events": { "log": { "every_n_steps": 16 } }
/// }
/// ```
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoopConfig {
    #[serde(default)]
    pub max_epochs: Option<NonZeroUsize>,
    #[serde(default)]
    pub max_steps: Option<NonZeroUsize>,
    #[serde(default)]
    pub max_seconds: Option<f64>,
    #[serde(default)]
    pub dataloader_len: Option<usize>,
    /// Name of a `NoLenStrategy`, `pairwise` if absent.
    #[serde(default)]
    pub no_len_strategy: Option<String>,
    /// Triggers by event name; evaluated in name order.
    #[serde(default)]
    pub events: BTreeMap<String, TriggerSpec>,
}

impl LoopConfig {
    /// Parses a loop config from a JSON string.
    ///
    /// # Errors
    /// * `LoopErr::Json` on malformed JSON, unknown fields or zero epochs/steps.
    /// * `LoopErr::UnknownStrategy` for an unrecognized `no_len_strategy`.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.strategy()?;
        Ok(config)
    }

    /// Reads and parses a loop config file.
    ///
    /// # Errors
    /// Returns `LoopErr::Io` if the file can't be read, otherwise as `from_json_str`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// The stopping conditions described by this config, validated.
    ///
    /// # Errors
    /// Returns `LoopErr::InvalidBound` if `max_seconds` isn't a finite positive number,
    /// or any error of `StoppingConfig::bound`.
    pub fn stopping(&self) -> Result<StoppingConfig> {
        let max_seconds = self
            .max_seconds
            .map(|s| {
                positive_secs(s).map_err(|detail| LoopErr::InvalidBound {
                    what: "max_seconds",
                    detail,
                })
            })
            .transpose()?;

        let stopping = StoppingConfig {
            max_epochs: self.max_epochs,
            max_steps: self.max_steps,
            max_seconds,
        };
        stopping.bound()?;
        Ok(stopping)
    }

    /// The configured no-length strategy.
    ///
    /// # Errors
    /// Returns `LoopErr::UnknownStrategy` if the name isn't recognized.
    pub fn strategy(&self) -> Result<NoLenStrategy> {
        self.no_len_strategy
            .as_deref()
            .map_or(Ok(NoLenStrategy::default()), str::parse)
    }

    /// Builds every configured trigger, in event name order.
    ///
    /// # Errors
    /// Returns the first `LoopErr::InvalidTrigger` found.
    pub fn triggers(&self, clock: Option<&SharedClock>) -> Result<Vec<(String, Trigger)>> {
        self.events
            .iter()
            .map(|(name, spec)| Ok((name.clone(), spec.build(clock.cloned())?)))
            .collect()
    }
}

/// Converts a number of seconds into a `Duration`, rejecting non-finite and
/// non-positive values.
pub(crate) fn positive_secs(secs: f64) -> std::result::Result<Duration, String> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("{secs} is not a positive number of seconds"));
    }

    Duration::try_from_secs_f64(secs).map_err(|e| format!("{secs}: {e}"))
}
