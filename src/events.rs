use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// An event that can fire on a batch.
///
/// The built-in events are separate variants, so no user key can ever be mistaken for
/// one of them whatever its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Event<K> {
    /// The batch is the last of its epoch.
    EpochEnd,
    /// The batch is the last of the run.
    TrainingEnd,
    /// A user event registered on the loop.
    Custom(K),
}

impl<K> Event<K> {
    #[inline]
    pub fn is_builtin(&self) -> bool {
        !matches!(self, Event::Custom(_))
    }

    /// Returns the user key, if this is a user event.
    pub fn custom(&self) -> Option<&K> {
        match self {
            Event::Custom(key) => Some(key),
            _ => None,
        }
    }
}

impl<K> From<K> for Event<K> {
    fn from(key: K) -> Self {
        Event::Custom(key)
    }
}

/// The events fired by one batch.
pub type EventSet<K> = HashSet<Event<K>>;
