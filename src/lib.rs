//! Controlled iteration over training batches.
//!
//! A [`Loop`] walks a [`BatchSource`] epoch after epoch until a stopping condition is
//! met (max epochs, max steps, and/or a wall-clock budget) and annotates every batch with
//! the [`Event`]s it fires: the built-in epoch end and training end, plus any
//! user-registered [`Trigger`].
//!
//! ```
//! use std::num::NonZeroUsize;
//! use train_loop::{Event, Loop, Trigger};
//!
//! #[derive(Debug, Clone, PartialEq, Eq, Hash)]
//! enum Ev {
//!     Accumulate,
//! }
//!
//! let every_4 = Trigger::every_n_steps(NonZeroUsize::new(4).unwrap());
//! let train = Loop::builder((0..128).collect::<Vec<_>>())
//!     .max_epochs(2)
//!     .event(Ev::Accumulate, every_4)
//!     .build()?;
//!
//! let mut accumulated = 0;
//! for item in train {
//!     let (_batch, events) = item?;
//!     if events.contains(&Event::Custom(Ev::Accumulate)) {
//!         accumulated += 1;
//!     }
//! }
//! assert_eq!(accumulated, 64);
//! # Ok::<(), train_loop::LoopErr>(())
//! ```

pub mod builder;
pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod metrics;
pub mod source;
pub mod state;
pub mod train_loop;
pub mod trigger;

pub use builder::LoopBuilder;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{Bound, LoopConfig, NoLenStrategy, StoppingConfig, TriggerSpec};
pub use driver::{KnownLen, Pairwise};
pub use error::{LoopErr, Result};
pub use events::{Event, EventSet};
pub use metrics::{CloseReason, LoopMetrics, LoopSummary};
pub use source::{from_fn, BatchSource, FromFn};
pub use state::LoopState;
pub use train_loop::Loop;
pub use trigger::{Trigger, TriggerBuilder};
