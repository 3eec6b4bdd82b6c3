use log::warn;

use super::{Progress, Step};
use crate::{
    clock::{self, SharedClock},
    config::{Stopping, StoppingConfig},
    error::{LoopErr, Result},
    source::BatchSource,
};

/// Walks a source of unknown length by reading one batch ahead.
///
/// A batch is only yielded once the next one has been read, so when the look-ahead read
/// fails the held batch is known to be the last of its epoch.
pub struct Pairwise<S: BatchSource> {
    source: S,
    iter: Option<S::Iter>,
    held: Option<S::Batch>,
    progress: Progress,
}

impl<S: BatchSource> Pairwise<S> {
    /// Creates a driver measuring time with the system clock.
    ///
    /// # Args
    /// * `source` - The batch source; its length is never queried.
    /// * `stopping` - Exactly one of `max_epochs`/`max_steps`, optionally `max_seconds`.
    ///
    /// # Errors
    /// Returns a configuration error if the bounds are invalid.
    pub fn new(source: S, stopping: &StoppingConfig) -> Result<Self> {
        let stopping = Stopping::new(stopping, clock::system())?;
        Ok(Self::from_stopping(source, stopping))
    }

    pub(crate) fn from_stopping(source: S, stopping: Stopping) -> Self {
        Self {
            source,
            iter: None,
            held: None,
            progress: Progress::new(stopping),
        }
    }

    /// Replaces the clock used for `max_seconds`.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.progress.set_clock(clock);
        self
    }

    /// Starts a traversal and reads its first batch.
    fn begin_epoch(&mut self) -> Result<S::Batch> {
        let mut iter = self.source.batches();
        match iter.next() {
            Some(batch) => {
                self.iter = Some(iter);
                Ok(batch)
            }
            None => {
                let epoch = self.progress.counters.epoch;
                warn!(epoch = epoch; "dataloader produced an empty epoch");
                Err(LoopErr::EmptyEpoch { epoch })
            }
        }
    }
}

impl<S: BatchSource> Iterator for Pairwise<S> {
    type Item = Step<S::Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.progress.finished {
            return None;
        }
        self.progress.start();

        // Nothing held means a new epoch starts here.
        let batch = match self.held.take() {
            Some(batch) => batch,
            None => match self.begin_epoch() {
                Ok(batch) => batch,
                Err(e) => {
                    self.progress.finished = true;
                    return Some(Err(e));
                }
            },
        };

        self.held = self.iter.as_mut().and_then(Iterator::next);
        let epoch_end = self.held.is_none();

        let training_end = self.progress.max_steps_reached()
            || self.progress.max_seconds_reached()
            || (epoch_end && self.progress.is_last_epoch());

        let state = self.progress.step(epoch_end, training_end);
        if epoch_end || training_end {
            self.iter = None;
            self.held = None;
        }

        Some(Ok((batch, state)))
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;
    use crate::{source::from_fn, state::LoopState};

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn run<S: BatchSource>(driver: Pairwise<S>) -> Vec<(S::Batch, LoopState)> {
        driver.map(|step| step.unwrap()).collect()
    }

    #[test]
    fn max_epochs_detects_epoch_end_without_len() {
        let d = Pairwise::new(from_fn(|| 0..4), &StoppingConfig::epochs(nz(2))).unwrap();
        let items = run(d);

        assert_eq!(items.len(), 8);
        let ends: Vec<_> = items
            .iter()
            .map(|(_, s)| (s.epoch_end, s.training_end))
            .collect();
        assert_eq!(
            ends,
            vec![
                (false, false),
                (false, false),
                (false, false),
                (true, false),
                (false, false),
                (false, false),
                (false, false),
                (true, true),
            ]
        );

        let (b, s) = items[4];
        assert_eq!(b, 0);
        assert_eq!((s.epoch, s.global_step, s.epoch_step), (1, 4, 0));
    }

    #[test]
    fn max_steps_stops_mid_epoch() {
        let d = Pairwise::new(from_fn(|| 0..4), &StoppingConfig::steps(nz(6))).unwrap();
        let items = run(d);

        assert_eq!(items.len(), 6);
        assert_eq!(
            items[5],
            (
                1,
                LoopState {
                    epoch: 1,
                    global_step: 5,
                    epoch_step: 1,
                    epoch_end: false,
                    training_end: true,
                }
            )
        );
    }

    #[test]
    fn max_steps_on_epoch_boundary_sets_both_flags() {
        let d = Pairwise::new(from_fn(|| 0..4), &StoppingConfig::steps(nz(8))).unwrap();
        let items = run(d);

        assert_eq!(items.len(), 8);
        assert!(items[7].1.epoch_end && items[7].1.training_end);
    }

    #[test]
    fn single_batch_epochs() {
        let d = Pairwise::new(from_fn(|| ["only"]), &StoppingConfig::epochs(nz(3))).unwrap();
        let items = run(d);

        assert_eq!(items.len(), 3);
        for (i, (b, s)) in items.iter().enumerate() {
            assert_eq!(*b, "only");
            assert_eq!((s.epoch, s.global_step, s.epoch_step), (i, i, 0));
            assert!(s.epoch_end);
            assert_eq!(s.training_end, i == 2);
        }
    }

    #[test]
    fn empty_epoch_is_an_error() {
        let mut d = Pairwise::new(from_fn(|| 0..0), &StoppingConfig::epochs(nz(1))).unwrap();

        assert!(matches!(d.next(), Some(Err(LoopErr::EmptyEpoch { epoch: 0 }))));
        assert!(d.next().is_none());
    }

    #[test]
    fn empty_later_epoch_is_reported_with_its_index() {
        let mut epoch = 0;
        let src = from_fn(move || {
            epoch += 1;
            if epoch == 1 { 0..2 } else { 0..0 }
        });
        let mut d = Pairwise::new(src, &StoppingConfig::steps(nz(10))).unwrap();

        assert!(d.next().unwrap().is_ok());
        assert!(d.next().unwrap().unwrap().1.epoch_end);
        assert!(matches!(d.next(), Some(Err(LoopErr::EmptyEpoch { epoch: 1 }))));
    }

    #[test]
    fn batches_need_not_be_clone() {
        struct Opaque(usize);

        let src = from_fn(|| (0..3).map(Opaque));
        let d = Pairwise::new(src, &StoppingConfig::epochs(nz(1))).unwrap();
        let seen: Vec<_> = d.map(|step| step.unwrap().0 .0).collect();
        assert_eq!(seen, vec![0, 1, 2]);
    }
}
