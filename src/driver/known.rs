use log::warn;

use super::{Progress, Step};
use crate::{
    clock::{self, SharedClock},
    config::{Bound, Stopping, StoppingConfig},
    error::{LoopErr, Result},
    source::BatchSource,
};

/// Walks a source whose number of batches per epoch is known up front.
pub struct KnownLen<S: BatchSource> {
    source: S,
    len: usize,
    epochs: Option<usize>,
    iter: Option<S::Iter>,
    // The last batch of the epoch was yielded; the traversal must be exhausted.
    epoch_done: bool,
    progress: Progress,
}

impl<S: BatchSource> KnownLen<S> {
    /// Creates a driver measuring time with the system clock.
    ///
    /// # Args
    /// * `source` - The batch source.
    /// * `len` - Batches per traversal of `source`.
    /// * `stopping` - Exactly one of `max_epochs`/`max_steps`, optionally `max_seconds`.
    ///
    /// # Errors
    /// Returns a configuration error if `len` is zero or the bounds are invalid.
    pub fn new(source: S, len: usize, stopping: &StoppingConfig) -> Result<Self> {
        let stopping = Stopping::new(stopping, clock::system())?;
        Self::from_stopping(source, len, stopping)
    }

    pub(crate) fn from_stopping(source: S, len: usize, stopping: Stopping) -> Result<Self> {
        if len == 0 {
            return Err(LoopErr::InvalidLength);
        }

        let epochs = match stopping.bound {
            Bound::Epochs(n) => Some(n.get()),
            Bound::Steps(n) => Some(n.get().div_ceil(len)),
            Bound::Unbounded => None,
        };

        Ok(Self {
            source,
            len,
            epochs,
            iter: None,
            epoch_done: false,
            progress: Progress::new(stopping),
        })
    }

    /// Replaces the clock used for `max_seconds`.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.progress.set_clock(clock);
        self
    }

    fn is_last_epoch(&self) -> bool {
        self.epochs
            .is_some_and(|n| self.progress.counters.epoch == n - 1)
    }

    fn fail(&mut self, epoch: usize, got: usize) -> Option<Step<S::Batch>> {
        warn!(epoch = epoch, expected = self.len, got = got; "dataloader length mismatch");
        self.progress.finished = true;
        self.iter = None;
        Some(Err(LoopErr::LengthMismatch {
            epoch,
            expected: self.len,
            got,
        }))
    }
}

impl<S: BatchSource> Iterator for KnownLen<S> {
    type Item = Step<S::Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.progress.finished {
            return None;
        }
        self.progress.start();

        if self.epoch_done {
            self.epoch_done = false;
            let overrun = self.iter.take().and_then(|mut it| it.next());
            if overrun.is_some() {
                let epoch = self.progress.counters.epoch - 1;
                return self.fail(epoch, self.len + 1);
            }
        }

        if self.iter.is_none() {
            if self
                .epochs
                .is_some_and(|n| self.progress.counters.epoch >= n)
            {
                self.progress.finished = true;
                return None;
            }
            self.iter = Some(self.source.batches());
        }

        let batch = match self.iter.as_mut().and_then(Iterator::next) {
            Some(batch) => batch,
            None => {
                let counters = &self.progress.counters;
                let (epoch, got) = (counters.epoch, counters.epoch_step);
                return self.fail(epoch, got);
            }
        };

        let epoch_end = self.progress.counters.epoch_step == self.len - 1;
        let training_end = self.progress.max_steps_reached()
            || self.progress.max_seconds_reached()
            || (self.is_last_epoch() && epoch_end);

        let state = self.progress.step(epoch_end, training_end);
        if training_end {
            self.iter = None;
        } else {
            self.epoch_done = epoch_end;
        }

        Some(Ok((batch, state)))
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, num::NonZeroUsize, rc::Rc};

    use super::*;
    use crate::{source::from_fn, state::LoopState};

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn states<S: BatchSource>(driver: KnownLen<S>) -> Vec<LoopState> {
        driver.map(|step| step.unwrap().1).collect()
    }

    #[test]
    fn max_epochs_marks_each_epoch_end() {
        let d = KnownLen::new(vec![0, 1, 2, 3], 4, &StoppingConfig::epochs(nz(2))).unwrap();
        let items: Vec<_> = d.map(Result::unwrap).collect();

        assert_eq!(items.len(), 8);
        let batches: Vec<_> = items.iter().map(|(b, _)| *b).collect();
        assert_eq!(batches, vec![0, 1, 2, 3, 0, 1, 2, 3]);

        let (_, s) = items[3];
        assert_eq!(
            s,
            LoopState {
                epoch: 0,
                global_step: 3,
                epoch_step: 3,
                epoch_end: true,
                training_end: false,
            }
        );

        let (_, s) = items[4];
        assert_eq!((s.epoch, s.global_step, s.epoch_step), (1, 4, 0));

        let (_, s) = items[7];
        assert!(s.epoch_end && s.training_end);
    }

    #[test]
    fn max_steps_stops_mid_epoch() {
        let d = KnownLen::new(vec![0, 1, 2, 3], 4, &StoppingConfig::steps(nz(6))).unwrap();
        let s = states(d);

        assert_eq!(s.len(), 6);
        let last = s[5];
        assert_eq!(
            last,
            LoopState {
                epoch: 1,
                global_step: 5,
                epoch_step: 1,
                epoch_end: false,
                training_end: true,
            }
        );
        assert!(s[..5].iter().all(|s| !s.training_end));
    }

    #[test]
    fn max_steps_on_epoch_boundary_sets_both_flags() {
        let d = KnownLen::new(vec![0, 1, 2, 3], 4, &StoppingConfig::steps(nz(8))).unwrap();
        let s = states(d);

        assert_eq!(s.len(), 8);
        assert!(s[7].epoch_end && s[7].training_end);
    }

    #[test]
    fn stops_reading_after_training_end() {
        let pulled = Rc::new(Cell::new(0));
        let counter = pulled.clone();
        let src = from_fn(move || {
            let counter = counter.clone();
            (0..4).inspect(move |_| counter.set(counter.get() + 1))
        });

        let mut d = KnownLen::new(src, 4, &StoppingConfig::steps(nz(2))).unwrap();
        assert!(d.next().is_some());
        assert!(d.next().unwrap().unwrap().1.training_end);
        assert!(d.next().is_none());
        assert!(d.next().is_none());
        assert_eq!(pulled.get(), 2);
    }

    #[test]
    fn rejects_zero_len_and_bad_bounds() {
        assert!(matches!(
            KnownLen::new(vec![1], 0, &StoppingConfig::epochs(nz(1))),
            Err(LoopErr::InvalidLength)
        ));
        assert!(matches!(
            KnownLen::new(vec![1], 1, &StoppingConfig::default()),
            Err(LoopErr::NoStoppingCondition)
        ));
    }

    #[test]
    fn short_source_is_a_length_mismatch() {
        let mut d = KnownLen::new(vec![0, 1, 2], 4, &StoppingConfig::epochs(nz(1))).unwrap();

        for _ in 0..3 {
            assert!(d.next().unwrap().is_ok());
        }
        assert!(matches!(
            d.next(),
            Some(Err(LoopErr::LengthMismatch {
                epoch: 0,
                expected: 4,
                got: 3
            }))
        ));
        assert!(d.next().is_none());
    }

    #[test]
    fn long_source_is_a_length_mismatch() {
        let mut d = KnownLen::new(vec![0, 1, 2, 3, 4], 4, &StoppingConfig::epochs(nz(2))).unwrap();

        let yielded: Vec<_> = d.by_ref().take(4).map(Result::unwrap).collect();
        assert!(yielded[3].1.epoch_end);

        assert!(matches!(
            d.next(),
            Some(Err(LoopErr::LengthMismatch {
                epoch: 0,
                expected: 4,
                got: 5
            }))
        ));
        assert!(d.next().is_none());
    }
}
