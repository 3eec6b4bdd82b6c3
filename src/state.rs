use serde::{Deserialize, Serialize};

/// Immutable snapshot of the loop's position, one per yielded batch.
///
/// All counters are 0-based. `training_end` is set on at most one snapshot, the final
/// one of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoopState {
    pub epoch: usize,
    pub global_step: usize,
    pub epoch_step: usize,
    pub epoch_end: bool,
    pub training_end: bool,
}

/// Mutable counters owned by a driver while it walks a source.
#[derive(Debug, Default, Clone)]
pub(crate) struct Counters {
    pub epoch: usize,
    pub global_step: usize,
    pub epoch_step: usize,
}

impl Counters {
    #[inline]
    pub fn snapshot(&self, epoch_end: bool, training_end: bool) -> LoopState {
        LoopState {
            epoch: self.epoch,
            global_step: self.global_step,
            epoch_step: self.epoch_step,
            epoch_end,
            training_end,
        }
    }

    /// Advances past a yielded batch that didn't end the run.
    #[inline]
    pub fn advance(&mut self, epoch_end: bool) {
        self.global_step += 1;
        if epoch_end {
            self.epoch += 1;
            self.epoch_step = 0;
        } else {
            self.epoch_step += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_resets_epoch_step_only_on_epoch_end() {
        let mut c = Counters::default();
        c.advance(false);
        c.advance(false);
        assert_eq!((c.epoch, c.global_step, c.epoch_step), (0, 2, 2));

        c.advance(true);
        assert_eq!((c.epoch, c.global_step, c.epoch_step), (1, 3, 0));
    }

    #[test]
    fn state_serializes_as_flat_record() {
        let state = Counters::default().snapshot(true, false);
        let json = serde_json::to_value(state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "epoch": 0,
                "global_step": 0,
                "epoch_step": 0,
                "epoch_end": true,
                "training_end": false,
            })
        );

        let back: LoopState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
