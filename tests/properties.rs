use std::num::NonZeroUsize;

use proptest::prelude::*;

use train_loop::{from_fn, KnownLen, LoopState, Pairwise, StoppingConfig};

fn stopping() -> impl Strategy<Value = StoppingConfig> {
    prop_oneof![
        (1usize..5).prop_map(|n| StoppingConfig::epochs(NonZeroUsize::new(n).unwrap())),
        (1usize..40).prop_map(|n| StoppingConfig::steps(NonZeroUsize::new(n).unwrap())),
    ]
}

fn known(len: usize, cfg: &StoppingConfig) -> Vec<(usize, LoopState)> {
    KnownLen::new((0..len).collect::<Vec<_>>(), len, cfg)
        .unwrap()
        .map(Result::unwrap)
        .collect()
}

fn pairwise(len: usize, cfg: &StoppingConfig) -> Vec<(usize, LoopState)> {
    Pairwise::new(from_fn(move || 0..len), cfg)
        .unwrap()
        .map(Result::unwrap)
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn both_drivers_yield_the_same_sequence(len in 1usize..9, cfg in stopping()) {
        prop_assert_eq!(known(len, &cfg), pairwise(len, &cfg));
    }

    #[test]
    fn counters_advance_one_step_at_a_time(len in 1usize..9, cfg in stopping()) {
        let items = known(len, &cfg);

        let expected = match (cfg.max_epochs, cfg.max_steps) {
            (Some(n), _) => n.get() * len,
            (_, Some(n)) => n.get(),
            _ => unreachable!(),
        };
        prop_assert_eq!(items.len(), expected);

        for (i, (batch, state)) in items.iter().enumerate() {
            prop_assert_eq!(state.global_step, i);
            prop_assert_eq!(state.epoch, i / len);
            prop_assert_eq!(state.epoch_step, i % len);
            prop_assert_eq!(*batch, i % len);
            prop_assert_eq!(state.epoch_end, i % len == len - 1);
        }

        let ends: Vec<_> = items.iter().map(|(_, s)| s.training_end).collect();
        prop_assert!(ends[..ends.len() - 1].iter().all(|end| !end));
        prop_assert!(ends[ends.len() - 1]);
    }
}
