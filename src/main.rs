use std::{env, process};

use anyhow::Context;
use log::info;

use train_loop::{from_fn, Event, LoopBuilder, LoopConfig};

const DEFAULT_NUM_BATCHES: usize = 8;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [num_batches]", args[0]);
        process::exit(1);
    }

    let config = LoopConfig::load(&args[1])
        .with_context(|| format!("loading loop config from {}", args[1]))?;

    let num_batches = match args.get(2) {
        Some(n) => n
            .parse::<usize>()
            .with_context(|| format!("invalid number of batches: {n}"))?,
        None => DEFAULT_NUM_BATCHES,
    };

    // Synthetic batches; the length is only known if the config declares it.
    let source = from_fn(move || 0..num_batches);
    let train = LoopBuilder::from_config(source, &config, None)?.build()?;
    info!(driver = train.driver_kind(); "starting");

    for item in train {
        let (batch, events) = item?;

        let mut names: Vec<String> = events
            .iter()
            .map(|event| match event {
                Event::EpochEnd => "EPOCH_END".to_string(),
                Event::TrainingEnd => "TRAINING_END".to_string(),
                Event::Custom(name) => name.clone(),
            })
            .collect();
        names.sort();

        println!("batch {batch}: [{}]", names.join(", "));
    }

    Ok(())
}
