use std::{env, num::NonZeroUsize, path::PathBuf};

use anyhow::Context;
use backprop::{
    arch::{Sequential, activations::ActFn, loss::CostFn},
    dataset::{TrainingExample, shuffle_examples},
    training::HyperParameters,
};
use log::{info, warn};
use rand::{SeedableRng, rngs::StdRng};

const DEFAULT_WEIGHTS: &str = "xor.weights";
const BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(4).unwrap();
const EPOCHS: usize = 2_000;
const SEED: u64 = 7;

/// Trains a small network on the xor gate.
///
/// Usage: `backprop [hyper_parameters.json] [weights_path]`. Previously saved weights are
/// resumed from if they fit the network.
fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let params = match args.next() {
        Some(path) => HyperParameters::from_json_file(&path)
            .with_context(|| format!("failed to load hyper parameters from {path}"))?,
        None => HyperParameters {
            learn_rate: 0.1,
            batch_size: BATCH_SIZE,
            report_every: NonZeroUsize::new(2_000),
            ..Default::default()
        },
    };
    let weights = args
        .next()
        .map_or_else(|| PathBuf::from(DEFAULT_WEIGHTS), PathBuf::from);

    let mut rng = StdRng::seed_from_u64(SEED);
    let mut net = Sequential::with_hyper_parameters(2, CostFn::Mse, &params)?;
    net.add_layers(ActFn::TanH, &[4], &mut rng);
    net.add_layers(ActFn::Linear, &[1], &mut rng);

    if weights.exists() {
        match net.load_weights(&weights) {
            Ok(()) => info!("resuming from {}", weights.display()),
            Err(e) => warn!("starting from scratch: {e}"),
        }
    }

    let mut data: Vec<_> = [([0., 0.], 0.), ([0., 1.], 1.), ([1., 0.], 1.), ([1., 1.], 0.)]
        .into_iter()
        .map(|(x, y)| TrainingExample::new(x.to_vec(), vec![y]))
        .collect();

    for epoch in 0..EPOCHS {
        let learn_rate = params.learn_rate_at(epoch);
        let cost = net.train_dataset(&data, params.batch_size, learn_rate)?;
        shuffle_examples(&mut data, &mut rng);

        if epoch % 500 == 0 {
            info!(epoch = epoch, cost = cost, learn_rate = learn_rate; "epoch done");
        }
    }

    for example in &data {
        let output = net.predict(&example.input)?;
        info!(
            "{:?} -> {:.3} (expected {})",
            example.input, output[0], example.expected[0]
        );
    }

    net.save_weights(&weights)
        .with_context(|| format!("failed to save weights to {}", weights.display()))?;

    Ok(())
}
