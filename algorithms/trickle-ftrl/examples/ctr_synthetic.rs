//! Train the model family on a synthetic hashed click-through batch and
//! compare held-out log loss.

use ndarray::Array1;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use sprs::{CsMat, TriMat};
use trickle::prelude::*;
use trickle_ftrl::{FmFtrl, Ftrl, Result};

const HASH_WIDTH: usize = 1 << 12;
const FEATURES_PER_ROW: usize = 24;

/// Synthesize a hashed impression batch: every row activates a couple of
/// hash buckets, and the label follows a planted sparse weight vector.
fn synthetic_batch(nrows: usize, seed: u64) -> (CsMat<f64>, Array1<bool>) {
    let mut rng = Xoshiro256Plus::seed_from_u64(seed);
    let planted: Vec<f64> = (0..HASH_WIDTH)
        .map(|_| {
            if rng.gen::<f64>() < 0.02 {
                rng.gen_range(-2.0..2.0)
            } else {
                0.0
            }
        })
        .collect();

    let mut triplets = TriMat::new((nrows, HASH_WIDTH));
    let mut targets = Vec::with_capacity(nrows);
    for row in 0..nrows {
        let mut score = 0.0;
        for _ in 0..FEATURES_PER_ROW {
            let bucket = rng.gen_range(0..HASH_WIDTH);
            let value = rng.gen_range(0.1..1.0);
            triplets.add_triplet(row, bucket, value);
            score += planted[bucket] * value;
        }
        targets.push(score > 0.0);
    }
    (triplets.to_csr(), Array1::from(targets))
}

fn main() -> Result<()> {
    let (x_train, y_train) = synthetic_batch(8_000, 1);
    let (x_valid, y_valid) = synthetic_batch(2_000, 2);
    let train = DatasetBase::new(x_train, y_train);
    let valid_targets: Vec<bool> = y_valid.iter().copied().collect();

    let linear_params = Ftrl::<f64>::params()
        .alpha(0.05)
        .beta(1.0)
        .l1_penalty(0.1)
        .l2_penalty(1.0)
        .iterations(3)
        .num_threads(4);
    let linear = linear_params.fit_with(None, &train)?;
    let linear_loss = linear
        .try_predict(&x_valid)?
        .log_loss(&valid_targets)?;
    println!("linear  valid log loss {:.4}", linear_loss);

    let fm_params = FmFtrl::<f64>::params()
        .alpha(0.05)
        .embedding_dim(8)
        .iterations(3)
        .num_threads(4)
        .seed(17);
    let fm = fm_params.fit_with(None, &train)?;
    let fm_loss = fm.try_predict(&x_valid)?.log_loss(&valid_targets)?;
    println!("fm      valid log loss {:.4}", fm_loss);

    let nonzero = linear.weights().iter().filter(|&&w| w != 0.0).count();
    println!(
        "linear model keeps {} of {} hash buckets",
        nonzero, HASH_WIDTH
    );

    Ok(())
}
