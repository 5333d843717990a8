mod algorithm;
pub(crate) mod hyperparams;

pub use hyperparams::{ReluNetParams, ReluNetValidParams};

use crate::accumulator::AdaptiveState;
use ndarray::Array2;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use trickle::Float;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// One fully-connected weight block, stored as its adaptive accumulators in
/// row-major `[input * fan_out + output]` order, so the weights of one
/// input line are contiguous. Weights are materialized from the
/// accumulators on every touch.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug)]
pub(crate) struct DenseLayer<F> {
    pub(crate) state: AdaptiveState<F>,
    pub(crate) fan_in: usize,
    pub(crate) fan_out: usize,
}

impl<F: Float> DenseLayer<F> {
    fn seeded(fan_in: usize, fan_out: usize, scale: F, rng: &mut Xoshiro256Plus) -> Self {
        Self {
            state: AdaptiveState::with_random_z(fan_in * fan_out, scale, rng),
            fan_in,
            fan_out,
        }
    }
}

/// Shallow rectified-linear network classifier trained with the
/// FTRL-Proximal discipline.
///
/// The hashed sparse input feeds one or two dense hidden layers through a
/// sparse-times-dense product, each followed by a ReLU and, during fit, an
/// inverted dropout mask; a linear output unit and a sigmoid produce the
/// probability. Every weight of every layer is updated through the same
/// per-coordinate adaptive accumulator as the linear model.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct ReluNet<F: Float> {
    pub(crate) params: ReluNetValidParams<F>,
    /// Input block plus hidden blocks plus the single-output block.
    pub(crate) layers: Vec<DenseLayer<F>>,
}

impl<F: Float> ReluNet<F> {
    /// Create default hyperparameters
    pub fn params() -> ReluNetParams<F> {
        ReluNetParams::new()
    }

    /// Create a new model with given parameters and hash width.
    ///
    /// All accumulators are seeded with small uniform random values from
    /// the configured seed; identical hidden units would otherwise receive
    /// identical gradients forever.
    pub fn new(params: ReluNetValidParams<F>, nfeatures: usize) -> ReluNet<F> {
        let mut rng = Xoshiro256Plus::seed_from_u64(params.seed);
        let scale = params.init_scale;

        let mut widths = Vec::with_capacity(params.hidden_layers.len() + 2);
        widths.push(nfeatures);
        widths.extend_from_slice(&params.hidden_layers);
        widths.push(1);

        let layers = widths
            .windows(2)
            .map(|pair| DenseLayer::seeded(pair[0], pair[1], scale, &mut rng))
            .collect();

        Self { params, layers }
    }

    /// Hash width the model is sized for
    pub fn nfeatures(&self) -> usize {
        self.layers[0].fan_in
    }

    /// Number of weight blocks, hidden plus output
    pub fn nlayers(&self) -> usize {
        self.layers.len()
    }

    /// Get the hyperparameters
    pub fn get_params(&self) -> &ReluNetValidParams<F> {
        &self.params
    }

    /// Materialize the weights of one block as a `(fan_in, fan_out)`
    /// matrix; block `0` is input-to-hidden, the last block is
    /// hidden-to-output.
    pub fn layer_weights(&self, layer: usize) -> Array2<F> {
        let p = &self.params;
        let block = &self.layers[layer];
        Array2::from_shape_fn((block.fan_in, block.fan_out), |(i, j)| {
            block.state.weight_at(
                i * block.fan_out + j,
                p.alpha,
                p.beta,
                p.l1_penalty,
                p.l2_penalty,
            )
        })
    }
}
