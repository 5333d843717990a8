mod algorithm;
pub(crate) mod hyperparams;
pub(crate) mod kernel;

pub use hyperparams::{FmFtrlParams, FmFtrlValidParams};
pub use kernel::LatentKernel;

use crate::accumulator::AdaptiveState;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use trickle::Float;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Factorization-machine classifier trained with the FTRL-Proximal
/// discipline.
///
/// Extends the linear model with `embedding_dim` latent lanes per hash
/// bucket; the pairwise interaction of two co-occurring features is the dot
/// product of their latent vectors, evaluated in `O(nnz · k)` through the
/// standard sum-of-squares identity. Latent accumulators receive the same
/// closed-form per-coordinate update as the linear ones, under their own
/// learning rate and penalties.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct FmFtrl<F: Float> {
    pub(crate) params: FmFtrlValidParams<F>,
    pub(crate) linear: AdaptiveState<F>,
    /// Latent accumulators, row-major `[bucket * embedding_dim + lane]`.
    pub(crate) latent: AdaptiveState<F>,
}

impl<F: Float> FmFtrl<F> {
    /// Create default hyperparameters
    pub fn params() -> FmFtrlParams<F> {
        FmFtrlParams::new()
    }

    /// Create a new model with given parameters and hash width.
    ///
    /// The linear accumulators start zeroed; the latent ones are seeded
    /// with small uniform random values from the configured seed, since an
    /// all-zero latent start has identically zero interaction gradient.
    pub fn new(params: FmFtrlValidParams<F>, nfeatures: usize) -> FmFtrl<F> {
        let mut rng = Xoshiro256Plus::seed_from_u64(params.seed);
        let latent_len = nfeatures * params.embedding_dim;
        let latent = AdaptiveState::with_random_z(latent_len, params.latent_init, &mut rng);
        Self {
            params,
            linear: AdaptiveState::zeros(nfeatures),
            latent,
        }
    }

    /// Hash width the model is sized for
    pub fn nfeatures(&self) -> usize {
        self.linear.len()
    }

    /// Number of latent lanes per feature
    pub fn embedding_dim(&self) -> usize {
        self.params.embedding_dim
    }

    /// Get the hyperparameters
    pub fn get_params(&self) -> &FmFtrlValidParams<F> {
        &self.params
    }

    /// Materialize the linear weight vector
    pub fn weights(&self) -> Array1<F> {
        let p = &self.params;
        (0..self.linear.len())
            .map(|idx| {
                self.linear
                    .weight_at(idx, p.alpha, p.beta, p.l1_penalty, p.l2_penalty)
            })
            .collect()
    }

    /// Materialize the latent factors as an `(nfeatures, embedding_dim)`
    /// matrix
    pub fn latent_factors(&self) -> Array2<F> {
        let p = &self.params;
        let k = p.embedding_dim;
        Array2::from_shape_fn((self.nfeatures(), k), |(idx, lane)| {
            self.latent
                .weight_at(idx * k + lane, p.latent_alpha, p.beta, p.latent_l1, p.latent_l2)
        })
    }
}
