mod algorithm;
pub(crate) mod hyperparams;

pub use hyperparams::{FtrlParams, FtrlValidParams};

use crate::accumulator::AdaptiveState;
use ndarray::Array1;
use trickle::Float;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Linear FTRL-Proximal classifier over hash-bucketed sparse features.
///
/// The model keeps one `z`/`n` accumulator pair per hash bucket and
/// materializes weights on demand from the closed-form proximal step, so
/// rarely-touched coordinates stay exactly zero under l1 regularization.
/// Both storage widths are covered by the same implementation: `Ftrl<f64>`
/// for double precision and `Ftrl<f32>` for single precision.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct Ftrl<F: Float> {
    pub(crate) params: FtrlValidParams<F>,
    pub(crate) state: AdaptiveState<F>,
}

impl<F: Float> Ftrl<F> {
    /// Create default hyperparameters
    pub fn params() -> FtrlParams<F> {
        FtrlParams::new()
    }

    /// Create a new model with given parameters and hash width
    pub fn new(params: FtrlValidParams<F>, nfeatures: usize) -> Ftrl<F> {
        Self {
            params,
            state: AdaptiveState::zeros(nfeatures),
        }
    }

    /// Hash width the model is sized for
    pub fn nfeatures(&self) -> usize {
        self.state.len()
    }

    /// Get Z values
    pub fn z(&self) -> &[F] {
        &self.state.z
    }

    /// Get N values
    pub fn n(&self) -> &[F] {
        &self.state.n
    }

    /// Get the hyperparameters
    pub fn get_params(&self) -> &FtrlValidParams<F> {
        &self.params
    }

    /// Materialize the weight vector
    pub fn weights(&self) -> Array1<F> {
        let p = &self.params;
        (0..self.state.len())
            .map(|idx| {
                self.state
                    .weight_at(idx, p.alpha(), p.beta(), p.l1_penalty(), p.l2_penalty())
            })
            .collect()
    }
}
