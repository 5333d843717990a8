use crate::error::FtrlError;
use crate::ftrl::hyperparams::{check_learning_params, check_schedule_params};
use crate::hogwild::UpdateScheme;
use trickle::{Float, ParamGuard};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// A verified hyperparameter set for the rectified-linear network model.
///
/// See [`ReluNetParams`] for documentation of the individual parameters.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct ReluNetValidParams<F: Float> {
    pub(crate) alpha: F,
    pub(crate) beta: F,
    pub(crate) l1_penalty: F,
    pub(crate) l2_penalty: F,
    pub(crate) hidden_layers: Vec<usize>,
    pub(crate) dropout_rate: F,
    pub(crate) init_scale: F,
    pub(crate) iterations: usize,
    pub(crate) num_threads: usize,
    pub(crate) update_scheme: UpdateScheme,
    pub(crate) seed: u64,
}

impl<F: Float> ReluNetValidParams<F> {
    pub fn alpha(&self) -> F {
        self.alpha
    }

    pub fn beta(&self) -> F {
        self.beta
    }

    pub fn l1_penalty(&self) -> F {
        self.l1_penalty
    }

    pub fn l2_penalty(&self) -> F {
        self.l2_penalty
    }

    pub fn hidden_layers(&self) -> &[usize] {
        &self.hidden_layers
    }

    pub fn dropout_rate(&self) -> F {
        self.dropout_rate
    }

    pub fn init_scale(&self) -> F {
        self.init_scale
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn update_scheme(&self) -> UpdateScheme {
        self.update_scheme
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// Hyperparameters of the shallow rectified-linear network (builder
/// pattern).
///
/// Every trainable weight of the network, the input-to-hidden block
/// included, runs through the same closed-form adaptive update as the
/// linear model, so each parameter carries its own effective step size and
/// l1/l2 shrinkage.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct ReluNetParams<F: Float>(pub(crate) ReluNetValidParams<F>);

impl<F: Float> Default for ReluNetParams<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> ReluNetParams<F> {
    /// Create new hyperparameters with default values
    pub fn new() -> Self {
        Self(ReluNetValidParams {
            alpha: F::cast(0.1),
            beta: F::cast(1.0),
            l1_penalty: F::cast(0.0),
            l2_penalty: F::cast(0.001),
            hidden_layers: vec![32],
            dropout_rate: F::cast(0.0),
            init_scale: F::cast(0.01),
            iterations: 1,
            num_threads: 1,
            update_scheme: UpdateScheme::default(),
            seed: 42,
        })
    }

    /// Set the learning-rate numerator.
    ///
    /// Defaults to `0.1` if not set
    pub fn alpha(mut self, alpha: F) -> Self {
        self.0.alpha = alpha;
        self
    }

    /// Set the learning-rate shape parameter.
    ///
    /// Defaults to `1.0` if not set
    pub fn beta(mut self, beta: F) -> Self {
        self.0.beta = beta;
        self
    }

    /// Set the l1 penalty.
    ///
    /// Defaults to `0.0` if not set
    pub fn l1_penalty(mut self, l1_penalty: F) -> Self {
        self.0.l1_penalty = l1_penalty;
        self
    }

    /// Set the l2 penalty.
    ///
    /// Defaults to `0.001` if not set
    pub fn l2_penalty(mut self, l2_penalty: F) -> Self {
        self.0.l2_penalty = l2_penalty;
        self
    }

    /// Set the hidden-layer widths: one width for a single hidden layer,
    /// two for the deeper variant.
    ///
    /// Defaults to `[32]` if not set
    pub fn hidden_layers(mut self, widths: &[usize]) -> Self {
        self.0.hidden_layers = widths.to_vec();
        self
    }

    /// Set the dropout rate applied to hidden activations during fit.
    /// Kept units are scaled by `1/(1-rate)`, so prediction needs no
    /// rescaling.
    ///
    /// Defaults to `0.0` if not set
    ///
    /// `dropout_rate` must be in `[0, 1)`
    pub fn dropout_rate(mut self, dropout_rate: F) -> Self {
        self.0.dropout_rate = dropout_rate;
        self
    }

    /// Set the scale of the random initialization of the accumulators;
    /// this is what breaks the symmetry between hidden units.
    ///
    /// Defaults to `0.01` if not set
    ///
    /// `init_scale` must be positive and finite
    pub fn init_scale(mut self, init_scale: F) -> Self {
        self.0.init_scale = init_scale;
        self
    }

    /// Set the number of passes over the batch per fit call.
    ///
    /// Defaults to `1` if not set
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.0.iterations = iterations;
        self
    }

    /// Set the number of worker threads used per fit or predict call.
    ///
    /// Defaults to `1` if not set
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.0.num_threads = num_threads;
        self
    }

    /// Set how workers share the accumulators; see [`UpdateScheme`].
    /// The network's output layer cannot be partitioned by coordinate, so
    /// [`UpdateScheme::Sharded`] runs a deterministic single-threaded pass.
    ///
    /// Defaults to [`UpdateScheme::Hogwild`] if not set
    pub fn update_scheme(mut self, update_scheme: UpdateScheme) -> Self {
        self.0.update_scheme = update_scheme;
        self
    }

    /// Set the seed of the weight initialization and the dropout masks.
    ///
    /// Defaults to `42` if not set
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }
}

impl<F: Float> ParamGuard for ReluNetParams<F> {
    type Checked = ReluNetValidParams<F>;
    type Error = FtrlError;

    /// Validate the hyperparameters
    fn check_ref(&self) -> Result<&Self::Checked, Self::Error> {
        check_learning_params(
            self.0.alpha,
            self.0.beta,
            self.0.l1_penalty,
            self.0.l2_penalty,
        )?;
        check_schedule_params(self.0.iterations, self.0.num_threads)?;
        let widths = &self.0.hidden_layers;
        if widths.is_empty() || widths.len() > 2 || widths.iter().any(|&w| w == 0) {
            Err(FtrlError::InvalidHiddenLayers)
        } else if !(F::zero()..F::one()).contains(&self.0.dropout_rate) {
            Err(FtrlError::InvalidDropoutRate(
                self.0.dropout_rate.to_f32().unwrap_or(f32::NAN),
            ))
        } else if !self.0.init_scale.is_finite() || self.0.init_scale <= F::zero() {
            Err(FtrlError::InvalidInitScale(
                self.0.init_scale.to_f32().unwrap_or(f32::NAN),
            ))
        } else {
            Ok(&self.0)
        }
    }

    fn check(self) -> Result<Self::Checked, Self::Error> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReluNet;

    #[test]
    fn default_params_are_valid() {
        assert!(ReluNet::<f64>::params().check().is_ok());
    }

    #[test]
    fn rejects_bad_hidden_layers() {
        assert!(matches!(
            ReluNet::<f64>::params().hidden_layers(&[]).check(),
            Err(FtrlError::InvalidHiddenLayers)
        ));
        assert!(matches!(
            ReluNet::<f64>::params().hidden_layers(&[8, 4, 2]).check(),
            Err(FtrlError::InvalidHiddenLayers)
        ));
        assert!(matches!(
            ReluNet::<f64>::params().hidden_layers(&[8, 0]).check(),
            Err(FtrlError::InvalidHiddenLayers)
        ));
        assert!(ReluNet::<f64>::params().hidden_layers(&[8, 4]).check().is_ok());
    }

    #[test]
    fn rejects_out_of_range_dropout() {
        assert!(matches!(
            ReluNet::<f32>::params().dropout_rate(1.0).check(),
            Err(FtrlError::InvalidDropoutRate(_))
        ));
        assert!(matches!(
            ReluNet::<f32>::params().dropout_rate(-0.1).check(),
            Err(FtrlError::InvalidDropoutRate(_))
        ));
        assert!(ReluNet::<f32>::params().dropout_rate(0.5).check().is_ok());
    }
}
