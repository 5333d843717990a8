use crate::error::FtrlError;
use crate::ftrl::hyperparams::{check_learning_params, check_schedule_params};
use crate::hogwild::UpdateScheme;
use trickle::{Float, ParamGuard};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// A verified hyperparameter set for the factorization-machine model.
///
/// See [`FmFtrlParams`] for documentation of the individual parameters.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct FmFtrlValidParams<F: Float> {
    pub(crate) alpha: F,
    pub(crate) beta: F,
    pub(crate) l1_penalty: F,
    pub(crate) l2_penalty: F,
    pub(crate) latent_alpha: F,
    pub(crate) latent_l1: F,
    pub(crate) latent_l2: F,
    pub(crate) latent_init: F,
    pub(crate) embedding_dim: usize,
    pub(crate) iterations: usize,
    pub(crate) num_threads: usize,
    pub(crate) update_scheme: UpdateScheme,
    pub(crate) seed: u64,
}

impl<F: Float> FmFtrlValidParams<F> {
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

    pub fn latent_alpha(&self) -> F {
        self.latent_alpha
    }

    pub fn latent_l1(&self) -> F {
        self.latent_l1
    }

    pub fn latent_l2(&self) -> F {
        self.latent_l2
    }

    pub fn latent_init(&self) -> F {
        self.latent_init
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
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

/// Hyperparameters of the factorization-machine model (builder pattern).
///
/// The linear part is governed by the same four adaptive-gradient
/// parameters as the plain linear model; the latent interaction part has
/// its own learning rate and penalties, applied per latent lane through the
/// identical closed-form update.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct FmFtrlParams<F: Float>(pub(crate) FmFtrlValidParams<F>);

impl<F: Float> Default for FmFtrlParams<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> FmFtrlParams<F> {
    /// Create new hyperparameters with default values
    pub fn new() -> Self {
        Self(FmFtrlValidParams {
            alpha: F::cast(0.02),
            beta: F::cast(0.01),
            l1_penalty: F::cast(1e-5),
            l2_penalty: F::cast(0.1),
            latent_alpha: F::cast(0.03),
            latent_l1: F::cast(0.0),
            latent_l2: F::cast(0.005),
            latent_init: F::cast(0.01),
            embedding_dim: 4,
            iterations: 1,
            num_threads: 1,
            update_scheme: UpdateScheme::default(),
            seed: 42,
        })
    }

    /// Set the learning-rate numerator of the linear part.
    ///
    /// Defaults to `0.02` if not set
    pub fn alpha(mut self, alpha: F) -> Self {
        self.0.alpha = alpha;
        self
    }

    /// Set the learning-rate shape parameter.
    ///
    /// Defaults to `0.01` if not set
    pub fn beta(mut self, beta: F) -> Self {
        self.0.beta = beta;
        self
    }

    /// Set the l1 penalty of the linear part.
    ///
    /// Defaults to `1e-5` if not set
    pub fn l1_penalty(mut self, l1_penalty: F) -> Self {
        self.0.l1_penalty = l1_penalty;
        self
    }

    /// Set the l2 penalty of the linear part.
    ///
    /// Defaults to `0.1` if not set
    pub fn l2_penalty(mut self, l2_penalty: F) -> Self {
        self.0.l2_penalty = l2_penalty;
        self
    }

    /// Set the learning-rate numerator of the latent factors.
    ///
    /// Defaults to `0.03` if not set
    pub fn latent_alpha(mut self, latent_alpha: F) -> Self {
        self.0.latent_alpha = latent_alpha;
        self
    }

    /// Set the l1 penalty of the latent factors.
    ///
    /// Defaults to `0.0` if not set; a nonzero value collapses weakly
    /// supported factors to exactly zero
    pub fn latent_l1(mut self, latent_l1: F) -> Self {
        self.0.latent_l1 = latent_l1;
        self
    }

    /// Set the l2 penalty of the latent factors.
    ///
    /// Defaults to `0.005` if not set
    pub fn latent_l2(mut self, latent_l2: F) -> Self {
        self.0.latent_l2 = latent_l2;
        self
    }

    /// Set the scale of the random initialization of the latent
    /// accumulators.
    ///
    /// Defaults to `0.01` if not set
    ///
    /// `latent_init` must be positive and finite
    pub fn latent_init(mut self, latent_init: F) -> Self {
        self.0.latent_init = latent_init;
        self
    }

    /// Set the number of latent lanes per feature.
    ///
    /// Defaults to `4` if not set
    pub fn embedding_dim(mut self, embedding_dim: usize) -> Self {
        self.0.embedding_dim = embedding_dim;
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
    ///
    /// Defaults to [`UpdateScheme::Hogwild`] if not set
    pub fn update_scheme(mut self, update_scheme: UpdateScheme) -> Self {
        self.0.update_scheme = update_scheme;
        self
    }

    /// Set the seed of the latent-factor initialization.
    ///
    /// Defaults to `42` if not set
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }
}

impl<F: Float> ParamGuard for FmFtrlParams<F> {
    type Checked = FmFtrlValidParams<F>;
    type Error = FtrlError;

    /// Validate the hyperparameters
    fn check_ref(&self) -> Result<&Self::Checked, Self::Error> {
        check_learning_params(
            self.0.alpha,
            self.0.beta,
            self.0.l1_penalty,
            self.0.l2_penalty,
        )?;
        check_learning_params(
            self.0.latent_alpha,
            self.0.beta,
            self.0.latent_l1,
            self.0.latent_l2,
        )?;
        check_schedule_params(self.0.iterations, self.0.num_threads)?;
        if self.0.embedding_dim == 0 {
            Err(FtrlError::InvalidEmbeddingDim)
        } else if !self.0.latent_init.is_finite() || self.0.latent_init <= F::zero() {
            Err(FtrlError::InvalidInitScale(
                self.0.latent_init.to_f32().unwrap_or(f32::NAN),
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
    use crate::FmFtrl;

    #[test]
    fn default_params_are_valid() {
        assert!(FmFtrl::<f64>::params().check().is_ok());
    }

    #[test]
    fn rejects_zero_embedding_dim() {
        assert!(matches!(
            FmFtrl::<f64>::params().embedding_dim(0).check(),
            Err(FtrlError::InvalidEmbeddingDim)
        ));
    }

    #[test]
    fn rejects_bad_latent_settings() {
        assert!(matches!(
            FmFtrl::<f32>::params().latent_alpha(-1.0).check(),
            Err(FtrlError::InvalidAlpha(_))
        ));
        assert!(matches!(
            FmFtrl::<f32>::params().latent_init(0.0).check(),
            Err(FtrlError::InvalidInitScale(_))
        ));
    }
}
