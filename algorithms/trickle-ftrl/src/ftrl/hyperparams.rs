use crate::error::FtrlError;
use crate::hogwild::UpdateScheme;
use trickle::{Float, ParamGuard};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// A verified hyperparameter set ready for the estimation of a linear
/// FTRL-Proximal model.
///
/// See [`FtrlParams`] for documentation of the individual parameters.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct FtrlValidParams<F: Float> {
    pub(crate) alpha: F,
    pub(crate) beta: F,
    pub(crate) l1_penalty: F,
    pub(crate) l2_penalty: F,
    pub(crate) iterations: usize,
    pub(crate) num_threads: usize,
    pub(crate) update_scheme: UpdateScheme,
}

impl<F: Float> FtrlValidParams<F> {
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

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn update_scheme(&self) -> UpdateScheme {
        self.update_scheme
    }
}

/// Hyperparameters of the linear FTRL-Proximal model (builder pattern).
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct FtrlParams<F: Float>(pub(crate) FtrlValidParams<F>);

impl<F: Float> Default for FtrlParams<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> FtrlParams<F> {
    /// Create new hyperparameters with default values
    pub fn new() -> Self {
        Self(FtrlValidParams {
            alpha: F::cast(0.1),
            beta: F::cast(1.0),
            l1_penalty: F::cast(1.0),
            l2_penalty: F::cast(1.0),
            iterations: 1,
            num_threads: 1,
            update_scheme: UpdateScheme::default(),
        })
    }

    /// Set the learning-rate numerator.
    ///
    /// Defaults to `0.1` if not set
    ///
    /// `alpha` must be positive and finite
    pub fn alpha(mut self, alpha: F) -> Self {
        self.0.alpha = alpha;
        self
    }

    /// Set the learning-rate shape parameter.
    ///
    /// Defaults to `1.0` if not set
    ///
    /// `beta` must be non-negative and finite
    pub fn beta(mut self, beta: F) -> Self {
        self.0.beta = beta;
        self
    }

    /// Set the l1 penalty. Accumulated coordinates below this threshold
    /// materialize to exactly zero.
    ///
    /// Defaults to `1.0` if not set
    ///
    /// `l1_penalty` must be non-negative and finite
    pub fn l1_penalty(mut self, l1_penalty: F) -> Self {
        self.0.l1_penalty = l1_penalty;
        self
    }

    /// Set the l2 penalty.
    ///
    /// Defaults to `1.0` if not set
    ///
    /// `l2_penalty` must be non-negative and finite
    pub fn l2_penalty(mut self, l2_penalty: F) -> Self {
        self.0.l2_penalty = l2_penalty;
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
}

impl<F: Float> ParamGuard for FtrlParams<F> {
    type Checked = FtrlValidParams<F>;
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
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked, Self::Error> {
        self.check_ref()?;
        Ok(self.0)
    }
}

/// Shared validation of the adaptive-gradient parameters.
pub(crate) fn check_learning_params<F: Float>(
    alpha: F,
    beta: F,
    l1_penalty: F,
    l2_penalty: F,
) -> Result<(), FtrlError> {
    if !alpha.is_finite() || alpha <= F::zero() {
        Err(FtrlError::InvalidAlpha(alpha.to_f32().unwrap_or(f32::NAN)))
    } else if !beta.is_finite() || beta.is_negative() {
        Err(FtrlError::InvalidBeta(beta.to_f32().unwrap_or(f32::NAN)))
    } else if !l1_penalty.is_finite() || l1_penalty.is_negative() {
        Err(FtrlError::InvalidL1Penalty(
            l1_penalty.to_f32().unwrap_or(f32::NAN),
        ))
    } else if !l2_penalty.is_finite() || l2_penalty.is_negative() {
        Err(FtrlError::InvalidL2Penalty(
            l2_penalty.to_f32().unwrap_or(f32::NAN),
        ))
    } else {
        Ok(())
    }
}

/// Shared validation of the epoch/thread schedule.
pub(crate) fn check_schedule_params(
    iterations: usize,
    num_threads: usize,
) -> Result<(), FtrlError> {
    if iterations == 0 {
        Err(FtrlError::InvalidIterations)
    } else if num_threads == 0 {
        Err(FtrlError::InvalidNumThreads)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ftrl;

    #[test]
    fn default_params_are_valid() {
        assert!(Ftrl::<f64>::params().check().is_ok());
    }

    #[test]
    fn rejects_bad_alpha() {
        let params = Ftrl::<f64>::params().alpha(0.0);
        assert!(matches!(params.check(), Err(FtrlError::InvalidAlpha(_))));

        let params = Ftrl::<f64>::params().alpha(f64::NAN);
        assert!(matches!(params.check(), Err(FtrlError::InvalidAlpha(_))));
    }

    #[test]
    fn rejects_negative_penalties() {
        let params = Ftrl::<f32>::params().l1_penalty(-0.1);
        assert!(matches!(
            params.check(),
            Err(FtrlError::InvalidL1Penalty(_))
        ));

        let params = Ftrl::<f32>::params().l2_penalty(f32::INFINITY);
        assert!(matches!(
            params.check(),
            Err(FtrlError::InvalidL2Penalty(_))
        ));
    }

    #[test]
    fn rejects_zero_schedule() {
        assert!(matches!(
            Ftrl::<f64>::params().iterations(0).check(),
            Err(FtrlError::InvalidIterations)
        ));
        assert!(matches!(
            Ftrl::<f64>::params().num_threads(0).check(),
            Err(FtrlError::InvalidNumThreads)
        ));
    }
}
