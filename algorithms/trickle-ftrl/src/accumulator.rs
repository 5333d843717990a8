//! The per-coordinate adaptive-gradient bookkeeping shared by every model in
//! this crate.
//!
//! Each trainable coordinate carries two accumulators: `z`, the shifted sum
//! of gradients, and `n`, the sum of squared gradients. The materialized
//! weight is never stored; it is a pure function of `(z, n)` and the
//! regularization settings, recomputed whenever a coordinate is touched.
//! Coordinates whose accumulated `|z|` stays at or below the l1 penalty
//! materialize to exactly zero.

use ndarray::Array1;
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::Rng;
use trickle::Float;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Paired `z`/`n` accumulators for a block of coordinates.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug)]
pub(crate) struct AdaptiveState<F> {
    pub z: Vec<F>,
    pub n: Vec<F>,
}

impl<F: Float> AdaptiveState<F> {
    pub fn zeros(len: usize) -> Self {
        Self {
            z: vec![F::zero(); len],
            n: vec![F::zero(); len],
        }
    }

    /// Seed `z` uniformly from `[-scale, scale]`; used for latent factors
    /// and network layers, whose gradients vanish at an all-zero start.
    pub fn with_random_z<R: Rng>(len: usize, scale: F, rng: &mut R) -> Self {
        let dist = Uniform::new_inclusive(-scale, scale);
        Self {
            z: Array1::random_using(len, dist, rng).into_raw_vec(),
            n: vec![F::zero(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.z.len()
    }

    /// Materialize the weight of one coordinate.
    pub fn weight_at(&self, idx: usize, alpha: F, beta: F, l1: F, l2: F) -> F {
        calculate_weight(self.z[idx], self.n[idx], alpha, beta, l1, l2)
    }

    /// Apply one adaptive-gradient update to coordinate `idx`.
    ///
    /// `weight` must be the value materialized for this coordinate during
    /// the forward pass that produced `gradient`.
    pub fn update_at(&mut self, idx: usize, gradient: F, weight: F, alpha: F) {
        let sigma = calculate_sigma(self.n[idx], gradient, alpha);
        self.z[idx] += gradient - sigma * weight;
        self.n[idx] += gradient * gradient;
    }
}

/// Closed-form proximal weight.
///
/// Zero whenever `|z| <= l1`, otherwise the regularized quotient with the
/// per-coordinate adaptive denominator.
pub(crate) fn calculate_weight<F: Float>(z: F, n: F, alpha: F, beta: F, l1: F, l2: F) -> F {
    let sign = if z < F::zero() { -F::one() } else { F::one() };
    if z * sign <= l1 {
        F::zero()
    } else {
        (sign * l1 - z) / ((n.sqrt() + beta) / alpha + l2)
    }
}

/// Learning-rate decrement for one gradient step, in the cancellation-free
/// sqrt-difference form.
pub(crate) fn calculate_sigma<F: Float>(n: F, gradient: F, alpha: F) -> F {
    ((n + gradient * gradient).sqrt() - n.sqrt()) / alpha
}

/// Logistic link, clamped before the exponential.
pub(crate) fn sigmoid<F: Float>(score: F) -> F {
    let bound = F::cast(35.);
    F::one() / (F::one() + F::exp(-F::max(F::min(score, bound), -bound)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sigmoid_works() {
        let value = 100.;
        let result = sigmoid(value);
        assert!(result > 0.9);
        assert_abs_diff_eq!(sigmoid(0.0f64), 0.5);
    }

    #[test]
    fn weight_is_zero_within_l1_threshold() {
        // independent of the n accumulator
        for &n in &[0.0, 0.1, 10.0, 1e6] {
            assert_abs_diff_eq!(calculate_weight(0.4, n, 0.5, 0.5, 0.5, 0.5), 0.0);
            assert_abs_diff_eq!(calculate_weight(-0.5, n, 0.5, 0.5, 0.5, 0.5), 0.0);
        }
    }

    #[test]
    fn calculate_weight_works() {
        let z = 0.5;
        let n: f64 = 0.16;
        let expected_result = (0.1 - 0.5) / ((0.4 + 0.5) / 0.5 + 0.5);
        let result = calculate_weight(z, n, 0.5, 0.5, 0.1, 0.5);
        assert_abs_diff_eq!(result, expected_result);

        // antisymmetric in z
        let negative = calculate_weight(-z, n, 0.5, 0.5, 0.1, 0.5);
        assert_abs_diff_eq!(negative, -expected_result);
    }

    #[test]
    fn calculate_sigma_works() {
        let gradient: f64 = 0.5;
        let n: f64 = 0.11;
        let expected_result = ((0.11 + 0.25) as f64).sqrt() - (0.11 as f64).sqrt();
        let result = calculate_sigma(n, gradient, 0.5);
        assert_abs_diff_eq!(result, expected_result / 0.5);
    }

    #[test]
    fn update_accumulates_z_and_n() {
        let mut state = AdaptiveState::<f64>::zeros(2);
        let weight = 0.0;
        state.update_at(1, 0.3, weight, 0.5);

        let sigma = calculate_sigma(0.0, 0.3, 0.5);
        assert_abs_diff_eq!(state.z[1], 0.3 - sigma * weight);
        assert_abs_diff_eq!(state.n[1], 0.09);
        assert_abs_diff_eq!(state.z[0], 0.0);
        assert_abs_diff_eq!(state.n[0], 0.0);
    }

    #[test]
    fn random_z_stays_within_scale() {
        use rand::SeedableRng;
        let mut rng = rand_xoshiro::Xoshiro256Plus::seed_from_u64(7);
        let state = AdaptiveState::<f32>::with_random_z(100, 0.01, &mut rng);
        assert!(state.z.iter().all(|z| z.abs() <= 0.01));
        assert!(state.n.iter().all(|&n| n == 0.0));
    }
}
