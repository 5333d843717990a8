//! Quality measures for binary classifiers emitting probabilities
//!
use crate::dataset::Pr;
use crate::error::{Error, Result};
use ndarray::{ArrayBase, Data, Ix1};

/// Classification metrics for probability predictions against boolean ground
/// truth.
pub trait BinaryClassification {
    /// Mean negative log-likelihood of the targets under the predicted
    /// probabilities. Probabilities are clamped away from zero and one
    /// before taking logarithms.
    fn log_loss(&self, targets: &[bool]) -> Result<f32>;

    /// Fraction of samples classified correctly at the 0.5 threshold.
    fn accuracy(&self, targets: &[bool]) -> Result<f32>;
}

const EPS: f32 = 1e-7;

impl BinaryClassification for [Pr] {
    fn log_loss(&self, targets: &[bool]) -> Result<f32> {
        if self.len() != targets.len() {
            return Err(Error::MismatchedSamples {
                expected: self.len(),
                found: targets.len(),
            });
        }
        if self.is_empty() {
            return Err(Error::Parameters("no samples to evaluate".to_string()));
        }

        let total: f32 = self
            .iter()
            .zip(targets.iter())
            .map(|(p, &y)| {
                let p = p.0.max(EPS).min(1.0 - EPS);
                if y {
                    -p.ln()
                } else {
                    -(1.0 - p).ln()
                }
            })
            .sum();

        Ok(total / self.len() as f32)
    }

    fn accuracy(&self, targets: &[bool]) -> Result<f32> {
        if self.len() != targets.len() {
            return Err(Error::MismatchedSamples {
                expected: self.len(),
                found: targets.len(),
            });
        }
        if self.is_empty() {
            return Err(Error::Parameters("no samples to evaluate".to_string()));
        }

        let hits = self
            .iter()
            .zip(targets.iter())
            .filter(|(p, &y)| (p.0 >= 0.5) == y)
            .count();

        Ok(hits as f32 / self.len() as f32)
    }
}

impl<S: Data<Elem = Pr>> BinaryClassification for ArrayBase<S, Ix1> {
    fn log_loss(&self, targets: &[bool]) -> Result<f32> {
        self.as_slice().expect("contiguous predictions").log_loss(targets)
    }

    fn accuracy(&self, targets: &[bool]) -> Result<f32> {
        self.as_slice().expect("contiguous predictions").accuracy(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn log_loss_of_confident_predictions_is_small() {
        let predictions = array![Pr(0.99), Pr(0.01)];
        let loss = predictions.log_loss(&[true, false]).unwrap();
        assert!(loss < 0.02);
    }

    #[test]
    fn log_loss_penalizes_confident_mistakes() {
        let good = array![Pr(0.9), Pr(0.1)].log_loss(&[true, false]).unwrap();
        let bad = array![Pr(0.1), Pr(0.9)].log_loss(&[true, false]).unwrap();
        assert!(bad > good);
    }

    #[test]
    fn accuracy_counts_threshold_hits() {
        let predictions = array![Pr(0.8), Pr(0.3), Pr(0.6), Pr(0.2)];
        let acc = predictions
            .accuracy(&[true, false, false, false])
            .unwrap();
        assert_eq!(acc, 0.75);
    }

    #[test]
    fn mismatched_lengths_error() {
        let predictions = array![Pr(0.5)];
        assert!(predictions.log_loss(&[true, false]).is_err());
    }
}
