//! Provide traits for different classes of algorithms
//!

use crate::dataset::{DatasetBase, Float, Records};
use ndarray::{ArrayBase, Data, Ix2};
use sprs::CsMat;

/// Fittable algorithms
///
/// A fittable algorithm takes a dataset and returns a fitted model. The
/// implementation lives on the checked hyperparameter set; unchecked
/// parameter sets gain the same impl through the blanket forwarding in
/// [`ParamGuard`](crate::ParamGuard).
pub trait Fit<R: Records, T, E: std::error::Error> {
    type Object;

    fn fit(&self, dataset: &DatasetBase<R, T>) -> Result<Self::Object, E>;
}

/// Incrementally fittable algorithms
///
/// An incremental algorithm can resume from a previously fitted model,
/// which is how repeated online updates over successive batches are
/// expressed: pass `None` to start from scratch (sizing the model from the
/// batch), or `Some(model)` to continue training the existing state.
pub trait FitWith<'a, R: Records, T, E: std::error::Error> {
    type ObjectIn;
    type ObjectOut;

    fn fit_with(
        &self,
        model: Self::ObjectIn,
        dataset: &'a DatasetBase<R, T>,
    ) -> Result<Self::ObjectOut, E>;
}

/// Predict into a preallocated target container
pub trait PredictInplace<R, T> {
    /// Predict something in place
    fn predict_inplace(&self, x: &R, y: &mut T);

    /// Create targets that `predict_inplace` works with
    fn default_target(&self, x: &R) -> T;
}

/// Predict with an owned return value
pub trait Predict<R, T> {
    fn predict(&self, x: R) -> T;
}

impl<'a, F: Float, T, O> Predict<&'a CsMat<F>, T> for O
where
    O: PredictInplace<CsMat<F>, T>,
{
    fn predict(&self, records: &'a CsMat<F>) -> T {
        let mut targets = self.default_target(records);
        self.predict_inplace(records, &mut targets);
        targets
    }
}

impl<'a, F: Float, S: Data<Elem = F>, T, O> Predict<&'a ArrayBase<S, Ix2>, T> for O
where
    O: PredictInplace<ArrayBase<S, Ix2>, T>,
{
    fn predict(&self, records: &'a ArrayBase<S, Ix2>) -> T {
        let mut targets = self.default_target(records);
        self.predict_inplace(records, &mut targets);
        targets
    }
}

impl<'a, R: Records, T, S, O> Predict<&'a DatasetBase<R, T>, S> for O
where
    O: PredictInplace<R, S>,
{
    fn predict(&self, dataset: &'a DatasetBase<R, T>) -> S {
        let mut targets = self.default_target(&dataset.records);
        self.predict_inplace(&dataset.records, &mut targets);
        targets
    }
}
