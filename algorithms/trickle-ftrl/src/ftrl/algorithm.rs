use std::ops::Range;

use ndarray::{Array1, ArrayView1};
use sprs::CsMat;

use trickle::dataset::{fold_row_into, AsSingleTargets};
use trickle::traits::{Fit, FitWith, PredictInplace};
use trickle::{DatasetBase, Float, Pr};

use crate::accumulator::{sigmoid, AdaptiveState};
use crate::batch::{check_width, validate_fit_batch, validate_predict_batch};
use crate::error::{FtrlError, Result};
use crate::ftrl::{Ftrl, FtrlValidParams};
use crate::hogwild::{build_pool, contiguous_blocks, Hogwild, UpdateScheme};

impl<F, T> Fit<CsMat<F>, T, FtrlError> for FtrlValidParams<F>
where
    F: Float,
    T: AsSingleTargets<Elem = bool>,
{
    type Object = Ftrl<F>;

    /// Fit a fresh model, sizing the hash width from the batch.
    fn fit(&self, dataset: &DatasetBase<CsMat<F>, T>) -> Result<Self::Object> {
        self.fit_with(None, dataset)
    }
}

impl<'a, F, T> FitWith<'a, CsMat<F>, T, FtrlError> for FtrlValidParams<F>
where
    F: Float,
    T: AsSingleTargets<Elem = bool>,
{
    type ObjectIn = Option<Ftrl<F>>;
    type ObjectOut = Ftrl<F>;

    /// Fit a linear FTRL-Proximal model given a sparse feature matrix and a
    /// boolean target variable.
    ///
    /// Passing `None` starts from a zeroed weight store sized to the batch;
    /// passing `Some(model)` continues training the existing state, in which
    /// case the batch's column count must match the model's hash width.
    /// Training runs under the model's own hyperparameters; this parameter
    /// set only seeds a fresh model when `None` is passed.
    ///
    /// Returns the fitted model, which predicts probabilities of the target
    /// variable for new feature values.
    fn fit_with(
        &self,
        model_in: Self::ObjectIn,
        dataset: &DatasetBase<CsMat<F>, T>,
    ) -> Result<Self::ObjectOut> {
        validate_fit_batch(dataset)?;
        let x = dataset.records();

        let mut model = match model_in {
            Some(model) => {
                check_width(x, model.nfeatures())?;
                model
            }
            None => Ftrl::new(self.clone(), x.cols()),
        };

        let targets = dataset.targets().as_single_targets();
        let Ftrl { params, state } = &mut model;
        for _ in 0..params.iterations {
            run_epoch(params, state, x, targets, &dataset.weights)?;
        }

        Ok(model)
    }
}

impl<F: Float> PredictInplace<CsMat<F>, Array1<Pr>> for Ftrl<F> {
    /// Given an input matrix `X`, with shape `(n_samples, n_features)`,
    /// `predict` returns the target variable according to the parameters
    /// learned from the training data distribution.
    ///
    /// Panics when the batch fails validation; [`Ftrl::try_predict`] is the
    /// fallible variant.
    fn predict_inplace(&self, x: &CsMat<F>, y: &mut Array1<Pr>) {
        assert_eq!(
            x.rows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        match self.try_predict(x) {
            Ok(probabilities) => y.assign(&probabilities),
            Err(e) => panic!("{}", e),
        }
    }

    fn default_target(&self, x: &CsMat<F>) -> Array1<Pr> {
        Array1::from_elem(x.rows(), Pr(0.0))
    }
}

impl<F: Float> Ftrl<F> {
    /// Predict one probability per row, validating storage order and the
    /// hash width first.
    pub fn try_predict(&self, x: &CsMat<F>) -> Result<Array1<Pr>> {
        validate_predict_batch(x, self.nfeatures())?;

        let nrows = x.rows();
        let nthreads = self.params.num_threads.min(nrows).max(1);
        let mut out = vec![Pr(0.0); nrows];

        if nthreads <= 1 {
            predict_rows(&self.params, &self.state, x, 0..nrows, &mut out);
        } else {
            let pool = build_pool(nthreads)?;
            let blocks = contiguous_blocks(nrows, nthreads);

            // each worker fills a disjoint slice of the output
            let mut slices = Vec::with_capacity(blocks.len());
            let mut rest = out.as_mut_slice();
            for block in &blocks {
                let (head, tail) = rest.split_at_mut(block.len());
                slices.push(head);
                rest = tail;
            }

            let params = &self.params;
            let state = &self.state;
            pool.scope(|scope| {
                for (block, slice) in blocks.into_iter().zip(slices) {
                    scope.spawn(move |_| predict_rows(params, state, x, block, slice));
                }
            });
        }

        Ok(Array1::from(out))
    }
}

fn predict_rows<F: Float>(
    params: &FtrlValidParams<F>,
    state: &AdaptiveState<F>,
    x: &CsMat<F>,
    rows: Range<usize>,
    out: &mut [Pr],
) {
    let mut row_buf = Vec::new();
    let offset = rows.start;
    for i in rows {
        let row = match x.outer_view(i) {
            Some(row) => row,
            None => continue,
        };
        fold_row_into(row.indices(), row.data(), &mut row_buf);

        let mut score = F::zero();
        for &(idx, value) in &row_buf {
            score += weight_at(params, state, idx) * value;
        }
        out[i - offset] = Pr(sigmoid(score).to_f32().unwrap_or_default());
    }
}

fn run_epoch<F: Float>(
    params: &FtrlValidParams<F>,
    state: &mut AdaptiveState<F>,
    x: &CsMat<F>,
    targets: ArrayView1<bool>,
    weights: &Array1<f32>,
) -> Result<()> {
    let nrows = x.rows();
    let nthreads = params.num_threads.min(nrows).max(1);

    if nthreads <= 1 {
        fit_rows(params, state, x, targets, weights, 0..nrows);
        return Ok(());
    }

    let pool = build_pool(nthreads)?;
    match params.update_scheme {
        UpdateScheme::Hogwild => {
            let blocks = contiguous_blocks(nrows, nthreads);
            let shared = Hogwild::new(state);
            let shared = &shared;
            pool.scope(|scope| {
                for block in blocks {
                    scope.spawn(move |_| {
                        // racy by design; see the hogwild module contract
                        let state = unsafe { shared.get() };
                        fit_rows(params, state, x, targets, weights, block);
                    });
                }
            });
        }
        UpdateScheme::Sharded => {
            let snapshot: Vec<F> = (0..state.len())
                .map(|idx| weight_at(params, state, idx))
                .collect();
            let shards = contiguous_blocks(state.len(), nthreads);
            let shared = Hogwild::new(state);
            let shared = &shared;
            let snapshot = &snapshot;
            pool.scope(|scope| {
                for shard in shards {
                    scope.spawn(move |_| {
                        // writes stay inside this worker's coordinate shard
                        let state = unsafe { shared.get() };
                        fit_shard(params, state, x, targets, weights, shard, snapshot);
                    });
                }
            });
        }
    }

    Ok(())
}

/// One sequential pass over a block of rows, updating any touched
/// coordinate.
fn fit_rows<F: Float>(
    params: &FtrlValidParams<F>,
    state: &mut AdaptiveState<F>,
    x: &CsMat<F>,
    targets: ArrayView1<bool>,
    weights: &Array1<f32>,
    rows: Range<usize>,
) {
    let mut row_buf = Vec::new();
    let mut weight_buf = Vec::new();
    for i in rows {
        let row = match x.outer_view(i) {
            Some(row) => row,
            None => continue,
        };
        if !fold_row_into(row.indices(), row.data(), &mut row_buf) {
            // non-finite feature values: reject the row, keep the store intact
            continue;
        }

        let sample_weight = F::cast(if weights.is_empty() { 1.0 } else { weights[i] });

        weight_buf.clear();
        let mut score = F::zero();
        for &(idx, value) in &row_buf {
            let weight = weight_at(params, state, idx);
            weight_buf.push(weight);
            score += weight * value;
        }

        let err = row_error(score, targets[i], sample_weight);
        for (&(idx, value), &weight) in row_buf.iter().zip(weight_buf.iter()) {
            state.update_at(idx, err * value, weight, params.alpha);
        }
    }
}

/// One sequential pass over all rows, restricted to the coordinates of one
/// shard. Foreign coordinates are read from the epoch-start snapshot, which
/// keeps the pass deterministic for a fixed shard layout.
fn fit_shard<F: Float>(
    params: &FtrlValidParams<F>,
    state: &mut AdaptiveState<F>,
    x: &CsMat<F>,
    targets: ArrayView1<bool>,
    weights: &Array1<f32>,
    shard: Range<usize>,
    snapshot: &[F],
) {
    let mut row_buf = Vec::new();
    let mut weight_buf = Vec::new();
    for i in 0..x.rows() {
        let row = match x.outer_view(i) {
            Some(row) => row,
            None => continue,
        };
        if !fold_row_into(row.indices(), row.data(), &mut row_buf) {
            continue;
        }

        let sample_weight = F::cast(if weights.is_empty() { 1.0 } else { weights[i] });

        weight_buf.clear();
        let mut score = F::zero();
        for &(idx, value) in &row_buf {
            let weight = if shard.contains(&idx) {
                weight_at(params, state, idx)
            } else {
                snapshot[idx]
            };
            weight_buf.push(weight);
            score += weight * value;
        }

        let err = row_error(score, targets[i], sample_weight);
        for (&(idx, value), &weight) in row_buf.iter().zip(weight_buf.iter()) {
            if shard.contains(&idx) {
                state.update_at(idx, err * value, weight, params.alpha);
            }
        }
    }
}

fn weight_at<F: Float>(params: &FtrlValidParams<F>, state: &AdaptiveState<F>, idx: usize) -> F {
    state.weight_at(
        idx,
        params.alpha,
        params.beta,
        params.l1_penalty,
        params.l2_penalty,
    )
}

fn row_error<F: Float>(score: F, target: bool, sample_weight: F) -> F {
    let truth = if target { F::one() } else { F::zero() };
    (sigmoid(score) - truth) * sample_weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{dense_to_csr, separable_batch};
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use trickle::metrics::BinaryClassification;
    use trickle::prelude::*;
    use trickle::ParamGuard;

    #[test]
    fn fresh_model_predicts_even_odds() {
        let params = Ftrl::<f64>::params().check().unwrap();
        let model = Ftrl::new(params, 3);
        let x = dense_to_csr(&[vec![1.0, 0.0, 2.0], vec![0.0, -1.0, 0.0]]);
        let probabilities = model.try_predict(&x).unwrap();
        for p in probabilities.iter() {
            assert_abs_diff_eq!(p.0, 0.5);
        }
    }

    #[test]
    fn single_threaded_replay_is_deterministic() {
        let (x, y) = separable_batch(24, 6, 42);
        let dataset = DatasetBase::new(x, y);
        let params = Ftrl::<f64>::params()
            .alpha(0.1)
            .l1_penalty(0.0)
            .l2_penalty(0.1)
            .iterations(3);

        let first = params.clone().fit_with(None, &dataset).unwrap();
        let second = params.fit_with(None, &dataset).unwrap();

        assert_eq!(first.z(), second.z());
        assert_eq!(first.n(), second.n());
    }

    #[test]
    fn incremental_fit_validates_width() {
        let (x, y) = separable_batch(10, 8, 1);
        let dataset = DatasetBase::new(x, y);
        let model = Ftrl::<f64>::params().fit_with(None, &dataset).unwrap();
        assert_eq!(model.nfeatures(), 8);

        let (x_wrong, y_wrong) = separable_batch(5, 4, 2);
        let narrow = DatasetBase::new(x_wrong, y_wrong);
        let result = Ftrl::<f64>::params().fit_with(Some(model), &narrow);
        assert!(matches!(
            result,
            Err(FtrlError::DimensionMismatch {
                expected: 8,
                found: 4
            })
        ));

        // a fresh fit adopts the new width instead
        let resized = Ftrl::<f64>::params().fit_with(None, &narrow).unwrap();
        assert_eq!(resized.nfeatures(), 4);
    }

    #[test]
    fn predict_validates_width() {
        let (x, y) = separable_batch(10, 8, 3);
        let dataset = DatasetBase::new(x, y);
        let model = Ftrl::<f64>::params().fit_with(None, &dataset).unwrap();

        let (x_wrong, _) = separable_batch(5, 4, 4);
        assert!(matches!(
            model.try_predict(&x_wrong),
            Err(FtrlError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn training_loss_improves_on_separable_data() {
        let (x, y) = separable_batch(60, 1, 7);
        let targets: Vec<bool> = y.iter().copied().collect();
        let dataset = DatasetBase::new(x, y);
        let params = Ftrl::<f64>::params()
            .alpha(0.1)
            .beta(1.0)
            .l1_penalty(0.0)
            .l2_penalty(0.0);

        let mut model = params.clone().fit_with(None, &dataset).unwrap();
        let mut previous = model
            .try_predict(dataset.records())
            .unwrap()
            .log_loss(&targets)
            .unwrap();

        for _ in 0..10 {
            model = params.clone().fit_with(Some(model), &dataset).unwrap();
            let loss = model
                .try_predict(dataset.records())
                .unwrap()
                .log_loss(&targets)
                .unwrap();
            assert!(loss < previous);
            previous = loss;
        }
    }

    #[test]
    fn strong_l1_collapses_all_weights_to_zero() {
        let (x, y) = separable_batch(20, 5, 11);
        let dataset = DatasetBase::new(x, y);
        let model = Ftrl::<f64>::params()
            .l1_penalty(100.0)
            .iterations(2)
            .fit_with(None, &dataset)
            .unwrap();

        assert!(model.weights().iter().all(|&w| w == 0.0));
    }

    #[test]
    fn zero_weighted_rows_do_not_contribute() {
        let x_full = dense_to_csr(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]]);
        let full = DatasetBase::new(x_full, array![true, false, true])
            .with_weights(array![1.0, 1.0, 0.0]);

        let x_trimmed = dense_to_csr(&[vec![1.0, 0.0], vec![0.0, 1.0]]);
        let trimmed = DatasetBase::new(x_trimmed, array![true, false]);

        let params = Ftrl::<f64>::params().l1_penalty(0.0).l2_penalty(0.1);
        let with_zero = params.clone().fit_with(None, &full).unwrap();
        let without_row = params.fit_with(None, &trimmed).unwrap();

        assert_eq!(with_zero.z(), without_row.z());
        assert_eq!(with_zero.n(), without_row.n());
    }

    #[test]
    fn non_finite_rows_are_rejected() {
        let x = dense_to_csr(&[vec![f64::NAN, 1.0]]);
        let dataset = DatasetBase::new(x, array![true]);
        let model = Ftrl::<f64>::params().fit_with(None, &dataset).unwrap();

        // the offending row was skipped, so the store is still zeroed
        assert!(model.z().iter().all(|&z| z == 0.0));
        assert!(model.n().iter().all(|&n| n == 0.0));
    }

    #[test]
    fn hogwild_training_produces_finite_state() {
        let (x, y) = separable_batch(200, 16, 5);
        let dataset = DatasetBase::new(x, y);
        let model = Ftrl::<f64>::params()
            .num_threads(4)
            .l1_penalty(0.0)
            .l2_penalty(0.1)
            .iterations(2)
            .fit_with(None, &dataset)
            .unwrap();

        assert!(model.z().iter().all(|z| z.is_finite()));
        let probabilities = model.try_predict(dataset.records()).unwrap();
        assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(&p.0)));
    }

    #[test]
    fn sharded_training_is_reproducible() {
        let (x, y) = separable_batch(80, 12, 9);
        let dataset = DatasetBase::new(x, y);
        let params = Ftrl::<f64>::params()
            .num_threads(3)
            .update_scheme(UpdateScheme::Sharded)
            .l1_penalty(0.0)
            .l2_penalty(0.1)
            .iterations(2);

        let first = params.clone().fit_with(None, &dataset).unwrap();
        let second = params.fit_with(None, &dataset).unwrap();

        assert_eq!(first.z(), second.z());
        assert_eq!(first.n(), second.n());
    }

    #[test]
    fn predict_matches_between_thread_counts() {
        let (x, y) = separable_batch(50, 6, 13);
        let dataset = DatasetBase::new(x, y);
        let model = Ftrl::<f64>::params()
            .l1_penalty(0.0)
            .fit_with(None, &dataset)
            .unwrap();

        let serial = model.try_predict(dataset.records()).unwrap();

        let mut wide = model;
        wide.params.num_threads = 4;
        let parallel = wide.try_predict(dataset.records()).unwrap();

        for (a, b) in serial.iter().zip(parallel.iter()) {
            assert_abs_diff_eq!(a.0, b.0);
        }
    }

    #[test]
    fn duplicate_indices_are_summed_before_use() {
        // two entries on the same column must behave like their sum
        let mut tri = sprs::TriMat::new((1, 3));
        tri.add_triplet(0, 1, 0.75);
        tri.add_triplet(0, 1, 0.25);
        let x_dup: CsMat<f64> = tri.to_csr();

        let x_sum = dense_to_csr(&[vec![0.0, 1.0, 0.0]]);

        let params = Ftrl::<f64>::params().l1_penalty(0.0);
        let a = params
            .clone()
            .fit_with(None, &DatasetBase::new(x_dup, array![true]))
            .unwrap();
        let b = params
            .fit_with(None, &DatasetBase::new(x_sum, array![true]))
            .unwrap();

        assert_eq!(a.z(), b.z());
        assert_eq!(a.n(), b.n());
    }
}
