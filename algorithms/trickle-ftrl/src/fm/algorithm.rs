use std::ops::Range;

use ndarray::{Array1, ArrayView1};
use sprs::CsMat;

use trickle::dataset::{fold_row_into, AsSingleTargets};
use trickle::traits::{Fit, FitWith, PredictInplace};
use trickle::{DatasetBase, Float, Pr};

use crate::accumulator::{sigmoid, AdaptiveState};
use crate::batch::{check_width, validate_fit_batch, validate_predict_batch};
use crate::error::{FtrlError, Result};
use crate::fm::kernel::{interaction_term, LatentKernel};
use crate::fm::{FmFtrl, FmFtrlValidParams};
use crate::hogwild::{build_pool, contiguous_blocks, Hogwild, UpdateScheme};

impl<F, T> Fit<CsMat<F>, T, FtrlError> for FmFtrlValidParams<F>
where
    F: Float + LatentKernel,
    T: AsSingleTargets<Elem = bool>,
{
    type Object = FmFtrl<F>;

    /// Fit a fresh model, sizing the hash width from the batch.
    fn fit(&self, dataset: &DatasetBase<CsMat<F>, T>) -> Result<Self::Object> {
        self.fit_with(None, dataset)
    }
}

impl<'a, F, T> FitWith<'a, CsMat<F>, T, FtrlError> for FmFtrlValidParams<F>
where
    F: Float + LatentKernel,
    T: AsSingleTargets<Elem = bool>,
{
    type ObjectIn = Option<FmFtrl<F>>;
    type ObjectOut = FmFtrl<F>;

    /// Fit a factorization machine given a sparse feature matrix and a
    /// boolean target variable.
    ///
    /// Passing `None` starts a fresh model sized to the batch, with
    /// seed-initialized latent factors; passing `Some(model)` continues
    /// training the existing state, in which case the batch's column count
    /// must match the model's hash width.
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
            None => FmFtrl::new(self.clone(), x.cols()),
        };

        let targets = dataset.targets().as_single_targets();
        let FmFtrl {
            params,
            linear,
            latent,
        } = &mut model;
        for _ in 0..params.iterations {
            run_epoch(params, linear, latent, x, targets, &dataset.weights)?;
        }

        Ok(model)
    }
}

impl<F: Float + LatentKernel> PredictInplace<CsMat<F>, Array1<Pr>> for FmFtrl<F> {
    /// Given an input matrix `X`, with shape `(n_samples, n_features)`,
    /// `predict` returns the target variable according to the parameters
    /// learned from the training data distribution.
    ///
    /// Panics when the batch fails validation; [`FmFtrl::try_predict`] is
    /// the fallible variant.
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

impl<F: Float + LatentKernel> FmFtrl<F> {
    /// Predict one probability per row, validating storage order and the
    /// hash width first.
    pub fn try_predict(&self, x: &CsMat<F>) -> Result<Array1<Pr>> {
        validate_predict_batch(x, self.nfeatures())?;

        let nrows = x.rows();
        let nthreads = self.params.num_threads.min(nrows).max(1);
        let mut out = vec![Pr(0.0); nrows];

        if nthreads <= 1 {
            predict_rows(&self.params, &self.linear, &self.latent, x, 0..nrows, &mut out);
        } else {
            let pool = build_pool(nthreads)?;
            let blocks = contiguous_blocks(nrows, nthreads);

            let mut slices = Vec::with_capacity(blocks.len());
            let mut rest = out.as_mut_slice();
            for block in &blocks {
                let (head, tail) = rest.split_at_mut(block.len());
                slices.push(head);
                rest = tail;
            }

            let params = &self.params;
            let linear = &self.linear;
            let latent = &self.latent;
            pool.scope(|scope| {
                for (block, slice) in blocks.into_iter().zip(slices) {
                    scope.spawn(move |_| {
                        predict_rows(params, linear, latent, x, block, slice)
                    });
                }
            });
        }

        Ok(Array1::from(out))
    }
}

/// Per-worker scratch space; sized once, reused across rows.
struct FmScratch<F> {
    row: Vec<(usize, F)>,
    weights: Vec<F>,
    factors: Vec<F>,
    sums: Vec<F>,
    sums_sq: Vec<F>,
}

impl<F: Float> FmScratch<F> {
    fn new(embedding_dim: usize) -> Self {
        Self {
            row: Vec::new(),
            weights: Vec::new(),
            factors: Vec::new(),
            sums: vec![F::zero(); embedding_dim],
            sums_sq: vec![F::zero(); embedding_dim],
        }
    }
}

fn run_epoch<F: Float + LatentKernel>(
    params: &FmFtrlValidParams<F>,
    linear: &mut AdaptiveState<F>,
    latent: &mut AdaptiveState<F>,
    x: &CsMat<F>,
    targets: ArrayView1<bool>,
    weights: &Array1<f32>,
) -> Result<()> {
    let nrows = x.rows();
    let nthreads = params.num_threads.min(nrows).max(1);

    if nthreads <= 1 {
        fit_rows(params, linear, latent, x, targets, weights, 0..nrows);
        return Ok(());
    }

    let pool = build_pool(nthreads)?;
    match params.update_scheme {
        UpdateScheme::Hogwild => {
            let blocks = contiguous_blocks(nrows, nthreads);
            let mut stores = (linear, latent);
            let shared = Hogwild::new(&mut stores);
            let shared = &shared;
            pool.scope(|scope| {
                for block in blocks {
                    scope.spawn(move |_| {
                        // racy by design; see the hogwild module contract
                        let (linear, latent) = unsafe { shared.get() };
                        fit_rows(params, linear, latent, x, targets, weights, block);
                    });
                }
            });
        }
        UpdateScheme::Sharded => {
            let k = params.embedding_dim;
            let linear_snapshot: Vec<F> = (0..linear.len())
                .map(|idx| {
                    linear.weight_at(idx, params.alpha, params.beta, params.l1_penalty, params.l2_penalty)
                })
                .collect();
            let latent_snapshot: Vec<F> = (0..latent.len())
                .map(|slot| {
                    latent.weight_at(slot, params.latent_alpha, params.beta, params.latent_l1, params.latent_l2)
                })
                .collect();
            debug_assert_eq!(latent_snapshot.len(), linear_snapshot.len() * k);

            let shards = contiguous_blocks(linear.len(), nthreads);
            let mut stores = (linear, latent);
            let shared = Hogwild::new(&mut stores);
            let shared = &shared;
            let linear_snapshot = &linear_snapshot;
            let latent_snapshot = &latent_snapshot;
            pool.scope(|scope| {
                for shard in shards {
                    scope.spawn(move |_| {
                        // writes stay inside this worker's coordinate shard
                        let (linear, latent) = unsafe { shared.get() };
                        fit_shard(
                            params,
                            linear,
                            latent,
                            x,
                            targets,
                            weights,
                            shard,
                            linear_snapshot,
                            latent_snapshot,
                        );
                    });
                }
            });
        }
    }

    Ok(())
}

/// One sequential pass over a block of rows, updating any touched
/// coordinate of both the linear and the latent store.
fn fit_rows<F: Float + LatentKernel>(
    params: &FmFtrlValidParams<F>,
    linear: &mut AdaptiveState<F>,
    latent: &mut AdaptiveState<F>,
    x: &CsMat<F>,
    targets: ArrayView1<bool>,
    weights: &Array1<f32>,
    rows: Range<usize>,
) {
    let k = params.embedding_dim;
    let mut scratch = FmScratch::new(k);
    for i in rows {
        let row = match x.outer_view(i) {
            Some(row) => row,
            None => continue,
        };
        if !fold_row_into(row.indices(), row.data(), &mut scratch.row) {
            // non-finite feature values: reject the row, keep the store intact
            continue;
        }

        let sample_weight = F::cast(if weights.is_empty() { 1.0 } else { weights[i] });

        // forward pass, materializing every touched weight once
        scratch.weights.clear();
        scratch.factors.clear();
        for lane in scratch.sums.iter_mut() {
            *lane = F::zero();
        }
        for lane in scratch.sums_sq.iter_mut() {
            *lane = F::zero();
        }

        let mut score = F::zero();
        for &(idx, value) in &scratch.row {
            let weight = linear.weight_at(
                idx,
                params.alpha,
                params.beta,
                params.l1_penalty,
                params.l2_penalty,
            );
            scratch.weights.push(weight);
            score += weight * value;
        }
        for (pos, &(idx, value)) in scratch.row.iter().enumerate() {
            let base = idx * k;
            for lane in 0..k {
                scratch.factors.push(latent.weight_at(
                    base + lane,
                    params.latent_alpha,
                    params.beta,
                    params.latent_l1,
                    params.latent_l2,
                ));
            }
            let factors = &scratch.factors[pos * k..(pos + 1) * k];
            F::accumulate_lanes(factors, value, &mut scratch.sums, &mut scratch.sums_sq);
        }
        score += interaction_term(&scratch.sums, &scratch.sums_sq);

        // backward pass through the shared adaptive update
        let truth = if targets[i] { F::one() } else { F::zero() };
        let err = (sigmoid(score) - truth) * sample_weight;
        for (pos, &(idx, value)) in scratch.row.iter().enumerate() {
            linear.update_at(idx, err * value, scratch.weights[pos], params.alpha);
            let base = idx * k;
            for lane in 0..k {
                let factor = scratch.factors[pos * k + lane];
                let gradient = err * (scratch.sums[lane] * value - factor * value * value);
                latent.update_at(base + lane, gradient, factor, params.latent_alpha);
            }
        }
    }
}

/// One sequential pass over all rows, restricted to the features of one
/// shard; a feature's latent lanes live in its shard. Foreign weights are
/// read from the epoch-start snapshots.
#[allow(clippy::too_many_arguments)]
fn fit_shard<F: Float + LatentKernel>(
    params: &FmFtrlValidParams<F>,
    linear: &mut AdaptiveState<F>,
    latent: &mut AdaptiveState<F>,
    x: &CsMat<F>,
    targets: ArrayView1<bool>,
    weights: &Array1<f32>,
    shard: Range<usize>,
    linear_snapshot: &[F],
    latent_snapshot: &[F],
) {
    let k = params.embedding_dim;
    let mut scratch = FmScratch::new(k);
    for i in 0..x.rows() {
        let row = match x.outer_view(i) {
            Some(row) => row,
            None => continue,
        };
        if !fold_row_into(row.indices(), row.data(), &mut scratch.row) {
            continue;
        }

        let sample_weight = F::cast(if weights.is_empty() { 1.0 } else { weights[i] });

        scratch.weights.clear();
        scratch.factors.clear();
        for lane in scratch.sums.iter_mut() {
            *lane = F::zero();
        }
        for lane in scratch.sums_sq.iter_mut() {
            *lane = F::zero();
        }

        let mut score = F::zero();
        for &(idx, value) in &scratch.row {
            let weight = if shard.contains(&idx) {
                linear.weight_at(
                    idx,
                    params.alpha,
                    params.beta,
                    params.l1_penalty,
                    params.l2_penalty,
                )
            } else {
                linear_snapshot[idx]
            };
            scratch.weights.push(weight);
            score += weight * value;
        }
        for (pos, &(idx, value)) in scratch.row.iter().enumerate() {
            let base = idx * k;
            let own = shard.contains(&idx);
            for lane in 0..k {
                let factor = if own {
                    latent.weight_at(
                        base + lane,
                        params.latent_alpha,
                        params.beta,
                        params.latent_l1,
                        params.latent_l2,
                    )
                } else {
                    latent_snapshot[base + lane]
                };
                scratch.factors.push(factor);
            }
            let factors = &scratch.factors[pos * k..(pos + 1) * k];
            F::accumulate_lanes(factors, value, &mut scratch.sums, &mut scratch.sums_sq);
        }
        score += interaction_term(&scratch.sums, &scratch.sums_sq);

        let truth = if targets[i] { F::one() } else { F::zero() };
        let err = (sigmoid(score) - truth) * sample_weight;
        for (pos, &(idx, value)) in scratch.row.iter().enumerate() {
            if !shard.contains(&idx) {
                continue;
            }
            linear.update_at(idx, err * value, scratch.weights[pos], params.alpha);
            let base = idx * k;
            for lane in 0..k {
                let factor = scratch.factors[pos * k + lane];
                let gradient = err * (scratch.sums[lane] * value - factor * value * value);
                latent.update_at(base + lane, gradient, factor, params.latent_alpha);
            }
        }
    }
}

fn predict_rows<F: Float + LatentKernel>(
    params: &FmFtrlValidParams<F>,
    linear: &AdaptiveState<F>,
    latent: &AdaptiveState<F>,
    x: &CsMat<F>,
    rows: Range<usize>,
    out: &mut [Pr],
) {
    let k = params.embedding_dim;
    let mut scratch = FmScratch::new(k);
    let offset = rows.start;
    for i in rows {
        let row = match x.outer_view(i) {
            Some(row) => row,
            None => continue,
        };
        fold_row_into(row.indices(), row.data(), &mut scratch.row);

        for lane in scratch.sums.iter_mut() {
            *lane = F::zero();
        }
        for lane in scratch.sums_sq.iter_mut() {
            *lane = F::zero();
        }
        scratch.factors.clear();

        let mut score = F::zero();
        for &(idx, value) in &scratch.row {
            let weight = linear.weight_at(
                idx,
                params.alpha,
                params.beta,
                params.l1_penalty,
                params.l2_penalty,
            );
            score += weight * value;
        }
        for (pos, &(idx, value)) in scratch.row.iter().enumerate() {
            let base = idx * k;
            for lane in 0..k {
                scratch.factors.push(latent.weight_at(
                    base + lane,
                    params.latent_alpha,
                    params.beta,
                    params.latent_l1,
                    params.latent_l2,
                ));
            }
            let factors = &scratch.factors[pos * k..(pos + 1) * k];
            F::accumulate_lanes(factors, value, &mut scratch.sums, &mut scratch.sums_sq);
        }
        score += interaction_term(&scratch.sums, &scratch.sums_sq);

        out[i - offset] = Pr(sigmoid(score).to_f32().unwrap_or_default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{dense_to_csr, separable_batch};
    use approx::assert_abs_diff_eq;
    use trickle::metrics::BinaryClassification;
    use trickle::prelude::*;
    use trickle::ParamGuard;

    /// Build a model whose latent factors materialize to exactly the given
    /// values: with `n = 0`, `beta = 0`, `latent_alpha = 1`, `latent_l1 = 0`
    /// and `latent_l2 = 1` the closed form reduces to `factor = -z`.
    fn fm_with_factors(nfeatures: usize, factors: &[f64]) -> FmFtrl<f64> {
        let params = FmFtrl::<f64>::params()
            .beta(0.0)
            .latent_alpha(1.0)
            .latent_l1(0.0)
            .latent_l2(1.0)
            .embedding_dim(factors.len() / nfeatures)
            .check()
            .unwrap();
        let mut model = FmFtrl::new(params, nfeatures);
        for (slot, &factor) in factors.iter().enumerate() {
            model.latent.z[slot] = -factor;
            model.latent.n[slot] = 0.0;
        }
        model
    }

    #[test]
    fn factors_materialize_as_constructed() {
        let model = fm_with_factors(2, &[0.3, -0.8]);
        let factors = model.latent_factors();
        assert_abs_diff_eq!(factors[[0, 0]], 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(factors[[1, 0]], -0.8, epsilon = 1e-12);
    }

    #[test]
    fn interaction_matches_brute_force_pairwise_sum() {
        // two nonzero features, k = 1: the O(nnz·k) identity must equal
        // v_i · v_j · x_i · x_j
        let (v_i, v_j) = (0.3f64, -0.8);
        let (x_i, x_j) = (2.0f64, 0.5);
        let model = fm_with_factors(2, &[v_i, v_j]);

        let x = dense_to_csr(&[vec![x_i, x_j]]);
        let probability = model.try_predict(&x).unwrap()[0].0 as f64;

        // linear part is zero, so the score is the interaction term alone
        let brute_force = v_i * v_j * x_i * x_j;
        let expected = 1.0 / (1.0 + (-brute_force).exp());
        assert_abs_diff_eq!(probability, expected, epsilon = 1e-6);
    }

    #[test]
    fn single_threaded_replay_is_deterministic() {
        let (x, y) = separable_batch(30, 8, 21);
        let dataset = DatasetBase::new(x, y);
        let params = FmFtrl::<f64>::params().iterations(2).seed(7);

        let first = params.clone().fit_with(None, &dataset).unwrap();
        let second = params.fit_with(None, &dataset).unwrap();

        assert_eq!(first.linear.z, second.linear.z);
        assert_eq!(first.latent.z, second.latent.z);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let (x, y) = separable_batch(10, 6, 3);
        let dataset = DatasetBase::new(x, y);
        let model = FmFtrl::<f64>::params().fit_with(None, &dataset).unwrap();

        let (x_wrong, y_wrong) = separable_batch(4, 3, 4);
        assert!(matches!(
            model.try_predict(&x_wrong),
            Err(FtrlError::DimensionMismatch { .. })
        ));

        let narrow = DatasetBase::new(x_wrong, y_wrong);
        assert!(matches!(
            FmFtrl::<f64>::params().fit_with(Some(model), &narrow),
            Err(FtrlError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn training_reduces_loss_on_interaction_data() {
        // y depends only on whether features 0 and 1 co-occur, which the
        // linear part alone cannot express
        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for case in 0..40 {
            let (a, b) = (case % 2 == 0, case % 4 < 2);
            let mut row = vec![0.0; 4];
            if a {
                row[0] = 1.0;
            }
            if b {
                row[1] = 1.0;
            }
            row[2 + case % 2] = 0.5;
            rows.push(row);
            targets.push(a && b);
        }
        let dataset = DatasetBase::new(dense_to_csr(&rows), ndarray::Array1::from(targets.clone()));

        let params = FmFtrl::<f64>::params()
            .alpha(0.1)
            .latent_alpha(0.1)
            .latent_init(0.1)
            .l1_penalty(0.0)
            .embedding_dim(2)
            .seed(3);

        let model = params.clone().fit_with(None, &dataset).unwrap();
        let initial = model
            .try_predict(dataset.records())
            .unwrap()
            .log_loss(&targets)
            .unwrap();

        let mut model = model;
        for _ in 0..40 {
            model = params.clone().fit_with(Some(model), &dataset).unwrap();
        }
        let trained = model
            .try_predict(dataset.records())
            .unwrap()
            .log_loss(&targets)
            .unwrap();

        assert!(trained < initial);
    }

    #[test]
    fn hogwild_training_produces_finite_state() {
        let (x, y) = separable_batch(150, 12, 17);
        let dataset = DatasetBase::new(x, y);
        let model = FmFtrl::<f64>::params()
            .num_threads(4)
            .iterations(2)
            .fit_with(None, &dataset)
            .unwrap();

        assert!(model.linear.z.iter().all(|z| z.is_finite()));
        assert!(model.latent.z.iter().all(|z| z.is_finite()));
        let probabilities = model.try_predict(dataset.records()).unwrap();
        assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(&p.0)));
    }

    #[test]
    fn sharded_training_is_reproducible() {
        let (x, y) = separable_batch(60, 10, 29);
        let dataset = DatasetBase::new(x, y);
        let params = FmFtrl::<f64>::params()
            .num_threads(3)
            .update_scheme(UpdateScheme::Sharded)
            .iterations(2);

        let first = params.clone().fit_with(None, &dataset).unwrap();
        let second = params.fit_with(None, &dataset).unwrap();

        assert_eq!(first.linear.z, second.linear.z);
        assert_eq!(first.latent.z, second.latent.z);
        assert_eq!(first.latent.n, second.latent.n);
    }

    #[test]
    fn latent_seed_controls_initialization() {
        let params_a = FmFtrl::<f64>::params().seed(1).check().unwrap();
        let params_b = FmFtrl::<f64>::params().seed(2).check().unwrap();
        let a = FmFtrl::new(params_a.clone(), 5);
        let b = FmFtrl::new(params_b, 5);
        let a2 = FmFtrl::new(params_a, 5);

        assert_eq!(a.latent.z, a2.latent.z);
        assert_ne!(a.latent.z, b.latent.z);
    }

    #[test]
    fn get_weights_shapes() {
        let (x, y) = separable_batch(10, 7, 31);
        let dataset = DatasetBase::new(x, y);
        let model = FmFtrl::<f64>::params()
            .embedding_dim(3)
            .fit_with(None, &dataset)
            .unwrap();

        assert_eq!(model.weights().len(), 7);
        assert_eq!(model.latent_factors().dim(), (7, 3));
    }
}
