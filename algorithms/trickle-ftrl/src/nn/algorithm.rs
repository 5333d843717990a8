use std::ops::Range;

use ndarray::{Array1, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use sprs::CsMat;

use trickle::dataset::{fold_row_into, AsSingleTargets};
use trickle::traits::{Fit, FitWith, PredictInplace};
use trickle::{DatasetBase, Float, Pr};

use crate::accumulator::sigmoid;
use crate::batch::{check_width, validate_fit_batch, validate_predict_batch};
use crate::error::{FtrlError, Result};
use crate::hogwild::{build_pool, contiguous_blocks, Hogwild, UpdateScheme};
use crate::nn::{DenseLayer, ReluNet, ReluNetValidParams};

impl<F, T> Fit<CsMat<F>, T, FtrlError> for ReluNetValidParams<F>
where
    F: Float,
    T: AsSingleTargets<Elem = bool>,
{
    type Object = ReluNet<F>;

    /// Fit a fresh model, sizing the hash width from the batch.
    fn fit(&self, dataset: &DatasetBase<CsMat<F>, T>) -> Result<Self::Object> {
        self.fit_with(None, dataset)
    }
}

impl<'a, F, T> FitWith<'a, CsMat<F>, T, FtrlError> for ReluNetValidParams<F>
where
    F: Float,
    T: AsSingleTargets<Elem = bool>,
{
    type ObjectIn = Option<ReluNet<F>>;
    type ObjectOut = ReluNet<F>;

    /// Fit a rectified-linear network given a sparse feature matrix and a
    /// boolean target variable.
    ///
    /// Passing `None` starts a fresh seed-initialized network sized to the
    /// batch; passing `Some(model)` continues training the existing state,
    /// in which case the batch's column count must match the model's hash
    /// width.
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
            None => ReluNet::new(self.clone(), x.cols()),
        };

        let targets = dataset.targets().as_single_targets();
        let ReluNet { params, layers } = &mut model;
        for epoch in 0..params.iterations {
            run_epoch(params, layers, x, targets, &dataset.weights, epoch)?;
        }

        Ok(model)
    }
}

impl<F: Float> PredictInplace<CsMat<F>, Array1<Pr>> for ReluNet<F> {
    /// Given an input matrix `X`, with shape `(n_samples, n_features)`,
    /// `predict` returns the target variable according to the parameters
    /// learned from the training data distribution. Dropout is inactive
    /// outside of fit.
    ///
    /// Panics when the batch fails validation; [`ReluNet::try_predict`] is
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

impl<F: Float> ReluNet<F> {
    /// Predict one probability per row, validating storage order and the
    /// hash width first.
    pub fn try_predict(&self, x: &CsMat<F>) -> Result<Array1<Pr>> {
        validate_predict_batch(x, self.nfeatures())?;

        let nrows = x.rows();
        let nthreads = self.params.num_threads.min(nrows).max(1);
        let mut out = vec![Pr(0.0); nrows];

        if nthreads <= 1 {
            predict_rows(&self.params, &self.layers, x, 0..nrows, &mut out);
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
            let layers = &self.layers;
            pool.scope(|scope| {
                for (block, slice) in blocks.into_iter().zip(slices) {
                    scope.spawn(move |_| predict_rows(params, layers, x, block, slice));
                }
            });
        }

        Ok(Array1::from(out))
    }
}

/// Per-worker scratch space holding one row's activations, dropout scales
/// and back-propagated gradients for every hidden layer.
struct NetScratch<F> {
    row: Vec<(usize, F)>,
    pre: Vec<Vec<F>>,
    act: Vec<Vec<F>>,
    mask: Vec<Vec<F>>,
    delta: Vec<Vec<F>>,
}

impl<F: Float> NetScratch<F> {
    fn new(hidden_widths: &[usize]) -> Self {
        let alloc = || {
            hidden_widths
                .iter()
                .map(|&w| vec![F::zero(); w])
                .collect::<Vec<_>>()
        };
        Self {
            row: Vec::new(),
            pre: alloc(),
            act: alloc(),
            mask: alloc(),
            delta: alloc(),
        }
    }
}

fn run_epoch<F: Float>(
    params: &ReluNetValidParams<F>,
    layers: &mut Vec<DenseLayer<F>>,
    x: &CsMat<F>,
    targets: ArrayView1<bool>,
    weights: &Array1<f32>,
    epoch: usize,
) -> Result<()> {
    let nrows = x.rows();
    let nthreads = params.num_threads.min(nrows).max(1);

    // the output unit cannot be partitioned by coordinate, so the strict
    // scheme runs the deterministic sequential pass instead
    if nthreads <= 1 || params.update_scheme == UpdateScheme::Sharded {
        let mut rng = worker_rng(params.seed, epoch, nthreads, 0);
        fit_rows(params, layers, x, targets, weights, 0..nrows, &mut rng);
        return Ok(());
    }

    let pool = build_pool(nthreads)?;
    let blocks = contiguous_blocks(nrows, nthreads);
    let shared = Hogwild::new(layers);
    let shared = &shared;
    pool.scope(|scope| {
        for (worker, block) in blocks.into_iter().enumerate() {
            scope.spawn(move |_| {
                // racy by design; see the hogwild module contract
                let layers = unsafe { shared.get() };
                let mut rng = worker_rng(params.seed, epoch, nthreads, worker);
                fit_rows(params, layers, x, targets, weights, block, &mut rng);
            });
        }
    });

    Ok(())
}

fn worker_rng(seed: u64, epoch: usize, nthreads: usize, worker: usize) -> Xoshiro256Plus {
    Xoshiro256Plus::seed_from_u64(seed.wrapping_add((epoch * nthreads + worker + 1) as u64))
}

fn fit_rows<F: Float>(
    params: &ReluNetValidParams<F>,
    layers: &mut [DenseLayer<F>],
    x: &CsMat<F>,
    targets: ArrayView1<bool>,
    weights: &Array1<f32>,
    rows: Range<usize>,
    rng: &mut Xoshiro256Plus,
) {
    let mut scratch = NetScratch::new(&params.hidden_layers);
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

        let score = forward_row(params, layers, &mut scratch, Some(&mut *rng));
        let truth = if targets[i] { F::one() } else { F::zero() };
        let err = (sigmoid(score) - truth) * sample_weight;
        backward_row(params, layers, &mut scratch, err);
    }
}

fn predict_rows<F: Float>(
    params: &ReluNetValidParams<F>,
    layers: &[DenseLayer<F>],
    x: &CsMat<F>,
    rows: Range<usize>,
    out: &mut [Pr],
) {
    let mut scratch = NetScratch::new(&params.hidden_layers);
    let offset = rows.start;
    for i in rows {
        let row = match x.outer_view(i) {
            Some(row) => row,
            None => continue,
        };
        fold_row_into(row.indices(), row.data(), &mut scratch.row);

        let score = forward_row(params, layers, &mut scratch, None);
        out[i - offset] = Pr(sigmoid(score).to_f32().unwrap_or_default());
    }
}

fn layer_weight<F: Float>(params: &ReluNetValidParams<F>, layer: &DenseLayer<F>, slot: usize) -> F {
    layer.state.weight_at(
        slot,
        params.alpha,
        params.beta,
        params.l1_penalty,
        params.l2_penalty,
    )
}

/// Forward pass over one folded row. With a generator the hidden
/// activations are thinned by inverted dropout; without one (prediction)
/// every unit participates at full scale.
fn forward_row<F: Float>(
    params: &ReluNetValidParams<F>,
    layers: &[DenseLayer<F>],
    scratch: &mut NetScratch<F>,
    mut dropout_rng: Option<&mut Xoshiro256Plus>,
) -> F {
    let nhidden = layers.len() - 1;
    let dropout = params.dropout_rate.to_f64().unwrap_or(0.0);
    let keep_scale = F::one() / (F::one() - params.dropout_rate);

    for l in 0..nhidden {
        let layer = &layers[l];
        let width = layer.fan_out;
        for slot in scratch.pre[l].iter_mut() {
            *slot = F::zero();
        }

        if l == 0 {
            // sparse-times-dense product over the row's nonzeros
            for &(idx, value) in &scratch.row {
                let base = idx * width;
                for j in 0..width {
                    scratch.pre[l][j] += layer_weight(params, layer, base + j) * value;
                }
            }
        } else {
            for i in 0..layer.fan_in {
                let activation = scratch.act[l - 1][i];
                if activation == F::zero() {
                    continue;
                }
                let base = i * width;
                for j in 0..width {
                    scratch.pre[l][j] += layer_weight(params, layer, base + j) * activation;
                }
            }
        }

        for j in 0..width {
            let scale = match dropout_rng.as_deref_mut() {
                Some(rng) if dropout > 0.0 => {
                    if rng.gen::<f64>() < dropout {
                        F::zero()
                    } else {
                        keep_scale
                    }
                }
                _ => F::one(),
            };
            scratch.mask[l][j] = scale;
            scratch.act[l][j] = F::max(scratch.pre[l][j], F::zero()) * scale;
        }
    }

    let output = &layers[nhidden];
    let mut score = F::zero();
    for (i, &activation) in scratch.act[nhidden - 1].iter().enumerate() {
        score += layer_weight(params, output, i) * activation;
    }
    score
}

/// Backward pass over one folded row; every weight of every block receives
/// the closed-form adaptive update, with gradients taken at the weights
/// the forward pass saw.
fn backward_row<F: Float>(
    params: &ReluNetValidParams<F>,
    layers: &mut [DenseLayer<F>],
    scratch: &mut NetScratch<F>,
    err: F,
) {
    let nhidden = layers.len() - 1;

    // output block: gradient and the back-propagated signal share w_old
    {
        let output = &mut layers[nhidden];
        for i in 0..output.fan_in {
            let w_old = layer_weight(params, output, i);
            scratch.delta[nhidden - 1][i] = err * w_old;
            output
                .state
                .update_at(i, err * scratch.act[nhidden - 1][i], w_old, params.alpha);
        }
    }

    for l in (0..nhidden).rev() {
        // through the dropout scale and the ReLU gate
        let width = layers[l].fan_out;
        for j in 0..width {
            let gated = scratch.delta[l][j] * scratch.mask[l][j];
            scratch.delta[l][j] = if scratch.pre[l][j] > F::zero() {
                gated
            } else {
                F::zero()
            };
        }

        if l > 0 {
            let layer = &mut layers[l];
            for i in 0..layer.fan_in {
                let activation = scratch.act[l - 1][i];
                let base = i * layer.fan_out;
                let mut propagated = F::zero();
                for j in 0..layer.fan_out {
                    let delta = scratch.delta[l][j];
                    let w_old = layer_weight(params, layer, base + j);
                    propagated += w_old * delta;
                    layer
                        .state
                        .update_at(base + j, delta * activation, w_old, params.alpha);
                }
                scratch.delta[l - 1][i] = propagated;
            }
        } else {
            let layer = &mut layers[0];
            for &(idx, value) in &scratch.row {
                let base = idx * layer.fan_out;
                for j in 0..layer.fan_out {
                    let delta = scratch.delta[0][j];
                    if delta == F::zero() {
                        continue;
                    }
                    let w_old = layer_weight(params, layer, base + j);
                    layer
                        .state
                        .update_at(base + j, delta * value, w_old, params.alpha);
                }
            }
        }
    }
}
