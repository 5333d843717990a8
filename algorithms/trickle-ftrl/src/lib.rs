//! # FTRL-Proximal online learning
//!
//! `trickle-ftrl` provides the adaptive online-learning model family of the
//! `trickle` workspace: models that train incrementally over very
//! high-dimensional, hash-bucketed sparse feature batches with
//! per-coordinate adaptive learning rates and closed-form l1/l2 proximal
//! updates.
//!
//! ## Models
//!
//! * [`Ftrl`] — the linear FTRL-Proximal classifier. Generic over the
//!   storage width: `Ftrl<f64>` and `Ftrl<f32>` share one implementation.
//! * [`FmFtrl`] — the factorization-machine extension, adding low-rank
//!   pairwise feature interactions evaluated through a width-`k`
//!   vectorized kernel.
//! * [`ReluNet`] — shallow rectified-linear networks with one or two
//!   hidden layers and dropout, every parameter trained under the same
//!   adaptive-gradient discipline.
//!
//! ## Fitting and prediction
//!
//! Batches are CSR matrices (`sprs`) whose column indices lie in
//! `[0, nfeatures)`, wrapped in a [`trickle::DatasetBase`] together with
//! boolean targets and optional per-sample weights. A fresh fit sizes the
//! model from the batch; `fit_with(Some(model), ..)` continues online
//! learning and insists that the batch width matches the model.
//!
//! ```
//! use trickle::prelude::*;
//! use trickle_ftrl::Ftrl;
//! use ndarray::array;
//! use sprs::TriMat;
//!
//! let mut triplets = TriMat::new((4, 3));
//! triplets.add_triplet(0, 0, 1.0);
//! triplets.add_triplet(1, 1, -0.5);
//! triplets.add_triplet(2, 0, 0.25);
//! triplets.add_triplet(3, 2, 2.0);
//! let records: sprs::CsMat<f64> = triplets.to_csr();
//!
//! let dataset = DatasetBase::new(records, array![true, false, true, false]);
//! let model = Ftrl::params()
//!     .alpha(0.1)
//!     .l1_penalty(0.1)
//!     .fit_with(None, &dataset)
//!     .unwrap();
//! let probabilities = model.predict(&dataset);
//! assert_eq!(probabilities.len(), 4);
//! ```
//!
//! ## Parallel training
//!
//! Each fit call partitions rows into contiguous blocks across the
//! configured worker threads. The default [`UpdateScheme::Hogwild`] updates
//! the shared accumulators lock-free and unsynchronized, tolerating lost
//! updates on overlapping coordinates; [`UpdateScheme::Sharded`] trades
//! throughput for reproducibility. See the scheme documentation for the
//! exact guarantees.

mod accumulator;
mod batch;
mod error;
mod fm;
mod ftrl;
mod hogwild;
mod nn;

pub use error::{FtrlError, Result};
pub use fm::{FmFtrl, FmFtrlParams, FmFtrlValidParams, LatentKernel};
pub use ftrl::{Ftrl, FtrlParams, FtrlValidParams};
pub use hogwild::UpdateScheme;
pub use nn::{ReluNet, ReluNetParams, ReluNetValidParams};

#[cfg(test)]
pub(crate) mod test_util {
    use ndarray::Array1;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256Plus;
    use sprs::{CsMat, TriMat};

    /// CSR matrix from dense rows; zeros are not stored.
    pub fn dense_to_csr(rows: &[Vec<f64>]) -> CsMat<f64> {
        let ncols = rows.iter().map(|row| row.len()).max().unwrap_or(0);
        let mut triplets = TriMat::new((rows.len(), ncols));
        for (i, row) in rows.iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                if value != 0.0 {
                    triplets.add_triplet(i, j, value);
                }
            }
        }
        triplets.to_csr()
    }

    /// A linearly separable sparse batch: feature 0 is `±1` and decides the
    /// target, the remaining columns carry random noise.
    pub fn separable_batch(
        nrows: usize,
        nfeatures: usize,
        seed: u64,
    ) -> (CsMat<f64>, Array1<bool>) {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let mut triplets = TriMat::new((nrows, nfeatures));
        let mut targets = Vec::with_capacity(nrows);
        for i in 0..nrows {
            let positive: bool = rng.gen();
            triplets.add_triplet(i, 0, if positive { 1.0 } else { -1.0 });
            targets.push(positive);
            for j in 1..nfeatures {
                if rng.gen::<f64>() < 0.3 {
                    triplets.add_triplet(i, j, rng.gen_range(-1.0..1.0));
                }
            }
        }
        (triplets.to_csr(), Array1::from(targets))
    }
}
