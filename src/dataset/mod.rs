//! Datasets
//!
//! This module implements the dataset struct and the helper traits that give
//! algorithms a uniform view over dense and sparse (CSR) feature batches.
use ndarray::{Array1, Array2, ScalarOperand};

use num_traits::{FromPrimitive, NumAssignOps, NumCast, Signed};
use rand::distributions::uniform::SampleUniform;
use sprs::CsMat;

use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::Deref;

mod impl_dataset;
mod impl_records;
mod impl_targets;
mod sparse;

pub use impl_targets::AsSingleTargets;
pub use sparse::fold_row_into;

/// Floating point numbers
///
/// This trait bound multiplexes the common assumptions made about floating
/// point numbers and implements them for 32bit and 64bit floating points.
/// Records, weights and latent factors are all generic over this trait, so a
/// single algorithm implementation covers both storage widths.
pub trait Float:
    FromPrimitive
    + num_traits::Float
    + PartialOrd
    + Sync
    + Send
    + Default
    + fmt::Display
    + fmt::Debug
    + Signed
    + Sum
    + NumAssignOps
    + SampleUniform
    + ScalarOperand
    + approx::AbsDiffEq<Epsilon = Self>
{
    fn cast<T: NumCast>(x: T) -> Self {
        NumCast::from(x).unwrap()
    }
}

impl Float for f32 {}
impl Float for f64 {}

/// Probability types
///
/// This helper struct exists to distinguish probabilities from plain floating
/// points, so a binary classifier can advertise the meaning of its output in
/// its `Predict` signature.
#[cfg_attr(
    feature = "serde",
    derive(serde_crate::Serialize, serde_crate::Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Copy, Clone, Default)]
pub struct Pr(pub f32);

impl Pr {
    pub fn even() -> Pr {
        Pr(0.5)
    }
}

impl PartialEq for Pr {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Pr {
    fn partial_cmp(&self, other: &Pr) -> Option<Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl Deref for Pr {
    type Target = f32;

    fn deref(&self) -> &f32 {
        &self.0
    }
}

/// Record trait
///
/// Implemented for anything that can act as the feature block of a dataset:
/// dense `ndarray` matrices and `sprs` CSR matrices alike.
pub trait Records: Sized {
    type Elem;

    fn nsamples(&self) -> usize;
    fn nfeatures(&self) -> usize;
}

/// DatasetBase
///
/// This is the fundamental structure of a dataset. It contains the feature
/// records, the targets and optional per-sample weights. Hash-bucketed
/// feature spaces are anonymous, so no feature names are carried.
///
/// # Fields
///
/// * `records`: a two-dimensional matrix with dimensionality (nsamples,
///   nfeatures), dense or CSR sparse
/// * `targets`: one target per sample
/// * `weights`: optional per-sample weights with dimensionality (nsamples);
///   an empty array means every sample counts with weight one
pub struct DatasetBase<R, T>
where
    R: Records,
{
    pub records: R,
    pub targets: T,

    pub weights: Array1<f32>,
}

/// Dataset with dense records
pub type Dataset<F, L = bool> = DatasetBase<Array2<F>, Array1<L>>;

/// Dataset with hash-bucketed CSR records, the common case for this
/// workspace: column indices lie in `[0, nfeatures)` and every row is an
/// ordered sequence of `(index, value)` pairs.
pub type SparseDataset<F, L = bool> = DatasetBase<CsMat<F>, Array1<L>>;
