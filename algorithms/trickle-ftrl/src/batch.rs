//! Batch validation shared by all model shapes.
//!
//! Every check here runs before the first mutation of any weight store, so
//! a rejected call leaves the model exactly as it was.

use sprs::CsMat;
use trickle::dataset::AsSingleTargets;
use trickle::{DatasetBase, Float};

use crate::error::{FtrlError, Result};

/// Validate a training batch: CSR storage, one target per row, and (when
/// present) one weight per row.
pub(crate) fn validate_fit_batch<F, T>(dataset: &DatasetBase<CsMat<F>, T>) -> Result<()>
where
    F: Float,
    T: AsSingleTargets<Elem = bool>,
{
    let x = dataset.records();
    if !x.is_csr() {
        return Err(FtrlError::UnsupportedStorage);
    }

    let nsamples = x.rows();
    let ntargets = dataset.targets().as_single_targets().len();
    if ntargets != nsamples {
        return Err(FtrlError::MismatchedTargetCount {
            expected: nsamples,
            found: ntargets,
        });
    }

    if !dataset.weights.is_empty() && dataset.weights.len() != nsamples {
        return Err(FtrlError::MismatchedWeightCount {
            expected: nsamples,
            found: dataset.weights.len(),
        });
    }

    Ok(())
}

/// Validate a prediction batch against the width the model was sized for.
pub(crate) fn validate_predict_batch<F: Float>(x: &CsMat<F>, nfeatures: usize) -> Result<()> {
    if !x.is_csr() {
        return Err(FtrlError::UnsupportedStorage);
    }
    check_width(x, nfeatures)
}

/// The dimension guard: the batch's column count must equal the model's
/// configured hash width.
pub(crate) fn check_width<F: Float>(x: &CsMat<F>, nfeatures: usize) -> Result<()> {
    if x.cols() != nfeatures {
        return Err(FtrlError::DimensionMismatch {
            expected: nfeatures,
            found: x.cols(),
        });
    }
    Ok(())
}
