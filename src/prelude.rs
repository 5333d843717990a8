//! Helper re-exports to simplify the use of common traits
pub use crate::dataset::{
    AsSingleTargets, Dataset, DatasetBase, Float, Pr, Records, SparseDataset,
};
pub use crate::error::Error;
pub use crate::metrics::BinaryClassification;
pub use crate::param_guard::ParamGuard;
pub use crate::traits::{Fit, FitWith, Predict, PredictInplace};
