//! Error types shared across the workspace
//!
use thiserror::Error;

use ndarray::ShapeError;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("invalid parameter {0}")]
    Parameters(String),
    #[error("invalid ndarray shape {0}")]
    NdShape(#[from] ShapeError),
    #[error("mismatched sample counts {expected} and {found}")]
    MismatchedSamples { expected: usize, found: usize },
    #[error("multiple targets not supported")]
    MultipleTargets,
}
