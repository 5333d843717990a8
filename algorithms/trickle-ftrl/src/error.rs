use thiserror::Error;

/// Simplified `Result` using [`FtrlError`] as error type
pub type Result<T> = std::result::Result<T, FtrlError>;

#[derive(Error, Debug, Clone)]
pub enum FtrlError {
    /// The batch's column count disagrees with the width the model was
    /// sized for. Raised by every predict call and by incremental fits;
    /// a fresh fit instead adopts the batch's width.
    #[error("Dimension mismatch: expected {expected} features, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("alpha must be positive and finite, but is {0}")]
    InvalidAlpha(f32),
    #[error("beta must be non-negative and finite, but is {0}")]
    InvalidBeta(f32),
    #[error("l1 penalty must be non-negative and finite, but is {0}")]
    InvalidL1Penalty(f32),
    #[error("l2 penalty must be non-negative and finite, but is {0}")]
    InvalidL2Penalty(f32),
    #[error("number of iterations must be bigger than 0")]
    InvalidIterations,
    #[error("number of worker threads must be bigger than 0")]
    InvalidNumThreads,
    #[error("embedding dimension must be bigger than 0")]
    InvalidEmbeddingDim,
    #[error("initialization scale must be positive and finite, but is {0}")]
    InvalidInitScale(f32),
    #[error("hidden layers must hold one or two widths, each bigger than 0")]
    InvalidHiddenLayers,
    #[error("dropout rate must be in [0, 1), but is {0}")]
    InvalidDropoutRate(f32),
    #[error("number of targets {found} does not match number of samples {expected}")]
    MismatchedTargetCount { expected: usize, found: usize },
    #[error("number of sample weights {found} does not match number of samples {expected}")]
    MismatchedWeightCount { expected: usize, found: usize },
    #[error("batches must use row-major (CSR) storage")]
    UnsupportedStorage,
    #[error("worker pool could not be started: {0}")]
    ThreadPool(String),
    #[error(transparent)]
    Core(#[from] trickle::error::Error),
}
