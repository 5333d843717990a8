//! `trickle` provides the shared building blocks for online learning over
//! hash-bucketed sparse feature batches.
//!
//! The crate plays the same role for the `trickle-*` algorithm crates that a
//! common core plays in any estimator toolkit: it defines the floating-point
//! abstraction ([`Float`]), the dataset container ([`DatasetBase`]) with
//! optional per-sample weights, record traits for dense and CSR sparse
//! matrices, the estimator traits ([`traits::Fit`], [`traits::FitWith`],
//! [`traits::Predict`]) and the hyperparameter checking machinery
//! ([`ParamGuard`]).
//!
//! Algorithm crates live under `algorithms/` and pull this crate in as their
//! foundation; see `trickle-ftrl` for the adaptive online-learning model
//! family.

pub mod dataset;
pub mod error;
pub mod metrics;
mod param_guard;
pub mod prelude;
pub mod traits;

pub use dataset::{Dataset, DatasetBase, Float, Pr, Records, SparseDataset};
pub use error::Error;
pub use param_guard::ParamGuard;
