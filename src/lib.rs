//! `gpblocks` gathers the building blocks of Gaussian process posterior inference
//! with non-conjugate likelihoods.
//!
//! The heavy lifting lives in [`gpblocks_gp`] which is re-exported here, this
//! crate adding toy [`datasets`] and the `classification` demo binary.
//!
//! ```no_run
//! use gpblocks::datasets::{classification_toy, test_grid};
//! use gpblocks::likelihoods::Bernoulli;
//! use gpblocks::mean_models::ZeroMean;
//! use gpblocks::{compose, dataset, Prior, Rbf};
//! use linfa::prelude::*;
//!
//! let (x, y) = classification_toy(100, 123);
//! let train = dataset(&x, &y).expect("valid data");
//! let posterior = compose(Prior::new(ZeroMean(), Rbf::default()), Bernoulli::new(100));
//! let fitted = posterior.params().fit(&train).expect("MAP estimation");
//!
//! let proba = fitted.predict_proba(&test_grid(500)).expect("prediction");
//! ```
#![warn(missing_docs)]
pub mod datasets;

pub use gpblocks_gp::correlation_models::{Matern52Kernel, Rbf, SquaredExponentialKernel};
pub use gpblocks_gp::likelihoods::{Bernoulli, Gaussian, Link};
pub use gpblocks_gp::linalg::cholesky;
pub use gpblocks_gp::mean_models::{ConstantMean, ZeroMean};
pub use gpblocks_gp::*;
