//! This library implements [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process)
//! posterior inference with non-conjugate likelihoods, typically binary classification
//! with a Bernoulli likelihood, by maximum a posteriori (MAP) estimation of the kernel
//! hyperparameters together with the latent function values at the training points.
//!
//! A GP [`Prior`] (a [`MeanFunction`](mean_models::MeanFunction) and a
//! [`Kernel`](correlation_models::Kernel)) is combined with a
//! [`Likelihood`](likelihoods::Likelihood) by [`compose`] into a [`Posterior`].
//! Its log joint density ([`LogJoint`]) is a function of the flat vector of
//! unconstrained parameters, see [`initialise`] and [`transform`], minimized with
//! [`Adam`] by [`fit`](optimization::fit). The [`PosteriorPredictive`] then gives
//! the predictive mean and variance of the latent function at new points.
//!
//! The latent values are whitened: `f = m(X) + L nu` where `L` is the Cholesky
//! factor of the prior covariance matrix, `nu` being the estimated parameters.
//!
//! The whole pipeline is also available through [`FitParams`] which implements
//! the linfa `Fit` trait.
//!
//! ```no_run
//! use gpblocks_gp::correlation_models::SquaredExponentialKernel;
//! use gpblocks_gp::likelihoods::Bernoulli;
//! use gpblocks_gp::mean_models::ZeroMean;
//! use gpblocks_gp::{compose, dataset, Prior};
//! use linfa::prelude::*;
//! use ndarray::array;
//!
//! let x = array![[-0.8], [-0.3], [0.1], [0.6]];
//! let y = array![[0.], [0.], [1.], [1.]];
//! let train = dataset(&x, &y).expect("valid data");
//!
//! let prior = Prior::new(ZeroMean(), SquaredExponentialKernel::default());
//! let posterior = compose(prior, Bernoulli::new(4));
//! let fitted = posterior
//!     .params()
//!     .n_iters(500)
//!     .fit(&train)
//!     .expect("MAP estimation");
//! let proba = fitted.predict_proba(&array![[0.5]]).expect("prediction");
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
pub mod correlation_models;
mod errors;
mod fit_params;
pub mod likelihoods;
pub mod linalg;
pub mod mean_models;
mod parameters;
mod posterior;
mod utils;

pub mod optimization;

pub use errors::*;
pub use fit_params::*;
pub use optimization::{Adam, Objective, OptimResult, Optimizer};
pub use parameters::*;
pub use posterior::*;
pub use utils::DiffMatrix;
