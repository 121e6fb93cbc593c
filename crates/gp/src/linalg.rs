//! Dense linear algebra used by the GP posterior: covariance matrices built from
//! a [`Kernel`], a jittered Cholesky factorization and triangular solves.

use crate::correlation_models::{Kernel, N_KERNEL_PARAMS};
use crate::errors::{GpError, Result};
use crate::parameters::KernelParams;
use crate::utils::DiffMatrix;
use linfa::Float;
use linfa_linalg::{cholesky::*, triangular::*};
use log::debug;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};

/// Default jitter added to the diagonal at the first factorization attempt,
/// relative to the mean of the diagonal
pub const DEFAULT_JITTER: f64 = 1e-6;
/// Default multiplicative growth of the jitter between two attempts
pub const DEFAULT_JITTER_GROWTH: f64 = 10.;
/// Default number of retries after the first factorization attempt
pub const DEFAULT_JITTER_RETRIES: usize = 5;

/// Jitter schedule used to stabilize a Cholesky factorization.
///
/// Attempt `k` (for `k` in `0..=max_retries`) factorizes `K + j_k * I` where
/// `j_k = initial * growth^k * mean(diag(K))`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JitterPolicy<F: Float> {
    initial: F,
    growth: F,
    max_retries: usize,
}

impl<F: Float> Default for JitterPolicy<F> {
    fn default() -> Self {
        JitterPolicy {
            initial: F::cast(DEFAULT_JITTER),
            growth: F::cast(DEFAULT_JITTER_GROWTH),
            max_retries: DEFAULT_JITTER_RETRIES,
        }
    }
}

impl<F: Float> JitterPolicy<F> {
    /// Constructor
    pub fn new(initial: F, growth: F, max_retries: usize) -> Self {
        JitterPolicy {
            initial,
            growth,
            max_retries,
        }
    }

    /// Relative jitter of the first attempt
    pub fn initial(&self) -> F {
        self.initial
    }

    /// Jitter growth factor between attempts
    pub fn growth(&self) -> F {
        self.growth
    }

    /// Number of retries after the first attempt
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn relative_jitter(&self, attempt: usize) -> F {
        self.initial * self.growth.powi(attempt as i32)
    }
}

/// Lower Cholesky factor `L` of `K + jitter * I`
#[derive(Clone, Debug)]
pub struct CholeskyFactor<F: Float> {
    /// Lower triangular factor
    pub factor: Array2<F>,
    /// Absolute jitter added to the diagonal
    pub jitter: F,
    /// Jitter relative to the mean of the diagonal of `K`
    pub relative_jitter: F,
}

impl<F: Float> CholeskyFactor<F> {
    /// Solve `L x = b` for a (n, m) right hand side
    pub fn solve_lower(&self, b: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        solve_lower(&self.factor, b)
    }

    /// Solve `L^T x = b` for a (n, m) right hand side
    pub fn solve_upper(&self, b: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        solve_upper(&self.factor, b)
    }

    /// Solve `L x = b` for a vector right hand side
    pub fn solve_lower_vec(&self, b: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Array1<F>> {
        let x = self.solve_lower(&b.view().insert_axis(Axis(1)))?;
        Ok(x.remove_axis(Axis(1)))
    }

    /// Solve `L^T x = b` for a vector right hand side
    pub fn solve_upper_vec(&self, b: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Array1<F>> {
        let x = self.solve_upper(&b.view().insert_axis(Axis(1)))?;
        Ok(x.remove_axis(Axis(1)))
    }

    /// Solve `(L L^T) x = b` by forward then backward substitution
    pub fn solve_vec(&self, b: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Array1<F>> {
        let rho = self.solve_lower_vec(b)?;
        self.solve_upper_vec(&rho)
    }

    /// `log |L| = sum_i log L_ii`
    pub fn log_det(&self) -> F {
        self.factor.diag().mapv(|v| v.ln()).sum()
    }
}

/// Build the (n, n) covariance matrix of the `x` points specified as a (n, nx) matrix.
///
/// Only the strict upper triangle is evaluated, then mirrored, so the result is
/// exactly symmetric.
pub fn gram<F: Float, K: Kernel<F>>(
    kernel: &K,
    hyper: &KernelParams<F>,
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Array2<F> {
    gram_from_diffs(kernel, hyper, &DiffMatrix::new(x))
}

/// Build the covariance matrix from precomputed pairwise differences
pub fn gram_from_diffs<F: Float, K: Kernel<F>>(
    kernel: &K,
    hyper: &KernelParams<F>,
    diffs: &DiffMatrix<F>,
) -> Array2<F> {
    let k0 = kernel.value(&Array2::zeros((1, diffs.d.ncols())), hyper)[0];
    let values = kernel.value(&diffs.d, hyper);
    let mut k_mx = Array2::from_diag_elem(diffs.n_obs, k0);
    for (i, ij) in diffs.d_indices.outer_iter().enumerate() {
        k_mx[[ij[0], ij[1]]] = values[i];
        k_mx[[ij[1], ij[0]]] = values[i];
    }
    k_mx
}

/// Derivatives of the covariance matrix with respect to the kernel
/// hyperparameters, ordered as (lengthscale, variance)
pub fn gram_hyper_jacobians<F: Float, K: Kernel<F>>(
    kernel: &K,
    hyper: &KernelParams<F>,
    diffs: &DiffMatrix<F>,
) -> Vec<Array2<F>> {
    let jac0 = kernel.hyper_jacobian(&Array2::zeros((1, diffs.d.ncols())), hyper);
    let jac = kernel.hyper_jacobian(&diffs.d, hyper);
    (0..N_KERNEL_PARAMS)
        .map(|p| {
            let mut dk = Array2::from_diag_elem(diffs.n_obs, jac0[[0, p]]);
            for (i, ij) in diffs.d_indices.outer_iter().enumerate() {
                dk[[ij[0], ij[1]]] = jac[[i, p]];
                dk[[ij[1], ij[0]]] = jac[[i, p]];
            }
            dk
        })
        .collect()
}

/// Build the (n1, n2) cross covariance matrix between `x1` (n1, nx) and `x2` (n2, nx)
pub fn cross_covariance<F: Float, K: Kernel<F>>(
    kernel: &K,
    hyper: &KernelParams<F>,
    x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
    x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Array2<F> {
    let mut k_mx = Array2::zeros((x1.nrows(), x2.nrows()));
    for (mut row, x1_row) in k_mx.rows_mut().into_iter().zip(x1.rows()) {
        let d = &x1_row - x2;
        row.assign(&kernel.value(&d, hyper));
    }
    k_mx
}

/// Cholesky factorization of a symmetric matrix with a bounded jitter schedule.
///
/// Fails with [`GpError::NumericalError`] when the matrix holds non finite values
/// or is still not positive definite after the last retry.
pub fn cholesky<F: Float>(
    matrix: &ArrayBase<impl Data<Elem = F>, Ix2>,
    policy: &JitterPolicy<F>,
) -> Result<CholeskyFactor<F>> {
    if !matrix.is_square() {
        return Err(GpError::ValidationError(format!(
            "Cholesky factorization needs a square matrix, got {:?}",
            matrix.shape()
        )));
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(GpError::NumericalError(
            "covariance matrix holds non finite values".to_string(),
        ));
    }
    let scale = matrix.diag().mean().unwrap_or_else(F::zero);
    for attempt in 0..=policy.max_retries() {
        let relative_jitter = policy.relative_jitter(attempt);
        let jitter = relative_jitter * scale;
        let mut k_mx = matrix.to_owned();
        k_mx.diag_mut().mapv_inplace(|v| v + jitter);
        match k_mx.cholesky() {
            Ok(factor) => {
                return Ok(CholeskyFactor {
                    factor,
                    jitter,
                    relative_jitter,
                })
            }
            Err(err) => debug!("Cholesky attempt {attempt} with jitter {jitter} failed: {err}"),
        }
    }
    Err(GpError::NumericalError(format!(
        "matrix is not positive definite after {} jittered Cholesky attempts",
        policy.max_retries() + 1
    )))
}

/// Solve `L x = b` where `L` is lower triangular
pub fn solve_lower<F: Float>(
    l: &ArrayBase<impl Data<Elem = F>, Ix2>,
    b: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<Array2<F>> {
    Ok(l.solve_triangular(b, UPLO::Lower)?)
}

/// Solve `L^T x = b` where `L` is lower triangular
pub fn solve_upper<F: Float>(
    l: &ArrayBase<impl Data<Elem = F>, Ix2>,
    b: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<Array2<F>> {
    Ok(l.t().solve_triangular(b, UPLO::Upper)?)
}
