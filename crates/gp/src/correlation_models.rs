//! A module for stationary covariance kernels of the GP prior.
//!
//! The following kernels are implemented:
//! * squared exponential (a.k.a. RBF),
//! * matern 5/2.
//!
//! Both are isotropic: they depend on `x - x'` through its euclidean norm `r`
//! and are parameterized by a `lengthscale` and a `variance` (see [`KernelParams`]).

use crate::parameters::KernelParams;
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2, Zip};
use std::fmt;

/// Number of kernel hyperparameters, ordered as (lengthscale, variance)
pub const N_KERNEL_PARAMS: usize = 2;

/// A trait for covariance kernels used by a GP [`Prior`](crate::Prior)
pub trait Kernel<F: Float>: Clone + Copy + Default + fmt::Display + Sync {
    /// Compute `k(x, x')` given differences `d` between x and x' as a (n, nx) matrix,
    /// returns the n covariance values.
    fn value(&self, d: &ArrayBase<impl Data<Elem = F>, Ix2>, hyper: &KernelParams<F>)
        -> Array1<F>;

    /// Compute the derivatives of `k(x, x')` with respect to the hyperparameters
    /// given differences `d` as a (n, nx) matrix.
    /// Returns a (n, 2) matrix with columns (d/dlengthscale, d/dvariance).
    fn hyper_jacobian(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        hyper: &KernelParams<F>,
    ) -> Array2<F>;
}

fn squared_norms<F: Float>(d: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
    d.mapv(|v| v * v).sum_axis(Axis(1))
}

/// Squared exponential kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SquaredExponentialKernel();

/// The usual name of the squared exponential kernel
pub type Rbf = SquaredExponentialKernel;

impl<F: Float> Kernel<F> for SquaredExponentialKernel {
    /// variance * exp( - r^2 / (2 * lengthscale^2) )
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        hyper: &KernelParams<F>,
    ) -> Array1<F> {
        let l2 = hyper.lengthscale * hyper.lengthscale;
        squared_norms(d).mapv(|r2| hyper.variance * F::exp(-r2 / (F::cast(2.) * l2)))
    }

    fn hyper_jacobian(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        hyper: &KernelParams<F>,
    ) -> Array2<F> {
        let l = hyper.lengthscale;
        let r2 = squared_norms(d);
        let mut jac = Array2::zeros((d.nrows(), N_KERNEL_PARAMS));
        Zip::from(jac.rows_mut()).and(&r2).for_each(|mut row, &r2| {
            let e = F::exp(-r2 / (F::cast(2.) * l * l));
            row[0] = hyper.variance * e * r2 / (l * l * l);
            row[1] = e;
        });
        jac
    }
}

impl fmt::Display for SquaredExponentialKernel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SquaredExponential")
    }
}

/// Matern 5/2 kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Matern52Kernel();

impl<F: Float> Kernel<F> for Matern52Kernel {
    /// variance * (1 + s + s^2 / 3) * exp(-s) with s = sqrt(5) * r / lengthscale
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        hyper: &KernelParams<F>,
    ) -> Array1<F> {
        let sqrt5 = F::cast(5.).sqrt();
        squared_norms(d).mapv(|r2| {
            let s = sqrt5 * r2.sqrt() / hyper.lengthscale;
            hyper.variance * (F::one() + s + s * s / F::cast(3.)) * F::exp(-s)
        })
    }

    fn hyper_jacobian(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        hyper: &KernelParams<F>,
    ) -> Array2<F> {
        let sqrt5 = F::cast(5.).sqrt();
        let r2 = squared_norms(d);
        let mut jac = Array2::zeros((d.nrows(), N_KERNEL_PARAMS));
        Zip::from(jac.rows_mut()).and(&r2).for_each(|mut row, &r2| {
            let s = sqrt5 * r2.sqrt() / hyper.lengthscale;
            let e = F::exp(-s);
            row[0] = hyper.variance * s * s / F::cast(3.) * (F::one() + s) * e / hyper.lengthscale;
            row[1] = (F::one() + s + s * s / F::cast(3.)) * e;
        });
        jac
    }
}

impl fmt::Display for Matern52Kernel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Matern52")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::DiffMatrix;
    use approx::assert_abs_diff_eq;
    use finitediff::FiniteDiff;
    use ndarray::{array, Array2};
    use paste::paste;

    #[test]
    fn test_squared_exponential() {
        let xt = array![[4.5], [1.2], [2.0], [3.0], [4.0]];
        let dm = DiffMatrix::new(&xt);
        let hyper = KernelParams {
            lengthscale: 1.,
            variance: 2.,
        };
        let res = SquaredExponentialKernel::default().value(&dm.d, &hyper);
        let expected = dm.d.column(0).mapv(|d: f64| 2. * (-0.5 * d * d).exp());
        assert_abs_diff_eq!(res, expected, epsilon = 1e-12);
        // |4.5 - 1.2| = 3.3
        assert_abs_diff_eq!(res[0], 2. * (-0.5 * 3.3f64 * 3.3).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_matern52_at_zero_distance() {
        let d = Array2::<f64>::zeros((3, 2));
        let hyper = KernelParams {
            lengthscale: 0.3,
            variance: 1.7,
        };
        assert_abs_diff_eq!(
            Matern52Kernel::default().value(&d, &hyper),
            array![1.7, 1.7, 1.7],
            epsilon = 1e-12
        );
    }

    macro_rules! test_hyper_jacobian {
        ($kernel:ident) => {
            paste! {
                #[test]
                fn [<test_hyper_jacobian_ $kernel:snake>]() {
                    let d = array![[0.3, -0.2], [1.1, 0.4], [0.0, 0.0], [2.5, -1.0]];
                    let kernel = [<$kernel Kernel>]::default();
                    let jac = kernel.hyper_jacobian(&d, &KernelParams { lengthscale: 0.8, variance: 1.3 });
                    for i in 0..d.nrows() {
                        let row = d.slice(ndarray::s![i..i + 1, ..]).to_owned();
                        let f = |p: &Vec<f64>| -> f64 {
                            kernel.value(&row, &KernelParams { lengthscale: p[0], variance: p[1] })[0]
                        };
                        let grad = vec![0.8, 1.3].central_diff(&f);
                        assert_abs_diff_eq!(jac[[i, 0]], grad[0], epsilon = 1e-6);
                        assert_abs_diff_eq!(jac[[i, 1]], grad[1], epsilon = 1e-6);
                    }
                }
            }
        };
    }

    test_hyper_jacobian!(SquaredExponential);
    test_hyper_jacobian!(Matern52);
}
