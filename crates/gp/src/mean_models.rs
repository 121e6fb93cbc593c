//! A module for mean functions of the GP prior.
//!
//! Latent values are modelled as `f(x) = m(x) + g(x)` where `g` is a zero-mean GP,
//! the mean function `m` carrying no trainable parameter.
//!
//! The following mean functions are implemented:
//! * zero,
//! * constant.

use linfa::Float;
use ndarray::{Array1, ArrayBase, Data, Ix2};
use paste::paste;
use std::fmt;

/// A trait for mean functions used by a GP [`Prior`](crate::Prior)
pub trait MeanFunction<F: Float>: Clone + Copy + Default + fmt::Display + Sync {
    /// Compute the mean value at the given `x` data points specified as (n, nx) matrix.
    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F>;
}

/// The zero function as mean of the GP
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ZeroMean();

impl<F: Float> MeanFunction<F> for ZeroMean {
    /// m(x) = 0
    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        Array1::zeros(x.nrows())
    }
}

/// A constant function as mean of the GP
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ConstantMean(pub f64);

impl<F: Float> MeanFunction<F> for ConstantMean {
    /// m(x) = c
    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        Array1::from_elem(x.nrows(), F::cast(self.0))
    }
}

macro_rules! declare_mean_util_impls {
    ($mean:ident) => {
        paste! {
            impl fmt::Display for [<$mean Mean>] {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    write!(f, "{}Mean", stringify!($mean))
                }
            }
        }
    };
}

declare_mean_util_impls!(Zero);
declare_mean_util_impls!(Constant);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_zero() {
        let x = array![[1., 2.], [3., 4.], [5., 6.]];
        let m: Array1<f64> = ZeroMean().value(&x);
        assert_abs_diff_eq!(m, array![0., 0., 0.]);
    }

    #[test]
    fn test_constant() {
        let x = array![[0.], [7.]];
        let m: Array1<f32> = ConstantMean(0.5).value(&x);
        assert_abs_diff_eq!(m, array![0.5f32, 0.5]);
    }

    #[test]
    fn test_utils() {
        assert_eq!("ZeroMean", ZeroMean().to_string());
        assert_eq!("ConstantMean", ConstantMean(1.).to_string());
    }
}
