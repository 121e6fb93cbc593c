//! A module for likelihoods mapping latent GP values `f` to the distribution of
//! the observations `y`.
//!
//! The following likelihoods are implemented:
//! * Bernoulli for binary classification, with a logit (default) or probit link,
//! * Gaussian for regression, with a trainable observation noise variance.

use crate::errors::{GpError, Result};
use crate::parameters::LikelihoodParams;
use linfa::Float;
use ndarray::{Array1, ArrayBase, Data, Ix1, Zip};
use std::f64::consts::{PI, SQRT_2};
use std::fmt;

/// Below this value of `z`, `log Phi(z)` uses its asymptotic expansion
const PROBIT_ASYMPTOTE: f64 = -30.;

/// A trait for observation models of a GP [`Posterior`](crate::Posterior)
pub trait Likelihood<F: Float>: Clone + fmt::Display + Sync {
    /// Number of datapoints the likelihood was built for
    fn num_datapoints(&self) -> usize;

    /// Whether the likelihood has a trainable `obs_noise` parameter
    fn has_obs_noise(&self) -> bool {
        false
    }

    /// Check that `y` has the expected length and lies in the likelihood support
    fn check_targets(&self, y: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<()>;

    /// Distribution parameter of each observation given latent values `f`
    fn link(&self, f: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Array1<F>;

    /// `log p(y | f)` summed over the observations
    fn log_prob(
        &self,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        f: &ArrayBase<impl Data<Elem = F>, Ix1>,
        params: &LikelihoodParams<F>,
    ) -> Result<F>;

    /// Derivatives of `log p(y | f)` with respect to each `f_i` and
    /// to `obs_noise` when the likelihood has it
    fn log_prob_gradient(
        &self,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        f: &ArrayBase<impl Data<Elem = F>, Ix1>,
        params: &LikelihoodParams<F>,
    ) -> Result<(Array1<F>, Option<F>)>;
}

fn check_length<F: Float>(y: &ArrayBase<impl Data<Elem = F>, Ix1>, n: usize) -> Result<()> {
    if y.len() != n {
        return Err(GpError::ValidationError(format!(
            "likelihood built for {} datapoints, got {} targets",
            n,
            y.len()
        )));
    }
    Ok(())
}

/// Numerically stable `1 / (1 + exp(-x))`
pub fn sigmoid<F: Float>(x: F) -> F {
    if x >= F::zero() {
        F::one() / (F::one() + (-x).exp())
    } else {
        let e = x.exp();
        e / (F::one() + e)
    }
}

/// Numerically stable `ln(1 + exp(x))`
pub fn softplus<F: Float>(x: F) -> F {
    x.max(F::zero()) + (-num_traits::Float::abs(x)).exp().ln_1p()
}

/// Standard normal cumulative distribution function
pub fn std_normal_cdf<F: Float>(z: F) -> F {
    let z = z.to_f64().unwrap_or(f64::NAN);
    F::cast(0.5 * libm::erfc(-z / SQRT_2))
}

/// `ln Phi(z)` and `phi(z) / Phi(z)` computed in double precision
fn log_cdf_and_mills(z: f64) -> (f64, f64) {
    if z < PROBIT_ASYMPTOTE {
        let log_cdf = -0.5 * z * z - (-z).ln() - 0.5 * (2. * PI).ln();
        (log_cdf, -z - 1. / z)
    } else {
        let cdf = 0.5 * libm::erfc(-z / SQRT_2);
        let pdf = (-0.5 * z * z).exp() / (2. * PI).sqrt();
        (cdf.ln(), pdf / cdf)
    }
}

/// Link function of a Bernoulli likelihood
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Link {
    /// `p = 1 / (1 + exp(-f))`
    #[default]
    Logit,
    /// `p = Phi(f)`, the standard normal CDF
    Probit,
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Link::Logit => write!(f, "logit"),
            Link::Probit => write!(f, "probit"),
        }
    }
}

/// Bernoulli likelihood for binary targets in {0, 1}
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bernoulli {
    num_datapoints: usize,
    link: Link,
}

impl Bernoulli {
    /// Bernoulli likelihood with logit link for `num_datapoints` observations
    pub fn new(num_datapoints: usize) -> Self {
        Bernoulli {
            num_datapoints,
            link: Link::default(),
        }
    }

    /// Set the link function
    pub fn with_link(mut self, link: Link) -> Self {
        self.link = link;
        self
    }

    /// Get the link function
    pub fn link_function(&self) -> Link {
        self.link
    }
}

impl<F: Float> Likelihood<F> for Bernoulli {
    fn num_datapoints(&self) -> usize {
        self.num_datapoints
    }

    fn check_targets(&self, y: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<()> {
        check_length(y, self.num_datapoints)?;
        if let Some(v) = y.iter().find(|&&v| v != F::zero() && v != F::one()) {
            return Err(GpError::ValidationError(format!(
                "Bernoulli targets should be 0 or 1, got {v}"
            )));
        }
        Ok(())
    }

    fn link(&self, f: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Array1<F> {
        match self.link {
            Link::Logit => f.mapv(sigmoid),
            Link::Probit => f.mapv(std_normal_cdf),
        }
    }

    fn log_prob(
        &self,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        f: &ArrayBase<impl Data<Elem = F>, Ix1>,
        _params: &LikelihoodParams<F>,
    ) -> Result<F> {
        let lp = match self.link {
            // y f - ln(1 + e^f)
            Link::Logit => Zip::from(y)
                .and(f)
                .fold(F::zero(), |acc, &y, &f| acc + y * f - softplus(f)),
            // ln Phi((2y - 1) f)
            Link::Probit => Zip::from(y).and(f).fold(F::zero(), |acc, &y, &f| {
                let z = ((F::cast(2.) * y - F::one()) * f).to_f64().unwrap_or(f64::NAN);
                acc + F::cast(log_cdf_and_mills(z).0)
            }),
        };
        Ok(lp)
    }

    fn log_prob_gradient(
        &self,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        f: &ArrayBase<impl Data<Elem = F>, Ix1>,
        _params: &LikelihoodParams<F>,
    ) -> Result<(Array1<F>, Option<F>)> {
        let grad = match self.link {
            Link::Logit => Zip::from(y).and(f).map_collect(|&y, &f| y - sigmoid(f)),
            Link::Probit => Zip::from(y).and(f).map_collect(|&y, &f| {
                let s = F::cast(2.) * y - F::one();
                let z = (s * f).to_f64().unwrap_or(f64::NAN);
                s * F::cast(log_cdf_and_mills(z).1)
            }),
        };
        Ok((grad, None))
    }
}

impl fmt::Display for Bernoulli {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Bernoulli({}, {})", self.num_datapoints, self.link)
    }
}

/// Gaussian likelihood `y ~ N(f, obs_noise)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Gaussian {
    num_datapoints: usize,
}

impl Gaussian {
    /// Gaussian likelihood for `num_datapoints` observations
    pub fn new(num_datapoints: usize) -> Self {
        Gaussian { num_datapoints }
    }
}

fn obs_noise<F: Float>(params: &LikelihoodParams<F>) -> Result<F> {
    params.obs_noise.ok_or_else(|| {
        GpError::ConfigurationError("Gaussian likelihood needs an `obs_noise` value".to_string())
    })
}

impl<F: Float> Likelihood<F> for Gaussian {
    fn num_datapoints(&self) -> usize {
        self.num_datapoints
    }

    fn has_obs_noise(&self) -> bool {
        true
    }

    fn check_targets(&self, y: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<()> {
        check_length(y, self.num_datapoints)?;
        if y.iter().any(|v| !v.is_finite()) {
            return Err(GpError::ValidationError(
                "Gaussian targets should be finite".to_string(),
            ));
        }
        Ok(())
    }

    fn link(&self, f: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Array1<F> {
        f.to_owned()
    }

    fn log_prob(
        &self,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        f: &ArrayBase<impl Data<Elem = F>, Ix1>,
        params: &LikelihoodParams<F>,
    ) -> Result<F> {
        let s2 = obs_noise(params)?;
        let log_norm = F::cast(-0.5) * (F::cast(2. * PI) * s2).ln();
        Ok(Zip::from(y).and(f).fold(F::zero(), |acc, &y, &f| {
            acc + log_norm - (y - f) * (y - f) / (F::cast(2.) * s2)
        }))
    }

    fn log_prob_gradient(
        &self,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        f: &ArrayBase<impl Data<Elem = F>, Ix1>,
        params: &LikelihoodParams<F>,
    ) -> Result<(Array1<F>, Option<F>)> {
        let s2 = obs_noise(params)?;
        let grad_f = Zip::from(y).and(f).map_collect(|&y, &f| (y - f) / s2);
        let two = F::cast(2.);
        let grad_noise = Zip::from(y).and(f).fold(F::zero(), |acc, &y, &f| {
            acc - F::one() / (two * s2) + (y - f) * (y - f) / (two * s2 * s2)
        });
        Ok((grad_f, Some(grad_noise)))
    }
}

impl fmt::Display for Gaussian {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Gaussian({})", self.num_datapoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use finitediff::FiniteDiff;
    use ndarray::array;

    #[test]
    fn test_stable_functions() {
        assert_abs_diff_eq!(sigmoid(0.), 0.5);
        assert_abs_diff_eq!(sigmoid(-800.), 0.);
        assert_abs_diff_eq!(sigmoid(800.), 1.);
        assert_abs_diff_eq!(softplus(0.), 2f64.ln(), epsilon = 1e-15);
        assert_abs_diff_eq!(softplus(800.), 800.);
        assert_abs_diff_eq!(softplus(-800.), 0.);
        assert_abs_diff_eq!(std_normal_cdf(0.), 0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(std_normal_cdf(1.96), 0.9750021048517795, epsilon = 1e-9);
    }

    #[test]
    fn test_bernoulli_logit_log_prob() {
        let lik = Bernoulli::new(3);
        let y = array![0., 1., 1.];
        let f = array![0., 2., -1.];
        let lp = lik.log_prob(&y, &f, &LikelihoodParams::default()).unwrap();
        let expected = 0.5f64.ln() + sigmoid(2f64).ln() + sigmoid(-1f64).ln();
        assert_abs_diff_eq!(lp, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_bernoulli_probit_log_prob() {
        let lik = Bernoulli::new(2).with_link(Link::Probit);
        let y = array![0., 1.];
        let f = array![0.3, 0.3];
        let lp = lik.log_prob(&y, &f, &LikelihoodParams::default()).unwrap();
        let expected = std_normal_cdf(-0.3f64).ln() + std_normal_cdf(0.3f64).ln();
        assert_abs_diff_eq!(lp, expected, epsilon = 1e-12);
        // far in the tail the value stays finite
        let lp: f64 = lik
            .log_prob(&array![0., 1.], &array![60., -60.], &LikelihoodParams::default())
            .unwrap();
        assert!(lp.is_finite());
    }

    #[test]
    fn test_bernoulli_targets() {
        let lik = Bernoulli::new(2);
        assert!(Likelihood::<f64>::check_targets(&lik, &array![0., 1.]).is_ok());
        assert!(matches!(
            Likelihood::<f64>::check_targets(&lik, &array![0., 2.]),
            Err(GpError::ValidationError(_))
        ));
        assert!(matches!(
            Likelihood::<f64>::check_targets(&lik, &array![0., 1., 1.]),
            Err(GpError::ValidationError(_))
        ));
    }

    #[test]
    fn test_link() {
        let f = array![0., 100.];
        assert_abs_diff_eq!(Bernoulli::new(2).link(&f), array![0.5, 1.], epsilon = 1e-12);
        assert_abs_diff_eq!(Gaussian::new(2).link(&f), f);
    }

    fn check_gradient(lik: &impl Likelihood<f64>, y: Array1<f64>, noise: Option<f64>) {
        let f0 = vec![0.4, -1.2, 2.5, -0.1];
        let params = LikelihoodParams { obs_noise: noise };
        let (grad, grad_noise) = lik
            .log_prob_gradient(&y, &Array1::from(f0.clone()), &params)
            .unwrap();
        let fd = f0.central_diff(&|f: &Vec<f64>| -> f64 {
            lik.log_prob(&y, &Array1::from(f.clone()), &params).unwrap()
        });
        assert_abs_diff_eq!(grad, Array1::from(fd), epsilon = 1e-6);
        if let Some(s2) = noise {
            let fd = vec![s2].central_diff(&|p: &Vec<f64>| -> f64 {
                let params = LikelihoodParams {
                    obs_noise: Some(p[0]),
                };
                lik.log_prob(&y, &Array1::from(f0.clone()), &params).unwrap()
            });
            assert_abs_diff_eq!(grad_noise.unwrap(), fd[0], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_log_prob_gradients() {
        let y = array![0., 1., 1., 0.];
        check_gradient(&Bernoulli::new(4), y.clone(), None);
        check_gradient(&Bernoulli::new(4).with_link(Link::Probit), y, None);
        check_gradient(&Gaussian::new(4), array![0.3, -1., 2., 0.], Some(0.2));
    }

    #[test]
    fn test_gaussian_needs_noise() {
        let res = Gaussian::new(1).log_prob(&array![0.], &array![0.], &LikelihoodParams::default());
        assert!(matches!(res, Err(GpError::ConfigurationError(_))));
    }
}
