//! GP prior and posterior, the log joint objective of MAP estimation and the
//! posterior predictive distribution.
use crate::correlation_models::{Kernel, N_KERNEL_PARAMS};
use crate::errors::{GpError, Result};
use crate::likelihoods::Likelihood;
use crate::linalg::{
    cholesky, cross_covariance, gram, gram_from_diffs, gram_hyper_jacobians, CholeskyFactor,
    JitterPolicy,
};
use crate::mean_models::MeanFunction;
use crate::optimization::Objective;
use crate::parameters::{
    transform, Constrainer, KernelParams, LikelihoodParams, ParamSpace, ParamTransformer,
    ParamTransforms, Params,
};
use crate::utils::DiffMatrix;

use linfa::prelude::{Dataset, Float, PredictInplace};
use log::warn;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2, Zip};
use std::f64::consts::PI;
use std::fmt;

/// Training data: inputs as a (n, nx) matrix and one target per input
pub type TrainingData<F> = Dataset<F, F, Ix1>;

/// Build training data from inputs `x` (n, nx) and targets `y` given as a (n, 1) column.
///
/// Fails with a validation error when there is no point, when shapes do not agree
/// or when a value is not finite.
pub fn dataset<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<TrainingData<F>> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(GpError::ValidationError(format!(
            "training inputs should be a non empty (n, nx) matrix, got {:?}",
            x.shape()
        )));
    }
    if y.ncols() != 1 {
        return Err(GpError::ValidationError(format!(
            "training targets should be a (n, 1) column, got {:?}",
            y.shape()
        )));
    }
    if x.nrows() != y.nrows() {
        return Err(GpError::ValidationError(format!(
            "got {} inputs for {} targets",
            x.nrows(),
            y.nrows()
        )));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(GpError::ValidationError(
            "training data should hold finite values".to_string(),
        ));
    }
    Ok(Dataset::new(x.to_owned(), y.column(0).to_owned()))
}

/// A GP prior over latent functions `f ~ GP(m, k)`
#[derive(Clone, Debug)]
pub struct Prior<F: Float, Mean: MeanFunction<F>, Kern: Kernel<F>> {
    mean: Mean,
    kernel: Kern,
    jitter: JitterPolicy<F>,
}

impl<F: Float, Mean: MeanFunction<F>, Kern: Kernel<F>> Prior<F, Mean, Kern> {
    /// Prior given a mean function and a covariance kernel
    pub fn new(mean: Mean, kernel: Kern) -> Self {
        Prior {
            mean,
            kernel,
            jitter: JitterPolicy::default(),
        }
    }

    /// Set the jitter schedule of the covariance factorization
    pub fn jitter(mut self, policy: JitterPolicy<F>) -> Self {
        self.jitter = policy;
        self
    }

    /// Get mean function
    pub fn mean_function(&self) -> &Mean {
        &self.mean
    }

    /// Get covariance kernel
    pub fn kernel(&self) -> &Kern {
        &self.kernel
    }

    /// Get jitter schedule
    pub fn jitter_policy(&self) -> &JitterPolicy<F> {
        &self.jitter
    }

    /// Prior mean at `x` (n, nx)
    pub fn mean(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        self.mean.value(x)
    }

    /// Prior covariance matrix at `x` (n, nx)
    pub fn covariance(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        hyper: &KernelParams<F>,
    ) -> Array2<F> {
        gram(&self.kernel, hyper, x)
    }
}

impl<F: Float, Mean: MeanFunction<F>, Kern: Kernel<F>> fmt::Display for Prior<F, Mean, Kern> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Prior(mean={}, kernel={})", self.mean, self.kernel)
    }
}

/// A GP posterior: a prior combined with a likelihood of the observations
#[derive(Clone, Debug)]
pub struct Posterior<F: Float, Mean: MeanFunction<F>, Kern: Kernel<F>, Lik: Likelihood<F>> {
    prior: Prior<F, Mean, Kern>,
    likelihood: Lik,
}

/// Combine a prior and a likelihood into a posterior
pub fn compose<F, Mean, Kern, Lik>(
    prior: Prior<F, Mean, Kern>,
    likelihood: Lik,
) -> Posterior<F, Mean, Kern, Lik>
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    Posterior { prior, likelihood }
}

impl<F, Mean, Kern, Lik> Posterior<F, Mean, Kern, Lik>
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    /// Get the prior
    pub fn prior(&self) -> &Prior<F, Mean, Kern> {
        &self.prior
    }

    /// Get the likelihood
    pub fn likelihood(&self) -> &Lik {
        &self.likelihood
    }

    /// Log joint density of the posterior as a function of the flat vector of
    /// unconstrained parameters, negated when `negate` is true (for minimization).
    ///
    /// The training data is checked against the likelihood here, once.
    pub fn objective(
        &self,
        train: &TrainingData<F>,
        constrainer: &Constrainer,
        negate: bool,
    ) -> Result<LogJoint<'_, F, Mean, Kern, Lik>> {
        self.likelihood.check_targets(train.targets())?;
        let transforms = *ParamTransformer::<F>::transforms(constrainer);
        if transforms.obs_noise.is_some() != self.likelihood.has_obs_noise() {
            return Err(GpError::ConfigurationError(format!(
                "transforms {transforms:?} do not match {} parameters",
                self.likelihood
            )));
        }
        let n = train.records().nrows();
        let template = Params {
            kernel: KernelParams::default(),
            likelihood: LikelihoodParams {
                obs_noise: self.likelihood.has_obs_noise().then(F::one),
            },
            latent: Array1::zeros(n),
            space: ParamSpace::Unconstrained,
        };
        Ok(LogJoint {
            posterior: self,
            diffs: DiffMatrix::new(train.records()),
            mean: self.prior.mean(train.records()),
            y: train.targets().to_owned(),
            constrainer: *constrainer,
            transforms,
            template,
            sign: if negate { -F::one() } else { F::one() },
        })
    }

    /// Predictive distribution of the latent function given training data and
    /// fitted constrained parameters.
    pub fn predict(
        &self,
        train: &TrainingData<F>,
        params: &Params<F>,
    ) -> Result<PosteriorPredictive<F, Mean, Kern, Lik>> {
        if params.space() != ParamSpace::Constrained {
            return Err(GpError::ValidationError(
                "prediction expects constrained parameters".to_string(),
            ));
        }
        self.likelihood.check_targets(train.targets())?;
        let xt = train.records();
        if params.latent.len() != xt.nrows() {
            return Err(GpError::ValidationError(format!(
                "got {} latent values for {} training points",
                params.latent.len(),
                xt.nrows()
            )));
        }
        let k_mx = self.prior.covariance(xt, &params.kernel);
        let chol = cholesky(&k_mx, self.prior.jitter_policy())?;
        let mean = self.prior.mean(xt);
        let f = params.latent_function(&mean, &chol);
        let alpha = chol.solve_vec(&(&f - &mean))?;
        Ok(PosteriorPredictive {
            posterior: self.clone(),
            xt: xt.to_owned(),
            hyper: params.kernel,
            chol,
            alpha,
            latent: f,
        })
    }
}

impl<F, Mean, Kern, Lik> fmt::Display for Posterior<F, Mean, Kern, Lik>
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Posterior({}, {})", self.prior, self.likelihood)
    }
}

/// Log joint density `log p(y | f) + log N(nu | 0, I)` of a posterior on its
/// training data, expressed in unconstrained coordinates `u` (that is including
/// the log-determinant of the jacobian of each transform).
pub struct LogJoint<'a, F, Mean, Kern, Lik>
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    posterior: &'a Posterior<F, Mean, Kern, Lik>,
    diffs: DiffMatrix<F>,
    mean: Array1<F>,
    y: Array1<F>,
    constrainer: Constrainer,
    transforms: ParamTransforms,
    template: Params<F>,
    sign: F,
}

impl<F, Mean, Kern, Lik> LogJoint<'_, F, Mean, Kern, Lik>
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    /// Number of scalar parameters expected by the objective
    pub fn n_params(&self) -> usize {
        self.template.n_params()
    }

    /// Sum of the log-determinants of the transform jacobians at `u`
    pub fn log_jacobian(&self, u: &Array1<F>) -> F {
        self.transforms
            .hyper_transforms()
            .iter()
            .zip(u.iter())
            .fold(F::zero(), |acc, (t, &ui)| acc + t.log_abs_det_jacobian(ui))
    }

    fn evaluate(&self, u: &Array1<F>, with_gradient: bool) -> Result<(F, Option<Array1<F>>)> {
        let unconstrained = self.template.with_flat(u)?;
        let params = transform(&unconstrained, &self.constrainer)?;
        let prior = self.posterior.prior();
        let likelihood = self.posterior.likelihood();

        let k_mx = gram_from_diffs(prior.kernel(), &params.kernel, &self.diffs);
        let chol = cholesky(&k_mx, prior.jitter_policy())?;
        let nu = &params.latent;
        let f = params.latent_function(&self.mean, &chol);

        let log_lik = likelihood.log_prob(&self.y, &f, &params.likelihood)?;
        let n = F::cast(nu.len());
        let log_prior = F::cast(-0.5) * (nu.dot(nu) + n * F::cast((2. * PI).ln()));
        let value = self.sign * (log_lik + log_prior + self.log_jacobian(u));
        if !value.is_finite() {
            return Err(GpError::NumericalError(format!(
                "log joint is not finite at {params}"
            )));
        }
        if !with_gradient {
            return Ok((value, None));
        }

        let (grad_f, grad_noise) = likelihood.log_prob_gradient(&self.y, &f, &params.likelihood)?;
        // d/dnu = L^T g_f - nu
        let lt_grad_f = chol.factor.t().dot(&grad_f);
        let grad_nu = &lt_grad_f - nu;

        let mut grad_hyper = self.kernel_gradient(&params.kernel, &chol, &lt_grad_f, nu)?;
        grad_hyper.extend(grad_noise);

        let offset = self.template.hyper_offset();
        let mut grad = Array1::zeros(u.len());
        for (i, (t, g)) in self
            .transforms
            .hyper_transforms()
            .iter()
            .zip(grad_hyper)
            .enumerate()
        {
            grad[i] = g * t.derivative(u[i]) + t.log_abs_det_jacobian_derivative(u[i]);
        }
        grad.slice_mut(ndarray::s![offset..]).assign(&grad_nu);
        grad.mapv_inplace(|v| self.sign * v);
        if grad.iter().any(|v| !v.is_finite()) {
            return Err(GpError::NumericalError(format!(
                "log joint gradient is not finite at {params}"
            )));
        }
        Ok((value, Some(grad)))
    }

    /// `g_f^T (dL/dtheta) nu` for each kernel hyperparameter, using
    /// `dL = L Phi(L^-1 dK L^-T)` where `Phi` keeps the lower triangle and halves the diagonal
    fn kernel_gradient(
        &self,
        hyper: &KernelParams<F>,
        chol: &CholeskyFactor<F>,
        lt_grad_f: &Array1<F>,
        nu: &Array1<F>,
    ) -> Result<Vec<F>> {
        let kernel = self.posterior.prior().kernel();
        let mut grads = Vec::with_capacity(N_KERNEL_PARAMS);
        for mut dk in gram_hyper_jacobians(kernel, hyper, &self.diffs) {
            // the jitter is relative to the mean of the diagonal
            let djitter = chol.relative_jitter * dk.diag().mean().unwrap_or_else(F::zero);
            dk.diag_mut().mapv_inplace(|v| v + djitter);
            let b = chol.solve_lower(&dk)?;
            let a = chol.solve_lower(&b.t())?;
            let phi = lower_half(a);
            grads.push(lt_grad_f.dot(&phi.dot(nu)));
        }
        Ok(grads)
    }
}

fn lower_half<F: Float>(mut a: Array2<F>) -> Array2<F> {
    let half = F::cast(0.5);
    a.indexed_iter_mut().for_each(|((i, j), v)| {
        if j > i {
            *v = F::zero();
        } else if i == j {
            *v *= half;
        }
    });
    a
}

impl<F, Mean, Kern, Lik> Objective<F> for LogJoint<'_, F, Mean, Kern, Lik>
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    fn value(&self, params: &Array1<F>) -> Result<F> {
        self.evaluate(params, false).map(|(v, _)| v)
    }

    fn value_and_gradient(&self, params: &Array1<F>) -> Result<(F, Array1<F>)> {
        let (value, grad) = self.evaluate(params, true)?;
        grad.map(|g| (value, g)).ok_or_else(|| {
            GpError::NumericalError("log joint gradient was not computed".to_string())
        })
    }
}

/// Predictive distribution of the latent function at new points
#[derive(Clone, Debug)]
pub struct PosteriorPredictive<F, Mean, Kern, Lik>
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    posterior: Posterior<F, Mean, Kern, Lik>,
    xt: Array2<F>,
    hyper: KernelParams<F>,
    chol: CholeskyFactor<F>,
    /// `K^-1 (f - m)` at the training points
    alpha: Array1<F>,
    latent: Array1<F>,
}

impl<F, Mean, Kern, Lik> PosteriorPredictive<F, Mean, Kern, Lik>
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    /// Latent function values at the training points
    pub fn latent(&self) -> &Array1<F> {
        &self.latent
    }

    fn check_inputs(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<()> {
        if x.ncols() != self.xt.ncols() {
            return Err(GpError::ValidationError(format!(
                "expected points with {} components, got {}",
                self.xt.ncols(),
                x.ncols()
            )));
        }
        Ok(())
    }

    /// Predictive mean `m(x) + K(x, X) alpha` at `x` (n, nx)
    pub fn mean(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        self.check_inputs(x)?;
        let prior = self.posterior.prior();
        let kx = cross_covariance(prior.kernel(), &self.hyper, &self.xt, x);
        Ok(prior.mean(x) + kx.t().dot(&self.alpha))
    }

    /// Predictive variance `k(x, x) - |L^-1 K(X, x)|^2` at `x` (n, nx), clamped to be non negative
    pub fn variance(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        self.check_inputs(x)?;
        let kernel = self.posterior.prior().kernel();
        let kx = cross_covariance(kernel, &self.hyper, &self.xt, x);
        let v = self.chol.solve_lower(&kx)?;
        let kxx = kernel.value(&Array2::zeros((x.nrows(), x.ncols())), &self.hyper);
        let mut var = &kxx - &v.mapv(|v| v * v).sum_axis(Axis(0));
        clamp_negative_variance(&mut var, &kxx);
        Ok(var)
    }

    /// Probability of the positive class (or likelihood mean) at `x`,
    /// the link function being applied to the predictive mean
    pub fn probability(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        Ok(self.posterior.likelihood().link(&self.mean(x)?))
    }
}

/// Variances might be slightly negative depending on machine precision:
/// set them to zero, warning when far from it
fn clamp_negative_variance<F: Float>(
    var: &mut ArrayBase<impl ndarray::DataMut<Elem = F>, Ix1>,
    prior_var: &Array1<F>,
) {
    let tol = F::cast(1e-8);
    let n_below = Zip::from(&*var)
        .and(prior_var)
        .fold(0, |acc, &v, &p| if v < -tol * p { acc + 1 } else { acc });
    if n_below > 0 {
        warn!("{n_below} predicted variances below 0 are clamped to 0");
    }
    var.mapv_inplace(|v| v.max(F::zero()));
}

impl<F, D, Mean, Kern, Lik> PredictInplace<ArrayBase<D, Ix2>, Array1<F>>
    for PosteriorPredictive<F, Mean, Kern, Lik>
where
    F: Float,
    D: Data<Elem = F>,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<F>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        let values = self.mean(x).expect("GP posterior mean prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros((x.nrows(),))
    }
}

/// Posterior predictive adaptator to implement `linfa::Predict` trait for variance prediction.
pub struct VariancePredictor<'a, F, Mean, Kern, Lik>(pub &'a PosteriorPredictive<F, Mean, Kern, Lik>)
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>;

impl<F, D, Mean, Kern, Lik> PredictInplace<ArrayBase<D, Ix2>, Array1<F>>
    for VariancePredictor<'_, F, Mean, Kern, Lik>
where
    F: Float,
    D: Data<Elem = F>,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<F>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        let values = self.0.variance(x).expect("GP posterior variance prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros(x.nrows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation_models::{Matern52Kernel, SquaredExponentialKernel};
    use crate::likelihoods::{Bernoulli, Gaussian, Link};
    use crate::mean_models::{ConstantMean, ZeroMean};
    use crate::parameters::{initialise, Transform};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use linfa::traits::Predict;
    use ndarray::{array, Array};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::{Normal, Uniform};
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;

    fn classification_data(n: usize) -> TrainingData<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let x: Array2<f64> = Array::random_using((n, 1), Uniform::new(-1., 1.), &mut rng);
        let y = x.mapv(|v| if (3. * v).cos() > 0. { 1. } else { 0. });
        dataset(&x, &y).unwrap()
    }

    fn random_point(n: usize, seed: u64) -> Array1<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        Array::random_using(n, Normal::new(0., 0.5).unwrap(), &mut rng)
    }

    /// Central differences with a step large enough to stay above the round-off
    /// of the Cholesky factorization of ill-conditioned covariance matrices
    fn central_differences(objective: &impl Objective<f64>, u: &Array1<f64>) -> Array1<f64> {
        let h = 1e-4;
        Array1::from_shape_fn(u.len(), |i| {
            let mut up = u.clone();
            let mut down = u.clone();
            up[i] += h;
            down[i] -= h;
            (objective.value(&up).unwrap() - objective.value(&down).unwrap()) / (2. * h)
        })
    }

    fn check_gradient(objective: &impl Objective<f64>, u: &Array1<f64>) {
        let (value, grad) = objective.value_and_gradient(u).unwrap();
        assert_abs_diff_eq!(value, objective.value(u).unwrap(), epsilon = 1e-12);
        let fd = central_differences(objective, u);
        Zip::from(&grad).and(&fd).for_each(|&g, &d| {
            assert_relative_eq!(g, d, epsilon = 1e-6, max_relative = 1e-5);
        });
    }

    #[test]
    fn test_dataset_validation() {
        assert!(dataset(&array![[0.0]], &array![[2.0]]).is_ok());
        assert!(matches!(
            dataset(&array![[0.0], [1.0]], &array![[1.0]]),
            Err(GpError::ValidationError(_))
        ));
        assert!(matches!(
            dataset(&array![[0.0]], &array![[1.0, 0.0]]),
            Err(GpError::ValidationError(_))
        ));
        assert!(matches!(
            dataset(&array![[f64::NAN]], &array![[1.0]]),
            Err(GpError::ValidationError(_))
        ));
        assert!(matches!(
            dataset(&Array2::<f64>::zeros((0, 1)), &Array2::zeros((0, 1))),
            Err(GpError::ValidationError(_))
        ));
    }

    #[test]
    fn test_out_of_support_targets() {
        let train = dataset(&array![[0.0]], &array![[2.0]]).unwrap();
        let posterior = compose(
            Prior::new(ZeroMean(), SquaredExponentialKernel::default()),
            Bernoulli::new(train.records().nrows()),
        );
        let (_, constrainer, _) = initialise(&posterior);
        let res = posterior.objective(&train, &constrainer, true);
        assert!(matches!(res, Err(GpError::ValidationError(_))));
    }

    #[test]
    fn test_logit_gradient() {
        let train = classification_data(12);
        let posterior = compose(
            Prior::new(ZeroMean(), SquaredExponentialKernel::default()),
            Bernoulli::new(12),
        );
        let (_, constrainer, _) = initialise(&posterior);
        let objective = posterior.objective(&train, &constrainer, true).unwrap();
        let mut u = random_point(objective.n_params(), 1);
        u[0] = -0.5;
        check_gradient(&objective, &u);
    }

    #[test]
    fn test_probit_gradient_exp_transforms() {
        let train = classification_data(10);
        let posterior = compose(
            Prior::new(ConstantMean(0.2), Matern52Kernel::default()),
            Bernoulli::new(10).with_link(Link::Probit),
        );
        let transforms = ParamTransforms::new(false)
            .with("kernel.lengthscale", Transform::Exp)
            .unwrap();
        let objective = posterior
            .objective(&train, &Constrainer::new(transforms), false)
            .unwrap();
        check_gradient(&objective, &random_point(objective.n_params(), 2));
    }

    #[test]
    fn test_gaussian_gradient() {
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let x: Array2<f64> = Array::random_using((8, 2), Uniform::new(-1., 1.), &mut rng);
        let y = x.map_axis(Axis(1), |r| r[0].sin() + r[1]).insert_axis(Axis(1));
        let train = dataset(&x, &y).unwrap();
        let posterior = compose(
            Prior::new(ZeroMean(), SquaredExponentialKernel::default()),
            Gaussian::new(8),
        );
        let (_, constrainer, _) = initialise(&posterior);
        let objective = posterior.objective(&train, &constrainer, true).unwrap();
        assert_eq!(objective.n_params(), 11);
        check_gradient(&objective, &random_point(11, 4));
    }

    #[test]
    fn test_log_jacobian_term() {
        let train = classification_data(6);
        let posterior = compose(
            Prior::new(ZeroMean(), SquaredExponentialKernel::default()),
            Bernoulli::new(6),
        );
        let (_, constrainer, _) = initialise(&posterior);
        let objective = posterior.objective(&train, &constrainer, false).unwrap();
        let u = random_point(objective.n_params(), 5);

        let template = Params {
            kernel: KernelParams::default(),
            likelihood: LikelihoodParams::default(),
            latent: Array1::zeros(6),
            space: ParamSpace::Unconstrained,
        };
        let params = transform(&template.with_flat(&u).unwrap(), &constrainer).unwrap();
        let k_mx = gram(&SquaredExponentialKernel::default(), &params.kernel, train.records());
        let chol = cholesky(&k_mx, &JitterPolicy::default()).unwrap();
        let f = params.latent_function(&Array1::zeros(6), &chol);
        let log_lik = posterior
            .likelihood()
            .log_prob(train.targets(), &f, &params.likelihood)
            .unwrap();
        let log_prior = -0.5 * params.latent.dot(&params.latent) - 3. * (2. * PI).ln();
        let expected_jacobian = -(1. + (-u[0]).exp()).ln() - (1. + (-u[1]).exp()).ln();

        assert_abs_diff_eq!(objective.log_jacobian(&u), expected_jacobian, epsilon = 1e-12);
        assert_abs_diff_eq!(
            objective.value(&u).unwrap(),
            log_lik + log_prior + expected_jacobian,
            epsilon = 1e-10
        );
    }

    #[derive(Clone, Copy, Debug, Default)]
    struct ZeroKernel();

    impl fmt::Display for ZeroKernel {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "Zero")
        }
    }

    impl Kernel<f64> for ZeroKernel {
        fn value(
            &self,
            d: &ArrayBase<impl Data<Elem = f64>, Ix2>,
            _hyper: &KernelParams<f64>,
        ) -> Array1<f64> {
            Array1::zeros(d.nrows())
        }

        fn hyper_jacobian(
            &self,
            d: &ArrayBase<impl Data<Elem = f64>, Ix2>,
            _hyper: &KernelParams<f64>,
        ) -> Array2<f64> {
            Array2::zeros((d.nrows(), N_KERNEL_PARAMS))
        }
    }

    #[test]
    fn test_zero_kernel_fails() {
        let train = classification_data(5);
        let posterior = compose(Prior::new(ZeroMean(), ZeroKernel()), Bernoulli::new(5));
        let (params, constrainer, unconstrainer) = initialise(&posterior);
        let objective = posterior.objective(&train, &constrainer, true).unwrap();
        let u = transform(&params, &unconstrainer).unwrap().to_flat();
        assert!(matches!(
            objective.value(&u),
            Err(GpError::NumericalError(_))
        ));
        assert!(matches!(
            posterior.predict(&train, &params),
            Err(GpError::NumericalError(_))
        ));
    }

    #[test]
    fn test_mismatched_transforms() {
        let train = classification_data(5);
        let posterior = compose(
            Prior::new(ZeroMean(), SquaredExponentialKernel::default()),
            Bernoulli::new(5),
        );
        let constrainer = Constrainer::new(ParamTransforms::new(true));
        assert!(matches!(
            posterior.objective(&train, &constrainer, true),
            Err(GpError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_predictive_interpolates_latent() {
        let train = classification_data(15);
        let posterior = compose(
            Prior::new(ConstantMean(0.1), Matern52Kernel::default()),
            Bernoulli::new(15),
        );
        let (mut params, _, unconstrainer) = initialise(&posterior);
        params.kernel.lengthscale = 0.5;
        params.latent = random_point(15, 6);
        let predictive = posterior.predict(&train, &params).unwrap();

        // the predictive mean at training points recovers f = m + L nu
        let mean = predictive.mean(train.records()).unwrap();
        assert_abs_diff_eq!(mean, predictive.latent().to_owned(), epsilon = 1e-2);

        let var = predictive.variance(train.records()).unwrap();
        assert!(var.iter().all(|&v| (0. ..1e-3).contains(&v)));

        let xtest = Array::linspace(-3., 3., 61).insert_axis(Axis(1));
        let var = VariancePredictor(&predictive).predict(&xtest);
        assert!(var.iter().all(|&v| v >= 0.));
        assert_abs_diff_eq!(var[0], 1., epsilon = 1e-3);
        let proba = predictive.probability(&xtest).unwrap();
        assert!(proba.iter().all(|&p| (0. ..=1.).contains(&p)));
        assert_eq!(predictive.predict(&xtest).len(), 61);

        assert!(matches!(
            predictive.mean(&array![[0., 1.]]),
            Err(GpError::ValidationError(_))
        ));
        let unconstrained = transform(&params, &unconstrainer).unwrap();
        assert!(matches!(
            posterior.predict(&train, &unconstrained),
            Err(GpError::ValidationError(_))
        ));
    }
}
