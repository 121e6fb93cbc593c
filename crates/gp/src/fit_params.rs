//! Fitting configuration checked with linfa `ParamGuard` and MAP estimation
//! through the linfa `Fit` trait.
use crate::correlation_models::Kernel;
use crate::errors::{GpError, Result};
use crate::likelihoods::Likelihood;
use crate::mean_models::MeanFunction;
use crate::optimization::{fit, Adam, Objective, ADAM_BETA1, ADAM_BETA2, ADAM_STEP_SIZE};
use crate::parameters::{
    initialise, transform, Constrainer, ParamName, ParamTransforms, Params, Transform,
    Unconstrainer,
};
use crate::posterior::{dataset, Posterior, PosteriorPredictive, TrainingData};

use linfa::prelude::{DatasetBase, Fit, Float, PredictInplace};
use linfa::ParamGuard;
use log::info;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;
use std::time::Instant;

/// Default number of optimizer iterations
pub const FIT_N_ITERS: usize = 1000;
/// Default seed of the latent values initialization
pub const FIT_SEED: u64 = 42;

/// A set of validated fitting parameters.
#[derive(Clone, Debug)]
pub struct FitValidParams<F, Mean, Kern, Lik>
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    /// Posterior whose parameters are estimated
    pub(crate) posterior: Posterior<F, Mean, Kern, Lik>,
    /// Number of optimizer iterations
    pub(crate) n_iters: usize,
    /// Adam step size
    pub(crate) step_size: F,
    /// Adam moment decay rates
    pub(crate) betas: (F, F),
    /// Standard deviation of the random initial whitened latent values, 0 starts at the prior mean
    pub(crate) init_latent_std: F,
    /// Seed of the latent values initialization
    pub(crate) seed: u64,
    /// Transforms overridden by parameter name
    pub(crate) transforms: Vec<(String, Transform)>,
}

impl<F, Mean, Kern, Lik> FitValidParams<F, Mean, Kern, Lik>
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    /// Get the posterior
    pub fn posterior(&self) -> &Posterior<F, Mean, Kern, Lik> {
        &self.posterior
    }

    /// Get the number of optimizer iterations
    pub fn n_iters(&self) -> usize {
        self.n_iters
    }

    /// Get the Adam step size
    pub fn step_size(&self) -> F {
        self.step_size
    }

    /// Get the Adam moment decay rates
    pub fn betas(&self) -> (F, F) {
        self.betas
    }

    /// Get the standard deviation of the initial latent values
    pub fn init_latent_std(&self) -> F {
        self.init_latent_std
    }

    /// Get the seed
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Parameter transforms with overrides applied
    pub fn param_transforms(&self) -> Result<ParamTransforms> {
        let with_obs_noise = self.posterior.likelihood().has_obs_noise();
        self.transforms
            .iter()
            .try_fold(ParamTransforms::new(with_obs_noise), |acc, (name, t)| {
                if name.parse::<ParamName>()? == ParamName::ObsNoise && !with_obs_noise {
                    return Err(GpError::ConfigurationError(format!(
                        "{} has no observation noise",
                        self.posterior.likelihood()
                    )));
                }
                acc.with(name, *t)
            })
    }
}

#[derive(Clone, Debug)]
/// The set of parameters that can be specified to fit a [`Posterior`] by MAP estimation
pub struct FitParams<F, Mean, Kern, Lik>(FitValidParams<F, Mean, Kern, Lik>)
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>;

impl<F, Mean, Kern, Lik> FitParams<F, Mean, Kern, Lik>
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    /// Default fitting parameters of the given posterior
    pub fn new(posterior: Posterior<F, Mean, Kern, Lik>) -> Self {
        Self(FitValidParams {
            posterior,
            n_iters: FIT_N_ITERS,
            step_size: F::cast(ADAM_STEP_SIZE),
            betas: (F::cast(ADAM_BETA1), F::cast(ADAM_BETA2)),
            init_latent_std: F::zero(),
            seed: FIT_SEED,
            transforms: vec![],
        })
    }

    /// Set the number of optimizer iterations
    pub fn n_iters(mut self, n_iters: usize) -> Self {
        self.0.n_iters = n_iters;
        self
    }

    /// Set the Adam step size, should be positive
    pub fn step_size(mut self, step_size: F) -> Self {
        self.0.step_size = step_size;
        self
    }

    /// Set the Adam moment decay rates, both in [0, 1)
    pub fn betas(mut self, beta1: F, beta2: F) -> Self {
        self.0.betas = (beta1, beta2);
        self
    }

    /// Set the standard deviation of the random initial whitened latent values
    pub fn init_latent_std(mut self, std: F) -> Self {
        self.0.init_latent_std = std;
        self
    }

    /// Set the seed of the latent values initialization
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }

    /// Set the transform of the parameter called `name` (e.g. `kernel.lengthscale`)
    pub fn transform(mut self, name: &str, transform: Transform) -> Self {
        self.0.transforms.push((name.to_string(), transform));
        self
    }
}

impl<F, Mean, Kern, Lik> From<FitValidParams<F, Mean, Kern, Lik>> for FitParams<F, Mean, Kern, Lik>
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    fn from(valid: FitValidParams<F, Mean, Kern, Lik>) -> Self {
        FitParams(valid)
    }
}

impl<F, Mean, Kern, Lik> ParamGuard for FitParams<F, Mean, Kern, Lik>
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    type Checked = FitValidParams<F, Mean, Kern, Lik>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let valid = &self.0;
        if !(valid.step_size.is_finite() && valid.step_size > F::zero()) {
            return Err(GpError::ConfigurationError(format!(
                "`step_size` should be positive, got {}",
                valid.step_size
            )));
        }
        let (b1, b2) = valid.betas;
        if !(F::zero()..F::one()).contains(&b1) || !(F::zero()..F::one()).contains(&b2) {
            return Err(GpError::ConfigurationError(format!(
                "`betas` should lie in [0, 1), got ({b1}, {b2})"
            )));
        }
        if !(valid.init_latent_std.is_finite() && valid.init_latent_std >= F::zero()) {
            return Err(GpError::ConfigurationError(format!(
                "`init_latent_std` should be non negative, got {}",
                valid.init_latent_std
            )));
        }
        valid.param_transforms()?;
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

impl<F, Mean, Kern, Lik> Posterior<F, Mean, Kern, Lik>
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    /// Fitting parameters constructor
    pub fn params(&self) -> FitParams<F, Mean, Kern, Lik> {
        FitParams::new(self.clone())
    }
}

/// A posterior fitted by MAP estimation of its parameters
#[derive(Clone, Debug)]
pub struct FittedPosterior<F, Mean, Kern, Lik>
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    params: Params<F>,
    history: Vec<F>,
    objective: F,
    predictive: PosteriorPredictive<F, Mean, Kern, Lik>,
}

impl<F, Mean, Kern, Lik> FittedPosterior<F, Mean, Kern, Lik>
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    /// Fitted constrained parameters
    pub fn params(&self) -> &Params<F> {
        &self.params
    }

    /// Negative log joint at each optimizer iteration
    pub fn history(&self) -> &[F] {
        &self.history
    }

    /// Negative log joint at the fitted parameters
    pub fn objective(&self) -> F {
        self.objective
    }

    /// Predictive distribution at the fitted parameters
    pub fn predictive(&self) -> &PosteriorPredictive<F, Mean, Kern, Lik> {
        &self.predictive
    }

    /// Predictive mean of the latent function at `x` (n, nx)
    pub fn predict_mean(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        self.predictive.mean(x)
    }

    /// Predictive variance of the latent function at `x` (n, nx)
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        self.predictive.variance(x)
    }

    /// Probability of the positive class at `x` (n, nx)
    pub fn predict_proba(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        self.predictive.probability(x)
    }
}

impl<F, D, Mean, Kern, Lik> PredictInplace<ArrayBase<D, Ix2>, Array1<F>>
    for FittedPosterior<F, Mean, Kern, Lik>
where
    F: Float,
    D: Data<Elem = F>,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<F>) {
        self.predictive.predict_inplace(x, y)
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros(x.nrows())
    }
}

fn initial_latent<F: Float>(n: usize, std: F, seed: u64) -> Result<Array1<F>> {
    if std == F::zero() {
        return Ok(Array1::zeros(n));
    }
    let std = std.to_f64().unwrap_or(f64::NAN);
    let normal = Normal::new(0., std).map_err(|e| GpError::ConfigurationError(e.to_string()))?;
    let mut rng = Xoshiro256Plus::seed_from_u64(seed);
    Ok(Array1::<f64>::random_using(n, normal, &mut rng).mapv(F::cast))
}

impl<F, Mean, Kern, Lik> Fit<Array2<F>, Array1<F>, GpError> for FitValidParams<F, Mean, Kern, Lik>
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    type Object = FittedPosterior<F, Mean, Kern, Lik>;

    /// Fit kernel hyperparameters and latent values by maximizing the log joint density
    fn fit(&self, dataset: &DatasetBase<Array2<F>, Array1<F>>) -> Result<Self::Object> {
        let train: TrainingData<F> = dataset_checked(dataset)?;
        let posterior = &self.posterior;

        let (mut params, _, _) = initialise(posterior);
        params.latent = initial_latent(params.latent.len(), self.init_latent_std, self.seed)?;
        let transforms = self.param_transforms()?;
        let constrainer = Constrainer::new(transforms);
        let unconstrained = transform(&params, &Unconstrainer::new(transforms))?;

        let objective = posterior.objective(&train, &constrainer, true)?;
        let optimizer = Adam::new(self.step_size).with_betas(self.betas.0, self.betas.1);
        let now = Instant::now();
        let res = fit(&objective, &unconstrained.to_flat(), optimizer, self.n_iters)?;
        let final_objective = objective.value(&res.params)?;
        info!(
            "Fitted {} in {}ms: negative log joint {:?} -> {}",
            posterior,
            now.elapsed().as_millis(),
            res.history.first(),
            final_objective
        );

        let fitted = transform(&unconstrained.with_flat(&res.params)?, &constrainer)?;
        let predictive = posterior.predict(&train, &fitted)?;
        Ok(FittedPosterior {
            params: fitted,
            history: res.history,
            objective: final_objective,
            predictive,
        })
    }
}

fn dataset_checked<F: Float>(ds: &DatasetBase<Array2<F>, Array1<F>>) -> Result<TrainingData<F>> {
    dataset(ds.records(), &ds.targets().view().insert_axis(Axis(1)))
}
