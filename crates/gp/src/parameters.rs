//! Parameter records of a posterior and the bijective transforms between the
//! constrained and unconstrained spaces.
use crate::correlation_models::Kernel;
use crate::errors::{GpError, Result};
use crate::likelihoods::{sigmoid, softplus, Likelihood};
use crate::linalg::CholeskyFactor;
use crate::mean_models::MeanFunction;
use crate::posterior::Posterior;
use linfa::Float;
use ndarray::{s, Array1, ArrayBase, Data, Ix1};
use std::fmt;
use std::str::FromStr;

/// Default initial kernel lengthscale
pub const DEFAULT_LENGTHSCALE: f64 = 1.0;
/// Default initial kernel variance
pub const DEFAULT_VARIANCE: f64 = 1.0;
/// Default initial observation noise variance of a Gaussian likelihood
pub const DEFAULT_OBS_NOISE: f64 = 1.0;

/// Hyperparameters of a covariance [`Kernel`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelParams<F: Float> {
    /// Lengthscale `l > 0`
    pub lengthscale: F,
    /// Variance `s2 > 0`
    pub variance: F,
}

impl<F: Float> Default for KernelParams<F> {
    fn default() -> Self {
        KernelParams {
            lengthscale: F::cast(DEFAULT_LENGTHSCALE),
            variance: F::cast(DEFAULT_VARIANCE),
        }
    }
}

/// Trainable parameters of a [`Likelihood`]
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct LikelihoodParams<F: Float> {
    /// Observation noise variance, only for likelihoods having one
    pub obs_noise: Option<F>,
}

/// The space a [`Params`] record lives in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamSpace {
    /// Values in the natural domain of each parameter (e.g. positive lengthscale)
    Constrained,
    /// Values on the whole real line, as seen by the optimizer
    Unconstrained,
}

impl fmt::Display for ParamSpace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParamSpace::Constrained => write!(f, "constrained"),
            ParamSpace::Unconstrained => write!(f, "unconstrained"),
        }
    }
}

/// Names of the parameter fields
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamName {
    /// `kernel.lengthscale`
    Lengthscale,
    /// `kernel.variance`
    Variance,
    /// `likelihood.obs_noise`
    ObsNoise,
    /// `latent`
    Latent,
}

impl FromStr for ParamName {
    type Err = GpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "kernel.lengthscale" => Ok(ParamName::Lengthscale),
            "kernel.variance" => Ok(ParamName::Variance),
            "likelihood.obs_noise" => Ok(ParamName::ObsNoise),
            "latent" => Ok(ParamName::Latent),
            _ => Err(GpError::ConfigurationError(format!(
                "unknown parameter name '{s}'"
            ))),
        }
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ParamName::Lengthscale => "kernel.lengthscale",
            ParamName::Variance => "kernel.variance",
            ParamName::ObsNoise => "likelihood.obs_noise",
            ParamName::Latent => "latent",
        };
        write!(f, "{name}")
    }
}

/// The full parameter record of a GP posterior.
///
/// `latent` holds the whitened latent values `nu`, one per training point:
/// the latent function at the training inputs is `f = m(X) + L nu` where `L`
/// is the Cholesky factor of the prior covariance.
#[derive(Clone, Debug, PartialEq)]
pub struct Params<F: Float> {
    /// Kernel hyperparameters
    pub kernel: KernelParams<F>,
    /// Likelihood parameters
    pub likelihood: LikelihoodParams<F>,
    /// Whitened latent values
    pub latent: Array1<F>,
    pub(crate) space: ParamSpace,
}

impl<F: Float> Params<F> {
    /// Parameters in the constrained space
    pub fn new(kernel: KernelParams<F>, likelihood: LikelihoodParams<F>, latent: Array1<F>) -> Self {
        Params {
            kernel,
            likelihood,
            latent,
            space: ParamSpace::Constrained,
        }
    }

    /// The space the values live in
    pub fn space(&self) -> ParamSpace {
        self.space
    }

    /// Total number of scalar parameters
    pub fn n_params(&self) -> usize {
        2 + self.likelihood.obs_noise.map_or(0, |_| 1) + self.latent.len()
    }

    /// Value of a scalar hyperparameter, `None` for `latent` or an absent `obs_noise`
    pub fn get(&self, name: ParamName) -> Option<F> {
        match name {
            ParamName::Lengthscale => Some(self.kernel.lengthscale),
            ParamName::Variance => Some(self.kernel.variance),
            ParamName::ObsNoise => self.likelihood.obs_noise,
            ParamName::Latent => None,
        }
    }

    /// Flatten as `[lengthscale, variance, (obs_noise), latent...]`
    pub fn to_flat(&self) -> Array1<F> {
        let mut flat = Array1::zeros(self.n_params());
        flat[0] = self.kernel.lengthscale;
        flat[1] = self.kernel.variance;
        let offset = self.hyper_offset();
        if let Some(noise) = self.likelihood.obs_noise {
            flat[2] = noise;
        }
        flat.slice_mut(s![offset..]).assign(&self.latent);
        flat
    }

    /// Build a record with the same structure and space from a flat vector
    /// laid out as [`Params::to_flat`]
    pub fn with_flat(&self, flat: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Self> {
        if flat.len() != self.n_params() {
            return Err(GpError::ValidationError(format!(
                "expected {} flat parameters, got {}",
                self.n_params(),
                flat.len()
            )));
        }
        let offset = self.hyper_offset();
        Ok(Params {
            kernel: KernelParams {
                lengthscale: flat[0],
                variance: flat[1],
            },
            likelihood: LikelihoodParams {
                obs_noise: self.likelihood.obs_noise.map(|_| flat[2]),
            },
            latent: flat.slice(s![offset..]).to_owned(),
            space: self.space,
        })
    }

    /// Index of the first latent value in the flat layout
    pub(crate) fn hyper_offset(&self) -> usize {
        2 + self.likelihood.obs_noise.map_or(0, |_| 1)
    }

    /// Latent function values `f = mean + L nu` at the training inputs
    pub fn latent_function(&self, mean: &Array1<F>, chol: &CholeskyFactor<F>) -> Array1<F> {
        mean + &chol.factor.dot(&self.latent)
    }
}

impl<F: Float> fmt::Display for Params<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Params({}, lengthscale={}, variance={}",
            self.space, self.kernel.lengthscale, self.kernel.variance
        )?;
        if let Some(noise) = self.likelihood.obs_noise {
            write!(f, ", obs_noise={noise}")?;
        }
        write!(f, ", {} latent values)", self.latent.len())
    }
}

/// A bijection between the real line and the domain of a parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Transform {
    /// `x = u`
    Identity,
    /// `x = exp(u)`
    Exp,
    /// `x = ln(1 + exp(u))`
    #[default]
    Softplus,
}

impl Transform {
    /// Map an unconstrained value to the constrained domain
    pub fn forward<F: Float>(&self, u: F) -> F {
        match self {
            Transform::Identity => u,
            Transform::Exp => u.exp(),
            Transform::Softplus => softplus(u),
        }
    }

    /// Map a constrained value back to the real line
    pub fn inverse<F: Float>(&self, x: F) -> Result<F> {
        if !x.is_finite() {
            return Err(GpError::ValidationError(format!(
                "cannot unconstrain non finite value {x}"
            )));
        }
        match self {
            Transform::Identity => Ok(x),
            Transform::Exp | Transform::Softplus if x <= F::zero() => Err(
                GpError::ValidationError(format!("{self} transform expects a positive value, got {x}")),
            ),
            Transform::Exp => Ok(x.ln()),
            // ln(exp(x) - 1) without overflow
            Transform::Softplus => Ok(x + (-(-x).exp_m1()).ln()),
        }
    }

    /// `dx/du`
    pub fn derivative<F: Float>(&self, u: F) -> F {
        match self {
            Transform::Identity => F::one(),
            Transform::Exp => u.exp(),
            Transform::Softplus => sigmoid(u),
        }
    }

    /// `ln |dx/du|`
    pub fn log_abs_det_jacobian<F: Float>(&self, u: F) -> F {
        match self {
            Transform::Identity => F::zero(),
            Transform::Exp => u,
            Transform::Softplus => -softplus(-u),
        }
    }

    /// `d/du ln |dx/du|`
    pub fn log_abs_det_jacobian_derivative<F: Float>(&self, u: F) -> F {
        match self {
            Transform::Identity => F::zero(),
            Transform::Exp => F::one(),
            Transform::Softplus => sigmoid(-u),
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Transform::Identity => write!(f, "Identity"),
            Transform::Exp => write!(f, "Exp"),
            Transform::Softplus => write!(f, "Softplus"),
        }
    }
}

/// Transforms declared per parameter field; `latent` is always [`Transform::Identity`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamTransforms {
    /// Transform of `kernel.lengthscale`
    pub lengthscale: Transform,
    /// Transform of `kernel.variance`
    pub variance: Transform,
    /// Transform of `likelihood.obs_noise` when present
    pub obs_noise: Option<Transform>,
}

impl ParamTransforms {
    /// Default transforms for kernel hyperparameters and optionally an observation noise
    pub fn new(with_obs_noise: bool) -> Self {
        ParamTransforms {
            lengthscale: Transform::default(),
            variance: Transform::default(),
            obs_noise: with_obs_noise.then(Transform::default),
        }
    }

    /// Override the transform of the field called `name`
    pub fn with(mut self, name: &str, transform: Transform) -> Result<Self> {
        match name.parse::<ParamName>()? {
            ParamName::Lengthscale => self.lengthscale = transform,
            ParamName::Variance => self.variance = transform,
            ParamName::ObsNoise => self.obs_noise = Some(transform),
            ParamName::Latent if transform == Transform::Identity => (),
            ParamName::Latent => {
                return Err(GpError::ConfigurationError(format!(
                    "latent values are not transformed, got {transform}"
                )))
            }
        }
        Ok(self)
    }

    /// Transforms of the hyperparameters in flat layout order
    pub fn hyper_transforms(&self) -> Vec<Transform> {
        let mut transforms = vec![self.lengthscale, self.variance];
        transforms.extend(self.obs_noise);
        transforms
    }

    fn check<F: Float>(&self, params: &Params<F>) -> Result<()> {
        match (params.likelihood.obs_noise, self.obs_noise) {
            (Some(_), None) => Err(GpError::ConfigurationError(
                "no transform declared for `likelihood.obs_noise`".to_string(),
            )),
            (None, Some(_)) => Err(GpError::ValidationError(
                "a transform is declared for `likelihood.obs_noise` which is absent".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// A mapping of a whole [`Params`] record between the two spaces
pub trait ParamTransformer<F: Float> {
    /// Space of the input record
    fn source(&self) -> ParamSpace;

    /// Space of the output record
    fn target(&self) -> ParamSpace;

    /// Map one scalar hyperparameter
    fn map(&self, transform: &Transform, value: F) -> Result<F>;

    /// Declared transforms
    fn transforms(&self) -> &ParamTransforms;
}

/// Maps unconstrained parameters to their constrained domain
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Constrainer(ParamTransforms);

/// Maps constrained parameters to the real line, inverse of [`Constrainer`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Unconstrainer(ParamTransforms);

impl Constrainer {
    /// Constrainer from declared transforms
    pub fn new(transforms: ParamTransforms) -> Self {
        Constrainer(transforms)
    }

    /// The inverse mapping
    pub fn inverse(&self) -> Unconstrainer {
        Unconstrainer(self.0)
    }
}

impl Unconstrainer {
    /// Unconstrainer from declared transforms
    pub fn new(transforms: ParamTransforms) -> Self {
        Unconstrainer(transforms)
    }

    /// The inverse mapping
    pub fn inverse(&self) -> Constrainer {
        Constrainer(self.0)
    }
}

impl<F: Float> ParamTransformer<F> for Constrainer {
    fn source(&self) -> ParamSpace {
        ParamSpace::Unconstrained
    }

    fn target(&self) -> ParamSpace {
        ParamSpace::Constrained
    }

    fn map(&self, transform: &Transform, value: F) -> Result<F> {
        Ok(transform.forward(value))
    }

    fn transforms(&self) -> &ParamTransforms {
        &self.0
    }
}

impl<F: Float> ParamTransformer<F> for Unconstrainer {
    fn source(&self) -> ParamSpace {
        ParamSpace::Constrained
    }

    fn target(&self) -> ParamSpace {
        ParamSpace::Unconstrained
    }

    fn map(&self, transform: &Transform, value: F) -> Result<F> {
        transform.inverse(value)
    }

    fn transforms(&self) -> &ParamTransforms {
        &self.0
    }
}

/// Map every field of `params` with `transformer`, `latent` being left unchanged.
///
/// Fails with a validation error when `params` does not live in the source space
/// of the transformer.
pub fn transform<F: Float>(
    params: &Params<F>,
    transformer: &impl ParamTransformer<F>,
) -> Result<Params<F>> {
    if params.space != transformer.source() {
        return Err(GpError::ValidationError(format!(
            "expected {} parameters, got {} ones",
            transformer.source(),
            params.space
        )));
    }
    let transforms = transformer.transforms();
    transforms.check(params)?;
    let obs_noise = match (params.likelihood.obs_noise, transforms.obs_noise) {
        (Some(v), Some(t)) => Some(transformer.map(&t, v)?),
        _ => None,
    };
    Ok(Params {
        kernel: KernelParams {
            lengthscale: transformer.map(&transforms.lengthscale, params.kernel.lengthscale)?,
            variance: transformer.map(&transforms.variance, params.kernel.variance)?,
        },
        likelihood: LikelihoodParams { obs_noise },
        latent: params.latent.to_owned(),
        space: transformer.target(),
    })
}

/// Default constrained parameters of a posterior with the matching transforms.
///
/// Kernel hyperparameters start at 1, the observation noise (if any) at 1 and
/// the whitened latent values at 0, one per datapoint of the likelihood.
pub fn initialise<F, Mean, Kern, Lik>(
    posterior: &Posterior<F, Mean, Kern, Lik>,
) -> (Params<F>, Constrainer, Unconstrainer)
where
    F: Float,
    Mean: MeanFunction<F>,
    Kern: Kernel<F>,
    Lik: Likelihood<F>,
{
    let likelihood = posterior.likelihood();
    let obs_noise = likelihood
        .has_obs_noise()
        .then(|| F::cast(DEFAULT_OBS_NOISE));
    let params = Params::new(
        KernelParams::default(),
        LikelihoodParams { obs_noise },
        Array1::zeros(likelihood.num_datapoints()),
    );
    let transforms = ParamTransforms::new(likelihood.has_obs_noise());
    (
        params,
        Constrainer::new(transforms),
        Unconstrainer::new(transforms),
    )
}
