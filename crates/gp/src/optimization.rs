//! First order optimization of a differentiable [`Objective`] with [`Adam`].
use crate::errors::{GpError, Result};
use linfa::Float;
use log::{debug, info};
use ndarray::{Array1, Zip};
use std::time::Instant;

/// Default Adam step size
pub const ADAM_STEP_SIZE: f64 = 0.01;
/// Default exponential decay of Adam first moment estimates
pub const ADAM_BETA1: f64 = 0.9;
/// Default exponential decay of Adam second moment estimates
pub const ADAM_BETA2: f64 = 0.999;
/// Default Adam numerical stability constant
pub const ADAM_EPS: f64 = 1e-8;

/// Iterations between two progress logs of [`fit`]
const LOG_EVERY: usize = 100;

/// A differentiable scalar function of a flat parameter vector
pub trait Objective<F: Float> {
    /// Value at `params`
    fn value(&self, params: &Array1<F>) -> Result<F>;

    /// Value and gradient at `params`
    fn value_and_gradient(&self, params: &Array1<F>) -> Result<(F, Array1<F>)>;
}

/// A first order optimizer updating parameters from gradients
pub trait Optimizer<F: Float> {
    /// Reset the optimizer state for `n_params` parameters
    fn init(&mut self, n_params: usize);

    /// Take one descent step from `grad`, updating `params` in place
    fn update(&mut self, grad: &Array1<F>, params: &mut Array1<F>);
}

/// Adam (adaptive moment estimation) optimizer.
///
/// ```text
/// m_t = b1 * m_{t-1} + (1 - b1) * g_t
/// v_t = b2 * v_{t-1} + (1 - b2) * g_t^2
/// x_t = x_{t-1} - step * (m_t / (1 - b1^t)) / (sqrt(v_t / (1 - b2^t)) + eps)
/// ```
#[derive(Clone, Debug)]
pub struct Adam<F: Float> {
    step_size: F,
    beta1: F,
    beta2: F,
    eps: F,
    m: Array1<F>,
    v: Array1<F>,
    t: i32,
}

impl<F: Float> Default for Adam<F> {
    fn default() -> Self {
        Adam::new(F::cast(ADAM_STEP_SIZE))
    }
}

impl<F: Float> Adam<F> {
    /// Adam with the given step size and default decay rates
    pub fn new(step_size: F) -> Self {
        Adam {
            step_size,
            beta1: F::cast(ADAM_BETA1),
            beta2: F::cast(ADAM_BETA2),
            eps: F::cast(ADAM_EPS),
            m: Array1::zeros(0),
            v: Array1::zeros(0),
            t: 0,
        }
    }

    /// Set decay rates of the moment estimates
    pub fn with_betas(mut self, beta1: F, beta2: F) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    /// Set numerical stability constant
    pub fn with_eps(mut self, eps: F) -> Self {
        self.eps = eps;
        self
    }

    /// Get step size
    pub fn step_size(&self) -> F {
        self.step_size
    }

    /// Number of steps taken since the last `init`
    pub fn steps(&self) -> usize {
        self.t as usize
    }
}

impl<F: Float> Optimizer<F> for Adam<F> {
    fn init(&mut self, n_params: usize) {
        self.m = Array1::zeros(n_params);
        self.v = Array1::zeros(n_params);
        self.t = 0;
    }

    fn update(&mut self, grad: &Array1<F>, params: &mut Array1<F>) {
        if self.m.len() != params.len() {
            Optimizer::<F>::init(self, params.len());
        }
        self.t += 1;
        let (b1, b2) = (self.beta1, self.beta2);
        let m_corr = F::one() - b1.powi(self.t);
        let v_corr = F::one() - b2.powi(self.t);
        let (step, eps) = (self.step_size, self.eps);
        Zip::from(params)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(grad)
            .for_each(|x, m, v, &g| {
                *m = b1 * *m + (F::one() - b1) * g;
                *v = b2 * *v + (F::one() - b2) * g * g;
                *x -= step * (*m / m_corr) / ((*v / v_corr).sqrt() + eps);
            });
    }
}

/// Outcome of [`fit`]
#[derive(Clone, Debug)]
pub struct OptimResult<F: Float> {
    /// Parameters after the last iteration
    pub params: Array1<F>,
    /// Objective value at each iteration, before the update
    pub history: Vec<F>,
}

/// Minimize `objective` starting from `init` with `n_iters` steps of `optimizer`.
///
/// There is no early stopping. An objective failure at iteration `t` aborts with
/// [`GpError::OptimizationError`] holding the parameters at that iteration.
pub fn fit<F: Float>(
    objective: &impl Objective<F>,
    init: &Array1<F>,
    mut optimizer: impl Optimizer<F>,
    n_iters: usize,
) -> Result<OptimResult<F>> {
    let mut params = init.to_owned();
    optimizer.init(params.len());
    let mut history = Vec::with_capacity(n_iters);
    let now = Instant::now();
    for iteration in 0..n_iters {
        let (value, grad) = objective
            .value_and_gradient(&params)
            .map_err(|err| GpError::OptimizationError {
                iteration,
                params: params.iter().map(|v| v.to_f64().unwrap_or(f64::NAN)).collect(),
                source: Box::new(err),
            })?;
        if iteration % LOG_EVERY == 0 {
            debug!("iteration {iteration}: objective = {value}");
        }
        history.push(value);
        optimizer.update(&grad, &mut params);
    }
    info!(
        "{} iterations done in {}ms, last objective = {:?}",
        n_iters,
        now.elapsed().as_millis(),
        history.last()
    );
    Ok(OptimResult { params, history })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::cell::Cell;

    struct Quadratic {
        center: Array1<f64>,
    }

    impl Objective<f64> for Quadratic {
        fn value(&self, params: &Array1<f64>) -> Result<f64> {
            let d = params - &self.center;
            Ok(d.dot(&d))
        }

        fn value_and_gradient(&self, params: &Array1<f64>) -> Result<(f64, Array1<f64>)> {
            let d = params - &self.center;
            Ok((d.dot(&d), 2. * d))
        }
    }

    struct FailingAfter {
        calls: Cell<usize>,
        limit: usize,
    }

    impl Objective<f64> for FailingAfter {
        fn value(&self, params: &Array1<f64>) -> Result<f64> {
            Ok(params.sum())
        }

        fn value_and_gradient(&self, params: &Array1<f64>) -> Result<(f64, Array1<f64>)> {
            let calls = self.calls.get();
            self.calls.set(calls + 1);
            if calls == self.limit {
                return Err(GpError::NumericalError("boom".to_string()));
            }
            Ok((params.sum(), Array1::ones(params.len())))
        }
    }

    #[test]
    fn test_adam_first_step() {
        let mut adam = Adam::new(0.1);
        let mut x = array![1., -2.];
        adam.init(2);
        adam.update(&array![3., -0.5], &mut x);
        // bias corrected first step moves each component by the step size
        assert_abs_diff_eq!(x, array![0.9, -1.9], epsilon = 1e-6);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn test_fit_quadratic() {
        let objective = Quadratic {
            center: array![0.5, -1.5, 3.],
        };
        let res = fit(&objective, &Array1::zeros(3), Adam::new(0.05), 2000).unwrap();
        assert_eq!(res.history.len(), 2000);
        assert_abs_diff_eq!(res.params, objective.center, epsilon = 1e-2);
        assert!(res.history[1999] < res.history[0]);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let objective = Quadratic {
            center: array![1., 2.],
        };
        let a = fit(&objective, &array![0., 0.], Adam::default(), 50).unwrap();
        let b = fit(&objective, &array![0., 0.], Adam::default(), 50).unwrap();
        assert_eq!(a.params, b.params);
        assert_eq!(a.history, b.history);
    }

    #[test]
    fn test_fit_zero_iterations() {
        let objective = Quadratic {
            center: array![1.],
        };
        let res = fit(&objective, &array![4.], Adam::default(), 0).unwrap();
        assert_eq!(res.params, array![4.]);
        assert!(res.history.is_empty());
    }

    #[test]
    fn test_fit_aborts() {
        let objective = FailingAfter {
            calls: Cell::new(0),
            limit: 3,
        };
        match fit(&objective, &array![0., 0.], Adam::new(0.1), 10) {
            Err(GpError::OptimizationError {
                iteration,
                params,
                source,
            }) => {
                assert_eq!(iteration, 3);
                assert_eq!(params.len(), 2);
                assert!(params[0] < 0.);
                assert!(matches!(*source, GpError::NumericalError(_)));
            }
            other => panic!("expected an optimization error, got {other:?}"),
        }
    }
}
