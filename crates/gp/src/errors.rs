use thiserror::Error;

/// A result type for GP posterior algorithms
pub type Result<T> = std::result::Result<T, GpError>;

/// An error when building, fitting or querying a [`Posterior`](crate::Posterior)
#[derive(Error, Debug)]
pub enum GpError {
    /// When data or parameters do not have the expected shape or domain
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// When a factorization or an objective evaluation breaks down numerically
    #[error("Numerical error: {0}")]
    NumericalError(String),
    /// When a parameter name or a fitting option is unknown or inconsistent
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error(transparent)]
    /// When linear algebra computation fails
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When the optimizer aborts, `params` holds the unconstrained parameters
    /// at the failing iteration
    #[error("Optimization aborted at iteration {iteration}: {source}")]
    OptimizationError {
        /// Zero-based index of the failing iteration
        iteration: usize,
        /// Parameter snapshot (unconstrained, flattened)
        params: Vec<f64>,
        /// Underlying failure
        #[source]
        source: Box<GpError>,
    },
}
