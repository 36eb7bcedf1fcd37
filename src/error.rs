use thiserror::Error;

/// Failures inside a single numerical step of the estimator.
///
/// These never reach callers of `StateEstimator::update` or the forward
/// predictor; each one selects a fallback branch (alternate square root,
/// partial reset, truncated trajectory).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericalError {
    #[error("Cholesky factorization failed")]
    CholeskyFailed,

    #[error("Eigen decomposition did not converge")]
    EigenFailed,

    #[error("Innovation covariance is singular: {0}")]
    SingularInnovation(f64),

    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),
}

/// Numerical step result
pub type NumResult<T> = Result<T, NumericalError>;

/// Errors surfaced at construction/configuration time.
#[derive(Error, Debug, Clone)]
pub enum TrackerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid session: {0}")]
    InvalidSession(String),
}
