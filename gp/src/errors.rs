use linfa_linalg::LinalgError;
use thiserror::Error;

/// A result type for GP regression algorithm
pub type Result<T> = std::result::Result<T, GpError>;

/// An error when modeling a GP
#[derive(Error, Debug)]
pub enum GpError {
    /// When LikelihoodComputation computation fails
    #[error("LikelihoodComputation computation error: {0}")]
    LikelihoodComputationError(String),
    /// When linear algebra computation fails
    #[error("Linear Algebra error: {0}")]
    LinalgError(#[from] LinalgError),
    /// When a value is invalid
    #[error("Invalid value: {0}")]
    InvalidValueError(String),
    /// When training data is missing or inconsistent
    #[error("Training data error: {0}")]
    TrainingDataError(String),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
}
