use thiserror::Error;

/// A result type for the SOBO strategy
pub type Result<T> = std::result::Result<T, SoboError>;

/// An error for the SOBO strategy
#[derive(Error, Debug)]
pub enum SoboError {
    /// When acquisition or candidates are requested before the surrogate is trained
    #[error("Model not trained.")]
    NotFitted,
    /// When a configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfigError(String),
    /// When data (experiments, candidates, keys) is inconsistent with the domain
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// When an expression cannot be evaluated
    #[error("Expression error: {0}")]
    ExprError(String),
    /// When the surrogate model fails
    #[error(transparent)]
    GpError(#[from] sobox_gp::GpError),
    /// When a (de)serialization fails
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
}
