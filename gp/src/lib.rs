//! This library implements [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process) regression
//! also known as [Kriging](https://en.wikipedia.org/wiki/Kriging) models, used as surrogate
//! models by the `sobox` Bayesian optimization strategy.
//!
//! GP methods are implemented by [GaussianProcess] parameterized by [GpParams].
//! Besides point predictions and variances, the fitted model gives the joint
//! posterior covariance at a set of points ([GaussianProcess::predict_cov]) and
//! posterior trajectories drawn from given base samples ([GaussianProcess::sample])
//! which Monte-Carlo acquisition criteria rely on.
//!
//! Hyperparameters are estimated by maximizing the reduced likelihood with a multistart
//! COBYLA optimization. Configurations can be compared with [cross_val_score].
#![warn(missing_docs)]

mod algorithm;
pub mod correlation_models;
mod errors;
pub mod mean_models;
mod metrics;
mod optimization;
mod parameters;
mod utils;

pub use algorithm::*;
pub use correlation_models::CorrelationKind;
pub use errors::*;
pub use mean_models::MeanKind;
pub use metrics::*;
pub use parameters::*;

/// Default number of multistart for hyperparameters optimization
pub const GP_OPTIM_N_START: usize = 10;
/// Minimum number of likelihood evaluation during one hyperparameters optimization
pub const GP_COBYLA_MIN_EVAL: usize = 25;
/// Maximum number of likelihood evaluation during one hyperparameters optimization
pub const GP_COBYLA_MAX_EVAL: usize = 1000;
