use crate::correlation_models::CorrelationKind;
use crate::errors::{GpError, Result};
use crate::mean_models::MeanKind;
use crate::{GP_COBYLA_MAX_EVAL, GP_COBYLA_MIN_EVAL, GP_OPTIM_N_START};
use linfa::ParamGuard;
use serde::{Deserialize, Serialize};

/// An enum to represent a n-dim hyper parameter tuning
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ThetaTuning {
    /// Constant parameter (ie given not estimated)
    Fixed(Vec<f64>),
    /// Parameter is optimized between given bounds (lower, upper) starting from the inital guess
    Full {
        /// Initial guess for the parameter, either one value or one per input dimension
        init: Vec<f64>,
        /// Bounds for the parameter, either one pair or one per input dimension
        bounds: Vec<(f64, f64)>,
    },
}

impl Default for ThetaTuning {
    fn default() -> Self {
        ThetaTuning::Full {
            init: vec![Self::DEFAULT_INIT],
            bounds: vec![Self::DEFAULT_BOUNDS],
        }
    }
}

impl ThetaTuning {
    /// Default initial theta value
    pub const DEFAULT_INIT: f64 = 1e-1;
    /// Default bounds for theta values
    pub const DEFAULT_BOUNDS: (f64, f64) = (1e-2, 1e2);

    /// Get initial theta value
    pub fn init(&self) -> &[f64] {
        match self {
            ThetaTuning::Full { init, .. } => init,
            ThetaTuning::Fixed(init) => init,
        }
    }

    /// Get bounds for theta value
    pub fn bounds(&self) -> Option<&[(f64, f64)]> {
        match self {
            ThetaTuning::Full { bounds, .. } => Some(bounds),
            ThetaTuning::Fixed(_) => None,
        }
    }
}

/// A set of validated GP parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpValidParams {
    /// Parameter tuning hint of the autocorrelation model
    pub(crate) theta_tuning: ThetaTuning,
    /// Regression model representing the mean(x)
    pub(crate) mean: MeanKind,
    /// Correlation model representing the spatial correlation between errors at e(x) and e(x')
    pub(crate) corr: CorrelationKind,
    /// Number of internal likelihood optimization restart
    pub(crate) n_start: usize,
    /// Max number of internal likelihood evaluation during optimization
    pub(crate) max_eval: usize,
    /// Parameter to improve numerical stability
    pub(crate) nugget: f64,
}

impl Default for GpValidParams {
    fn default() -> GpValidParams {
        GpValidParams {
            theta_tuning: ThetaTuning::default(),
            mean: MeanKind::default(),
            corr: CorrelationKind::default(),
            n_start: GP_OPTIM_N_START,
            max_eval: GP_COBYLA_MAX_EVAL,
            nugget: 100.0 * f64::EPSILON,
        }
    }
}

impl GpValidParams {
    /// Get mean model
    pub fn mean(&self) -> MeanKind {
        self.mean
    }

    /// Get correlation corr k(x, x')
    pub fn corr(&self) -> CorrelationKind {
        self.corr
    }

    /// Get starting theta value for optimization
    pub fn theta_tuning(&self) -> &ThetaTuning {
        &self.theta_tuning
    }

    /// Get the number of internal optimization restart
    pub fn n_start(&self) -> usize {
        self.n_start
    }

    /// Get the max number of internal likelihood evaluations during one optimization
    pub fn max_eval(&self) -> usize {
        self.max_eval
    }

    /// Get nugget
    pub fn nugget(&self) -> f64 {
        self.nugget
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
/// The set of hyperparameters that can be specified for the execution of
/// the [GP algorithm](crate::GaussianProcess).
pub struct GpParams(pub(crate) GpValidParams);

impl GpParams {
    /// A constructor for GP parameters given mean and correlation models
    pub fn new(mean: MeanKind, corr: CorrelationKind) -> GpParams {
        Self(GpValidParams {
            mean,
            corr,
            ..Default::default()
        })
    }

    /// Set mean model.
    pub fn mean(mut self, mean: MeanKind) -> Self {
        self.0.mean = mean;
        self
    }

    /// Set correlation model.
    pub fn corr(mut self, corr: CorrelationKind) -> Self {
        self.0.corr = corr;
        self
    }

    /// Set theta hyper parameter tuning
    pub fn theta_tuning(mut self, theta_tuning: ThetaTuning) -> Self {
        self.0.theta_tuning = theta_tuning;
        self
    }

    /// Set the number of internal GP hyperparameter theta optimization restarts
    pub fn n_start(mut self, n_start: usize) -> Self {
        self.0.n_start = n_start;
        self
    }

    /// Set the max number of internal likelihood evaluations during one optimization.
    /// Values lower than [crate::GP_COBYLA_MIN_EVAL] are raised to it.
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.0.max_eval = GP_COBYLA_MIN_EVAL.max(max_eval);
        self
    }

    /// Set nugget.
    ///
    /// Nugget is used to improve numerical stability
    pub fn nugget(mut self, nugget: f64) -> Self {
        self.0.nugget = nugget;
        self
    }
}

impl From<GpValidParams> for GpParams {
    fn from(valid: GpValidParams) -> Self {
        GpParams(valid)
    }
}

impl ParamGuard for GpParams {
    type Checked = GpValidParams;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let tuning = &self.0.theta_tuning;
        if tuning.init().is_empty() || tuning.init().iter().any(|v| *v <= 0.) {
            return Err(GpError::InvalidValueError(
                "theta initial values should be given and strictly positive".to_string(),
            ));
        }
        if let Some(bounds) = tuning.bounds() {
            if bounds.is_empty() || bounds.iter().any(|(lo, up)| *lo <= 0. || lo >= up) {
                return Err(GpError::InvalidValueError(format!(
                    "theta bounds should be given as 0 < lower < upper, got {bounds:?}"
                )));
            }
        }
        if self.0.nugget < 0. {
            return Err(GpError::InvalidValueError(format!(
                "nugget should be positive, got {}",
                self.0.nugget
            )));
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_theta_bounds() {
        let params = GpParams::default().theta_tuning(ThetaTuning::Full {
            init: vec![0.1],
            bounds: vec![(1., 0.1)],
        });
        assert!(matches!(
            params.check(),
            Err(GpError::InvalidValueError(_))
        ));
    }

    #[test]
    fn test_max_eval_floor() {
        let params = GpParams::default().max_eval(3).check().unwrap();
        assert_eq!(params.max_eval(), GP_COBYLA_MIN_EVAL);
    }

    #[test]
    fn test_params_serde() {
        let params = GpParams::new(MeanKind::Linear, CorrelationKind::Matern52);
        let json = serde_json::to_string(&params).unwrap();
        let back: GpParams = serde_json::from_str(&json).unwrap();
        assert_eq!(params, back);
    }
}
