use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Default temperature of the probability of improvement sigmoid
pub const DEFAULT_PI_TAU: f64 = 1e-3;
/// Default upper confidence bound exploration parameter
pub const DEFAULT_UCB_BETA: f64 = 0.2;
/// Default temperature of the smooth maximum over the q-batch of log criteria
pub const DEFAULT_TAU_MAX: f64 = 1e-2;
/// Default temperature of the smooth improvement of log criteria
pub const DEFAULT_TAU_RELU: f64 = 1e-6;

fn default_true() -> bool {
    true
}

fn default_pi_tau() -> f64 {
    DEFAULT_PI_TAU
}

fn default_ucb_beta() -> f64 {
    DEFAULT_UCB_BETA
}

fn default_tau_max() -> f64 {
    DEFAULT_TAU_MAX
}

fn default_tau_relu() -> f64 {
    DEFAULT_TAU_RELU
}

/// Monte-Carlo acquisition function used to select next candidates
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AcquisitionFunction {
    /// q-Expected Improvement
    #[serde(rename = "qEI")]
    QEI,
    /// q-Noisy Expected Improvement
    #[serde(rename = "qNEI")]
    QNEI {
        #[serde(default = "default_true")]
        prune_baseline: bool,
    },
    /// q-Probability of Improvement
    #[serde(rename = "qPI")]
    QPI {
        #[serde(default = "default_pi_tau")]
        tau: f64,
    },
    /// q-Upper Confidence Bound
    #[serde(rename = "qUCB")]
    QUCB {
        #[serde(default = "default_ucb_beta")]
        beta: f64,
    },
    /// q-Simple Regret
    #[serde(rename = "qSR")]
    QSR,
    /// Log of q-Expected Improvement
    #[serde(rename = "qLogEI")]
    QLogEI {
        #[serde(default = "default_tau_max")]
        tau_max: f64,
        #[serde(default = "default_tau_relu")]
        tau_relu: f64,
    },
    /// Log of q-Noisy Expected Improvement
    #[serde(rename = "qLogNEI")]
    QLogNEI {
        #[serde(default = "default_true")]
        prune_baseline: bool,
        #[serde(default = "default_tau_max")]
        tau_max: f64,
        #[serde(default = "default_tau_relu")]
        tau_relu: f64,
    },
}

impl Default for AcquisitionFunction {
    fn default() -> Self {
        AcquisitionFunction::QLogNEI {
            prune_baseline: true,
            tau_max: DEFAULT_TAU_MAX,
            tau_relu: DEFAULT_TAU_RELU,
        }
    }
}

impl AcquisitionFunction {
    /// Every acquisition function with default parameters
    pub fn all() -> Vec<AcquisitionFunction> {
        vec![
            AcquisitionFunction::QEI,
            AcquisitionFunction::QNEI {
                prune_baseline: true,
            },
            AcquisitionFunction::QPI {
                tau: DEFAULT_PI_TAU,
            },
            AcquisitionFunction::QUCB {
                beta: DEFAULT_UCB_BETA,
            },
            AcquisitionFunction::QSR,
            AcquisitionFunction::QLogEI {
                tau_max: DEFAULT_TAU_MAX,
                tau_relu: DEFAULT_TAU_RELU,
            },
            AcquisitionFunction::default(),
        ]
    }

    /// Short name as used in serialized configurations
    pub fn name(&self) -> &'static str {
        match self {
            AcquisitionFunction::QEI => "qEI",
            AcquisitionFunction::QNEI { .. } => "qNEI",
            AcquisitionFunction::QPI { .. } => "qPI",
            AcquisitionFunction::QUCB { .. } => "qUCB",
            AcquisitionFunction::QSR => "qSR",
            AcquisitionFunction::QLogEI { .. } => "qLogEI",
            AcquisitionFunction::QLogNEI { .. } => "qLogNEI",
        }
    }

    /// Whether output constraints are folded into a constrained objective
    /// rather than handed to the criterion
    pub fn uses_constrained_objective(&self) -> bool {
        matches!(self, AcquisitionFunction::QUCB { .. } | AcquisitionFunction::QSR)
    }
}

/// Handling of non continuous features in the candidate optimization
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoricalMethod {
    /// Enumerate every value, each combination is optimized separately
    Exhaustive,
    /// Optimize a continuous relaxation then round to the closest allowed value
    Free,
}

/// Aggregation of the output scores into a single objective
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveAggregation {
    /// Score of the first output to maximize or minimize
    #[default]
    Single,
    /// Weighted sum of the scores
    Additive,
    /// Product of the scores raised to their weights
    Multiplicative,
    /// User supplied function of the scores
    Custom,
}

/// Trade-off parameter of the local search region
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Gamma {
    /// Constant value
    Constant(f64),
    /// Drawn log-uniformly in `[lower, upper]` at each ask
    LogUniform { lower: f64, upper: f64 },
}

/// Local search region configuration
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum LocalSearchConfig {
    /// Local search region Bayesian optimization: candidates of the local
    /// search are kept when their acquisition value is at least `gamma`,
    /// otherwise global candidates are returned
    LsrBo { gamma: Gamma },
}

impl LocalSearchConfig {
    /// Local search region with a constant trade-off parameter
    pub fn lsrbo(gamma: f64) -> Self {
        LocalSearchConfig::LsrBo {
            gamma: Gamma::Constant(gamma),
        }
    }
}

/// Options handed to the candidate optimizer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizerOptions {
    /// Maximum number of acquisition evaluations of one local optimization
    pub maxiter: usize,
    /// Number of restarts optimized concurrently
    pub batch_limit: usize,
}

/// Batch of candidates returned by `ask`
#[derive(Clone, Debug, PartialEq)]
pub struct Candidates {
    /// Folded input values (n, n_inputs)
    pub x: Array2<f64>,
    /// Surrogate mean at candidates (n, n_outputs)
    pub y_pred: Array2<f64>,
    /// Surrogate standard deviation at candidates (n, n_outputs)
    pub y_sd: Array2<f64>,
}

impl Candidates {
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.x.nrows() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_serde() {
        let acqf: AcquisitionFunction = serde_json::from_str(r#"{"type": "qUCB", "beta": 0.5}"#).unwrap();
        assert_eq!(acqf, AcquisitionFunction::QUCB { beta: 0.5 });
        let acqf: AcquisitionFunction = serde_json::from_str(r#"{"type": "qLogNEI"}"#).unwrap();
        assert_eq!(acqf, AcquisitionFunction::default());
        for acqf in AcquisitionFunction::all() {
            let json = serde_json::to_string(&acqf).unwrap();
            assert!(json.contains(acqf.name()));
        }
        assert!(serde_json::from_str::<AcquisitionFunction>(r#"{"type": "qXYZ"}"#).is_err());
    }
}
