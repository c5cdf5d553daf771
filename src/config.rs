//! Sobo strategy configuration.
use crate::errors::{Result, SoboError};
use crate::surrogate::SurrogateSpec;
use crate::types::*;

use serde::{Deserialize, Serialize};

/// Sobo strategy configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoboConfig {
    /// Acquisition function used to select candidates
    pub(crate) acquisition_function: Option<AcquisitionFunction>,
    /// Handling of categorical features in the candidate optimization
    pub(crate) categorical_method: Option<CategoricalMethod>,
    /// Handling of descriptor features in the candidate optimization
    pub(crate) descriptor_method: Option<CategoricalMethod>,
    /// Handling of discrete features in the candidate optimization
    pub(crate) discrete_method: Option<CategoricalMethod>,
    /// Aggregation of the output scores
    pub(crate) objective_aggregation: ObjectiveAggregation,
    /// Whether sigmoid outputs act as constraints of additive, multiplicative
    /// and custom objectives
    pub(crate) use_output_constraints: bool,
    /// Serialized custom function, see [crate::SoboStrategy::dumps]
    pub(crate) dump: Option<String>,
    /// Surrogate model specification
    pub(crate) surrogate: SurrogateSpec,
    /// Number of Monte-Carlo samples of the posterior
    pub(crate) num_mc_samples: usize,
    /// Number of local optimizations of the criterion
    pub(crate) num_restarts: usize,
    /// Number of raw samples screened to start local optimizations
    pub(crate) num_raw_samples: usize,
    /// Max number of criterion evaluations of a local optimization
    pub(crate) maxiter: usize,
    /// Number of local optimizations run concurrently
    pub(crate) batch_limit: usize,
    /// Max number of fixed feature combinations optimized separately
    pub(crate) max_combinations: usize,
    /// Surrogate hyperparameters search every `frequency_hyperopt` tells (0: never)
    pub(crate) frequency_hyperopt: usize,
    /// Local search region configuration
    pub(crate) local_search_config: Option<LocalSearchConfig>,
    /// Random generator seed, drawn at random when not set
    pub(crate) seed: Option<i64>,
}

impl Default for SoboConfig {
    fn default() -> Self {
        SoboConfig {
            acquisition_function: Some(AcquisitionFunction::default()),
            categorical_method: Some(CategoricalMethod::Exhaustive),
            descriptor_method: Some(CategoricalMethod::Exhaustive),
            discrete_method: Some(CategoricalMethod::Exhaustive),
            objective_aggregation: ObjectiveAggregation::Single,
            use_output_constraints: true,
            dump: None,
            surrogate: SurrogateSpec::default(),
            num_mc_samples: 512,
            num_restarts: 8,
            num_raw_samples: 1024,
            maxiter: 2000,
            batch_limit: 6,
            max_combinations: 64,
            frequency_hyperopt: 0,
            local_search_config: None,
            seed: None,
        }
    }
}

impl SoboConfig {
    /// Sets acquisition function, `None` is rejected by [SoboConfig::check]
    pub fn acquisition_function(mut self, acqf: Option<AcquisitionFunction>) -> Self {
        self.acquisition_function = acqf;
        self
    }

    pub fn categorical_method(mut self, method: Option<CategoricalMethod>) -> Self {
        self.categorical_method = method;
        self
    }

    pub fn descriptor_method(mut self, method: Option<CategoricalMethod>) -> Self {
        self.descriptor_method = method;
        self
    }

    pub fn discrete_method(mut self, method: Option<CategoricalMethod>) -> Self {
        self.discrete_method = method;
        self
    }

    pub fn objective_aggregation(mut self, aggregation: ObjectiveAggregation) -> Self {
        self.objective_aggregation = aggregation;
        self
    }

    pub fn use_output_constraints(mut self, use_output_constraints: bool) -> Self {
        self.use_output_constraints = use_output_constraints;
        self
    }

    /// Sets a custom function serialized with [crate::SoboStrategy::dumps]
    pub fn dump(mut self, dump: impl Into<String>) -> Self {
        self.dump = Some(dump.into());
        self
    }

    pub fn surrogate(mut self, surrogate: SurrogateSpec) -> Self {
        self.surrogate = surrogate;
        self
    }

    pub fn num_mc_samples(mut self, num_mc_samples: usize) -> Self {
        self.num_mc_samples = num_mc_samples;
        self
    }

    pub fn num_restarts(mut self, num_restarts: usize) -> Self {
        self.num_restarts = num_restarts;
        self
    }

    pub fn num_raw_samples(mut self, num_raw_samples: usize) -> Self {
        self.num_raw_samples = num_raw_samples;
        self
    }

    pub fn maxiter(mut self, maxiter: usize) -> Self {
        self.maxiter = maxiter;
        self
    }

    pub fn batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    pub fn max_combinations(mut self, max_combinations: usize) -> Self {
        self.max_combinations = max_combinations;
        self
    }

    pub fn frequency_hyperopt(mut self, frequency_hyperopt: usize) -> Self {
        self.frequency_hyperopt = frequency_hyperopt;
        self
    }

    pub fn local_search_config(mut self, config: Option<LocalSearchConfig>) -> Self {
        self.local_search_config = config;
        self
    }

    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check the configuration and resolve its optional fields
    pub fn check(self) -> Result<ValidSoboConfig> {
        let missing = |name: &str| SoboError::InvalidConfigError(format!("{name} should be set"));
        let acquisition_function = self
            .acquisition_function
            .clone()
            .ok_or_else(|| missing("acquisition_function"))?;
        let categorical_method = self
            .categorical_method
            .ok_or_else(|| missing("categorical_method"))?;
        let descriptor_method = self
            .descriptor_method
            .ok_or_else(|| missing("descriptor_method"))?;
        let discrete_method = self
            .discrete_method
            .ok_or_else(|| missing("discrete_method"))?;
        let seed = match self.seed {
            Some(seed) if seed < 0 => {
                return Err(SoboError::InvalidConfigError(format!(
                    "seed should be positive, got {seed}"
                )))
            }
            Some(seed) => seed as u64,
            None => ndarray_rand::rand::random(),
        };
        if self.num_mc_samples == 0 || self.num_restarts == 0 || self.num_raw_samples == 0 {
            return Err(SoboError::InvalidConfigError(
                "num_mc_samples, num_restarts and num_raw_samples should be positive".to_string(),
            ));
        }
        if let Some(LocalSearchConfig::LsrBo {
            gamma: Gamma::LogUniform { lower, upper },
        }) = self.local_search_config
        {
            if !(lower > 0. && lower <= upper) {
                return Err(SoboError::InvalidConfigError(format!(
                    "log uniform gamma requires 0 < lower <= upper, got [{lower}, {upper}]"
                )));
            }
        }
        Ok(ValidSoboConfig {
            acquisition_function,
            categorical_method,
            descriptor_method,
            discrete_method,
            seed,
            config: self,
        })
    }
}

/// A checked [SoboConfig]
#[derive(Clone, Debug, PartialEq)]
pub struct ValidSoboConfig {
    pub(crate) config: SoboConfig,
    pub(crate) acquisition_function: AcquisitionFunction,
    pub(crate) categorical_method: CategoricalMethod,
    pub(crate) descriptor_method: CategoricalMethod,
    pub(crate) discrete_method: CategoricalMethod,
    pub(crate) seed: u64,
}

impl ValidSoboConfig {
    pub fn config(&self) -> &SoboConfig {
        &self.config
    }

    pub fn acquisition_function(&self) -> &AcquisitionFunction {
        &self.acquisition_function
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let valid = SoboConfig::default().seed(42).check().unwrap();
        assert_eq!(
            valid.acquisition_function(),
            &AcquisitionFunction::QLogNEI {
                prune_baseline: true,
                tau_max: DEFAULT_TAU_MAX,
                tau_relu: DEFAULT_TAU_RELU
            }
        );
        assert_eq!(valid.seed(), 42);
        assert_eq!(valid.categorical_method, CategoricalMethod::Exhaustive);
    }

    #[test]
    fn test_invalid_configs() {
        let err = |config: SoboConfig| matches!(config.check(), Err(SoboError::InvalidConfigError(_)));
        assert!(err(SoboConfig::default().acquisition_function(None)));
        assert!(err(SoboConfig::default().categorical_method(None)));
        assert!(err(SoboConfig::default().descriptor_method(None)));
        assert!(err(SoboConfig::default().discrete_method(None)));
        assert!(err(SoboConfig::default().seed(-1)));
        assert!(err(SoboConfig::default().num_restarts(0)));
        assert!(err(SoboConfig::default().local_search_config(Some(
            LocalSearchConfig::LsrBo {
                gamma: Gamma::LogUniform {
                    lower: 0.,
                    upper: 1.
                }
            }
        ))));
    }

    #[test]
    fn test_config_serde() {
        let config = SoboConfig::default()
            .acquisition_function(Some(AcquisitionFunction::QUCB { beta: 0.5 }))
            .local_search_config(Some(LocalSearchConfig::lsrbo(0.1)))
            .seed(3);
        let json = serde_json::to_string(&config).unwrap();
        let restored: SoboConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);
        // missing fields take default values
        let partial: SoboConfig = serde_json::from_str(r#"{"num_restarts": 2}"#).unwrap();
        assert_eq!(partial.num_restarts, 2);
        assert_eq!(partial.num_raw_samples, 1024);
    }
}
