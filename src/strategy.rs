//! Ask and tell interface of the single objective Bayesian optimization.
//!
//! [SoboStrategy] holds the experiments told so far, the pending candidates
//! and the surrogate. Each `ask` builds the objective from the output
//! features, instantiates the configured acquisition criterion and maximizes
//! it over the domain.
use crate::config::{SoboConfig, ValidSoboConfig};
use crate::criteria::{McAcquisition, McContext, McSampler};
use crate::domain::{Constraint, Domain, Experiments};
use crate::errors::{Result, SoboError};
use crate::expr::Expr;
use crate::objectives::{
    constrained_objective, generic_objective_and_constraints, CustomFunction, GenericMcObjective,
    OutputConstraint, SoboObjective,
};
use crate::optimizers::CandidateOptimizer;
use crate::surrogate::{hyperoptimize, ModelList, SurrogateSpec};
use crate::types::*;
use crate::SOBOX_LOG;

use env_logger::{Builder, Env};
use log::{debug, info, warn};
use ndarray::{concatenate, Array2, Axis};
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

/// Number of standard deviations below the posterior mean used to bound
/// the objective from below
const INFEASIBLE_COST_STD: f64 = 6.;

/// Single objective Bayesian optimization strategy
pub struct SoboStrategy {
    domain: Domain,
    config: ValidSoboConfig,
    /// Current surrogate specification, updated by hyperparameters search
    surrogate: SurrogateSpec,
    custom_function: CustomFunction,
    experiments: Option<Experiments>,
    /// Pending candidates (folded values)
    candidates: Option<Array2<f64>>,
    model: Option<ModelList>,
    n_tells: usize,
    rng: Xoshiro256Plus,
}

impl SoboStrategy {
    /// Strategy for the given domain and configuration.
    ///
    /// Fails when the configuration is invalid or its custom function dump
    /// cannot be loaded.
    pub fn new(domain: Domain, config: SoboConfig) -> Result<Self> {
        let env = Env::new().filter_or(SOBOX_LOG, "info");
        let mut builder = Builder::from_env(env);
        let builder = builder.target(env_logger::Target::Stdout);
        builder.try_init().ok();

        let config = config.check()?;
        let custom_function = match config.config.dump.as_deref() {
            Some(dump) => CustomFunction::loads(dump)?,
            None => CustomFunction::default(),
        };
        Ok(SoboStrategy {
            domain,
            surrogate: config.config.surrogate.clone(),
            rng: Xoshiro256Plus::seed_from_u64(config.seed),
            config,
            custom_function,
            experiments: None,
            candidates: None,
            model: None,
            n_tells: 0,
        })
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn config(&self) -> &ValidSoboConfig {
        &self.config
    }

    /// Current surrogate specification
    pub fn surrogate(&self) -> &SurrogateSpec {
        &self.surrogate
    }

    pub fn experiments(&self) -> Option<&Experiments> {
        self.experiments.as_ref()
    }

    /// Pending candidates (folded values)
    pub fn candidates(&self) -> Option<&Array2<f64>> {
        self.candidates.as_ref()
    }

    pub fn num_experiments(&self) -> usize {
        self.experiments.as_ref().map(|e| e.nrows()).unwrap_or(0)
    }

    pub fn num_candidates(&self) -> usize {
        self.candidates.as_ref().map(|c| c.nrows()).unwrap_or(0)
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// Whether every output has at least one valid experiment
    pub fn has_sufficient_experiments(&self) -> bool {
        self.experiments
            .as_ref()
            .map(|e| (0..e.y().ncols()).all(|j| e.n_valid(j) > 0))
            .unwrap_or(false)
    }

    /// Forget pending candidates
    pub fn reset_pending(&mut self) {
        self.candidates = None;
    }

    /// Append experiments and retrain the surrogate
    pub fn tell(&mut self, experiments: &Experiments) -> Result<()> {
        self.tell_with(experiments, false, true)
    }

    /// Append (or replace with) experiments and, if `retrain`, fit the
    /// surrogate once every output has a valid experiment
    pub fn tell_with(&mut self, experiments: &Experiments, replace: bool, retrain: bool) -> Result<()> {
        self.domain.validate_experiments(experiments)?;
        match self.experiments.as_mut() {
            Some(exps) if !replace => exps.append(experiments)?,
            _ => self.experiments = Some(experiments.clone()),
        }
        info!("Told {} experiments ({} in total)", experiments.nrows(), self.num_experiments());
        if !retrain {
            return Ok(());
        }
        if !self.has_sufficient_experiments() {
            warn!("Not enough valid experiments to train the surrogate");
            return Ok(());
        }
        let frequency = self.config.config.frequency_hyperopt;
        if frequency > 0 && self.n_tells % frequency == 0 {
            self.hyperoptimize()?;
        }
        self.n_tells += 1;
        self.fit()
    }

    fn hyperoptimize(&mut self) -> Result<()> {
        let Some(exps) = self.experiments.as_ref() else {
            return Ok(());
        };
        match hyperoptimize(&self.surrogate, self.domain.inputs(), exps)? {
            Some(spec) => self.surrogate = spec,
            None => warn!(
                "No hyperopt is possible as no hyperopt config is available. Returning initial config."
            ),
        }
        Ok(())
    }

    fn fit(&mut self) -> Result<()> {
        let exps = self.experiments.as_ref().ok_or(SoboError::NotFitted)?;
        self.model = Some(ModelList::fit(self.domain.inputs(), exps, &self.surrogate)?);
        Ok(())
    }

    fn model(&self) -> Result<&ModelList> {
        self.model.as_ref().ok_or(SoboError::NotFitted)
    }

    /// Encoded training inputs (n_train, encoded_dim) and pending
    /// candidates (n_pending, encoded_dim).
    ///
    /// Training inputs are the distinct inputs of experiments valid for
    /// every output, in the order they were told.
    pub fn get_acqf_input_tensors(&self) -> Result<(Array2<f64>, Array2<f64>)> {
        let exps = self.experiments.as_ref().ok_or(SoboError::NotFitted)?;
        let inputs = self.domain.inputs();
        let xe = inputs.transform(exps.select_valid().x())?;
        let mut rows: Vec<usize> = Vec::with_capacity(xe.nrows());
        for i in 0..xe.nrows() {
            if !rows.iter().any(|k| xe.row(*k) == xe.row(i)) {
                rows.push(i);
            }
        }
        let x_train = xe.select(Axis(0), &rows);
        let x_pending = match self.candidates.as_ref() {
            Some(c) => inputs.transform(c)?,
            None => Array2::zeros((0, inputs.encoded_dim())),
        };
        Ok((x_train, x_pending))
    }

    /// Attach the function of a custom objective
    pub fn set_custom_function(&mut self, f: Expr) {
        self.custom_function.set(f);
    }

    /// Serialized custom function, fails when none is attached
    pub fn dumps(&self) -> Result<String> {
        self.custom_function.dumps()
    }

    /// Attach a custom function serialized with [SoboStrategy::dumps]
    pub fn loads(&mut self, dump: &str) -> Result<()> {
        self.custom_function = CustomFunction::loads(dump)?;
        Ok(())
    }

    fn generic_objective(&self) -> Result<(GenericMcObjective, Vec<OutputConstraint>)> {
        let exps = self.experiments.as_ref().ok_or(SoboError::NotFitted)?;
        generic_objective_and_constraints(
            self.domain.outputs(),
            exps,
            self.config.config.objective_aggregation,
            &self.custom_function,
            self.config.config.use_output_constraints,
        )
    }

    /// Shift `M` making the objective non-negative on the training inputs:
    /// `-min(0, min obj(mean - 6 std))`
    pub fn get_infeasible_cost(&self) -> Result<f64> {
        let (objective, _) = self.generic_objective()?;
        let model = self.model()?;
        let (x_train, _) = self.get_acqf_input_tensors()?;
        let (mean, std) = model.predict(&x_train.view())?;
        let lower = mean - std * INFEASIBLE_COST_STD;
        let obj = objective.forward(&lower.view().insert_axis(Axis(0)), &x_train.view())?;
        let min = obj.fold(0., |acc: f64, v| if v.is_finite() { acc.min(*v) } else { acc });
        Ok(-min)
    }

    /// Objective and output constraints handed to the acquisition criterion.
    ///
    /// qUCB and qSR take a constrained objective embedding the output
    /// constraints, other criteria weight their improvement by the
    /// feasibility of the returned constraints.
    pub fn get_objective_and_constraints(&self) -> Result<(SoboObjective, Vec<OutputConstraint>)> {
        let (generic, constraints) = self.generic_objective()?;
        if !self.config.acquisition_function.uses_constrained_objective() {
            return Ok((SoboObjective::Generic(generic), constraints));
        }
        if constraints.is_empty() {
            return Ok((SoboObjective::Generic(generic), vec![]));
        }
        let infeasible_cost = self.get_infeasible_cost()?;
        let objective = constrained_objective(self.domain.outputs(), generic, infeasible_cost)?;
        Ok((SoboObjective::Constrained(objective), vec![]))
    }

    /// Best objective value of the posterior mean at feasible training
    /// inputs and the index of that input. When no training input is
    /// feasible, the value is `-infeasible_cost` and the index the best
    /// unconstrained one.
    fn best_observed(
        &self,
        objective: &SoboObjective,
        constraints: &[OutputConstraint],
        infeasible_cost: f64,
    ) -> Result<(f64, usize)> {
        let model = self.model()?;
        let (x_train, _) = self.get_acqf_input_tensors()?;
        let (mean, _) = model.predict(&x_train.view())?;
        let obj = objective.forward(&mean.view().insert_axis(Axis(0)), &x_train.view())?;
        let argmax = |rows: &mut dyn Iterator<Item = usize>| {
            rows.filter(|j| obj[[0, *j]].is_finite())
                .max_by(|a, b| obj[[0, *a]].total_cmp(&obj[[0, *b]]))
        };
        let feasible = argmax(&mut (0..x_train.nrows()).filter(|j| {
            constraints
                .iter()
                .all(|c| c.value(mean[[*j, c.index]]) <= 0.)
        }));
        Ok(match feasible {
            Some(j) => (obj[[0, j]], j),
            None => (-infeasible_cost, argmax(&mut (0..x_train.nrows())).unwrap_or(0)),
        })
    }

    /// Acquisition criterion of the current state (surrogate, objective and
    /// pending candidates)
    pub fn get_acqf(&self) -> Result<McAcquisition<'_>> {
        let model = self.model()?;
        let (x_train, x_pending) = self.get_acqf_input_tensors()?;
        let (objective, constraints) = self.get_objective_and_constraints()?;
        let infeasible_cost = self.get_infeasible_cost()?;
        let (best_f, _) = self.best_observed(&objective, &constraints, infeasible_cost)?;
        debug!("Best observed objective {best_f}, infeasible cost {infeasible_cost}");
        let ctx = McContext {
            model,
            objective,
            constraints,
            x_pending,
            sampler: McSampler::new(self.config.config.num_mc_samples, self.config.seed),
        };
        McAcquisition::new(
            &self.config.acquisition_function,
            ctx,
            &x_train,
            best_f,
            infeasible_cost,
        )
    }

    /// Candidate optimizer options, the batch limit does not exceed the
    /// max count of n-choose-k constraints
    pub fn get_optimizer_options(&self) -> OptimizerOptions {
        let batch_limit = self
            .domain
            .constraints()
            .iter()
            .fold(self.config.config.batch_limit, |limit, c| match c {
                Constraint::NChooseK { max_count, .. } => limit.min(*max_count),
                _ => limit,
            })
            .max(1);
        OptimizerOptions {
            maxiter: self.config.config.maxiter,
            batch_limit,
        }
    }

    /// Acquisition values of folded candidates (n, n_inputs): one value per
    /// candidate or, when `combined`, one value of the whole batch
    pub fn calc_acquisition(&self, candidates: &Array2<f64>, combined: bool) -> Result<Vec<f64>> {
        let acqf = self.get_acqf()?;
        let xe = self.domain.inputs().transform(candidates)?;
        if combined {
            Ok(vec![acqf.value(&xe.view())?])
        } else {
            acqf.values(&xe.view())
        }
    }

    /// Trade-off parameter of the local search of this ask, if any
    fn draw_gamma(&mut self) -> Option<f64> {
        match self.config.config.local_search_config {
            Some(LocalSearchConfig::LsrBo {
                gamma: Gamma::Constant(gamma),
            }) => Some(gamma),
            Some(LocalSearchConfig::LsrBo {
                gamma: Gamma::LogUniform { lower, upper },
            }) => Some(self.rng.gen_range(lower.ln()..=upper.ln()).exp()),
            None => None,
        }
    }

    /// Select `n` candidates maximizing the acquisition criterion. With
    /// `add_pending`, the candidates are added to the pending ones accounted
    /// for by the next asks.
    pub fn ask(&mut self, n: usize, add_pending: bool) -> Result<Candidates> {
        if n == 0 {
            return Err(SoboError::ValidationError(
                "at least one candidate should be asked".to_string(),
            ));
        }
        self.model()?;
        let seed: u64 = self.rng.gen();
        let gamma = self.draw_gamma();

        let candidates = {
            let acqf = self.get_acqf()?;
            info!("Optimize {} criterion for {n} candidates...", acqf.name());
            let inputs = self.domain.inputs();
            let config = &self.config;
            let optimizer = CandidateOptimizer::new(inputs, self.domain.constraints())
                .methods(
                    config.categorical_method,
                    config.descriptor_method,
                    config.discrete_method,
                )
                .num_restarts(config.config.num_restarts)
                .num_raw_samples(config.config.num_raw_samples)
                .max_combinations(config.config.max_combinations)
                .options(self.get_optimizer_options())
                .seed(seed);
            let (x_train, _) = self.get_acqf_input_tensors()?;
            let (xe, value) = match gamma {
                Some(gamma) if x_train.nrows() > 0 => {
                    let objective = &acqf.context().objective;
                    let constraints = &acqf.context().constraints;
                    let infeasible_cost = self.get_infeasible_cost()?;
                    let (_, best) = self.best_observed(objective, constraints, infeasible_cost)?;
                    optimizer.optimize_with_local_search(&acqf, n, gamma, &x_train.row(best))?
                }
                Some(_) => {
                    warn!("No experiment valid for every output, local search skipped");
                    optimizer.optimize(&acqf, n, &inputs.encoded_bounds())?
                }
                None => optimizer.optimize(&acqf, n, &inputs.encoded_bounds())?,
            };
            info!("{} criterion = {value}", acqf.name());
            let (y_pred, y_sd) = self.model()?.predict(&xe.view())?;
            Candidates {
                x: inputs.inverse_transform(&xe),
                y_pred,
                y_sd,
            }
        };
        debug!("Candidates {}", candidates.x);

        if add_pending {
            self.candidates = Some(match self.candidates.take() {
                Some(pending) => concatenate![Axis(0), pending, candidates.x],
                None => candidates.x.clone(),
            });
        }
        Ok(candidates)
    }
}
