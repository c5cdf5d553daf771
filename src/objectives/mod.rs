//! Monte-Carlo objectives: reduction of posterior samples of the outputs
//! (mc, n, n_outputs) into objective values (mc, n) to be maximized.
mod custom;
mod penalizer;
mod reducer;

pub use custom::*;
pub use penalizer::*;
pub use reducer::*;

use crate::domain::{Experiments, Outputs};
use crate::errors::{Result, SoboError};
use crate::expr::{Expr, ExprContext, Value};
use crate::types::ObjectiveAggregation;
use ndarray::{Array2, ArrayView2, ArrayView3, Axis};

/// Objective built from output scorers
#[derive(Clone, Debug)]
pub enum GenericMcObjective {
    /// Score of a single output
    Single(OutputScorer),
    /// `sum_i w_i score_i`
    Additive(Vec<OutputScorer>),
    /// `prod_i score_i ^ w_i`
    Multiplicative(Vec<OutputScorer>),
    /// `f(scores, weights, samples, x)`
    Custom {
        function: Expr,
        scorers: Vec<OutputScorer>,
    },
}

impl GenericMcObjective {
    /// Objective values (mc, n) of posterior samples (mc, n, n_outputs) at `x` (n, d)
    pub fn forward(&self, samples: &ArrayView3<f64>, x: &ArrayView2<f64>) -> Result<Array2<f64>> {
        let (mc, n, _) = samples.dim();
        match self {
            GenericMcObjective::Single(scorer) => Ok(scorer.score(samples)),
            GenericMcObjective::Additive(scorers) => Ok(scorers
                .iter()
                .fold(Array2::zeros((mc, n)), |acc, s| acc + s.score(samples) * s.weight())),
            GenericMcObjective::Multiplicative(scorers) => {
                Ok(scorers.iter().fold(Array2::ones((mc, n)), |acc, s| {
                    let w = s.weight();
                    acc * s.score(samples).mapv(|v| v.powf(w))
                }))
            }
            GenericMcObjective::Custom { function, scorers } => {
                let ctx = CustomContext {
                    scorers,
                    samples: samples.view(),
                    x: x.view(),
                };
                function.eval(&ctx)?.into_array((mc, n))
            }
        }
    }

    /// Scorers of the objective
    pub fn scorers(&self) -> Vec<&OutputScorer> {
        match self {
            GenericMcObjective::Single(s) => vec![s],
            GenericMcObjective::Additive(scorers)
            | GenericMcObjective::Multiplicative(scorers)
            | GenericMcObjective::Custom { scorers, .. } => scorers.iter().collect(),
        }
    }
}

struct CustomContext<'a> {
    scorers: &'a [OutputScorer],
    samples: ArrayView3<'a, f64>,
    x: ArrayView2<'a, f64>,
}

impl CustomContext<'_> {
    fn scorer(&self, i: usize) -> Result<&OutputScorer> {
        self.scorers.get(i).ok_or_else(|| {
            SoboError::ExprError(format!(
                "score[{i}] out of range, {} scorers available",
                self.scorers.len()
            ))
        })
    }
}

impl ExprContext for CustomContext<'_> {
    fn score(&self, i: usize) -> Result<Value> {
        Ok(Value::Array(self.scorer(i)?.score(&self.samples)))
    }

    fn weight(&self, i: usize) -> Result<f64> {
        Ok(self.scorer(i)?.weight())
    }

    fn output(&self, i: usize) -> Result<Value> {
        if i >= self.samples.len_of(Axis(2)) {
            return Err(SoboError::ExprError(format!("y[{i}] out of range")));
        }
        Ok(Value::Array(self.samples.index_axis(Axis(2), i).to_owned()))
    }

    fn input(&self, i: usize) -> Result<Value> {
        if i >= self.x.ncols() {
            return Err(SoboError::ExprError(format!("x[{i}] out of range")));
        }
        let (mc, n, _) = self.samples.dim();
        let col = self.x.column(i);
        let values = col
            .broadcast((mc, n))
            .ok_or_else(|| SoboError::ExprError(format!("x[{i}] cannot be broadcast")))?;
        Ok(Value::Array(values.to_owned()))
    }
}

/// Objective handed to acquisition criteria
#[derive(Clone, Debug)]
pub enum SoboObjective {
    Generic(GenericMcObjective),
    Constrained(ConstrainedMcObjective),
}

impl SoboObjective {
    /// Objective values (mc, n) of posterior samples (mc, n, n_outputs) at `x` (n, d)
    pub fn forward(&self, samples: &ArrayView3<f64>, x: &ArrayView2<f64>) -> Result<Array2<f64>> {
        match self {
            SoboObjective::Generic(obj) => obj.forward(samples, x),
            SoboObjective::Constrained(obj) => obj.forward(samples, x),
        }
    }

    pub fn is_constrained(&self) -> bool {
        matches!(self, SoboObjective::Constrained(_))
    }
}

/// Generic objective and output constraints of a problem
///
/// Soft constraint outputs are turned into output constraints when at least
/// one output is a target. Otherwise (or when `use_output_constraints` is
/// false for additive, multiplicative and custom aggregations) every output
/// is scored and no constraint is returned.
pub fn generic_objective_and_constraints(
    outputs: &Outputs,
    experiments: &Experiments,
    aggregation: ObjectiveAggregation,
    custom: &CustomFunction,
    use_output_constraints: bool,
) -> Result<(GenericMcObjective, Vec<OutputConstraint>)> {
    let (targets, soft) = partition(outputs);
    let all: Vec<usize> = (0..outputs.len()).collect();
    let (scored, constrained) = match aggregation {
        ObjectiveAggregation::Single if targets.is_empty() => (vec![0], vec![]),
        ObjectiveAggregation::Single => (vec![targets[0]], soft),
        _ if use_output_constraints && !targets.is_empty() => (targets, soft),
        _ => (all, vec![]),
    };
    let constraints = output_constraints(outputs, &constrained);
    let mut scorers = reduce_outputs(outputs, experiments, &scored)?;
    let objective = match aggregation {
        ObjectiveAggregation::Single => GenericMcObjective::Single(scorers.remove(0)),
        ObjectiveAggregation::Additive => GenericMcObjective::Additive(scorers),
        ObjectiveAggregation::Multiplicative => GenericMcObjective::Multiplicative(scorers),
        ObjectiveAggregation::Custom => {
            let function = custom.get()?.clone();
            let arity = function.arity();
            if arity.scores > scorers.len() || arity.weights > scorers.len() {
                return Err(SoboError::InvalidConfigError(format!(
                    "custom function '{function}' uses more scores than the {} scored outputs",
                    scorers.len()
                )));
            }
            if arity.outputs > outputs.len() {
                return Err(SoboError::InvalidConfigError(format!(
                    "custom function '{function}' uses more outputs than the {} outputs",
                    outputs.len()
                )));
            }
            GenericMcObjective::Custom { function, scorers }
        }
    };
    Ok((objective, constraints))
}
