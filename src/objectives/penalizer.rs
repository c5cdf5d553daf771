use crate::domain::{Objective, Outputs};
use crate::errors::{Result, SoboError};
use crate::objectives::GenericMcObjective;
use crate::utils::{log_sigmoid, sigmoid};
use ndarray::{Array2, ArrayView2, ArrayView3, Axis};

/// Output constraint `c(y) = sign * (y - offset)`, feasible when `c(y) <= 0`.
/// Its smoothed feasibility is `sigmoid(-c(y) / eta)`.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputConstraint {
    /// Index of the constrained output
    pub index: usize,
    pub sign: f64,
    pub offset: f64,
    /// Temperature of the feasibility sigmoid
    pub eta: f64,
}

impl OutputConstraint {
    pub fn value(&self, y: f64) -> f64 {
        self.sign * (y - self.offset)
    }

    /// Constraint values (mc, n) of posterior samples (mc, n, n_outputs)
    pub fn eval(&self, samples: &ArrayView3<f64>) -> Array2<f64> {
        samples
            .index_axis(Axis(2), self.index)
            .mapv(|y| self.value(y))
    }
}

/// Split output indices into targets and soft constraints
pub fn partition(outputs: &Outputs) -> (Vec<usize>, Vec<usize>) {
    (0..outputs.len()).partition(|&i| {
        outputs
            .get(i)
            .map(|f| !f.objective.is_constraint())
            .unwrap_or(false)
    })
}

/// Output constraints of the given soft constraint outputs
pub fn output_constraints(outputs: &Outputs, indices: &[usize]) -> Vec<OutputConstraint> {
    let mut cstrs = vec![];
    for &index in indices {
        let Some(feat) = outputs.get(index) else {
            continue;
        };
        match feat.objective {
            Objective::MaximizeSigmoid { steepness, tp, .. } => cstrs.push(OutputConstraint {
                index,
                sign: -1.,
                offset: tp,
                eta: 1. / steepness,
            }),
            Objective::MinimizeSigmoid { steepness, tp, .. } => cstrs.push(OutputConstraint {
                index,
                sign: 1.,
                offset: tp,
                eta: 1. / steepness,
            }),
            Objective::Target {
                target,
                tolerance,
                steepness,
                ..
            } => {
                cstrs.push(OutputConstraint {
                    index,
                    sign: -1.,
                    offset: target - tolerance,
                    eta: 1. / steepness,
                });
                cstrs.push(OutputConstraint {
                    index,
                    sign: 1.,
                    offset: target + tolerance,
                    eta: 1. / steepness,
                });
            }
            _ => (),
        }
    }
    cstrs
}

/// Product of smoothed feasibilities (mc, n) of posterior samples
pub fn feasibility_weights(
    constraints: &[OutputConstraint],
    samples: &ArrayView3<f64>,
) -> Array2<f64> {
    let (mc, n, _) = samples.dim();
    constraints
        .iter()
        .fold(Array2::ones((mc, n)), |acc, c| {
            acc * c.eval(samples).mapv(|v| sigmoid(-v / c.eta))
        })
}

/// Sum of log smoothed feasibilities (mc, n) of posterior samples
pub fn log_feasibility_weights(
    constraints: &[OutputConstraint],
    samples: &ArrayView3<f64>,
) -> Array2<f64> {
    let (mc, n, _) = samples.dim();
    constraints
        .iter()
        .fold(Array2::zeros((mc, n)), |acc, c| {
            acc + c.eval(samples).mapv(|v| log_sigmoid(-v / c.eta))
        })
}

/// Objective weighted by the feasibility of the output constraints:
/// `(obj + M) * prod_i sigmoid(-c_i / eta_i) - M` where `M` is the infeasible cost.
#[derive(Clone, Debug)]
pub struct ConstrainedMcObjective {
    objective: GenericMcObjective,
    constraints: Vec<OutputConstraint>,
    infeasible_cost: f64,
}

impl ConstrainedMcObjective {
    pub fn new(
        objective: GenericMcObjective,
        constraints: Vec<OutputConstraint>,
        infeasible_cost: f64,
    ) -> Self {
        ConstrainedMcObjective {
            objective,
            constraints,
            infeasible_cost,
        }
    }

    pub fn objective(&self) -> &GenericMcObjective {
        &self.objective
    }

    pub fn constraints(&self) -> &[OutputConstraint] {
        &self.constraints
    }

    pub fn infeasible_cost(&self) -> f64 {
        self.infeasible_cost
    }

    /// Objective values (mc, n) of posterior samples (mc, n, n_outputs) at `x` (n, d)
    pub fn forward(&self, samples: &ArrayView3<f64>, x: &ArrayView2<f64>) -> Result<Array2<f64>> {
        let obj = self.objective.forward(samples, x)?;
        let feas = feasibility_weights(&self.constraints, samples);
        Ok((obj + self.infeasible_cost) * feas - self.infeasible_cost)
    }
}

/// Constrained objective of the target outputs weighted by the soft constraint outputs
///
/// Fails when no output is a target as only feasibility would be optimized.
pub fn constrained_objective(
    outputs: &Outputs,
    objective: GenericMcObjective,
    infeasible_cost: f64,
) -> Result<ConstrainedMcObjective> {
    let (targets, soft) = partition(outputs);
    if targets.is_empty() {
        return Err(SoboError::InvalidConfigError(
            "a constrained objective requires at least one output to maximize or minimize"
                .to_string(),
        ));
    }
    Ok(ConstrainedMcObjective::new(
        objective,
        output_constraints(outputs, &soft),
        infeasible_cost,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OutputFeature;
    use crate::objectives::OutputScorer;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array3};

    fn outputs() -> Outputs {
        Outputs::new(vec![
            OutputFeature::new("y", Objective::maximize()),
            OutputFeature::new("c1", Objective::maximize_sigmoid(100., 0.5)),
            OutputFeature::new("c2", Objective::target(1., 0.2, 100.)),
        ])
    }

    #[test]
    fn test_partition_and_constraints() {
        let outputs = outputs();
        let (targets, soft) = partition(&outputs);
        assert_eq!(targets, vec![0]);
        assert_eq!(soft, vec![1, 2]);
        let cstrs = output_constraints(&outputs, &soft);
        assert_eq!(cstrs.len(), 3);
        assert_abs_diff_eq!(cstrs[0].value(0.7), -0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(cstrs[0].eta, 0.01);
        assert_abs_diff_eq!(cstrs[1].value(0.7), 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(cstrs[2].value(0.7), -0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_constrained_objective() {
        let outputs = outputs();
        let generic = GenericMcObjective::Single(OutputScorer::new(0, Objective::maximize()));
        let objective = constrained_objective(&outputs, generic, 2.).unwrap();
        // feasible sample keeps its objective, infeasible one tends to -M
        let samples = Array3::from_shape_vec((1, 2, 3), vec![3., 1., 1., 3., 0., 1.]).unwrap();
        let x = Array2::zeros((2, 1));
        let values = objective.forward(&samples.view(), &x.view()).unwrap();
        assert_abs_diff_eq!(values[[0, 0]], 3., epsilon = 1e-2);
        assert_abs_diff_eq!(values[[0, 1]], -2., epsilon = 1e-6);
    }

    #[test]
    fn test_constrained_objective_without_target() {
        let outputs = Outputs::new(vec![
            OutputFeature::new("c1", Objective::maximize_sigmoid(100., 0.5)),
            OutputFeature::new("c2", Objective::minimize_sigmoid(100., 0.5)),
        ]);
        let generic = GenericMcObjective::Single(OutputScorer::new(0, outputs.get(0).unwrap().objective.clone()));
        assert!(matches!(
            constrained_objective(&outputs, generic, 0.),
            Err(SoboError::InvalidConfigError(_))
        ));
    }

    #[test]
    fn test_feasibility_weights() {
        let cstrs = output_constraints(&outputs(), &[1]);
        let samples = array![[[0., 0.5, 0.]]];
        let w = feasibility_weights(&cstrs, &samples.view());
        assert_abs_diff_eq!(w[[0, 0]], 0.5);
        let lw = log_feasibility_weights(&cstrs, &samples.view());
        assert_abs_diff_eq!(lw[[0, 0]], 0.5f64.ln(), epsilon = 1e-12);
    }
}
