//! Monte-Carlo acquisition criteria evaluated on q-batches of encoded points.
//!
//! A criterion draws joint posterior samples of the outputs at the batch
//! (pending points appended), reduces them with the objective into values
//! (mc, q) and reduces those over the batch then over the samples.
mod ei;
mod nei;
mod pi;
mod sampler;
mod sr;
mod ucb;

pub use ei::*;
pub use nei::*;
pub use pi::*;
pub use sampler::*;
pub use sr::*;
pub use ucb::*;

use crate::errors::{Result, SoboError};
use crate::objectives::{feasibility_weights, OutputConstraint, SoboObjective};
use crate::surrogate::ModelList;
use crate::types::AcquisitionFunction;
use ndarray::{concatenate, Array1, Array2, Array3, ArrayView2, Axis};

/// A Monte-Carlo acquisition criterion to be maximized
pub trait AcquisitionCriterion: Sync {
    /// Name of the criterion
    fn name(&self) -> &'static str;

    /// Criterion value of the q-batch `x` (q, d) of encoded points
    fn value(&self, ctx: &McContext, x: &ArrayView2<f64>) -> Result<f64>;

    /// Whether values are given on the log scale
    fn is_log(&self) -> bool {
        false
    }
}

/// State shared by criteria: surrogate, objective, output constraints,
/// pending points and sampler
#[derive(Clone, Debug)]
pub struct McContext<'a> {
    pub model: &'a ModelList,
    pub objective: SoboObjective,
    pub constraints: Vec<OutputConstraint>,
    pub x_pending: Array2<f64>,
    pub sampler: McSampler,
}

/// Posterior samples at a batch and their reduction by the objective
pub struct McEvaluation {
    /// Evaluated points (n, d)
    pub x: Array2<f64>,
    /// Posterior samples (mc, n, n_outputs)
    pub samples: Array3<f64>,
    /// Objective values (mc, n)
    pub obj: Array2<f64>,
    /// Smoothed feasibility of the output constraints (mc, n)
    pub feas: Array2<f64>,
}

impl McContext<'_> {
    /// Batch `x` followed by the pending points
    pub fn with_pending(&self, x: &ArrayView2<f64>) -> Result<Array2<f64>> {
        if self.x_pending.nrows() == 0 {
            return Ok(x.to_owned());
        }
        concatenate(Axis(0), &[x.view(), self.x_pending.view()])
            .map_err(|e| SoboError::ValidationError(e.to_string()))
    }

    /// Sample the posterior at `x` (n, d) and apply the objective
    pub fn evaluate(&self, x: &ArrayView2<f64>) -> Result<McEvaluation> {
        let base = self
            .sampler
            .base_samples(x.nrows(), self.model.n_outputs());
        let samples = self.model.sample(x, &base.view())?;
        let obj = self.objective.forward(&samples.view(), x)?;
        let feas = feasibility_weights(&self.constraints, &samples.view());
        Ok(McEvaluation {
            x: x.to_owned(),
            samples,
            obj,
            feas,
        })
    }
}

/// Mean over samples of the max over the batch of values (mc, q)
pub(crate) fn mean_of_max(values: &Array2<f64>) -> f64 {
    let max: Array1<f64> = values.map_axis(Axis(1), |row| {
        row.fold(f64::NEG_INFINITY, |a, &b| a.max(b))
    });
    max.mean().unwrap_or(f64::NEG_INFINITY)
}

/// Available criteria, one variant per [AcquisitionFunction]
#[derive(Clone, Debug)]
pub enum McCriterion {
    ExpectedImprovement(QExpectedImprovement),
    LogExpectedImprovement(QLogExpectedImprovement),
    NoisyExpectedImprovement(QNoisyExpectedImprovement),
    LogNoisyExpectedImprovement(QLogNoisyExpectedImprovement),
    ProbabilityOfImprovement(QProbabilityOfImprovement),
    UpperConfidenceBound(QUpperConfidenceBound),
    SimpleRegret(QSimpleRegret),
}

impl McCriterion {
    fn as_criterion(&self) -> &dyn AcquisitionCriterion {
        match self {
            McCriterion::ExpectedImprovement(c) => c,
            McCriterion::LogExpectedImprovement(c) => c,
            McCriterion::NoisyExpectedImprovement(c) => c,
            McCriterion::LogNoisyExpectedImprovement(c) => c,
            McCriterion::ProbabilityOfImprovement(c) => c,
            McCriterion::UpperConfidenceBound(c) => c,
            McCriterion::SimpleRegret(c) => c,
        }
    }
}

/// A criterion bound to its context
#[derive(Clone, Debug)]
pub struct McAcquisition<'a> {
    criterion: McCriterion,
    ctx: McContext<'a>,
}

impl<'a> McAcquisition<'a> {
    /// Instantiate the criterion of the given acquisition function.
    ///
    /// `x_baseline` (training inputs) is used by noisy criteria, `best_f` by
    /// improvement based criteria.
    pub fn new(
        acqf: &AcquisitionFunction,
        ctx: McContext<'a>,
        x_baseline: &Array2<f64>,
        best_f: f64,
        infeasible_cost: f64,
    ) -> Result<Self> {
        let criterion = match acqf {
            AcquisitionFunction::QEI => {
                McCriterion::ExpectedImprovement(QExpectedImprovement::new(best_f))
            }
            AcquisitionFunction::QLogEI { tau_max, tau_relu } => {
                McCriterion::LogExpectedImprovement(QLogExpectedImprovement::new(
                    best_f, *tau_max, *tau_relu,
                ))
            }
            AcquisitionFunction::QNEI { prune_baseline } => {
                McCriterion::NoisyExpectedImprovement(QNoisyExpectedImprovement::new(
                    &ctx,
                    x_baseline,
                    *prune_baseline,
                    infeasible_cost,
                )?)
            }
            AcquisitionFunction::QLogNEI {
                prune_baseline,
                tau_max,
                tau_relu,
            } => McCriterion::LogNoisyExpectedImprovement(QLogNoisyExpectedImprovement::new(
                QNoisyExpectedImprovement::new(&ctx, x_baseline, *prune_baseline, infeasible_cost)?,
                *tau_max,
                *tau_relu,
            )),
            AcquisitionFunction::QPI { tau } => {
                McCriterion::ProbabilityOfImprovement(QProbabilityOfImprovement::new(best_f, *tau))
            }
            AcquisitionFunction::QUCB { beta } => {
                McCriterion::UpperConfidenceBound(QUpperConfidenceBound::new(*beta))
            }
            AcquisitionFunction::QSR => McCriterion::SimpleRegret(QSimpleRegret),
        };
        Ok(McAcquisition { criterion, ctx })
    }

    pub fn criterion(&self) -> &McCriterion {
        &self.criterion
    }

    pub fn context(&self) -> &McContext<'a> {
        &self.ctx
    }

    pub fn name(&self) -> &'static str {
        self.criterion.as_criterion().name()
    }

    pub fn is_log(&self) -> bool {
        self.criterion.as_criterion().is_log()
    }

    /// Criterion value of the q-batch `x` (q, d)
    pub fn value(&self, x: &ArrayView2<f64>) -> Result<f64> {
        self.criterion.as_criterion().value(&self.ctx, x)
    }

    /// Criterion value on the natural scale (log criteria are exponentiated)
    pub fn natural_value(&self, x: &ArrayView2<f64>) -> Result<f64> {
        let v = self.value(x)?;
        Ok(if self.is_log() { v.exp() } else { v })
    }

    /// Acquisition values of each row of `x` (n, d) evaluated as a batch of one point
    pub fn values(&self, x: &ArrayView2<f64>) -> Result<Vec<f64>> {
        x.outer_iter()
            .map(|row| self.value(&row.insert_axis(Axis(0))))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::{Experiments, InputFeature, Inputs, Objective, OutputFeature, Outputs};
    use crate::objectives::{
        generic_objective_and_constraints, ConstrainedMcObjective, CustomFunction,
    };
    use crate::surrogate::SurrogateSpec;
    use crate::types::ObjectiveAggregation;
    use ndarray::{array, Array};
    use paste::paste;

    pub(crate) struct Fixture {
        pub model: ModelList,
        pub outputs: Outputs,
        pub experiments: Experiments,
    }

    /// 1D problem with a maximized output and a sigmoid constrained output
    pub(crate) fn fixture() -> Fixture {
        let inputs = Inputs::new(vec![InputFeature::continuous("x", 0., 1.)]);
        let outputs = Outputs::new(vec![
            OutputFeature::new("y", Objective::maximize()),
            OutputFeature::new("c", Objective::minimize_sigmoid(50., 0.7)),
        ]);
        let x = Array::linspace(0., 1., 6).insert_axis(Axis(1));
        let y = x.mapv(|v: f64| (5. * v).sin());
        let c = x.clone();
        let experiments =
            Experiments::new(&x, &ndarray::concatenate![Axis(1), y, c]).expect("experiments");
        let spec = SurrogateSpec {
            n_start: 2,
            ..SurrogateSpec::default()
        };
        let model = ModelList::fit(&inputs, &experiments, &spec).expect("surrogate");
        Fixture {
            model,
            outputs,
            experiments,
        }
    }

    pub(crate) fn context(fix: &Fixture, constrained: bool) -> McContext {
        let (generic, constraints) = generic_objective_and_constraints(
            &fix.outputs,
            &fix.experiments,
            ObjectiveAggregation::Single,
            &CustomFunction::default(),
            true,
        )
        .expect("objective");
        let (objective, constraints) = if constrained {
            (
                SoboObjective::Constrained(ConstrainedMcObjective::new(generic, constraints, 1.)),
                vec![],
            )
        } else {
            (SoboObjective::Generic(generic), constraints)
        };
        McContext {
            model: &fix.model,
            objective,
            constraints,
            x_pending: Array2::zeros((0, 1)),
            sampler: McSampler::new(64, 0),
        }
    }

    macro_rules! test_criterion {
        ($acqf:expr, $variant:ident, $name:ident) => {
            paste! {
                #[test]
                fn [<test_ $name _criterion>]() {
                    let fix = fixture();
                    let ctx = context(&fix, false);
                    let acqf = McAcquisition::new(&$acqf, ctx, fix.experiments.x(), 0.5, 1.)
                        .expect("acquisition");
                    assert!(matches!(acqf.criterion(), McCriterion::$variant(_)));
                    let x = array![[0.3], [0.9]];
                    let v1 = acqf.value(&x.view()).unwrap();
                    let v2 = acqf.value(&x.view()).unwrap();
                    assert!(v1.is_finite());
                    assert_eq!(v1, v2);
                    assert_eq!(acqf.values(&x.view()).unwrap().len(), 2);
                }
            }
        };
    }

    test_criterion!(AcquisitionFunction::QEI, ExpectedImprovement, qei);
    test_criterion!(
        AcquisitionFunction::QLogEI {
            tau_max: 1e-2,
            tau_relu: 1e-6
        },
        LogExpectedImprovement,
        qlogei
    );
    test_criterion!(
        AcquisitionFunction::QNEI {
            prune_baseline: true
        },
        NoisyExpectedImprovement,
        qnei
    );
    test_criterion!(AcquisitionFunction::default(), LogNoisyExpectedImprovement, qlognei);
    test_criterion!(AcquisitionFunction::QPI { tau: 1e-3 }, ProbabilityOfImprovement, qpi);
    test_criterion!(AcquisitionFunction::QUCB { beta: 0.2 }, UpperConfidenceBound, qucb);
    test_criterion!(AcquisitionFunction::QSR, SimpleRegret, qsr);

    #[test]
    fn test_pending_points_are_appended() {
        let fix = fixture();
        let mut ctx = context(&fix, true);
        ctx.x_pending = array![[0.5]];
        let xall = ctx.with_pending(&array![[0.1], [0.2]].view()).unwrap();
        assert_eq!(xall, array![[0.1], [0.2], [0.5]]);
    }

    #[test]
    fn test_mean_of_max() {
        let values = array![[1., 3.], [2., 0.]];
        assert_eq!(mean_of_max(&values), 2.5);
    }
}
