use crate::criteria::{mean_of_max, AcquisitionCriterion, McContext, McEvaluation};
use crate::errors::{Result, SoboError};
use crate::objectives::log_feasibility_weights;
use crate::utils::{log_softplus, logmeanexp, smooth_amax};
use log::debug;
use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis, Zip};

/// q-Noisy Expected Improvement: improvement of the batch over the best
/// feasible baseline point, sample per sample, so that observation noise
/// is accounted for without a fixed `best_f`.
#[derive(Clone, Debug, PartialEq)]
pub struct QNoisyExpectedImprovement {
    x_baseline: Array2<f64>,
    infeasible_cost: f64,
}

impl QNoisyExpectedImprovement {
    /// Criterion with baseline points `x_baseline` (training inputs).
    /// With `prune_baseline`, only baseline points being the best in at
    /// least one posterior sample are kept.
    pub fn new(
        ctx: &McContext,
        x_baseline: &Array2<f64>,
        prune_baseline: bool,
        infeasible_cost: f64,
    ) -> Result<Self> {
        let mut nei = QNoisyExpectedImprovement {
            x_baseline: x_baseline.to_owned(),
            infeasible_cost,
        };
        if prune_baseline && x_baseline.nrows() > 1 {
            let eval = ctx.evaluate(&x_baseline.view())?;
            let masked = nei.masked_objective(ctx, &eval, 0);
            let mut keep: Vec<usize> = masked
                .outer_iter()
                .filter_map(|row| {
                    row.iter()
                        .enumerate()
                        .filter(|(_, v)| v.is_finite())
                        .max_by(|a, b| a.1.total_cmp(b.1))
                        .map(|(i, _)| i)
                })
                .collect();
            keep.sort_unstable();
            keep.dedup();
            if !keep.is_empty() {
                debug!(
                    "Baseline pruned from {} to {} points",
                    x_baseline.nrows(),
                    keep.len()
                );
                nei.x_baseline = x_baseline.select(Axis(0), &keep);
            }
        }
        Ok(nei)
    }

    pub fn x_baseline(&self) -> &Array2<f64> {
        &self.x_baseline
    }

    /// Objective (mc, n - start) of the points from `start`, -inf where
    /// an output constraint is violated
    fn masked_objective(&self, ctx: &McContext, eval: &McEvaluation, start: usize) -> Array2<f64> {
        let mut obj = eval.obj.slice(s![.., start..]).to_owned();
        for c in ctx.constraints.iter() {
            let values = c.eval(&eval.samples.slice(s![.., start.., ..]));
            Zip::from(&mut obj)
                .and(&values)
                .for_each(|o, v| {
                    if *v > 0. {
                        *o = f64::NEG_INFINITY
                    }
                });
        }
        obj
    }

    /// Evaluate the batch with pending points followed by the baseline.
    /// Returns the evaluation, the batch size and the best baseline objective per sample.
    fn evaluate(&self, ctx: &McContext, x: &ArrayView2<f64>) -> Result<(McEvaluation, usize, Array1<f64>)> {
        let xall = ctx.with_pending(x)?;
        let q = xall.nrows();
        let full = concatenate(Axis(0), &[xall.view(), self.x_baseline.view()])
            .map_err(|e| SoboError::ValidationError(e.to_string()))?;
        let eval = ctx.evaluate(&full.view())?;
        let floor = -self.infeasible_cost;
        let best = self
            .masked_objective(ctx, &eval, q)
            .map_axis(Axis(1), |row| row.fold(floor, |a, &b| a.max(b)));
        Ok((eval, q, best))
    }
}

impl AcquisitionCriterion for QNoisyExpectedImprovement {
    fn name(&self) -> &'static str {
        "qNEI"
    }

    fn value(&self, ctx: &McContext, x: &ArrayView2<f64>) -> Result<f64> {
        let (eval, q, best) = self.evaluate(ctx, x)?;
        let best = best.insert_axis(Axis(1));
        let improvement = (&eval.obj.slice(s![.., ..q]) - &best).mapv(|v| v.max(0.))
            * eval.feas.slice(s![.., ..q]);
        Ok(mean_of_max(&improvement))
    }
}

/// Log of q-Noisy Expected Improvement, smoothed as [super::QLogExpectedImprovement]
#[derive(Clone, Debug, PartialEq)]
pub struct QLogNoisyExpectedImprovement {
    nei: QNoisyExpectedImprovement,
    tau_max: f64,
    tau_relu: f64,
}

impl QLogNoisyExpectedImprovement {
    pub fn new(nei: QNoisyExpectedImprovement, tau_max: f64, tau_relu: f64) -> Self {
        QLogNoisyExpectedImprovement {
            nei,
            tau_max,
            tau_relu,
        }
    }

    pub fn x_baseline(&self) -> &Array2<f64> {
        self.nei.x_baseline()
    }
}

impl AcquisitionCriterion for QLogNoisyExpectedImprovement {
    fn name(&self) -> &'static str {
        "qLogNEI"
    }

    fn value(&self, ctx: &McContext, x: &ArrayView2<f64>) -> Result<f64> {
        let (eval, q, best) = self.nei.evaluate(ctx, x)?;
        let best = best.insert_axis(Axis(1));
        let diff = &eval.obj.slice(s![.., ..q]) - &best;
        let log_feas = log_feasibility_weights(&ctx.constraints, &eval.samples.slice(s![.., ..q, ..]));
        let log_improvement = diff.mapv(|v| log_softplus(v, self.tau_relu)) + log_feas;
        let per_sample: Array1<f64> =
            log_improvement.map_axis(Axis(1), |row| smooth_amax(&row, self.tau_max));
        Ok(logmeanexp(&per_sample.view()))
    }

    fn is_log(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::tests::{context, fixture};
    use ndarray::array;

    #[test]
    fn test_baseline_pruning() {
        let fix = fixture();
        let ctx = context(&fix, false);
        let xb = fix.experiments.x().clone();
        let pruned = QNoisyExpectedImprovement::new(&ctx, &xb, true, 1.).unwrap();
        assert!(pruned.x_baseline().nrows() >= 1);
        assert!(pruned.x_baseline().nrows() < xb.nrows());
        let full = QNoisyExpectedImprovement::new(&ctx, &xb, false, 1.).unwrap();
        assert_eq!(full.x_baseline(), &xb);
    }

    #[test]
    fn test_nei_at_baseline_point_is_small() {
        let fix = fixture();
        let ctx = context(&fix, false);
        let xb = fix.experiments.x().clone();
        let nei = QNoisyExpectedImprovement::new(&ctx, &xb, false, 1.).unwrap();
        // training points are interpolated: no improvement over the baseline best
        let at_worst = nei.value(&ctx, &array![[1.]].view()).unwrap();
        let between = nei.value(&ctx, &array![[0.3]].view()).unwrap();
        assert!(at_worst < 1e-3);
        assert!(between > at_worst);
        let lognei = QLogNoisyExpectedImprovement::new(nei, 1e-2, 1e-6);
        let v = lognei.value(&ctx, &array![[0.3]].view()).unwrap();
        assert!(v.is_finite());
    }
}
