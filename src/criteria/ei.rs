use crate::criteria::{mean_of_max, AcquisitionCriterion, McContext};
use crate::errors::Result;
use crate::objectives::log_feasibility_weights;
use crate::utils::{log_softplus, logmeanexp, smooth_amax};
use ndarray::{Array1, ArrayView2, Axis};

/// q-Expected Improvement: `mean_mc max_q relu(obj - best_f) * feasibility`
#[derive(Clone, Debug, PartialEq)]
pub struct QExpectedImprovement {
    best_f: f64,
}

impl QExpectedImprovement {
    pub fn new(best_f: f64) -> Self {
        QExpectedImprovement { best_f }
    }

    pub fn best_f(&self) -> f64 {
        self.best_f
    }
}

impl AcquisitionCriterion for QExpectedImprovement {
    fn name(&self) -> &'static str {
        "qEI"
    }

    fn value(&self, ctx: &McContext, x: &ArrayView2<f64>) -> Result<f64> {
        let xall = ctx.with_pending(x)?;
        let eval = ctx.evaluate(&xall.view())?;
        let improvement = eval.obj.mapv(|v| (v - self.best_f).max(0.)) * &eval.feas;
        Ok(mean_of_max(&improvement))
    }
}

/// Log of q-Expected Improvement smoothed with a softplus improvement of
/// temperature `tau_relu` and a smooth maximum over the batch of temperature `tau_max`
#[derive(Clone, Debug, PartialEq)]
pub struct QLogExpectedImprovement {
    best_f: f64,
    tau_max: f64,
    tau_relu: f64,
}

impl QLogExpectedImprovement {
    pub fn new(best_f: f64, tau_max: f64, tau_relu: f64) -> Self {
        QLogExpectedImprovement {
            best_f,
            tau_max,
            tau_relu,
        }
    }

    pub fn best_f(&self) -> f64 {
        self.best_f
    }
}

impl AcquisitionCriterion for QLogExpectedImprovement {
    fn name(&self) -> &'static str {
        "qLogEI"
    }

    fn value(&self, ctx: &McContext, x: &ArrayView2<f64>) -> Result<f64> {
        let xall = ctx.with_pending(x)?;
        let eval = ctx.evaluate(&xall.view())?;
        let log_improvement = eval
            .obj
            .mapv(|v| log_softplus(v - self.best_f, self.tau_relu))
            + log_feasibility_weights(&ctx.constraints, &eval.samples.view());
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
    fn test_log_ei_close_to_log_of_ei() {
        let fix = fixture();
        let ctx = context(&fix, false);
        let x = array![[0.3]];
        let ei = QExpectedImprovement::new(0.5).value(&ctx, &x.view()).unwrap();
        let log_ei = QLogExpectedImprovement::new(0.5, 1e-6, 1e-6)
            .value(&ctx, &x.view())
            .unwrap();
        assert!(ei > 0.);
        assert!((log_ei.exp() - ei).abs() / ei < 1e-2, "{} vs {}", log_ei.exp(), ei);
    }

    #[test]
    fn test_ei_is_zero_far_above_posterior() {
        let fix = fixture();
        let ctx = context(&fix, false);
        let x = array![[0.3]];
        let ei = QExpectedImprovement::new(1e3).value(&ctx, &x.view()).unwrap();
        assert_eq!(ei, 0.);
        let log_ei = QLogExpectedImprovement::new(1e3, 1e-2, 1e-6)
            .value(&ctx, &x.view())
            .unwrap();
        assert!(log_ei.is_finite() && log_ei < -100.);
    }
}
