use crate::criteria::{mean_of_max, AcquisitionCriterion, McContext};
use crate::errors::Result;
use crate::utils::sigmoid;
use ndarray::ArrayView2;

/// q-Probability of Improvement: `mean_mc max_q sigmoid((obj - best_f) / tau) * feasibility`
#[derive(Clone, Debug, PartialEq)]
pub struct QProbabilityOfImprovement {
    best_f: f64,
    tau: f64,
}

impl QProbabilityOfImprovement {
    pub fn new(best_f: f64, tau: f64) -> Self {
        QProbabilityOfImprovement { best_f, tau }
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }
}

impl AcquisitionCriterion for QProbabilityOfImprovement {
    fn name(&self) -> &'static str {
        "qPI"
    }

    fn value(&self, ctx: &McContext, x: &ArrayView2<f64>) -> Result<f64> {
        let xall = ctx.with_pending(x)?;
        let eval = ctx.evaluate(&xall.view())?;
        let proba = eval.obj.mapv(|v| sigmoid((v - self.best_f) / self.tau)) * &eval.feas;
        Ok(mean_of_max(&proba))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::tests::{context, fixture};
    use ndarray::array;

    #[test]
    fn test_pi_is_a_probability() {
        let fix = fixture();
        let ctx = context(&fix, false);
        let pi = QProbabilityOfImprovement::new(0.5, 1e-3);
        let good = pi.value(&ctx, &array![[0.3]].view()).unwrap();
        let bad = pi.value(&ctx, &array![[1.]].view()).unwrap();
        assert!((0. ..=1.).contains(&good));
        assert!(good > 0.9);
        assert!(bad < 1e-3);
    }
}
