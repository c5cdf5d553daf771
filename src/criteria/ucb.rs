use crate::criteria::{mean_of_max, AcquisitionCriterion, McContext};
use crate::errors::Result;
use ndarray::{ArrayView2, Axis};

/// q-Upper Confidence Bound:
/// `mean_mc max_q (mu + beta_prime * |obj - mu|)` where `mu` is the sample mean
/// of the objective and `beta_prime = sqrt(beta * pi / 2)`
#[derive(Clone, Debug, PartialEq)]
pub struct QUpperConfidenceBound {
    beta: f64,
    beta_prime: f64,
}

impl QUpperConfidenceBound {
    pub fn new(beta: f64) -> Self {
        QUpperConfidenceBound {
            beta,
            beta_prime: (beta * std::f64::consts::PI / 2.).sqrt(),
        }
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Exploration coefficient applied to the sample deviations
    pub fn beta_prime(&self) -> f64 {
        self.beta_prime
    }
}

impl AcquisitionCriterion for QUpperConfidenceBound {
    fn name(&self) -> &'static str {
        "qUCB"
    }

    fn value(&self, ctx: &McContext, x: &ArrayView2<f64>) -> Result<f64> {
        let xall = ctx.with_pending(x)?;
        let eval = ctx.evaluate(&xall.view())?;
        let Some(mean) = eval.obj.mean_axis(Axis(0)) else {
            return Ok(f64::NEG_INFINITY);
        };
        let ucb = (&eval.obj - &mean).mapv(|v| self.beta_prime * v.abs()) + &mean;
        Ok(mean_of_max(&ucb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::tests::{context, fixture};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_beta_prime() {
        let ucb = QUpperConfidenceBound::new(0.5);
        assert_eq!(ucb.beta_prime(), (0.5 * std::f64::consts::PI / 2.).sqrt());
    }

    #[test]
    fn test_ucb_grows_with_beta() {
        let fix = fixture();
        let ctx = context(&fix, true);
        let x = array![[0.5]];
        let low = QUpperConfidenceBound::new(0.).value(&ctx, &x.view()).unwrap();
        let high = QUpperConfidenceBound::new(4.).value(&ctx, &x.view()).unwrap();
        assert!(high >= low);
        // beta = 0 gives the sample mean of the objective
        let sr = crate::criteria::QSimpleRegret.value(&ctx, &x.view()).unwrap();
        assert_abs_diff_eq!(low, sr, epsilon = 1e-10);
    }
}
