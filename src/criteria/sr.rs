use crate::criteria::{mean_of_max, AcquisitionCriterion, McContext};
use crate::errors::Result;
use ndarray::ArrayView2;

/// q-Simple Regret: `mean_mc max_q obj`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QSimpleRegret;

impl AcquisitionCriterion for QSimpleRegret {
    fn name(&self) -> &'static str {
        "qSR"
    }

    fn value(&self, ctx: &McContext, x: &ArrayView2<f64>) -> Result<f64> {
        let xall = ctx.with_pending(x)?;
        let eval = ctx.evaluate(&xall.view())?;
        Ok(mean_of_max(&eval.obj))
    }
}
