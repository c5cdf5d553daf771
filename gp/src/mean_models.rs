//! Regression models used as the trend (mean) term of the GP model.

use ndarray::{concatenate, Array2, ArrayBase, Axis, Data, Ix2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Regression basis evaluated at x to build the mean term `f(x).beta`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeanKind {
    /// Constant basis: `[1]`
    #[default]
    Constant,
    /// Linear basis: `[1, x_1, ..., x_nx]`
    Linear,
}

impl fmt::Display for MeanKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MeanKind::Constant => write!(f, "Constant"),
            MeanKind::Linear => write!(f, "Linear"),
        }
    }
}

impl MeanKind {
    /// Evaluate regression basis at `x` (n, nx), returns an (n, p) array
    pub fn value(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
        let ones = Array2::<f64>::ones((x.nrows(), 1));
        match self {
            MeanKind::Constant => ones,
            MeanKind::Linear => concatenate![Axis(1), ones, x.view()],
        }
    }
}
