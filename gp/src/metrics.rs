//! Cross-validation metrics used to compare GP configurations on a training set.

use crate::errors::{GpError, Result};
use crate::parameters::GpParams;
use linfa::prelude::{Dataset, Fit};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};

/// Cross validation scores of a GP configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossValScore {
    /// Root mean squared error of held-out predictions
    pub rmse: f64,
    /// Q2 predictive coefficient `1 - PRESS / TSS`
    pub q2: f64,
}

/// Compute k-fold cross validation scores of the GP defined by `params` on (xt, yt).
/// Folds are made of consecutive rows; `kfold` is capped by the number of rows
/// (leave-one-out).
pub fn cross_val_score(
    params: &GpParams,
    xt: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    yt: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    kfold: usize,
) -> Result<CrossValScore> {
    let n = xt.nrows();
    if n < 2 || kfold < 2 {
        return Err(GpError::TrainingDataError(format!(
            "Cross validation requires at least 2 points and 2 folds, got {n} points and {kfold} folds"
        )));
    }
    let kfold = kfold.min(n);
    let yt_mean = yt.mean().unwrap_or(0.);
    // Predictive Residual Sum of Squares
    let mut press = 0.;
    // Total Sum of Squares
    let mut tss = 0.;
    for k in 0..kfold {
        let (start, end) = (k * n / kfold, (k + 1) * n / kfold);
        let valid: Vec<usize> = (start..end).collect();
        let train: Vec<usize> = (0..n).filter(|i| *i < start || *i >= end).collect();
        let xtrain: Array2<f64> = xt.select(Axis(0), &train);
        let ytrain: Array1<f64> = yt.select(Axis(0), &train);
        let model = params.clone().fit(&Dataset::new(xtrain, ytrain))?;
        let xvalid = xt.select(Axis(0), &valid);
        let yvalid = yt.select(Axis(0), &valid);
        let pred = model.predict(&xvalid)?;
        press += (&yvalid - &pred).mapv(|v| v * v).sum();
        tss += yvalid.mapv(|v| (v - yt_mean) * (v - yt_mean)).sum();
    }
    let q2 = if tss > 0. { 1. - press / tss } else { f64::NEG_INFINITY };
    Ok(CrossValScore {
        rmse: (press / n as f64).sqrt(),
        q2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CorrelationKind, MeanKind};
    use ndarray::{array, Array};

    #[test]
    fn test_cross_val_smooth_function() {
        let xt = Array::linspace(0., 1., 12).insert_axis(Axis(1));
        let yt = xt.column(0).mapv(|v: f64| (3. * v).sin());
        let params = GpParams::new(MeanKind::Constant, CorrelationKind::SquaredExponential);
        let score = cross_val_score(&params, &xt, &yt, 4).expect("cross validation");
        assert!(score.q2 > 0.9, "q2 = {}", score.q2);
        assert!(score.rmse < 0.1, "rmse = {}", score.rmse);
    }

    #[test]
    fn test_cross_val_too_few_points() {
        let params = GpParams::default();
        let res = cross_val_score(&params, &array![[0.]], &array![1.], 3);
        assert!(matches!(res, Err(GpError::TrainingDataError(_))));
    }
}
