//! Correlation models used to model the error term of the GP model.
//!
//! The following correlation models are implemented:
//! * squared exponential,
//! * absolute exponential,
//! * matern 3/2,
//! * matern 5/2.

use ndarray::{Array1, ArrayBase, Axis, Data, Ix1, Ix2, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlation kernel r(x, x') between errors of the GP at x and x'
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CorrelationKind {
    /// `exp(- sum_j theta_j d_j^2)`
    #[default]
    SquaredExponential,
    /// `exp(- sum_j theta_j |d_j|)`
    AbsoluteExponential,
    /// Matern 3/2 kernel, product over dimensions
    Matern32,
    /// Matern 5/2 kernel, product over dimensions
    Matern52,
}

impl fmt::Display for CorrelationKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CorrelationKind::SquaredExponential => "SquaredExponential",
            CorrelationKind::AbsoluteExponential => "AbsoluteExponential",
            CorrelationKind::Matern32 => "Matern32",
            CorrelationKind::Matern52 => "Matern52",
        };
        write!(f, "{name}")
    }
}

impl CorrelationKind {
    /// All available kernels
    pub const ALL: [CorrelationKind; 4] = [
        CorrelationKind::SquaredExponential,
        CorrelationKind::AbsoluteExponential,
        CorrelationKind::Matern32,
        CorrelationKind::Matern52,
    ];

    /// Compute correlation values given componentwise distances `d` (n, nx)
    /// and `theta` hyperparameters (nx). Returns an (n,) array.
    pub fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Array1<f64> {
        match self {
            CorrelationKind::SquaredExponential => d
                .mapv(|v| v * v)
                .dot(theta)
                .mapv(|v| f64::exp(-v)),
            CorrelationKind::AbsoluteExponential => {
                d.mapv(f64::abs).dot(theta).mapv(|v| f64::exp(-v))
            }
            CorrelationKind::Matern32 => {
                let sqrt3 = f64::sqrt(3.);
                let mut r = Array1::zeros(d.nrows());
                Zip::from(&mut r).and(d.rows()).for_each(|r, di| {
                    let wd = (&di.mapv(f64::abs) * theta).mapv(|v| sqrt3 * v);
                    *r = wd.fold(1., |acc, v| acc * (1. + v)) * f64::exp(-wd.sum());
                });
                r
            }
            CorrelationKind::Matern52 => {
                let sqrt5 = f64::sqrt(5.);
                let mut r = Array1::zeros(d.nrows());
                Zip::from(&mut r).and(d.rows()).for_each(|r, di| {
                    let wd = (&di.mapv(f64::abs) * theta).mapv(|v| sqrt5 * v);
                    *r = wd.fold(1., |acc, v| acc * (1. + v + v * v / 3.)) * f64::exp(-wd.sum());
                });
                r
            }
        }
    }

    /// Number of columns of `d`, convenience used for shape checks
    pub(crate) fn check_dim(
        d: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> bool {
        d.len_of(Axis(1)) == theta.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::DiffMatrix;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_squared_exponential() {
        let xt = array![[4.5], [1.2], [2.0], [3.0], [4.0]];
        let dm = DiffMatrix::new(&xt);
        let res = CorrelationKind::SquaredExponential.value(&dm.d, &array![0.1]);
        assert_abs_diff_eq!(res[0], f64::exp(-0.1 * 3.3 * 3.3), epsilon = 1e-12);
        assert_eq!(res.len(), 10);
    }

    #[test]
    fn test_matern_reduce_to_one_at_zero_distance() {
        let d = array![[0., 0.], [0.3, 0.1]];
        let theta = array![0.5, 2.];
        for kind in CorrelationKind::ALL {
            let r = kind.value(&d, &theta);
            assert!(CorrelationKind::check_dim(&d, &theta));
            assert_abs_diff_eq!(r[0], 1.0, epsilon = 1e-12);
            assert!(r[1] < 1.0 && r[1] > 0.0, "{kind} correlation out of (0, 1)");
        }
    }

    #[test]
    fn test_matern52_value() {
        let d = array![[0.2]];
        let r = CorrelationKind::Matern52.value(&d, &array![1.]);
        let v = f64::sqrt(5.) * 0.2;
        assert_abs_diff_eq!(r[0], (1. + v + v * v / 3.) * f64::exp(-v), epsilon = 1e-12);
    }
}
