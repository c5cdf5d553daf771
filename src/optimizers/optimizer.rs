use finitediff::FiniteDiff;
use ndarray::{arr1, Array1, Array2, ArrayView1};

use cobyla::RhoBeg;

/// A function of the decision vector
pub(crate) type ObjFn<'a> = &'a (dyn Fn(&[f64]) -> f64 + Sync);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Algorithm {
    /// Gradient free, handles inequality constraints
    Cobyla,
    /// Gradient based (finite differences), bounds only
    Slsqp,
}

pub const ACQ_MAX_EVAL_DEFAULT: usize = 2000;

/// Facade for the local optimization algorithms: minimize `fun` subject to
/// `cons(x) >= 0` within `bounds`
pub(crate) struct Optimizer<'a> {
    algo: Algorithm,
    fun: ObjFn<'a>,
    cons: Vec<ObjFn<'a>>,
    bounds: Array2<f64>,
    max_eval: usize,
    xinit: Option<Array1<f64>>,
    ftol_abs: Option<f64>,
    ftol_rel: Option<f64>,
}

impl<'a> Optimizer<'a> {
    pub fn new(algo: Algorithm, fun: ObjFn<'a>, cons: &[ObjFn<'a>], bounds: &Array2<f64>) -> Self {
        Optimizer {
            algo,
            fun,
            cons: cons.to_vec(),
            bounds: bounds.clone(),
            max_eval: ACQ_MAX_EVAL_DEFAULT,
            xinit: None,
            ftol_abs: None,
            ftol_rel: None,
        }
    }

    pub fn ftol_abs(&mut self, ftol_abs: f64) -> &mut Self {
        self.ftol_abs = Some(ftol_abs);
        self
    }

    pub fn ftol_rel(&mut self, ftol_rel: f64) -> &mut Self {
        self.ftol_rel = Some(ftol_rel);
        self
    }

    pub fn max_eval(&mut self, max_eval: usize) -> &mut Self {
        self.max_eval = max_eval;
        self
    }

    pub fn xinit(&mut self, xinit: &ArrayView1<f64>) -> &mut Self {
        self.xinit = Some(xinit.to_owned());
        self
    }

    /// Run the optimization from `xinit` (middle of the bounds if unset).
    /// Returns the reached value, infinite when the algorithm failed, and the last point.
    pub fn minimize(&self) -> (f64, Array1<f64>) {
        let xinit = self
            .xinit
            .clone()
            .unwrap_or_else(|| self.bounds.mean_axis(ndarray::Axis(1)).unwrap_or_default())
            .to_vec();
        let bounds: Vec<_> = self
            .bounds
            .outer_iter()
            .map(|row| (row[0], row[1]))
            .collect();
        let res = match self.algo {
            Algorithm::Cobyla => {
                let cstrs: Vec<_> = self
                    .cons
                    .iter()
                    .map(|f| move |x: &[f64], _u: &mut ()| (*f)(x))
                    .collect();
                let res = cobyla::minimize(
                    |x: &[f64], _u: &mut ()| (self.fun)(x),
                    &xinit,
                    &bounds,
                    &cstrs,
                    (),
                    self.max_eval,
                    RhoBeg::All(0.25),
                    Some(cobyla::StopTols {
                        ftol_rel: self.ftol_rel.unwrap_or(0.0),
                        ftol_abs: self.ftol_abs.unwrap_or(0.0),
                        ..cobyla::StopTols::default()
                    }),
                );
                match res {
                    Ok((_, x_opt, y_opt)) => (y_opt, arr1(&x_opt)),
                    Err((_, x_opt, _)) => (f64::INFINITY, arr1(&x_opt)),
                }
            }
            Algorithm::Slsqp => {
                let fun = |x: &[f64], gradient: Option<&mut [f64]>, _u: &mut ()| {
                    if let Some(gradient) = gradient {
                        let f = |x: &Vec<f64>| -> f64 { (self.fun)(x) };
                        let grad = x.to_vec().central_diff(&f);
                        gradient.copy_from_slice(&grad);
                    }
                    (self.fun)(x)
                };
                let cstrs: Vec<fn(&[f64], Option<&mut [f64]>, &mut ()) -> f64> = vec![];
                let res = slsqp::minimize(
                    fun,
                    &xinit,
                    &bounds,
                    &cstrs,
                    (),
                    self.max_eval,
                    Some(slsqp::StopTols {
                        ftol_rel: self.ftol_rel.unwrap_or(0.0),
                        ftol_abs: self.ftol_abs.unwrap_or(0.0),
                        ..slsqp::StopTols::default()
                    }),
                );
                match res {
                    Ok((_, x_opt, y_opt)) => (y_opt, arr1(&x_opt)),
                    Err((_, x_opt, _)) => (f64::INFINITY, arr1(&x_opt)),
                }
            }
        };
        log::debug!("... end optimization");
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn paraboloid(x: &[f64]) -> f64 {
        (x[0] - 0.3).powi(2) + (x[1] - 0.6).powi(2)
    }

    #[test]
    fn test_slsqp_bounds_only() {
        let bounds = array![[0., 1.], [0., 1.]];
        let (y, x) = Optimizer::new(Algorithm::Slsqp, &paraboloid, &[], &bounds)
            .xinit(&array![0.9, 0.1].view())
            .max_eval(200)
            .minimize();
        assert_abs_diff_eq!(x, array![0.3, 0.6], epsilon = 1e-3);
        assert_abs_diff_eq!(y, 0., epsilon = 1e-6);
    }

    #[test]
    fn test_cobyla_with_constraint() {
        let bounds = array![[0., 1.], [0., 1.]];
        // x0 + x1 <= 0.5
        let cstr = |x: &[f64]| 0.5 - x[0] - x[1];
        let (_, x) = Optimizer::new(Algorithm::Cobyla, &paraboloid, &[&cstr as ObjFn], &bounds)
            .xinit(&array![0.1, 0.1].view())
            .max_eval(500)
            .minimize();
        assert!(x[0] + x[1] <= 0.5 + 1e-4);
        assert_abs_diff_eq!(x, array![0.1, 0.4], epsilon = 1e-2);
    }
}
