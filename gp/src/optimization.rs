use egobox_doe::{Lhs, LhsKind, SamplingMethod};
use ndarray::{arr1, s, Array, Array1, Array2, Zip};
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

pub(crate) struct CobylaParams {
    pub rhobeg: f64,
    pub ftol_rel: f64,
    pub maxeval: usize,
}

impl Default for CobylaParams {
    fn default() -> Self {
        CobylaParams {
            rhobeg: 0.5,
            ftol_rel: 1e-4,
            maxeval: 200,
        }
    }
}

/// Build `n_start + 1` starting points in log10 theta space: the given
/// `theta0` first, then points spread over the bounds.
pub(crate) fn prepare_multistart(
    n_start: usize,
    theta0: &Array1<f64>,
    bounds: &[(f64, f64)],
) -> (Array2<f64>, Vec<(f64, f64)>) {
    // Use log10 theta as optimization parameter
    let bounds: Vec<(f64, f64)> = bounds
        .iter()
        .map(|(lo, up)| (lo.log10(), up.log10()))
        .collect();

    let mut theta0s = Array2::zeros((n_start + 1, theta0.len()));
    theta0s.row_mut(0).assign(&theta0.mapv(f64::log10));

    match n_start.cmp(&1) {
        std::cmp::Ordering::Equal => {
            let mut rng = Xoshiro256Plus::seed_from_u64(42);
            let vals = bounds.iter().map(|(a, b)| rng.gen_range(*a..*b)).collect();
            theta0s.row_mut(1).assign(&Array::from_vec(vals))
        }
        std::cmp::Ordering::Greater => {
            let mut xlimits: Array2<f64> = Array2::zeros((bounds.len(), 2));
            Zip::from(xlimits.rows_mut())
                .and(&bounds)
                .for_each(|mut row, limits| row.assign(&arr1(&[limits.0, limits.1])));
            // Seeded: starting points only need to be spread over the bounds
            let seeds = Lhs::new(&xlimits)
                .kind(LhsKind::Maximin)
                .with_rng(Xoshiro256Plus::seed_from_u64(42))
                .sample(n_start);
            theta0s.slice_mut(s![1.., ..]).assign(&seeds);
        }
        std::cmp::Ordering::Less => (),
    };
    (theta0s, bounds)
}

/// Optimize gp hyper parameters given an initial guess and bounds with cobyla
pub(crate) fn optimize_params<ObjF>(
    objfn: ObjF,
    param0: &Array1<f64>,
    bounds: &[(f64, f64)],
    cobyla: CobylaParams,
) -> (f64, Array1<f64>)
where
    ObjF: Fn(&[f64], &mut ()) -> f64,
{
    use cobyla::{minimize, Func, RhoBeg, StopTols};

    let cons: Vec<&dyn Func<()>> = vec![];
    let param0 = param0.to_vec();

    match minimize(
        objfn,
        &param0,
        bounds,
        &cons,
        (),
        cobyla.maxeval,
        RhoBeg::All(cobyla.rhobeg),
        Some(StopTols {
            ftol_rel: cobyla.ftol_rel,
            ..StopTols::default()
        }),
    ) {
        Ok((_, x_opt, fval)) => {
            let fval = if fval.is_nan() { f64::INFINITY } else { fval };
            (fval, arr1(&x_opt))
        }
        Err((status, x_opt, _)) => {
            log::debug!("Cobyla optimizer error status {status:?}");
            (f64::INFINITY, arr1(&x_opt))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_prepare_multistart() {
        let (starts, bounds) = prepare_multistart(5, &array![0.1, 1.], &[(1e-2, 1e2), (1e-1, 1e1)]);
        assert_eq!(starts.dim(), (6, 2));
        assert_abs_diff_eq!(starts.row(0), array![-1., 0.], epsilon = 1e-12);
        assert_eq!(bounds, vec![(-2., 2.), (-1., 1.)]);
        for row in starts.rows() {
            assert!(row[0] >= -2. && row[0] <= 2.);
            assert!(row[1] >= -1. && row[1] <= 1.);
        }
    }

    #[test]
    fn test_optimize_params_quadratic() {
        let (fmin, xmin) = optimize_params(
            |x: &[f64], _u: &mut ()| (x[0] - 0.5).powi(2) + (x[1] + 0.25).powi(2),
            &array![0., 0.],
            &[(-1., 1.), (-1., 1.)],
            CobylaParams::default(),
        );
        assert_abs_diff_eq!(fmin, 0., epsilon = 1e-4);
        assert_abs_diff_eq!(xmin, array![0.5, -0.25], epsilon = 1e-2);
    }
}
