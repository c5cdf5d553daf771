use crate::correlation_models::CorrelationKind;
use crate::errors::{GpError, Result};
use crate::mean_models::MeanKind;
use crate::optimization::{optimize_params, prepare_multistart, CobylaParams};
use crate::parameters::{GpParams, GpValidParams, ThetaTuning};
use crate::utils::{pairwise_differences, DiffMatrix, NormalizedData};
use crate::GP_COBYLA_MIN_EVAL;

use linfa::prelude::{DatasetBase, Fit};
use linfa_linalg::{cholesky::*, qr::*, triangular::*};
use log::{debug, warn};
use ndarray::{Array, Array1, Array2, ArrayBase, ArrayView2, Axis, Data, Ix1, Ix2};
use ndarray_stats::QuantileExt;
use rayon::prelude::*;
use std::fmt;
use std::time::Instant;

/// Relative jitter added to the diagonal of covariance matrices which fail
/// to be factorized
const JITTERS: [f64; 4] = [1e-10, 1e-8, 1e-6, 1e-4];

/// Internal parameters computed from training data and optimized theta
#[derive(Debug, Clone)]
pub(crate) struct GpInnerParams {
    /// Gaussian process variance
    sigma2: f64,
    /// Generalized least-squares regression weights for Universal Kriging or given beta0 for Ordinary Kriging
    beta: Array2<f64>,
    /// Gaussian Process weights
    gamma: Array2<f64>,
    /// Cholesky decomposition of the correlation matrix \[R\]
    r_chol: Array2<f64>,
    /// Solution of the linear equation system : \[R\] x Ft = y
    ft: Array2<f64>,
    /// R upper triangle matrix of QR decomposition of the matrix Ft
    ft_qr_r: Array2<f64>,
}

/// A GP regression is an interpolation method where the
/// interpolated values are modeled by a Gaussian process with a mean and
/// governed by a prior covariance kernel, which depends on some
/// parameters to be determined.
///
/// The interpolated output is modeled as stochastic process as follows:
///
/// `Y(x) = mu(x) + Z(x)`
///
/// where:
/// * `mu(x)` is the trend i.e. the mean of the gaussian process
/// * `Z(x)` the realization of stochastic gaussian process ~ `Normal(0, sigma^2)`
///
/// which in turn is written as:
///
/// `Y(x) = betas.regr(x) + sigma^2*corr(x, x')`
///
/// Hyperparameters theta of the correlation kernel are estimated by maximizing
/// the reduced likelihood with a multistart COBYLA optimization in log10 space.
///
/// # Example
///
/// ```no_run
/// use sobox_gp::{CorrelationKind, GaussianProcess, MeanKind};
/// use linfa::prelude::*;
/// use ndarray::array;
///
/// let xt = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
/// let yt = array![0.0, 1.0, 1.5, 0.9, 1.0];
///
/// let gp = GaussianProcess::params(MeanKind::Constant, CorrelationKind::SquaredExponential)
///     .fit(&Dataset::new(xt, yt))
///     .expect("GP fit error");
/// let (mean, var) = gp.predict_valvar(&array![[1.5]]).expect("GP prediction");
/// ```
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    /// Parameter of the autocorrelation model
    theta: Array1<f64>,
    /// Reduced likelihood value (result from internal optimization)
    likelihood: f64,
    /// Gaussian process internal fitted params
    inner_params: GpInnerParams,
    /// Training inputs
    xt_norm: NormalizedData,
    /// Training outputs
    yt_norm: NormalizedData,
    /// Training dataset (input, output)
    training_data: (Array2<f64>, Array1<f64>),
    /// Parameters used to fit this model
    params: GpValidParams,
}

impl fmt::Display for GaussianProcess {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GP(mean={}, corr={}, theta={}, variance={}, likelihood={})",
            self.params.mean, self.params.corr, self.theta, self.inner_params.sigma2, self.likelihood,
        )
    }
}

impl GaussianProcess {
    /// Gp parameters contructor
    pub fn params(mean: MeanKind, corr: CorrelationKind) -> GpParams {
        GpParams::new(mean, corr)
    }

    /// Predict output values at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns n predicted values.
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array1<f64>> {
        self.check_input(x)?;
        let xnorm = (x - &self.xt_norm.mean) / &self.xt_norm.std;
        let f = self.params.mean.value(&xnorm);
        let corr = self.compute_correlation(&xnorm);
        // Scaled predictor
        let y_ = &f.dot(&self.inner_params.beta) + &corr.dot(&self.inner_params.gamma);
        // Predictor
        Ok((&y_ * &self.yt_norm.std + &self.yt_norm.mean).remove_axis(Axis(1)))
    }

    /// Predict variance values at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns n variance values.
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array1<f64>> {
        self.check_input(x)?;
        let xnorm = (x - &self.xt_norm.mean) / &self.xt_norm.std;
        let corr = self.compute_correlation(&xnorm);
        let (rt, u) = self.compute_rt_u(&xnorm, &corr)?;

        let mut mse: Array1<f64> = Array::ones(rt.ncols()) - rt.mapv(|v| v * v).sum_axis(Axis(0))
            + u.mapv(|v| v * v).sum_axis(Axis(0));
        mse.mapv_inplace(|v| self.inner_params.sigma2 * v);

        // Mean Squared Error might be slightly negative depending on
        // machine precision: set to zero in that case
        Ok(mse.mapv(|v| v.max(0.)))
    }

    /// Predict both output values and variances at n given `x` points of nx components
    pub fn predict_valvar(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        Ok((self.predict(x)?, self.predict_var(x)?))
    }

    /// Predict mean vector (n,) and joint covariance matrix (n, n) of the
    /// posterior at the n given `x` points
    pub fn predict_cov(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<(Array1<f64>, Array2<f64>)> {
        let mean = self.predict(x)?;
        let xnorm = (x - &self.xt_norm.mean) / &self.xt_norm.std;
        let corr = self.compute_correlation(&xnorm);
        let (rt, u) = self.compute_rt_u(&xnorm, &corr)?;

        let cross_dx = pairwise_differences(&xnorm, &xnorm);
        let k = self
            .params
            .corr
            .value(&cross_dx, &self.theta)
            .into_shape((xnorm.nrows(), xnorm.nrows()))
            .map_err(|e| GpError::InvalidValueError(e.to_string()))?;

        let mut cov = k - rt.t().dot(&rt) + u.t().dot(&u);
        cov.mapv_inplace(|v| self.inner_params.sigma2 * v);
        // Symmetrize to remove round-off asymmetry
        let cov = (&cov + &cov.t()) / 2.;
        Ok((mean, cov))
    }

    /// Draw posterior trajectories at `x` (n, nx) given standard normal base
    /// samples `base` (n_traj, n). Returns an (n_traj, n) array.
    ///
    /// Using the same base samples for a given `x` always gives the same trajectories.
    pub fn sample(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        base: &ArrayView2<f64>,
    ) -> Result<Array2<f64>> {
        if base.ncols() != x.nrows() {
            return Err(GpError::InvalidValueError(format!(
                "base samples should have {} columns, got {}",
                x.nrows(),
                base.ncols()
            )));
        }
        let (mean, cov) = self.predict_cov(x)?;
        let chol = psd_cholesky(&cov)?;
        Ok(base.dot(&chol.t()) + &mean)
    }

    /// Retrieve optimized hyperparameters theta
    pub fn theta(&self) -> &Array1<f64> {
        &self.theta
    }

    /// Estimated variance
    pub fn variance(&self) -> f64 {
        self.inner_params.sigma2
    }

    /// Retrieve reduced likelihood value
    pub fn likelihood(&self) -> f64 {
        self.likelihood
    }

    /// Retrieve input dimension
    pub fn dims(&self) -> usize {
        self.xt_norm.ncols()
    }

    /// Retrieve training data (xt, yt)
    pub fn training_data(&self) -> &(Array2<f64>, Array1<f64>) {
        &self.training_data
    }

    /// Retrieve parameters used to fit this model
    pub fn params_used(&self) -> GpParams {
        GpParams::from(self.params.clone())
    }

    fn check_input(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<()> {
        if x.ncols() != self.dims() {
            return Err(GpError::InvalidValueError(format!(
                "Input dimension should be {}, got {}",
                self.dims(),
                x.ncols()
            )));
        }
        Ok(())
    }

    /// Correlation (n, nt) between normalized x points and training points
    fn compute_correlation(&self, xnorm: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
        let dx = pairwise_differences(xnorm, &self.xt_norm.data);
        let n_obs = xnorm.nrows();
        let nt = self.xt_norm.data.nrows();
        let r = self.params.corr.value(&dx, &self.theta);
        // (n_obs * nt,) is contiguous in standard layout
        Array2::from_shape_vec((n_obs, nt), r.to_vec()).unwrap_or_else(|_| Array2::zeros((n_obs, nt)))
    }

    /// Compute `rt` and `u` matrices used for variances and covariance matrix
    fn compute_rt_u(
        &self,
        xnorm: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        corr: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<(Array2<f64>, Array2<f64>)> {
        let inners = &self.inner_params;
        let corr_t = corr.t().to_owned();
        let rt = inners.r_chol.solve_triangular(&corr_t, UPLO::Lower)?;
        let rhs = inners.ft.t().dot(&rt) - self.params.mean.value(xnorm).t();
        let u = inners
            .ft_qr_r
            .t()
            .to_owned()
            .solve_triangular(&rhs, UPLO::Lower)?;
        Ok((rt, u))
    }
}

/// Cholesky factor of a covariance matrix which may be only positive
/// semi-definite: growing jitter is added to the diagonal until the
/// factorization succeeds.
pub fn psd_cholesky(cov: &Array2<f64>) -> Result<Array2<f64>> {
    if let Ok(l) = cov.cholesky() {
        return Ok(l);
    }
    let scale = cov.diag().iter().fold(0f64, |acc, v| acc.max(v.abs())).max(1e-12);
    let n = cov.nrows();
    for jitter in JITTERS {
        let jittered = cov + &(Array2::<f64>::eye(n) * (jitter * scale));
        if let Ok(l) = jittered.cholesky() {
            debug!("Covariance factorized with jitter {jitter}");
            return Ok(l);
        }
    }
    warn!("Covariance not positive definite, falling back to diagonal factor");
    Ok(Array2::from_diag(&cov.diag().mapv(|v| v.max(0.).sqrt())))
}

impl<D: Data<Elem = f64>> Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError> for GpValidParams {
    type Object = GaussianProcess;

    /// Fit GP parameters using maximum likelihood
    fn fit(&self, dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>) -> Result<Self::Object> {
        let x = dataset.records();
        let y = dataset.targets().to_owned().insert_axis(Axis(1));

        if x.nrows() == 0 || x.nrows() != y.nrows() {
            return Err(GpError::TrainingDataError(format!(
                "Expected a non empty training set with matching sizes, got x {:?} and y {:?}",
                x.dim(),
                y.dim()
            )));
        }
        let dim = x.ncols();

        let init = self.theta_tuning().init();
        let theta0 = if init.len() == 1 {
            Array1::from_elem(dim, init[0])
        } else if init.len() == dim {
            Array1::from_vec(init.to_vec())
        } else {
            return Err(GpError::InvalidValueError(format!(
                "Initial guess for theta should be either 1-dim or dim of xtrain ({dim}), got {}",
                init.len()
            )));
        };

        let xtrain = NormalizedData::new(x);
        let ytrain = NormalizedData::new(&y);

        let x_distances = DiffMatrix::new(&xtrain.data);
        let sums = x_distances.d.sum_axis(Axis(1));
        if sums.min().map(|v| *v == 0.).unwrap_or(false) {
            warn!("Multiple x input features have the same value (at least same row twice).");
        }
        let fx = self.mean().value(&xtrain.data);

        let opt_theta = match self.theta_tuning() {
            ThetaTuning::Fixed(_) => theta0.to_owned(),
            ThetaTuning::Full { init: _, bounds } => {
                let base: f64 = 10.;
                let objfn = |x: &[f64], _params: &mut ()| -> f64 {
                    let theta = x.iter().map(|v| base.powf(*v)).collect::<Array1<f64>>();
                    if theta.iter().any(|v| v.is_nan()) {
                        // worst value wrt to rlf minimization
                        return f64::INFINITY;
                    }
                    let rxx = self.corr().value(&x_distances.d, &theta);
                    match reduced_likelihood(&fx, rxx, &x_distances, &ytrain, self.nugget()) {
                        Ok(r) => -r.0,
                        Err(_) => f64::INFINITY,
                    }
                };

                let bounds = if bounds.len() == 1 {
                    vec![bounds[0]; dim]
                } else if bounds.len() == dim {
                    bounds.to_vec()
                } else {
                    return Err(GpError::InvalidValueError(format!(
                        "Bounds for theta should be either 1-dim or dim of xtrain ({dim}), got {}",
                        bounds.len()
                    )));
                };

                let (theta_inits, bounds) = prepare_multistart(self.n_start(), &theta0, &bounds);
                debug!("Optimize with multistart theta = {theta_inits:?} and bounds = {bounds:?}");
                let now = Instant::now();
                let opt_params = (0..theta_inits.nrows())
                    .into_par_iter()
                    .map(|i| {
                        optimize_params(
                            objfn,
                            &theta_inits.row(i).to_owned(),
                            &bounds,
                            CobylaParams {
                                maxeval: (10 * theta_inits.ncols())
                                    .clamp(GP_COBYLA_MIN_EVAL, self.max_eval()),
                                ..CobylaParams::default()
                            },
                        )
                    })
                    .reduce(
                        || (f64::INFINITY, theta_inits.row(0).to_owned()),
                        |a, b| if b.0 < a.0 { b } else { a },
                    );
                debug!("elapsed optim = {:?}", now.elapsed().as_millis());
                opt_params.1.mapv(|v| base.powf(v))
            }
        };

        let rxx = self.corr().value(&x_distances.d, &opt_theta);
        let (lkh, inner_params) =
            reduced_likelihood(&fx, rxx, &x_distances, &ytrain, self.nugget())?;
        Ok(GaussianProcess {
            theta: opt_theta,
            likelihood: lkh,
            inner_params,
            xt_norm: xtrain,
            yt_norm: ytrain,
            training_data: (x.to_owned(), y.remove_axis(Axis(1))),
            params: self.clone(),
        })
    }
}

/// Compute reduced likelihood function
/// fx: mean factors term at x samples,
/// rxx: correlation factors at x samples,
/// x_distances: pairwise distances between x samples
/// ytrain: normalized output training values
/// nugget: factor to improve numerical stability
fn reduced_likelihood(
    fx: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    rxx: Array1<f64>,
    x_distances: &DiffMatrix,
    ytrain: &NormalizedData,
    nugget: f64,
) -> Result<(f64, GpInnerParams)> {
    // Set up R
    let mut r_mx: Array2<f64> = Array2::<f64>::eye(x_distances.n_obs).mapv(|v| v + v * nugget);
    for (i, ij) in x_distances.d_indices.outer_iter().enumerate() {
        r_mx[[ij[0], ij[1]]] = rxx[i];
        r_mx[[ij[1], ij[0]]] = rxx[i];
    }
    // R cholesky decomposition
    let r_chol = r_mx.cholesky()?;
    // Solve generalized least squared problem
    let ft = r_chol.solve_triangular(fx, UPLO::Lower)?;
    let (ft_qr_q, ft_qr_r) = ft.qr()?.into_decomp();

    // Ill-conditioned problem: try another theta
    let diag_r = ft_qr_r.diag().mapv(f64::abs);
    let (dmin, dmax) = diag_r
        .iter()
        .fold((f64::INFINITY, 0f64), |(lo, up), v| (lo.min(*v), up.max(*v)));
    if dmax == 0. || dmin / dmax < 1e-10 {
        return Err(GpError::LikelihoodComputationError(
            "ft is too ill conditioned, try another theta again".to_string(),
        ));
    }
    let yt = r_chol.solve_triangular(&ytrain.data, UPLO::Lower)?;

    let beta = ft_qr_r.solve_triangular_into(ft_qr_q.t().dot(&yt), UPLO::Upper)?;
    let rho = yt - ft.dot(&beta);
    let rho_sqr = rho.mapv(|v| v * v).sum_axis(Axis(0));

    let gamma = r_chol.t().solve_triangular_into(rho, UPLO::Upper)?;
    // The determinant of R is equal to the squared product of
    // the diagonal elements of its Cholesky decomposition r_chol
    let n_obs = x_distances.n_obs as f64;

    let logdet = r_chol.diag().mapv(f64::log10).sum() * 2. / n_obs;

    // Reduced likelihood
    let sigma2 = rho_sqr / n_obs;
    let reduced_likelihood = -n_obs * (sigma2.sum().max(f64::MIN_POSITIVE).log10() + logdet);

    Ok((
        reduced_likelihood,
        GpInnerParams {
            sigma2: sigma2[0] * ytrain.std[0] * ytrain.std[0],
            beta,
            gamma,
            r_chol,
            ft,
            ft_qr_r,
        },
    ))
}
