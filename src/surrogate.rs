//! Surrogate of the outputs: one independent Gaussian process per output
//! trained on the encoded inputs of the experiments valid for that output.
use crate::domain::{Experiments, Inputs};
use crate::errors::{Result, SoboError};
use linfa::prelude::{Dataset, Fit};
use log::{debug, info, warn};
use ndarray::{s, Array1, Array2, Array3, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use sobox_gp::{
    cross_val_score, CorrelationKind, GaussianProcess, GpParams, MeanKind, GP_COBYLA_MAX_EVAL,
    GP_OPTIM_N_START,
};

/// Search space of the surrogate hyperparameters optimization
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HyperConfig {
    pub means: Vec<MeanKind>,
    pub kernels: Vec<CorrelationKind>,
    /// Number of cross validation folds
    pub n_folds: usize,
}

impl Default for HyperConfig {
    fn default() -> Self {
        HyperConfig {
            means: vec![MeanKind::Constant, MeanKind::Linear],
            kernels: CorrelationKind::ALL.to_vec(),
            n_folds: 5,
        }
    }
}

/// Surrogate model specification
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurrogateSpec {
    pub mean: MeanKind,
    pub corr: CorrelationKind,
    /// Number of multistarts of the likelihood optimization
    pub n_start: usize,
    /// Max number of likelihood evaluations of one optimization
    pub max_eval: usize,
    /// Hyperparameters search space, none disables the search
    pub hyperconfig: Option<HyperConfig>,
}

impl Default for SurrogateSpec {
    fn default() -> Self {
        SurrogateSpec {
            mean: MeanKind::Constant,
            corr: CorrelationKind::Matern52,
            n_start: GP_OPTIM_N_START,
            max_eval: GP_COBYLA_MAX_EVAL,
            hyperconfig: None,
        }
    }
}

impl SurrogateSpec {
    pub fn gp_params(&self) -> GpParams {
        GaussianProcess::params(self.mean, self.corr)
            .n_start(self.n_start)
            .max_eval(self.max_eval)
    }
}

/// Independent Gaussian processes, one per output
#[derive(Clone, Debug)]
pub struct ModelList {
    models: Vec<GaussianProcess>,
}

impl ModelList {
    /// Train one GP per output on the experiments valid for that output
    pub fn fit(inputs: &Inputs, experiments: &Experiments, spec: &SurrogateSpec) -> Result<Self> {
        let xe = inputs.transform(experiments.x())?;
        let models = (0..experiments.y().ncols())
            .map(|j| {
                let rows = experiments.valid_rows(j);
                if rows.is_empty() {
                    return Err(SoboError::ValidationError(format!(
                        "no valid experiment to train the surrogate of output {j}"
                    )));
                }
                let xt = xe.select(Axis(0), &rows);
                let yt = experiments.y().column(j).select(Axis(0), &rows);
                let gp = spec.gp_params().fit(&Dataset::new(xt, yt))?;
                debug!("Output {j}: {gp}");
                Ok(gp)
            })
            .collect::<Result<Vec<_>>>()?;
        info!("Surrogate trained on {} experiments", experiments.nrows());
        Ok(ModelList { models })
    }

    pub fn n_outputs(&self) -> usize {
        self.models.len()
    }

    pub fn models(&self) -> &[GaussianProcess] {
        &self.models
    }

    /// Posterior mean and standard deviation (n, n_outputs) at encoded points `xe` (n, d)
    pub fn predict(&self, xe: &ArrayView2<f64>) -> Result<(Array2<f64>, Array2<f64>)> {
        let mut mean = Array2::zeros((xe.nrows(), self.n_outputs()));
        let mut std = Array2::zeros((xe.nrows(), self.n_outputs()));
        for (j, gp) in self.models.iter().enumerate() {
            let (m, v) = gp.predict_valvar(xe)?;
            mean.column_mut(j).assign(&m);
            std.column_mut(j).assign(&v.mapv(f64::sqrt));
        }
        Ok((mean, std))
    }

    /// Posterior samples (mc, n, n_outputs) at `xe` (n, d) given standard normal
    /// base samples of the same shape
    pub fn sample(&self, xe: &ArrayView2<f64>, base: &ArrayView3<f64>) -> Result<Array3<f64>> {
        let (mc, n, m) = base.dim();
        if n != xe.nrows() || m != self.n_outputs() {
            return Err(SoboError::ValidationError(format!(
                "base samples {:?} do not match {} points and {} outputs",
                base.dim(),
                xe.nrows(),
                self.n_outputs()
            )));
        }
        let mut samples = Array3::zeros((mc, n, m));
        for (j, gp) in self.models.iter().enumerate() {
            let traj = gp.sample(xe, &base.index_axis(Axis(2), j))?;
            samples.slice_mut(s![.., .., j]).assign(&traj);
        }
        Ok(samples)
    }
}

/// Select the surrogate configuration of the search space with the lowest
/// cross validation error, averaged over outputs.
///
/// Returns `None` when no search space is configured.
pub fn hyperoptimize(
    spec: &SurrogateSpec,
    inputs: &Inputs,
    experiments: &Experiments,
) -> Result<Option<SurrogateSpec>> {
    let Some(hyperconfig) = spec.hyperconfig.as_ref() else {
        return Ok(None);
    };
    let xe = inputs.transform(experiments.x())?;
    let data: Vec<(Array2<f64>, Array1<f64>)> = (0..experiments.y().ncols())
        .map(|j| {
            let rows = experiments.valid_rows(j);
            (
                xe.select(Axis(0), &rows),
                experiments.y().column(j).select(Axis(0), &rows),
            )
        })
        .collect();
    if data.iter().any(|(x, _)| x.nrows() < 2) {
        warn!("Not enough experiments for hyperparameters search, keeping current surrogate");
        return Ok(Some(spec.clone()));
    }

    let mut best: Option<(f64, SurrogateSpec)> = None;
    for mean in hyperconfig.means.iter() {
        for corr in hyperconfig.kernels.iter() {
            let candidate = SurrogateSpec {
                mean: *mean,
                corr: *corr,
                ..spec.clone()
            };
            let params = candidate.gp_params();
            let mut rmse = 0.;
            for (xt, yt) in data.iter() {
                match cross_val_score(&params, xt, yt, hyperconfig.n_folds) {
                    Ok(score) => rmse += score.rmse,
                    Err(err) => {
                        debug!("Skip {mean} {corr}: {err}");
                        rmse = f64::INFINITY;
                        break;
                    }
                }
            }
            let rmse = rmse / data.len() as f64;
            debug!("Surrogate {mean} {corr}: cross validation rmse = {rmse}");
            if rmse.is_finite() && best.as_ref().map(|(r, _)| rmse < *r).unwrap_or(true) {
                best = Some((rmse, candidate));
            }
        }
    }
    Ok(Some(match best {
        Some((rmse, best)) => {
            info!("Best surrogate {} {} (rmse = {rmse})", best.mean, best.corr);
            best
        }
        None => {
            warn!("Hyperparameters search failed, keeping current surrogate");
            spec.clone()
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::InputFeature;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};

    fn training() -> (Inputs, Experiments) {
        let inputs = Inputs::new(vec![InputFeature::continuous("x", 0., 1.)]);
        let x = Array::linspace(0., 1., 8).insert_axis(Axis(1));
        let y1 = x.mapv(|v: f64| (6. * v).sin());
        let mut y2 = x.mapv(|v| v * v);
        y2[[3, 0]] = f64::NAN;
        let y = ndarray::concatenate![Axis(1), y1, y2];
        (inputs, Experiments::new(&x, &y).unwrap())
    }

    #[test]
    fn test_fit_predict() {
        let (inputs, exps) = training();
        let models = ModelList::fit(&inputs, &exps, &SurrogateSpec::default()).unwrap();
        assert_eq!(models.n_outputs(), 2);
        assert_eq!(models.models()[1].training_data().0.nrows(), 7);
        let xe = array![[0.], [0.5]];
        let (mean, std) = models.predict(&xe.view()).unwrap();
        assert_abs_diff_eq!(mean[[0, 0]], 0., epsilon = 1e-3);
        assert_abs_diff_eq!(mean[[1, 1]], 0.25, epsilon = 1e-2);
        assert!(std.iter().all(|v| *v >= 0.));
    }

    #[test]
    fn test_sample_shape_and_determinism() {
        let (inputs, exps) = training();
        let models = ModelList::fit(&inputs, &exps, &SurrogateSpec::default()).unwrap();
        let xe = array![[0.1], [0.45], [0.9]];
        let base = Array3::from_shape_fn((4, 3, 2), |(i, j, k)| ((i + 2 * j + k) as f64).sin());
        let s1 = models.sample(&xe.view(), &base.view()).unwrap();
        let s2 = models.sample(&xe.view(), &base.view()).unwrap();
        assert_eq!(s1.dim(), (4, 3, 2));
        assert_eq!(s1, s2);
        let bad = Array3::zeros((4, 2, 2));
        assert!(models.sample(&xe.view(), &bad.view()).is_err());
    }

    #[test]
    fn test_hyperoptimize() {
        let (inputs, exps) = training();
        let spec = SurrogateSpec::default();
        assert!(hyperoptimize(&spec, &inputs, &exps).unwrap().is_none());
        let spec = SurrogateSpec {
            hyperconfig: Some(HyperConfig {
                means: vec![MeanKind::Constant],
                kernels: vec![CorrelationKind::SquaredExponential, CorrelationKind::Matern32],
                n_folds: 4,
            }),
            ..SurrogateSpec::default()
        };
        let best = hyperoptimize(&spec, &inputs, &exps).unwrap().unwrap();
        assert_eq!(best.mean, MeanKind::Constant);
        assert!(spec.hyperconfig.unwrap().kernels.contains(&best.corr));
    }

    #[test]
    fn test_fit_without_valid_data() {
        let inputs = Inputs::new(vec![InputFeature::continuous("x", 0., 1.)]);
        let exps = Experiments::new(&array![[0.], [1.]], &array![[1., f64::NAN], [2., f64::NAN]]).unwrap();
        assert!(matches!(
            ModelList::fit(&inputs, &exps, &SurrogateSpec::default()),
            Err(SoboError::ValidationError(_))
        ));
    }
}
