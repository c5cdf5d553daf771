use crate::domain::{Experiments, Objective, Outputs};
use crate::errors::{Result, SoboError};
use ndarray::{Array2, ArrayView3, Axis};

/// Scorer of one output: applies the output objective to the posterior
/// samples of that output
#[derive(Clone, Debug, PartialEq)]
pub struct OutputScorer {
    /// Index of the scored output
    pub index: usize,
    /// Objective of the scored output
    pub objective: Objective,
}

impl OutputScorer {
    pub fn new(index: usize, objective: Objective) -> Self {
        OutputScorer { index, objective }
    }

    /// Scores (mc, n) of posterior samples (mc, n, n_outputs)
    pub fn score(&self, samples: &ArrayView3<f64>) -> Array2<f64> {
        samples
            .index_axis(Axis(2), self.index)
            .mapv(|y| self.objective.score(y))
    }

    pub fn weight(&self) -> f64 {
        self.objective.weight()
    }
}

/// Scorers of the outputs given by `indices`
///
/// Fails when one of those outputs has no valid observation.
pub fn reduce_outputs(
    outputs: &Outputs,
    experiments: &Experiments,
    indices: &[usize],
) -> Result<Vec<OutputScorer>> {
    indices
        .iter()
        .map(|&i| {
            let feat = outputs.get(i).ok_or_else(|| {
                SoboError::ValidationError(format!("no output at index {i}"))
            })?;
            if i >= experiments.y().ncols() || experiments.n_valid(i) == 0 {
                return Err(SoboError::ValidationError(format!(
                    "output '{}' has no valid experiment",
                    feat.key
                )));
            }
            Ok(OutputScorer::new(i, feat.objective.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OutputFeature;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array3};

    #[test]
    fn test_score_samples() {
        let scorer = OutputScorer::new(
            1,
            Objective::Minimize {
                w: 2.,
                lower: 0.,
                upper: 2.,
            },
        );
        let samples = Array3::from_shape_vec((2, 1, 2), vec![0., 1., 5., 4.]).unwrap();
        assert_abs_diff_eq!(scorer.score(&samples.view()), array![[-0.5], [-2.]]);
        assert_abs_diff_eq!(scorer.weight(), 2.);
    }

    #[test]
    fn test_reduce_without_valid_data() {
        let outputs = Outputs::new(vec![
            OutputFeature::new("y1", Objective::maximize()),
            OutputFeature::new("y2", Objective::maximize_sigmoid(10., 0.)),
        ]);
        let exps = Experiments::new(&array![[0.], [1.]], &array![[1., f64::NAN], [2., f64::NAN]])
            .unwrap();
        let scorers = reduce_outputs(&outputs, &exps, &[0]).unwrap();
        assert_eq!(scorers.len(), 1);
        assert!(matches!(
            reduce_outputs(&outputs, &exps, &[0, 1]),
            Err(SoboError::ValidationError(_))
        ));
    }
}
