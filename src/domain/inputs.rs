use crate::errors::{Result, SoboError};
use egobox_doe::{Lhs, LhsKind, SamplingMethod};
use ndarray::{Array2, ArrayBase, ArrayView1, Data, Ix2};
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Kind of an input feature
///
/// Experiments store the folded value of a feature: the value itself for
/// continuous and discrete features, the index of the category for
/// categorical and descriptor features.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputKind {
    /// Real value in `[lower, upper]`. `local_relative_bounds` (below, above)
    /// delimits the local search region around a reference value.
    Continuous {
        lower: f64,
        upper: f64,
        #[serde(default)]
        local_relative_bounds: Option<(f64, f64)>,
    },
    /// Value among a finite set of reals
    Discrete { values: Vec<f64> },
    /// One among named categories, one-hot encoded
    Categorical { categories: Vec<String> },
    /// One among named categories, encoded by its descriptor values
    /// (`values[category][descriptor]`)
    Descriptor {
        categories: Vec<String>,
        descriptors: Vec<String>,
        values: Vec<Vec<f64>>,
    },
}

/// A named input feature
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputFeature {
    pub key: String,
    pub kind: InputKind,
}

impl InputFeature {
    /// Continuous feature in `[lower, upper]`
    pub fn continuous(key: &str, lower: f64, upper: f64) -> Self {
        InputFeature {
            key: key.to_string(),
            kind: InputKind::Continuous {
                lower,
                upper,
                local_relative_bounds: None,
            },
        }
    }

    /// Set the local search region of a continuous feature, no-op otherwise
    pub fn with_local_relative_bounds(mut self, below: f64, above: f64) -> Self {
        if let InputKind::Continuous {
            local_relative_bounds,
            ..
        } = &mut self.kind
        {
            *local_relative_bounds = Some((below, above));
        }
        self
    }

    /// Discrete feature taking the given values
    pub fn discrete(key: &str, values: &[f64]) -> Self {
        let mut values = values.to_vec();
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();
        InputFeature {
            key: key.to_string(),
            kind: InputKind::Discrete { values },
        }
    }

    /// Categorical feature
    pub fn categorical(key: &str, categories: &[&str]) -> Self {
        InputFeature {
            key: key.to_string(),
            kind: InputKind::Categorical {
                categories: categories.iter().map(|c| c.to_string()).collect(),
            },
        }
    }

    /// Categorical feature described by numerical descriptors
    pub fn descriptor(
        key: &str,
        categories: &[&str],
        descriptors: &[&str],
        values: Vec<Vec<f64>>,
    ) -> Self {
        InputFeature {
            key: key.to_string(),
            kind: InputKind::Descriptor {
                categories: categories.iter().map(|c| c.to_string()).collect(),
                descriptors: descriptors.iter().map(|c| c.to_string()).collect(),
                values,
            },
        }
    }

    pub fn is_continuous(&self) -> bool {
        matches!(self.kind, InputKind::Continuous { .. })
    }

    /// Number of categories or values of a non continuous feature
    pub fn n_levels(&self) -> Option<usize> {
        match &self.kind {
            InputKind::Continuous { .. } => None,
            InputKind::Discrete { values } => Some(values.len()),
            InputKind::Categorical { categories } | InputKind::Descriptor { categories, .. } => {
                Some(categories.len())
            }
        }
    }

    /// Folded value of the i-th level of a non continuous feature
    pub fn level(&self, i: usize) -> f64 {
        match &self.kind {
            InputKind::Discrete { values } => values[i],
            _ => i as f64,
        }
    }

    /// Names of the encoded columns of this feature
    pub fn encoded_columns(&self) -> Vec<String> {
        match &self.kind {
            InputKind::Continuous { .. } | InputKind::Discrete { .. } => vec![self.key.clone()],
            InputKind::Categorical { categories } => categories
                .iter()
                .map(|c| format!("{}_{}", self.key, c))
                .collect(),
            InputKind::Descriptor { descriptors, .. } => descriptors
                .iter()
                .map(|d| format!("{}_{}", self.key, d))
                .collect(),
        }
    }

    pub fn encoded_dim(&self) -> usize {
        match &self.kind {
            InputKind::Continuous { .. } | InputKind::Discrete { .. } => 1,
            InputKind::Categorical { categories } => categories.len(),
            InputKind::Descriptor { descriptors, .. } => descriptors.len(),
        }
    }

    /// Bounds of the encoded columns, discrete and descriptor features are relaxed
    /// to the interval spanned by their values
    pub fn encoded_bounds(&self) -> Vec<(f64, f64)> {
        match &self.kind {
            InputKind::Continuous { lower, upper, .. } => vec![(*lower, *upper)],
            InputKind::Discrete { values } => vec![values
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, up), v| {
                    (lo.min(*v), up.max(*v))
                })],
            InputKind::Categorical { categories } => vec![(0., 1.); categories.len()],
            InputKind::Descriptor {
                descriptors,
                values,
                ..
            } => (0..descriptors.len())
                .map(|j| {
                    values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, up), v| {
                        (lo.min(v[j]), up.max(v[j]))
                    })
                })
                .collect(),
        }
    }

    /// Encode a folded value
    pub fn encode(&self, value: f64) -> Result<Vec<f64>> {
        match &self.kind {
            InputKind::Continuous { .. } | InputKind::Discrete { .. } => Ok(vec![value]),
            InputKind::Categorical { categories } => {
                let idx = self.category_index(value, categories.len())?;
                let mut onehot = vec![0.; categories.len()];
                onehot[idx] = 1.;
                Ok(onehot)
            }
            InputKind::Descriptor {
                categories, values, ..
            } => {
                let idx = self.category_index(value, categories.len())?;
                Ok(values[idx].clone())
            }
        }
    }

    /// Decode encoded columns into a folded value, relaxed values are rounded to
    /// the closest allowed value
    pub fn decode(&self, cols: &[f64]) -> f64 {
        match &self.kind {
            InputKind::Continuous { .. } => cols[0],
            InputKind::Discrete { values } => closest(values.iter().map(|v| (v - cols[0]).abs()))
                .map(|i| values[i])
                .unwrap_or(cols[0]),
            InputKind::Categorical { .. } => closest(cols.iter().map(|v| -v)).unwrap_or(0) as f64,
            InputKind::Descriptor { values, .. } => closest(values.iter().map(|v| {
                v.iter()
                    .zip(cols)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
            }))
            .unwrap_or(0) as f64,
        }
    }

    fn category_index(&self, value: f64, n: usize) -> Result<usize> {
        if value.fract() != 0. || value < 0. || value >= n as f64 {
            return Err(SoboError::ValidationError(format!(
                "{value} is not a valid category index for feature '{}' ({n} categories)",
                self.key
            )));
        }
        Ok(value as usize)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let err = |msg: &str| {
            Err(SoboError::ValidationError(format!(
                "input '{}': {msg}",
                self.key
            )))
        };
        match &self.kind {
            InputKind::Continuous {
                lower,
                upper,
                local_relative_bounds,
            } => {
                if !lower.is_finite() || !upper.is_finite() || lower > upper {
                    return err("bounds should be finite with lower <= upper");
                }
                if let Some((below, above)) = local_relative_bounds {
                    if *below < 0. || *above < 0. {
                        return err("local relative bounds should be positive");
                    }
                }
            }
            InputKind::Discrete { values } => {
                if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
                    return err("at least one finite value is required");
                }
            }
            InputKind::Categorical { categories } => {
                if categories.is_empty() {
                    return err("at least one category is required");
                }
                if has_duplicates(categories) {
                    return err("categories should be unique");
                }
            }
            InputKind::Descriptor {
                categories,
                descriptors,
                values,
            } => {
                if categories.is_empty() || descriptors.is_empty() {
                    return err("at least one category and one descriptor are required");
                }
                if has_duplicates(categories) || has_duplicates(descriptors) {
                    return err("categories and descriptors should be unique");
                }
                if values.len() != categories.len()
                    || values.iter().any(|v| v.len() != descriptors.len())
                {
                    return err("one value per (category, descriptor) is required");
                }
            }
        }
        Ok(())
    }
}

fn has_duplicates(names: &[String]) -> bool {
    let mut sorted: Vec<&String> = names.iter().collect();
    sorted.sort();
    sorted.windows(2).any(|w| w[0] == w[1])
}

/// Index of the smallest value
fn closest(dists: impl Iterator<Item = f64>) -> Option<usize> {
    dists
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

/// Ordered set of input features
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Inputs {
    features: Vec<InputFeature>,
}

impl Inputs {
    pub fn new(features: Vec<InputFeature>) -> Self {
        Inputs { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputFeature> {
        self.features.iter()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.key.as_str()).collect()
    }

    pub fn get(&self, i: usize) -> Option<&InputFeature> {
        self.features.get(i)
    }

    pub fn get_by_key(&self, key: &str) -> Option<&InputFeature> {
        self.features.iter().find(|f| f.key == key)
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.features.iter().position(|f| f.key == key)
    }

    /// Dimension of the encoded space
    pub fn encoded_dim(&self) -> usize {
        self.features.iter().map(|f| f.encoded_dim()).sum()
    }

    /// Range of encoded columns of each feature
    pub fn encoded_ranges(&self) -> Vec<Range<usize>> {
        let mut start = 0;
        self.features
            .iter()
            .map(|f| {
                let r = start..start + f.encoded_dim();
                start = r.end;
                r
            })
            .collect()
    }

    /// Encoded dimension and, for each feature, the names of its encoded columns
    pub fn transform_info(&self) -> (usize, Vec<(String, Vec<String>)>) {
        let info = self
            .features
            .iter()
            .map(|f| (f.key.clone(), f.encoded_columns()))
            .collect();
        (self.encoded_dim(), info)
    }

    /// Bounds of the encoded space as a (encoded_dim, 2) matrix
    pub fn encoded_bounds(&self) -> Array2<f64> {
        let bounds: Vec<(f64, f64)> = self
            .features
            .iter()
            .flat_map(|f| f.encoded_bounds())
            .collect();
        let mut xlimits = Array2::zeros((bounds.len(), 2));
        for (i, (lo, up)) in bounds.into_iter().enumerate() {
            xlimits[[i, 0]] = lo;
            xlimits[[i, 1]] = up;
        }
        xlimits
    }

    /// Encode folded values (n, n_inputs) into (n, encoded_dim)
    pub fn transform(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array2<f64>> {
        if x.ncols() != self.len() {
            return Err(SoboError::ValidationError(format!(
                "expected {} input columns, got {}",
                self.len(),
                x.ncols()
            )));
        }
        let mut xe = Array2::zeros((x.nrows(), self.encoded_dim()));
        for (i, row) in x.outer_iter().enumerate() {
            let mut j = 0;
            for (f, v) in self.features.iter().zip(row.iter()) {
                for c in f.encode(*v)? {
                    xe[[i, j]] = c;
                    j += 1;
                }
            }
        }
        Ok(xe)
    }

    /// Decode encoded values (n, encoded_dim) into folded values (n, n_inputs)
    pub fn inverse_transform(&self, xe: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
        let ranges = self.encoded_ranges();
        let mut x = Array2::zeros((xe.nrows(), self.len()));
        for (i, row) in xe.outer_iter().enumerate() {
            for (k, (f, r)) in self.features.iter().zip(ranges.iter()).enumerate() {
                let cols: Vec<f64> = row.slice(ndarray::s![r.clone()]).to_vec();
                x[[i, k]] = f.decode(&cols);
            }
        }
        x
    }

    /// Round relaxed encoded values onto allowed values, staying in encoded space
    pub fn round_encoded(&self, xe: &ArrayView1<f64>) -> Result<Vec<f64>> {
        let ranges = self.encoded_ranges();
        let mut res = Vec::with_capacity(xe.len());
        for (f, r) in self.features.iter().zip(ranges) {
            let cols = xe.slice(ndarray::s![r]).to_vec();
            res.extend(f.encode(f.decode(&cols))?);
        }
        Ok(res)
    }

    /// Draw `n` random folded points using a latin hypercube of the relaxed encoded space
    pub fn sample(&self, n: usize, rng: &mut Xoshiro256Plus) -> Array2<f64> {
        if n == 0 {
            return Array2::zeros((0, self.len()));
        }
        let xlimits = self.encoded_bounds();
        let doe = Lhs::new(&xlimits)
            .kind(LhsKind::Maximin)
            .with_rng(Xoshiro256Plus::seed_from_u64(rng.gen()))
            .sample(n);
        self.inverse_transform(&doe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn mixed_inputs() -> Inputs {
        Inputs::new(vec![
            InputFeature::continuous("x1", -1., 1.),
            InputFeature::discrete("x2", &[3., 1., 2., 1.]),
            InputFeature::categorical("x3", &["a", "b", "c"]),
            InputFeature::descriptor("x4", &["s1", "s2"], &["d1", "d2"], vec![vec![1., 5.], vec![2., 10.]]),
        ])
    }

    #[test]
    fn test_transform_info() {
        let inputs = mixed_inputs();
        let (dim, info) = inputs.transform_info();
        assert_eq!(dim, 7);
        assert_eq!(info[2].1, vec!["x3_a", "x3_b", "x3_c"]);
        assert_eq!(info[3].1, vec!["x4_d1", "x4_d2"]);
        assert_eq!(inputs.encoded_ranges()[3], 5..7);
        let xlimits = inputs.encoded_bounds();
        assert_abs_diff_eq!(xlimits.row(1), array![1., 3.]);
        assert_abs_diff_eq!(xlimits.row(6), array![5., 10.]);
    }

    #[test]
    fn test_transform_inverse_transform() {
        let inputs = mixed_inputs();
        let x = array![[0.5, 2., 1., 0.], [-1., 3., 2., 1.]];
        let xe = inputs.transform(&x).unwrap();
        assert_abs_diff_eq!(xe, array![[0.5, 2., 0., 1., 0., 1., 5.], [-1., 3., 0., 0., 1., 2., 10.]]);
        assert_abs_diff_eq!(inputs.inverse_transform(&xe), x);
    }

    #[test]
    fn test_invalid_category() {
        let inputs = mixed_inputs();
        let x = array![[0.5, 2., 3., 0.]];
        assert!(matches!(inputs.transform(&x), Err(SoboError::ValidationError(_))));
        let x = array![[0.5, 2.]];
        assert!(inputs.transform(&x).is_err());
    }

    #[test]
    fn test_rounding_relaxed_values() {
        let inputs = mixed_inputs();
        let xe = array![0.3, 2.4, 0.2, 0.7, 0.1, 1.8, 9.];
        let rounded = inputs.round_encoded(&xe.view()).unwrap();
        assert_eq!(rounded, vec![0.3, 2., 0., 1., 0., 2., 10.]);
    }

    #[test]
    fn test_sample() {
        let inputs = mixed_inputs();
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let x = inputs.sample(20, &mut rng);
        assert_eq!(x.dim(), (20, 4));
        for row in x.outer_iter() {
            assert!((-1. ..=1.).contains(&row[0]));
            assert!([1., 2., 3.].contains(&row[1]));
            assert!([0., 1., 2.].contains(&row[2]));
            assert!([0., 1.].contains(&row[3]));
        }
        // valid folded values encode without error
        assert!(inputs.transform(&x).is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(InputFeature::continuous("x", 1., 0.).validate().is_err());
        assert!(InputFeature::categorical("x", &["a", "a"]).validate().is_err());
        assert!(InputFeature::descriptor("x", &["a"], &["d1", "d2"], vec![vec![1.]])
            .validate()
            .is_err());
        assert!(mixed_inputs().iter().all(|f| f.validate().is_ok()));
    }
}
