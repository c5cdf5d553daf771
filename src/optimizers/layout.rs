use egobox_doe::{Lhs, LhsKind, SamplingMethod};
use ndarray::{Array2, ArrayView2};
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Slot {
    Var(usize),
    Fixed(f64),
}

/// Mapping between the decision vector of the local solver, normalized in
/// the unit hypercube, and a q-batch of encoded points (q, d).
///
/// Entries of the batch are either fixed or bound to a decision variable.
/// Entries of an interpoint column share one variable per group of
/// consecutive points.
#[derive(Clone, Debug)]
pub(crate) struct BatchLayout {
    q: usize,
    d: usize,
    slots: Vec<Slot>,
    lower: Vec<f64>,
    width: Vec<f64>,
}

impl BatchLayout {
    /// * `bounds`: encoded bounds (d, 2)
    /// * `fixed`: for each of the q points, the fixed value of each column if any
    /// * `shared`: (column, multiplicity) of interpoint columns
    pub fn new(bounds: &ArrayView2<f64>, fixed: &[Vec<Option<f64>>], shared: &[(usize, usize)]) -> Self {
        let q = fixed.len();
        let d = bounds.nrows();
        let mut slots = Vec::with_capacity(q * d);
        let mut lower = vec![];
        let mut width = vec![];
        let mut groups: HashMap<(usize, usize), usize> = HashMap::new();
        for (i, point) in fixed.iter().enumerate() {
            for j in 0..d {
                if let Some(v) = point.get(j).copied().flatten() {
                    slots.push(Slot::Fixed(v));
                    continue;
                }
                let group = shared
                    .iter()
                    .find(|(col, _)| *col == j)
                    .map(|(_, m)| (j, i / (*m).max(1)));
                let var = match group.and_then(|g| groups.get(&g)) {
                    Some(k) => *k,
                    None => {
                        let k = lower.len();
                        lower.push(bounds[[j, 0]]);
                        width.push(bounds[[j, 1]] - bounds[[j, 0]]);
                        if let Some(g) = group {
                            groups.insert(g, k);
                        }
                        k
                    }
                };
                slots.push(Slot::Var(var));
            }
        }
        BatchLayout {
            q,
            d,
            slots,
            lower,
            width,
        }
    }

    pub fn n_vars(&self) -> usize {
        self.lower.len()
    }

    /// Points of the batch bound to at least one decision variable
    pub fn free_points(&self) -> Vec<usize> {
        (0..self.q)
            .filter(|i| {
                self.slots[i * self.d..(i + 1) * self.d]
                    .iter()
                    .any(|s| matches!(s, Slot::Var(_)))
            })
            .collect()
    }

    /// Bounds of the decision variables
    pub fn unit_bounds(&self) -> Array2<f64> {
        let mut bounds = Array2::zeros((self.n_vars(), 2));
        bounds.column_mut(1).fill(1.);
        bounds
    }

    /// Batch (q, d) of a decision vector
    pub fn to_batch(&self, z: &[f64]) -> Array2<f64> {
        Array2::from_shape_fn((self.q, self.d), |(i, j)| match self.slots[i * self.d + j] {
            Slot::Fixed(v) => v,
            Slot::Var(k) => self.lower[k] + z[k].clamp(0., 1.) * self.width[k],
        })
    }

    /// `n` decision vectors drawn from a latin hypercube
    pub fn sample(&self, n: usize, rng: &mut Xoshiro256Plus) -> Array2<f64> {
        if self.n_vars() == 0 {
            return Array2::zeros((n, 0));
        }
        Lhs::new(&self.unit_bounds())
            .kind(LhsKind::Classic)
            .with_rng(Xoshiro256Plus::seed_from_u64(rng.gen()))
            .sample(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_fixed_and_free_entries() {
        let bounds = array![[0., 2.], [-1., 1.]];
        let fixed = vec![vec![None, Some(0.5)], vec![None, None]];
        let layout = BatchLayout::new(&bounds.view(), &fixed, &[]);
        assert_eq!(layout.n_vars(), 3);
        let x = layout.to_batch(&[0.5, 0.25, 1.]);
        assert_abs_diff_eq!(x, array![[1., 0.5], [0.5, 1.]]);

        let fixed = vec![vec![Some(1.), Some(0.5)], vec![None, None]];
        let layout = BatchLayout::new(&bounds.view(), &fixed, &[]);
        assert_eq!(layout.free_points(), vec![1]);
    }

    #[test]
    fn test_shared_columns() {
        let bounds = array![[0., 1.], [0., 10.]];
        let fixed = vec![vec![None, None]; 4];
        let layout = BatchLayout::new(&bounds.view(), &fixed, &[(1, 2)]);
        // 4 variables for column 0, 2 groups for column 1
        assert_eq!(layout.n_vars(), 6);
        let z: Vec<f64> = (0..6).map(|k| k as f64 / 10.).collect();
        let x = layout.to_batch(&z);
        assert_eq!(x[[0, 1]], x[[1, 1]]);
        assert_eq!(x[[2, 1]], x[[3, 1]]);
        assert_ne!(x[[0, 1]], x[[2, 1]]);

        let layout = BatchLayout::new(&bounds.view(), &fixed, &[(1, 4)]);
        assert_eq!(layout.n_vars(), 5);
        let x = layout.to_batch(&[0.1, 0.2, 0.3, 0.4, 0.5]);
        assert!(x.column(1).iter().all(|v| *v == x[[0, 1]]));
    }

    #[test]
    fn test_sample() {
        let bounds = array![[0., 1.], [0., 10.]];
        let layout = BatchLayout::new(&bounds.view(), &[vec![None, Some(3.)]], &[]);
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let z = layout.sample(10, &mut rng);
        assert_eq!(z.dim(), (10, 1));
        assert!(z.iter().all(|v| (0. ..=1.).contains(v)));
    }
}
