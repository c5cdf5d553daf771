use crate::criteria::McAcquisition;
use crate::domain::{Constraint, InputKind, Inputs, CONSTRAINT_TOL};
use crate::errors::Result;
use crate::optimizers::{Algorithm, BatchLayout, Optimizer};
use crate::types::{CategoricalMethod, OptimizerOptions};

use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use ndarray_rand::rand::seq::index;
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use std::collections::HashSet;

/// Value handed to the local solver where the criterion cannot be evaluated
const FAILED_VALUE: f64 = 1e10;

/// Tolerance of equality constraints given to the local solver
const EQUALITY_TOL: f64 = 1e-6;

/// Max number of n-choose-k features enumerated exhaustively
const NCHOOSEK_MAX_ENUMERATED: usize = 16;

/// Encoded columns fixed to a value
type Combination = Vec<(usize, f64)>;

/// Pointwise constraint applied to the encoded columns of its features
#[derive(Clone, Debug)]
struct PointConstraint {
    cols: Vec<usize>,
    constraint: Constraint,
}

impl PointConstraint {
    fn values(&self, row: &ArrayView1<f64>) -> Vec<f64> {
        self.cols.iter().map(|j| row[*j]).collect()
    }

    fn is_fulfilled(&self, row: &ArrayView1<f64>) -> bool {
        self.constraint
            .is_fulfilled(&self.values(row), CONSTRAINT_TOL)
            .unwrap_or(false)
    }

    /// Constraint values of the local solver, feasible when >= 0
    fn solver_values(&self, row: &ArrayView1<f64>) -> Vec<f64> {
        match self.constraint.evaluate(&self.values(row)) {
            Ok(g) if self.constraint.is_equality() => vec![EQUALITY_TOL - g, EQUALITY_TOL + g],
            Ok(g) => vec![-g],
            Err(_) if self.constraint.is_equality() => vec![-FAILED_VALUE; 2],
            Err(_) => vec![-FAILED_VALUE],
        }
    }
}

/// Maximizer of an acquisition criterion over q-batches of the encoded space.
///
/// Non continuous features handled exhaustively and n-choose-k constraints
/// are enumerated as combinations of fixed columns. Each optimization screens
/// latin hypercube raw samples then runs the local solver from the best ones.
pub struct CandidateOptimizer<'a> {
    inputs: &'a Inputs,
    constraints: &'a [Constraint],
    point_constraints: Vec<PointConstraint>,
    categorical_method: CategoricalMethod,
    descriptor_method: CategoricalMethod,
    discrete_method: CategoricalMethod,
    num_restarts: usize,
    num_raw_samples: usize,
    max_combinations: usize,
    options: OptimizerOptions,
    seed: u64,
}

impl<'a> CandidateOptimizer<'a> {
    pub fn new(inputs: &'a Inputs, constraints: &'a [Constraint]) -> Self {
        let ranges = inputs.encoded_ranges();
        let point_constraints = constraints
            .iter()
            .filter(|c| c.is_pointwise())
            .map(|c| PointConstraint {
                cols: c
                    .features()
                    .iter()
                    .filter_map(|key| inputs.index_of(key).map(|i| ranges[i].start))
                    .collect(),
                constraint: c.clone(),
            })
            .collect();
        CandidateOptimizer {
            inputs,
            constraints,
            point_constraints,
            categorical_method: CategoricalMethod::Exhaustive,
            descriptor_method: CategoricalMethod::Exhaustive,
            discrete_method: CategoricalMethod::Exhaustive,
            num_restarts: 8,
            num_raw_samples: 1024,
            max_combinations: 64,
            options: OptimizerOptions {
                maxiter: super::ACQ_MAX_EVAL_DEFAULT,
                batch_limit: 6,
            },
            seed: 0,
        }
    }

    /// Handling of categorical, descriptor and discrete features
    pub fn methods(
        mut self,
        categorical: CategoricalMethod,
        descriptor: CategoricalMethod,
        discrete: CategoricalMethod,
    ) -> Self {
        self.categorical_method = categorical;
        self.descriptor_method = descriptor;
        self.discrete_method = discrete;
        self
    }

    pub fn num_restarts(mut self, num_restarts: usize) -> Self {
        self.num_restarts = num_restarts.max(1);
        self
    }

    pub fn num_raw_samples(mut self, num_raw_samples: usize) -> Self {
        self.num_raw_samples = num_raw_samples.max(1);
        self
    }

    pub fn max_combinations(mut self, max_combinations: usize) -> Self {
        self.max_combinations = max_combinations.max(1);
        self
    }

    pub fn options(mut self, options: OptimizerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn method(&self, kind: &InputKind) -> CategoricalMethod {
        match kind {
            InputKind::Continuous { .. } => CategoricalMethod::Free,
            InputKind::Discrete { .. } => self.discrete_method,
            InputKind::Categorical { .. } => self.categorical_method,
            InputKind::Descriptor { .. } => self.descriptor_method,
        }
    }

    /// Box of the local search region around `reference` (encoded) for the
    /// continuous features declaring local relative bounds
    pub fn local_bounds(&self, reference: &ArrayView1<f64>) -> Array2<f64> {
        let mut bounds = self.inputs.encoded_bounds();
        for (feat, range) in self.inputs.iter().zip(self.inputs.encoded_ranges()) {
            if let InputKind::Continuous {
                lower,
                upper,
                local_relative_bounds: Some((below, above)),
            } = feat.kind
            {
                let j = range.start;
                let center = reference[j].clamp(lower, upper);
                bounds[[j, 0]] = (center - below).max(lower);
                bounds[[j, 1]] = (center + above).min(upper);
            }
        }
        bounds
    }

    /// Fixed column combinations: every value of exhaustively handled
    /// features times the allowed active sets of n-choose-k constraints
    fn combinations(&self, rng: &mut Xoshiro256Plus) -> Vec<Combination> {
        let ranges = self.inputs.encoded_ranges();
        let mut dims: Vec<Vec<Combination>> = vec![];
        for (feat, range) in self.inputs.iter().zip(ranges.iter()) {
            if self.method(&feat.kind) != CategoricalMethod::Exhaustive {
                continue;
            }
            let Some(n) = feat.n_levels() else { continue };
            let options = (0..n)
                .filter_map(|l| feat.encode(feat.level(l)).ok())
                .map(|cols| range.clone().zip(cols).collect())
                .collect();
            dims.push(options);
        }
        for cstr in self.constraints {
            if let Constraint::NChooseK {
                features,
                min_count,
                max_count,
                none_also_valid,
            } = cstr
            {
                let cols: Vec<usize> = features
                    .iter()
                    .filter_map(|key| self.inputs.index_of(key).map(|i| ranges[i].start))
                    .collect();
                dims.push(self.active_sets(&cols, *min_count, *max_count, *none_also_valid, rng));
            }
        }

        let total = dims
            .iter()
            .try_fold(1usize, |acc, d| acc.checked_mul(d.len()));
        let picks: Vec<Vec<usize>> = match total {
            Some(total) if total <= self.max_combinations => (0..total)
                .map(|mut k| {
                    dims.iter()
                        .map(|d| {
                            let i = k % d.len();
                            k /= d.len();
                            i
                        })
                        .collect()
                })
                .collect(),
            _ => {
                debug!(
                    "Too many feature combinations, {} drawn at random",
                    self.max_combinations
                );
                let mut seen = HashSet::new();
                let mut attempts = 0;
                while seen.len() < self.max_combinations && attempts < 100 * self.max_combinations
                {
                    let pick: Vec<usize> = dims.iter().map(|d| rng.gen_range(0..d.len())).collect();
                    seen.insert(pick);
                    attempts += 1;
                }
                let mut picks: Vec<_> = seen.into_iter().collect();
                picks.sort();
                picks
            }
        };
        picks
            .into_iter()
            .map(|pick| {
                pick.iter()
                    .zip(dims.iter())
                    .flat_map(|(i, d)| d[*i].clone())
                    .collect()
            })
            .collect()
    }

    /// Inactive features of n-choose-k constraints fixed to 0, one option per
    /// allowed active set
    fn active_sets(
        &self,
        cols: &[usize],
        min_count: usize,
        max_count: usize,
        none_also_valid: bool,
        rng: &mut Xoshiro256Plus,
    ) -> Vec<Combination> {
        let inactive = |active: &[usize]| -> Combination {
            cols.iter()
                .enumerate()
                .filter(|(i, _)| !active.contains(i))
                .map(|(_, j)| (*j, 0.))
                .collect()
        };
        let n = cols.len();
        let max_count = max_count.min(n);
        let mut sets: Vec<Combination> = vec![];
        if n <= NCHOOSEK_MAX_ENUMERATED {
            for mask in 0u32..(1 << n) {
                let count = mask.count_ones() as usize;
                if (min_count..=max_count).contains(&count) || (none_also_valid && count == 0) {
                    let active: Vec<usize> = (0..n).filter(|i| mask & (1 << i) != 0).collect();
                    sets.push(inactive(&active));
                }
            }
        } else {
            // Too many subsets: draw active sets of the largest allowed size
            for _ in 0..self.max_combinations {
                let active = index::sample(rng, n, max_count).into_vec();
                sets.push(inactive(&active));
            }
            if none_also_valid {
                sets.push(inactive(&[]));
            }
        }
        sets
    }

    fn is_feasible(&self, x: &ArrayView2<f64>) -> bool {
        x.outer_iter()
            .all(|row| self.point_constraints.iter().all(|c| c.is_fulfilled(&row)))
    }

    /// Maximize the criterion over q-batches within the encoded `bounds` (d, 2).
    ///
    /// Returns the encoded batch (q, d), relaxed features being rounded, and
    /// its criterion value.
    pub fn optimize(
        &self,
        acqf: &McAcquisition,
        q: usize,
        bounds: &Array2<f64>,
    ) -> Result<(Array2<f64>, f64)> {
        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed);
        let combinations = self.combinations(&mut rng);
        let d = bounds.nrows();
        let ranges = self.inputs.encoded_ranges();
        let shared: Vec<(usize, usize)> = self
            .constraints
            .iter()
            .filter_map(|c| match c {
                Constraint::InterpointEquality {
                    feature,
                    multiplicity,
                } => self
                    .inputs
                    .index_of(feature)
                    .map(|i| (ranges[i].start, multiplicity.unwrap_or(q).max(1))),
                _ => None,
            })
            .collect();
        let fixed_row = |combination: &Combination| {
            let mut row = vec![None; d];
            for (j, v) in combination {
                row[*j] = Some(*v);
            }
            row
        };

        let batch = if combinations.len() <= 1 {
            let row = combinations.first().map(fixed_row).unwrap_or(vec![None; d]);
            let layout = BatchLayout::new(&bounds.view(), &vec![row; q], &shared);
            let (x, _) = self.optimize_layout(acqf, &layout, &mut rng)?;
            self.round(&x)?
        } else {
            info!(
                "Sequential optimization over {} feature combinations",
                combinations.len()
            );
            let mut chosen: Vec<Array1<f64>> = vec![];
            for i in 0..q {
                let mut fixed: Vec<Vec<Option<f64>>> = chosen
                    .iter()
                    .map(|x| x.iter().map(|v| Some(*v)).collect())
                    .collect();
                fixed.push(vec![None; d]);
                let mut best: Option<(f64, Array1<f64>)> = None;
                for combination in combinations.iter() {
                    let mut row = fixed_row(combination);
                    for (col, m) in shared.iter() {
                        let first = (i / m) * m;
                        if first < i {
                            row[*col] = Some(chosen[first][*col]);
                        }
                    }
                    fixed[i] = row;
                    let layout = BatchLayout::new(&bounds.view(), &fixed, &[]);
                    let (x, _) = self.optimize_layout(acqf, &layout, &mut rng)?;
                    let x = self.round(&x)?;
                    let value = acqf.value(&x.view()).unwrap_or(f64::NEG_INFINITY);
                    if best.as_ref().map(|(v, _)| value > *v).unwrap_or(true) {
                        best = Some((value, x.row(i).to_owned()));
                    }
                }
                if let Some((value, x)) = best {
                    debug!("Point {i}: criterion {value} at {x}");
                    chosen.push(x);
                }
            }
            let mut batch = Array2::zeros((chosen.len(), d));
            for (i, x) in chosen.iter().enumerate() {
                batch.row_mut(i).assign(x);
            }
            batch
        };
        let value = acqf.value(&batch.view())?;
        Ok((batch, value))
    }

    /// Global optimization followed by a local one around `reference`
    /// (encoded); local candidates are kept when their natural criterion
    /// value is at least `gamma`.
    pub fn optimize_with_local_search(
        &self,
        acqf: &McAcquisition,
        q: usize,
        gamma: f64,
        reference: &ArrayView1<f64>,
    ) -> Result<(Array2<f64>, f64)> {
        let global = self.optimize(acqf, q, &self.inputs.encoded_bounds())?;
        let local = self.optimize(acqf, q, &self.local_bounds(reference))?;
        let local_value = acqf.natural_value(&local.0.view())?;
        if local_value >= gamma {
            info!("Local search candidates kept (criterion {local_value} >= gamma {gamma})");
            Ok(local)
        } else {
            info!("Global search candidates kept (criterion {local_value} < gamma {gamma})");
            Ok(global)
        }
    }

    fn round(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut rounded = x.clone();
        for (i, row) in x.outer_iter().enumerate() {
            let r = self.inputs.round_encoded(&row)?;
            rounded.row_mut(i).assign(&Array1::from(r));
        }
        Ok(rounded)
    }

    /// Multistart optimization of the decision variables of a layout
    fn optimize_layout(
        &self,
        acqf: &McAcquisition,
        layout: &BatchLayout,
        rng: &mut Xoshiro256Plus,
    ) -> Result<(Array2<f64>, f64)> {
        if layout.n_vars() == 0 {
            let x = layout.to_batch(&[]);
            let value = acqf.value(&x.view())?;
            return Ok((x, value));
        }

        let raw = layout.sample(self.num_raw_samples, rng);
        let mut screened: Vec<(bool, f64, usize)> = (0..raw.nrows())
            .into_par_iter()
            .map(|k| {
                let x = layout.to_batch(&raw.row(k).to_vec());
                let value = acqf
                    .value(&x.view())
                    .ok()
                    .filter(|v| v.is_finite())
                    .unwrap_or(f64::NEG_INFINITY);
                (self.is_feasible(&x.view()), value, k)
            })
            .collect();
        screened.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.total_cmp(&a.1)));
        let starts: Vec<(bool, f64, usize)> =
            screened.into_iter().take(self.num_restarts).collect();

        let obj = |z: &[f64]| -> f64 {
            let x = layout.to_batch(z);
            match acqf.value(&x.view()) {
                Ok(v) if v.is_finite() => -v,
                _ => FAILED_VALUE,
            }
        };
        let mut cstrs: Vec<Box<dyn Fn(&[f64]) -> f64 + Sync + '_>> = vec![];
        for i in layout.free_points() {
            for cstr in self.point_constraints.iter() {
                let n_values = if cstr.constraint.is_equality() { 2 } else { 1 };
                for k in 0..n_values {
                    cstrs.push(Box::new(move |z: &[f64]| {
                        let x = layout.to_batch(z);
                        cstr.solver_values(&x.row(i))[k]
                    }));
                }
            }
        }
        let cstr_refs: Vec<_> = cstrs
            .iter()
            .map(|c| c.as_ref() as &(dyn Fn(&[f64]) -> f64 + Sync))
            .collect();
        let algorithm = if cstr_refs.is_empty() {
            Algorithm::Slsqp
        } else {
            Algorithm::Cobyla
        };
        let bounds = layout.unit_bounds();

        let mut results: Vec<(f64, Array1<f64>)> = vec![];
        for chunk in starts.chunks(self.options.batch_limit.max(1)) {
            let res: Vec<(f64, Array1<f64>)> = chunk
                .par_iter()
                .filter_map(|(_, _, k)| {
                    debug!("Begin optim from raw sample {k}");
                    let (y_opt, z_opt) = Optimizer::new(algorithm, &obj, &cstr_refs, &bounds)
                        .xinit(&raw.row(*k))
                        .max_eval(self.options.maxiter)
                        .ftol_rel(1e-6)
                        .ftol_abs(1e-8)
                        .minimize();
                    let x = layout.to_batch(&z_opt.to_vec());
                    if !y_opt.is_finite() || !self.is_feasible(&x.view()) {
                        debug!("Optim from raw sample {k} failed");
                        return None;
                    }
                    acqf.value(&x.view())
                        .ok()
                        .filter(|v| v.is_finite())
                        .map(|v| (v, z_opt))
                })
                .collect();
            results.extend(res);
        }

        let best_local = results
            .into_iter()
            .max_by(|a, b| a.0.total_cmp(&b.0));
        let best_raw = starts
            .first()
            .filter(|(feasible, value, _)| *feasible && value.is_finite())
            .map(|(_, value, k)| (*value, raw.row(*k).to_owned()));
        let (value, z) = match (best_local, best_raw) {
            (Some(local), Some(raw)) if raw.0 > local.0 => raw,
            (Some(local), _) => local,
            (None, _) => {
                warn!("All local optimizations failed, returning the best raw sample");
                let k = starts.first().map(|s| s.2).unwrap_or(0);
                let z = raw.row(k).to_owned();
                let value = acqf
                    .value(&layout.to_batch(&z.to_vec()).view())
                    .unwrap_or(f64::NEG_INFINITY);
                (value, z)
            }
        };
        Ok((layout.to_batch(&z.to_vec()), value))
    }
}
