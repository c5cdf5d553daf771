use ndarray::{s, Array1, Array2, ArrayBase, Axis, Data, Ix2};

/// A structure to store (n, xdim) matrix data and its mean and standard deviation vectors.
#[derive(Debug, Clone)]
pub(crate) struct NormalizedData {
    /// normalized data
    pub data: Array2<f64>,
    /// mean vector computed from data
    pub mean: Array1<f64>,
    /// standard deviation vector computed from data
    pub std: Array1<f64>,
}

impl NormalizedData {
    /// Constructor
    pub fn new(x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> NormalizedData {
        let (data, mean, std) = normalize(x);
        NormalizedData { data, mean, std }
    }

    /// Dimension of data points
    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }
}

/// Center and reduce columns of `x`. A single row or a constant column
/// keeps a unit standard deviation.
pub fn normalize(x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> (Array2<f64>, Array1<f64>, Array1<f64>) {
    let x_mean = x
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(x.ncols()));
    let mut x_std = if x.nrows() > 1 {
        x.std_axis(Axis(0), 1.)
    } else {
        Array1::ones(x.ncols())
    };
    x_std.mapv_inplace(|v| if v == 0. || !v.is_finite() { 1. } else { v });
    let xnorm = (x - &x_mean) / &x_std;

    (xnorm, x_mean, x_std)
}

/// Pairwise absolute differences between rows of a training set
#[derive(Debug)]
pub struct DiffMatrix {
    /// Differences as (n_obs * (n_obs-1))/2, nx) array
    pub d: Array2<f64>,
    /// Indices of the differences in the original data array
    pub d_indices: Array2<usize>,
    /// Number of observations
    pub n_obs: usize,
}

impl DiffMatrix {
    /// Compute differences given points given as an array (n_obs, nx)
    pub fn new(x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> DiffMatrix {
        let n_obs = x.nrows();
        let nx = x.ncols();
        let n_diffs = n_obs * n_obs.saturating_sub(1) / 2;
        let mut d_indices = Array2::<usize>::zeros((n_diffs, 2));
        let mut d = Array2::zeros((n_diffs, nx));
        let mut idx = 0;
        for k in 0..n_obs.saturating_sub(1) {
            let idx0 = idx;
            idx = idx0 + n_obs - k - 1;
            for i in (k + 1)..n_obs {
                let r = idx0 + i - k - 1;
                d_indices[[r, 0]] = k;
                d_indices[[r, 1]] = i;
            }
            let diff = &x.slice(s![k, ..]) - &x.slice(s![k + 1..n_obs, ..]);
            d.slice_mut(s![idx0..idx, ..]).assign(&diff);
        }
        d.mapv_inplace(f64::abs);

        DiffMatrix {
            d,
            d_indices,
            n_obs,
        }
    }
}

/// Computes differences between each element of x and each element of y
/// resulting in a 2d array of shape (nrows(x) * nrows(y), ncols(x));
/// *Panics* if x and y have not the same column numbers
pub fn pairwise_differences(
    x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
) -> Array2<f64> {
    assert!(x.ncols() == y.ncols());
    let (nx, ny) = (x.nrows(), y.nrows());
    let mut d = Array2::zeros((nx * ny, x.ncols()));
    for (i, xi) in x.rows().into_iter().enumerate() {
        let block = (&y.view() - &xi).mapv(f64::abs);
        d.slice_mut(s![i * ny..(i + 1) * ny, ..]).assign(&block);
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_normalized_matrix() {
        let x = array![[1., 2.], [3., 2.]];
        let xnorm = NormalizedData::new(&x);
        assert_abs_diff_eq!(xnorm.mean, array![2., 2.]);
        // constant column keeps unit std
        assert_abs_diff_eq!(xnorm.std, array![f64::sqrt(2.), 1.]);
        assert_abs_diff_eq!(xnorm.data.column(1), array![0., 0.]);
    }

    #[test]
    fn test_normalize_single_row() {
        let (xnorm, mean, std) = normalize(&array![[3., -1.]]);
        assert_abs_diff_eq!(mean, array![3., -1.]);
        assert_abs_diff_eq!(std, array![1., 1.]);
        assert_abs_diff_eq!(xnorm, array![[0., 0.]]);
    }

    #[test]
    fn test_diff_matrix() {
        let xt = array![[0.5], [1.2], [2.0], [3.0], [4.0]];
        let dm = DiffMatrix::new(&xt);
        assert_eq!(dm.d.nrows(), 10);
        assert_abs_diff_eq!(dm.d[[0, 0]], 0.7, epsilon = 1e-12);
        assert_eq!(dm.d_indices.row(4).to_vec(), vec![1, 2]);
        assert_abs_diff_eq!(dm.d[[9, 0]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pairwise_differences() {
        let x = array![[-0.9486833], [-0.82219219]];
        let y = array![[-1.26491106], [-0.63245553], [0.], [0.63245553], [1.26491106]];
        let d = pairwise_differences(&x, &y);
        assert_eq!(d.dim(), (10, 1));
        assert_abs_diff_eq!(d[[0, 0]], 0.31622776, epsilon = 1e-8);
        assert_abs_diff_eq!(d[[5, 0]], 0.44271887, epsilon = 1e-8);
    }
}
