use crate::errors::{Result, SoboError};
use ndarray::{concatenate, Array2, ArrayBase, Axis, Data, Ix2, Zip};

/// Table of past experiments
///
/// Inputs are stored as folded values (n, n_inputs), outputs as (n, n_outputs)
/// with a validity flag per output value. Rows are only appended.
#[derive(Clone, Debug, PartialEq)]
pub struct Experiments {
    x: Array2<f64>,
    y: Array2<f64>,
    valid: Array2<bool>,
}

impl Experiments {
    /// Experiments where every non-NaN output value is valid
    pub fn new(
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<Self> {
        let valid = y.mapv(|v| !v.is_nan());
        Self::with_validity(x, y, &valid)
    }

    /// Experiments with explicit validity flags, NaN output values are always invalid
    pub fn with_validity(
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        valid: &ArrayBase<impl Data<Elem = bool>, Ix2>,
    ) -> Result<Self> {
        if x.nrows() != y.nrows() || y.dim() != valid.dim() {
            return Err(SoboError::ValidationError(format!(
                "inconsistent experiments shapes: x {:?}, y {:?}, valid {:?}",
                x.dim(),
                y.dim(),
                valid.dim()
            )));
        }
        let mut valid = valid.to_owned();
        Zip::from(&mut valid)
            .and(y)
            .for_each(|v, y| *v = *v && !y.is_nan());
        Ok(Experiments {
            x: x.to_owned(),
            y: y.to_owned(),
            valid,
        })
    }

    /// Empty table for the given numbers of inputs and outputs
    pub fn empty(n_inputs: usize, n_outputs: usize) -> Self {
        Experiments {
            x: Array2::zeros((0, n_inputs)),
            y: Array2::zeros((0, n_outputs)),
            valid: Array2::from_elem((0, n_outputs), false),
        }
    }

    /// Append rows of `other`
    pub fn append(&mut self, other: &Experiments) -> Result<()> {
        if other.x.ncols() != self.x.ncols() || other.y.ncols() != self.y.ncols() {
            return Err(SoboError::ValidationError(format!(
                "cannot append experiments with {} inputs and {} outputs to experiments with {} inputs and {} outputs",
                other.x.ncols(),
                other.y.ncols(),
                self.x.ncols(),
                self.y.ncols()
            )));
        }
        self.x = concatenate![Axis(0), self.x, other.x];
        self.y = concatenate![Axis(0), self.y, other.y];
        self.valid = concatenate![Axis(0), self.valid, other.valid];
        Ok(())
    }

    pub fn nrows(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.x.nrows() == 0
    }

    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array2<f64> {
        &self.y
    }

    pub fn valid(&self) -> &Array2<bool> {
        &self.valid
    }

    /// Rows valid for the given output
    pub fn valid_rows(&self, output: usize) -> Vec<usize> {
        self.valid
            .column(output)
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.then_some(i))
            .collect()
    }

    /// Rows valid for every output
    pub fn valid_rows_all(&self) -> Vec<usize> {
        self.valid
            .outer_iter()
            .enumerate()
            .filter_map(|(i, row)| row.iter().all(|v| *v).then_some(i))
            .collect()
    }

    /// Number of experiments valid for the given output
    pub fn n_valid(&self, output: usize) -> usize {
        self.valid.column(output).iter().filter(|v| **v).count()
    }

    /// Rows valid for every output
    pub fn select_valid(&self) -> Experiments {
        let rows = self.valid_rows_all();
        Experiments {
            x: self.x.select(Axis(0), &rows),
            y: self.y.select(Axis(0), &rows),
            valid: self.valid.select(Axis(0), &rows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_validity() {
        let x = array![[0.], [1.], [2.]];
        let y = array![[1., f64::NAN], [2., 3.], [3., 4.]];
        let valid = array![[true, true], [true, true], [false, true]];
        let exps = Experiments::with_validity(&x, &y, &valid).unwrap();
        assert_eq!(exps.valid_rows(0), vec![0, 1]);
        assert_eq!(exps.valid_rows(1), vec![1, 2]);
        assert_eq!(exps.valid_rows_all(), vec![1]);
        assert_eq!(exps.n_valid(1), 2);
        assert_eq!(exps.select_valid().nrows(), 1);
    }

    #[test]
    fn test_append() {
        let mut exps = Experiments::empty(1, 1);
        let other = Experiments::new(&array![[0.], [1.]], &array![[1.], [2.]]).unwrap();
        exps.append(&other).unwrap();
        exps.append(&other).unwrap();
        assert_eq!(exps.nrows(), 4);
        let bad = Experiments::new(&array![[0., 1.]], &array![[1.]]).unwrap();
        assert!(exps.append(&bad).is_err());
        assert!(Experiments::new(&array![[0.]], &array![[1.], [2.]]).is_err());
    }
}
