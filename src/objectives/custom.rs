use crate::errors::{Result, SoboError};
use crate::expr::Expr;

/// User supplied aggregation function of a custom objective, possibly unset
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CustomFunction(Option<Expr>);

impl CustomFunction {
    pub fn new(f: Expr) -> Self {
        CustomFunction(Some(f))
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    pub fn set(&mut self, f: Expr) {
        self.0 = Some(f)
    }

    /// The attached function, fails when none was attached
    pub fn get(&self) -> Result<&Expr> {
        self.0.as_ref().ok_or_else(|| {
            SoboError::InvalidConfigError("No function for custom objective given.".to_string())
        })
    }

    /// Serialize the attached function
    pub fn dumps(&self) -> Result<String> {
        let f = self.0.as_ref().ok_or_else(|| {
            SoboError::InvalidConfigError("Custom function is not set.".to_string())
        })?;
        // JSON has no representation of infinite and NaN values
        if !f.has_finite_constants() {
            return Err(SoboError::InvalidConfigError(format!(
                "Custom function {f} with non finite constants cannot be serialized."
            )));
        }
        Ok(serde_json::to_string(f)?)
    }

    /// Restore a function serialized with [CustomFunction::dumps]
    pub fn loads(text: &str) -> Result<Self> {
        let f: Expr = serde_json::from_str(text).map_err(|e| {
            SoboError::InvalidConfigError(format!("Cannot load custom function: {e}"))
        })?;
        Ok(CustomFunction(Some(f)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray_rand::rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn test_unset_function() {
        let f = CustomFunction::default();
        assert!(!f.is_set());
        assert!(matches!(f.get(), Err(SoboError::InvalidConfigError(_))));
        assert!(matches!(f.dumps(), Err(SoboError::InvalidConfigError(_))));
    }

    #[test]
    fn test_dumps_loads() {
        let f = CustomFunction::new(Expr::score(0) * Expr::weight(0) + Expr::output(1).exp());
        let text = f.dumps().unwrap();
        let g = CustomFunction::loads(&text).unwrap();
        assert_eq!(f, g);
        assert!(matches!(
            CustomFunction::loads("not a function"),
            Err(SoboError::InvalidConfigError(_))
        ));
    }

    #[test]
    fn test_dumps_loads_constants_bit_identical() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let mut values: Vec<f64> = (0..2000).map(|_| rng.gen_range(0. ..10.)).collect();
        values.extend((0..2000).map(|_| f64::from_bits(rng.gen::<u64>())).filter(|v| v.is_finite()));
        values.extend([9.502076740304727, f64::MIN_POSITIVE, f64::MAX, -0., 5e-324]);
        for v in values {
            let f = CustomFunction::new(Expr::score(0) * v);
            let g = CustomFunction::loads(&f.dumps().unwrap()).unwrap();
            match g.get().unwrap() {
                Expr::Binary(_, _, c) => match c.as_ref() {
                    Expr::Const(w) => assert_eq!(v.to_bits(), w.to_bits(), "{v} restored as {w}"),
                    e => panic!("unexpected expression {e}"),
                },
                e => panic!("unexpected expression {e}"),
            }
        }
    }

    #[test]
    fn test_dumps_non_finite_constant() {
        for v in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let f = CustomFunction::new(Expr::score(0) * v);
            assert!(matches!(f.dumps(), Err(SoboError::InvalidConfigError(_))));
        }
        let f = CustomFunction::new(Expr::score(0) * f64::MAX);
        assert!(CustomFunction::loads(&f.dumps().unwrap()).is_ok());
    }
}
