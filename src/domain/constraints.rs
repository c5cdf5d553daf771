use crate::errors::{Result, SoboError};
use crate::expr::{Expr, InputValues};
use serde::{Deserialize, Serialize};

/// Constraint on input features
///
/// Inequality constraints use the convention `g(x) <= 0` is feasible.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Constraint {
    /// `sum_i coefficients[i] * x[features[i]] == rhs`
    LinearEquality {
        features: Vec<String>,
        coefficients: Vec<f64>,
        rhs: f64,
    },
    /// `sum_i coefficients[i] * x[features[i]] <= rhs`
    LinearInequality {
        features: Vec<String>,
        coefficients: Vec<f64>,
        rhs: f64,
    },
    /// `expression(x) == 0` where `Expr::input(i)` is `x[features[i]]`
    NonlinearEquality {
        features: Vec<String>,
        expression: Expr,
    },
    /// `expression(x) <= 0` where `Expr::input(i)` is `x[features[i]]`
    NonlinearInequality {
        features: Vec<String>,
        expression: Expr,
    },
    /// Between `min_count` and `max_count` of the features are nonzero,
    /// or none of them when `none_also_valid`
    NChooseK {
        features: Vec<String>,
        min_count: usize,
        max_count: usize,
        none_also_valid: bool,
    },
    /// Consecutive points of a batch, by groups of `multiplicity` (the whole
    /// batch if unset), share the same value of `feature`
    InterpointEquality {
        feature: String,
        multiplicity: Option<usize>,
    },
}

impl Constraint {
    pub fn linear_inequality(features: &[&str], coefficients: &[f64], rhs: f64) -> Self {
        Constraint::LinearInequality {
            features: features.iter().map(|f| f.to_string()).collect(),
            coefficients: coefficients.to_vec(),
            rhs,
        }
    }

    pub fn linear_equality(features: &[&str], coefficients: &[f64], rhs: f64) -> Self {
        Constraint::LinearEquality {
            features: features.iter().map(|f| f.to_string()).collect(),
            coefficients: coefficients.to_vec(),
            rhs,
        }
    }

    pub fn nonlinear_inequality(features: &[&str], expression: Expr) -> Self {
        Constraint::NonlinearInequality {
            features: features.iter().map(|f| f.to_string()).collect(),
            expression,
        }
    }

    pub fn nonlinear_equality(features: &[&str], expression: Expr) -> Self {
        Constraint::NonlinearEquality {
            features: features.iter().map(|f| f.to_string()).collect(),
            expression,
        }
    }

    pub fn n_choose_k(
        features: &[&str],
        min_count: usize,
        max_count: usize,
        none_also_valid: bool,
    ) -> Self {
        Constraint::NChooseK {
            features: features.iter().map(|f| f.to_string()).collect(),
            min_count,
            max_count,
            none_also_valid,
        }
    }

    pub fn interpoint_equality(feature: &str, multiplicity: Option<usize>) -> Self {
        Constraint::InterpointEquality {
            feature: feature.to_string(),
            multiplicity,
        }
    }

    /// Keys of the constrained features
    pub fn features(&self) -> Vec<&str> {
        match self {
            Constraint::LinearEquality { features, .. }
            | Constraint::LinearInequality { features, .. }
            | Constraint::NonlinearEquality { features, .. }
            | Constraint::NonlinearInequality { features, .. }
            | Constraint::NChooseK { features, .. } => {
                features.iter().map(|f| f.as_str()).collect()
            }
            Constraint::InterpointEquality { feature, .. } => vec![feature.as_str()],
        }
    }

    /// Whether the constraint applies to a single point and can be handed to
    /// the local solver as a function of the point
    pub fn is_pointwise(&self) -> bool {
        matches!(
            self,
            Constraint::LinearEquality { .. }
                | Constraint::LinearInequality { .. }
                | Constraint::NonlinearEquality { .. }
                | Constraint::NonlinearInequality { .. }
        )
    }

    pub fn is_equality(&self) -> bool {
        matches!(
            self,
            Constraint::LinearEquality { .. } | Constraint::NonlinearEquality { .. }
        )
    }

    /// Value `g(x)` of a pointwise constraint given the values of its features
    /// (feasible when `g(x) <= 0`, or `g(x) == 0` for equalities)
    pub fn evaluate(&self, values: &[f64]) -> Result<f64> {
        match self {
            Constraint::LinearEquality {
                coefficients, rhs, ..
            }
            | Constraint::LinearInequality {
                coefficients, rhs, ..
            } => Ok(coefficients
                .iter()
                .zip(values)
                .map(|(c, x)| c * x)
                .sum::<f64>()
                - rhs),
            Constraint::NonlinearEquality { expression, .. }
            | Constraint::NonlinearInequality { expression, .. } => expression
                .eval(&InputValues(values))?
                .as_scalar()
                .ok_or_else(|| {
                    SoboError::ExprError("constraint expression should be scalar".to_string())
                }),
            _ => Err(SoboError::ValidationError(format!(
                "{:?} is not a pointwise constraint",
                self
            ))),
        }
    }

    /// Whether the values of the constrained features fulfill a single point
    /// constraint with tolerance `tol`
    pub fn is_fulfilled(&self, values: &[f64], tol: f64) -> Result<bool> {
        match self {
            Constraint::NChooseK {
                min_count,
                max_count,
                none_also_valid,
                ..
            } => {
                let count = values.iter().filter(|v| v.abs() > tol).count();
                Ok((count >= *min_count && count <= *max_count)
                    || (*none_also_valid && count == 0))
            }
            Constraint::InterpointEquality { .. } => Ok(true),
            c if c.is_equality() => Ok(c.evaluate(values)?.abs() <= tol),
            c => Ok(c.evaluate(values)? <= tol),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let err = |msg: String| Err(SoboError::ValidationError(msg));
        match self {
            Constraint::LinearEquality {
                features,
                coefficients,
                ..
            }
            | Constraint::LinearInequality {
                features,
                coefficients,
                ..
            } => {
                if features.len() != coefficients.len() {
                    return err(format!(
                        "linear constraint over {} features has {} coefficients",
                        features.len(),
                        coefficients.len()
                    ));
                }
            }
            Constraint::NonlinearEquality {
                features,
                expression,
            }
            | Constraint::NonlinearInequality {
                features,
                expression,
            } => {
                let arity = expression.arity();
                if arity.inputs > features.len()
                    || arity.scores + arity.weights + arity.outputs > 0
                {
                    return err(format!(
                        "nonlinear constraint expression '{expression}' should only use the {} constrained inputs",
                        features.len()
                    ));
                }
            }
            Constraint::NChooseK {
                features,
                min_count,
                max_count,
                ..
            } => {
                if min_count > max_count || *max_count > features.len() {
                    return err(format!(
                        "n-choose-k counts ({min_count}, {max_count}) invalid for {} features",
                        features.len()
                    ));
                }
            }
            Constraint::InterpointEquality { multiplicity, .. } => {
                if matches!(multiplicity, Some(m) if *m < 2) {
                    return err("interpoint multiplicity should be at least 2".to_string());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear() {
        let c = Constraint::linear_inequality(&["x1", "x2"], &[1., 1.], 1.);
        assert!(c.is_fulfilled(&[0.3, 0.6], 1e-6).unwrap());
        assert!(!c.is_fulfilled(&[0.5, 0.6], 1e-6).unwrap());
        let c = Constraint::linear_equality(&["x1", "x2"], &[1., 1.], 1.);
        assert!(c.is_fulfilled(&[0.4, 0.6], 1e-6).unwrap());
        assert!(!c.is_fulfilled(&[0.3, 0.6], 1e-6).unwrap());
    }

    #[test]
    fn test_nonlinear() {
        // x1^2 + x2^2 <= 1
        let expr = Expr::input(0).powf(Expr::constant(2.)) + Expr::input(1).powf(Expr::constant(2.))
            - 1.;
        let c = Constraint::nonlinear_inequality(&["x1", "x2"], expr);
        assert!(c.validate().is_ok());
        assert!(c.is_fulfilled(&[0.5, 0.5], 1e-6).unwrap());
        assert!(!c.is_fulfilled(&[1., 0.5], 1e-6).unwrap());

        let c = Constraint::nonlinear_inequality(&["x1"], Expr::input(1));
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_nchoosek() {
        let c = Constraint::n_choose_k(&["x1", "x2", "x3"], 1, 2, false);
        assert!(c.validate().is_ok());
        assert!(c.is_fulfilled(&[0., 0.5, 0.2], 1e-6).unwrap());
        assert!(!c.is_fulfilled(&[0.1, 0.5, 0.2], 1e-6).unwrap());
        assert!(!c.is_fulfilled(&[0., 0., 0.], 1e-6).unwrap());
        let c = Constraint::n_choose_k(&["x1", "x2", "x3"], 1, 2, true);
        assert!(c.is_fulfilled(&[0., 0., 0.], 1e-6).unwrap());
        assert!(Constraint::n_choose_k(&["x1"], 1, 2, true).validate().is_err());
    }

    #[test]
    fn test_serde() {
        let c = Constraint::interpoint_equality("x1", Some(2));
        let json = serde_json::to_string(&c).unwrap();
        let c2: Constraint = serde_json::from_str(&json).unwrap();
        assert_eq!(c, c2);
        assert!(Constraint::interpoint_equality("x1", Some(1)).validate().is_err());
    }
}
