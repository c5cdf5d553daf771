//! Declarative description of an optimization problem: input features,
//! output features with their objectives and input constraints.
mod constraints;
mod experiments;
mod inputs;
mod objectives;
mod outputs;

pub use constraints::*;
pub use experiments::*;
pub use inputs::*;
pub use objectives::*;
pub use outputs::*;

use crate::errors::{Result, SoboError};
use ndarray::{Array2, ArrayBase, Data, Ix2};
use serde::{Deserialize, Serialize};

/// Tolerance used to check constraints fulfillment of candidates
pub const CONSTRAINT_TOL: f64 = 1e-4;

/// Inputs, outputs and constraints of an optimization problem
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    inputs: Inputs,
    outputs: Outputs,
    #[serde(default)]
    constraints: Vec<Constraint>,
}

impl Domain {
    /// Build a validated domain
    pub fn new(inputs: Inputs, outputs: Outputs, constraints: Vec<Constraint>) -> Result<Self> {
        let domain = Domain {
            inputs,
            outputs,
            constraints,
        };
        domain.validate()?;
        Ok(domain)
    }

    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Check domain invariants, also used after deserialization
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Err(SoboError::ValidationError(
                "domain requires at least one input and one output".to_string(),
            ));
        }
        let mut keys: Vec<&str> = self.inputs.keys();
        keys.extend(self.outputs.keys());
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        if let Some(w) = sorted.windows(2).find(|w| w[0] == w[1]) {
            return Err(SoboError::ValidationError(format!(
                "duplicate feature key '{}'",
                w[0]
            )));
        }
        for feat in self.inputs.iter() {
            feat.validate()?;
        }
        for cstr in self.constraints.iter() {
            cstr.validate()?;
            for key in cstr.features() {
                let feat = self.inputs.get_by_key(key).ok_or_else(|| {
                    SoboError::ValidationError(format!(
                        "constraint references unknown input '{key}'"
                    ))
                })?;
                if !feat.is_continuous() {
                    return Err(SoboError::ValidationError(format!(
                        "constraints only apply to continuous inputs, '{key}' is not"
                    )));
                }
                if let (
                    Constraint::NChooseK { .. },
                    InputKind::Continuous { lower, .. },
                ) = (cstr, &feat.kind)
                {
                    if *lower != 0. {
                        return Err(SoboError::ValidationError(format!(
                            "n-choose-k input '{key}' should have a lower bound of 0"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Check that experiments match the domain and encode
    pub fn validate_experiments(&self, exps: &Experiments) -> Result<()> {
        if exps.y().ncols() != self.outputs.len() {
            return Err(SoboError::ValidationError(format!(
                "expected {} output columns, got {}",
                self.outputs.len(),
                exps.y().ncols()
            )));
        }
        self.inputs.transform(exps.x()).map(|_| ())
    }

    /// Values of the features of a constraint in a folded point
    fn constraint_values(&self, cstr: &Constraint, row: &[f64]) -> Result<Vec<f64>> {
        cstr.features()
            .iter()
            .map(|key| {
                self.inputs
                    .index_of(key)
                    .map(|i| row[i])
                    .ok_or_else(|| SoboError::ValidationError(format!("unknown input '{key}'")))
            })
            .collect()
    }

    /// Whether each row of folded points (n, n_inputs) fulfills the pointwise
    /// and n-choose-k constraints
    pub fn is_fulfilled(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Vec<bool>> {
        x.outer_iter()
            .map(|row| {
                let row = row.to_vec();
                for cstr in self.constraints.iter() {
                    let values = self.constraint_values(cstr, &row)?;
                    if !cstr.is_fulfilled(&values, CONSTRAINT_TOL)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            })
            .collect()
    }

    /// Whether a batch of folded points fulfills the interpoint equality constraints
    pub fn is_interpoint_fulfilled(&self, x: &Array2<f64>) -> bool {
        self.constraints.iter().all(|cstr| match cstr {
            Constraint::InterpointEquality {
                feature,
                multiplicity,
            } => {
                let Some(j) = self.inputs.index_of(feature) else {
                    return false;
                };
                let m = multiplicity.unwrap_or(x.nrows()).max(1);
                x.column(j)
                    .to_vec()
                    .chunks(m)
                    .all(|g| g.iter().all(|v| (v - g[0]).abs() <= CONSTRAINT_TOL))
            }
            _ => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn inputs() -> Inputs {
        Inputs::new(vec![
            InputFeature::continuous("x1", 0., 1.),
            InputFeature::continuous("x2", 0., 1.),
            InputFeature::categorical("c", &["a", "b"]),
        ])
    }

    fn outputs() -> Outputs {
        Outputs::new(vec![OutputFeature::new("y", Objective::maximize())])
    }

    #[test]
    fn test_domain_validation() {
        assert!(Domain::new(inputs(), outputs(), vec![]).is_ok());
        let dup = Outputs::new(vec![OutputFeature::new("x1", Objective::maximize())]);
        assert!(Domain::new(inputs(), dup, vec![]).is_err());
        let unknown = Constraint::linear_inequality(&["x1", "x3"], &[1., 1.], 1.);
        assert!(Domain::new(inputs(), outputs(), vec![unknown]).is_err());
        let categorical = Constraint::interpoint_equality("c", None);
        assert!(Domain::new(inputs(), outputs(), vec![categorical]).is_err());
    }

    #[test]
    fn test_fulfilled() {
        let domain = Domain::new(
            inputs(),
            outputs(),
            vec![
                Constraint::linear_inequality(&["x1", "x2"], &[1., 1.], 1.),
                Constraint::interpoint_equality("x1", None),
            ],
        )
        .unwrap();
        let x = array![[0.2, 0.3, 0.], [0.2, 0.9, 1.]];
        assert_eq!(domain.is_fulfilled(&x).unwrap(), vec![true, false]);
        assert!(domain.is_interpoint_fulfilled(&x));
        let x = array![[0.2, 0.3, 0.], [0.4, 0.3, 1.]];
        assert!(!domain.is_interpoint_fulfilled(&x));
    }
}
