use crate::utils::sigmoid;
use serde::{Deserialize, Serialize};

fn one() -> f64 {
    1.
}

fn zero() -> f64 {
    0.
}

/// Objective attached to an output
///
/// Plain objectives (maximize, minimize, close to target) give a desirability
/// score. Sigmoid and target objectives are soft constraints: their score is
/// a feasibility probability in `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Objective {
    Maximize {
        #[serde(default = "one")]
        w: f64,
        #[serde(default = "zero")]
        lower: f64,
        #[serde(default = "one")]
        upper: f64,
    },
    Minimize {
        #[serde(default = "one")]
        w: f64,
        #[serde(default = "zero")]
        lower: f64,
        #[serde(default = "one")]
        upper: f64,
    },
    MaximizeSigmoid {
        #[serde(default = "one")]
        w: f64,
        steepness: f64,
        tp: f64,
    },
    MinimizeSigmoid {
        #[serde(default = "one")]
        w: f64,
        steepness: f64,
        tp: f64,
    },
    Target {
        #[serde(default = "one")]
        w: f64,
        target: f64,
        tolerance: f64,
        steepness: f64,
    },
    CloseToTarget {
        #[serde(default = "one")]
        w: f64,
        target: f64,
        #[serde(default = "one")]
        exponent: f64,
    },
}

impl Objective {
    pub fn maximize() -> Self {
        Objective::Maximize {
            w: 1.,
            lower: 0.,
            upper: 1.,
        }
    }

    pub fn minimize() -> Self {
        Objective::Minimize {
            w: 1.,
            lower: 0.,
            upper: 1.,
        }
    }

    pub fn maximize_sigmoid(steepness: f64, tp: f64) -> Self {
        Objective::MaximizeSigmoid {
            w: 1.,
            steepness,
            tp,
        }
    }

    pub fn minimize_sigmoid(steepness: f64, tp: f64) -> Self {
        Objective::MinimizeSigmoid {
            w: 1.,
            steepness,
            tp,
        }
    }

    pub fn target(target: f64, tolerance: f64, steepness: f64) -> Self {
        Objective::Target {
            w: 1.,
            target,
            tolerance,
            steepness,
        }
    }

    pub fn close_to_target(target: f64, exponent: f64) -> Self {
        Objective::CloseToTarget {
            w: 1.,
            target,
            exponent,
        }
    }

    /// Return the same objective with the given weight
    pub fn with_weight(mut self, weight: f64) -> Self {
        match &mut self {
            Objective::Maximize { w, .. }
            | Objective::Minimize { w, .. }
            | Objective::MaximizeSigmoid { w, .. }
            | Objective::MinimizeSigmoid { w, .. }
            | Objective::Target { w, .. }
            | Objective::CloseToTarget { w, .. } => *w = weight,
        }
        self
    }

    pub fn weight(&self) -> f64 {
        match self {
            Objective::Maximize { w, .. }
            | Objective::Minimize { w, .. }
            | Objective::MaximizeSigmoid { w, .. }
            | Objective::MinimizeSigmoid { w, .. }
            | Objective::Target { w, .. }
            | Objective::CloseToTarget { w, .. } => *w,
        }
    }

    /// Whether the objective acts as a soft output constraint
    pub fn is_constraint(&self) -> bool {
        matches!(
            self,
            Objective::MaximizeSigmoid { .. }
                | Objective::MinimizeSigmoid { .. }
                | Objective::Target { .. }
        )
    }

    /// Desirability (or feasibility probability) of the output value `y`
    pub fn score(&self, y: f64) -> f64 {
        match self {
            Objective::Maximize { lower, upper, .. } => (y - lower) / (upper - lower),
            Objective::Minimize { lower, upper, .. } => -(y - lower) / (upper - lower),
            Objective::MaximizeSigmoid { steepness, tp, .. } => sigmoid(steepness * (y - tp)),
            Objective::MinimizeSigmoid { steepness, tp, .. } => sigmoid(-steepness * (y - tp)),
            Objective::Target {
                target,
                tolerance,
                steepness,
                ..
            } => {
                sigmoid(steepness * (y - (target - tolerance)))
                    * sigmoid(-steepness * (y - (target + tolerance)))
            }
            Objective::CloseToTarget {
                target, exponent, ..
            } => -(y - target).abs().powf(*exponent),
        }
    }

    /// Feasibility probability of `y` for constraint objectives
    pub fn feasibility(&self, y: f64) -> Option<f64> {
        if self.is_constraint() {
            Some(self.score(y))
        } else {
            None
        }
    }
}
