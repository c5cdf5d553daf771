//! Expression trees evaluated by a small interpreter.
//!
//! Expressions are used in two places:
//! * custom objectives `f(samples, callables, weights, X)` where leaves refer to
//!   per-output scores ([Expr::score]), weights ([Expr::weight]), raw output
//!   samples ([Expr::output]) or inputs ([Expr::input]);
//! * nonlinear input constraints where [Expr::input] leaves refer to the
//!   constraint features.
//!
//! An expression serializes to JSON and is evaluated by the same interpreter
//! once restored, so a dumped function reproduces the original values exactly.
//!
//! ```
//! use sobox::Expr;
//!
//! // (s0^w0 + s1^w1) * (s0^w0 * s1^w1)
//! let p0 = Expr::score(0).powf(Expr::weight(0));
//! let p1 = Expr::score(1).powf(Expr::weight(1));
//! let f = (p0.clone() + p1.clone()) * (p0 * p1);
//! let text = serde_json::to_string(&f).unwrap();
//! let g: Expr = serde_json::from_str(&text).unwrap();
//! assert_eq!(f, g);
//! ```

use crate::errors::{Result, SoboError};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unary operators
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `|x|`
    Abs,
    /// `exp(x)`
    Exp,
    /// natural logarithm
    Ln,
    /// square root
    Sqrt,
    /// `1 / (1 + exp(-x))`
    Sigmoid,
}

impl UnaryOp {
    fn apply(&self, v: f64) -> f64 {
        match self {
            UnaryOp::Neg => -v,
            UnaryOp::Abs => v.abs(),
            UnaryOp::Exp => libm::exp(v),
            UnaryOp::Ln => libm::log(v),
            UnaryOp::Sqrt => libm::sqrt(v),
            UnaryOp::Sigmoid => 1. / (1. + libm::exp(-v)),
        }
    }
}

/// Binary operators
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a / b`
    Div,
    /// `a ^ b`
    Pow,
    /// `min(a, b)`
    Min,
    /// `max(a, b)`
    Max,
}

impl BinaryOp {
    fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => libm::pow(a, b),
            BinaryOp::Min => a.min(b),
            BinaryOp::Max => a.max(b),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
        }
    }
}

/// An expression tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// A constant value
    Const(f64),
    /// Score of the i-th per-output scorer
    Score(usize),
    /// Weight of the i-th per-output scorer
    Weight(usize),
    /// Raw sample of the i-th output
    Output(usize),
    /// Value of the i-th input
    Input(usize),
    /// Unary operation
    Unary(UnaryOp, Box<Expr>),
    /// Binary operation
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Sum of terms
    Sum(Vec<Expr>),
    /// Product of terms
    Product(Vec<Expr>),
}

/// Result of an evaluation: either a scalar or an array of values, one per
/// (sample, point).
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A scalar, broadcast against arrays
    Scalar(f64),
    /// An array of values
    Array(Array2<f64>),
}

impl Value {
    fn map(self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Scalar(v) => Value::Scalar(f(v)),
            Value::Array(mut a) => {
                a.mapv_inplace(f);
                Value::Array(a)
            }
        }
    }

    fn combine(self, other: Value, op: BinaryOp) -> Result<Value> {
        let res = match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(op.apply(a, b)),
            (Value::Scalar(a), Value::Array(b)) => Value::Array(b.mapv(|v| op.apply(a, v))),
            (Value::Array(a), Value::Scalar(b)) => Value::Array(a.mapv(|v| op.apply(v, b))),
            (Value::Array(mut a), Value::Array(b)) => {
                if a.dim() != b.dim() {
                    return Err(SoboError::ExprError(format!(
                        "shape mismatch in '{}': {:?} vs {:?}",
                        op.symbol(),
                        a.dim(),
                        b.dim()
                    )));
                }
                Zip::from(&mut a).and(&b).for_each(|a, &b| *a = op.apply(*a, b));
                Value::Array(a)
            }
        };
        Ok(res)
    }

    /// Turn the value into an array of the given shape, broadcasting scalars
    pub fn into_array(self, shape: (usize, usize)) -> Result<Array2<f64>> {
        match self {
            Value::Scalar(v) => Ok(Array2::from_elem(shape, v)),
            Value::Array(a) if a.dim() == shape => Ok(a),
            Value::Array(a) => Err(SoboError::ExprError(format!(
                "expected result of shape {shape:?}, got {:?}",
                a.dim()
            ))),
        }
    }

    /// Scalar value, if any
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            Value::Array(_) => None,
        }
    }
}

/// Values of the leaves of an expression
pub trait ExprContext {
    /// Score of the i-th scorer
    fn score(&self, i: usize) -> Result<Value>;
    /// Weight of the i-th scorer
    fn weight(&self, i: usize) -> Result<f64>;
    /// Raw sample of the i-th output
    fn output(&self, i: usize) -> Result<Value>;
    /// Value of the i-th input
    fn input(&self, i: usize) -> Result<Value>;
}

/// Leaf counts referenced by an expression
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExprArity {
    /// One more than the highest score index, 0 if none
    pub scores: usize,
    /// One more than the highest weight index, 0 if none
    pub weights: usize,
    /// One more than the highest output index, 0 if none
    pub outputs: usize,
    /// One more than the highest input index, 0 if none
    pub inputs: usize,
}

impl Expr {
    /// Constant leaf
    pub fn constant(v: f64) -> Expr {
        Expr::Const(v)
    }

    /// Score of the i-th scorer
    pub fn score(i: usize) -> Expr {
        Expr::Score(i)
    }

    /// Weight of the i-th scorer
    pub fn weight(i: usize) -> Expr {
        Expr::Weight(i)
    }

    /// Raw sample of the i-th output
    pub fn output(i: usize) -> Expr {
        Expr::Output(i)
    }

    /// Value of the i-th input
    pub fn input(i: usize) -> Expr {
        Expr::Input(i)
    }

    /// `self ^ exponent`
    pub fn powf(self, exponent: Expr) -> Expr {
        Expr::Binary(BinaryOp::Pow, Box::new(self), Box::new(exponent))
    }

    /// `min(self, other)`
    pub fn min(self, other: Expr) -> Expr {
        Expr::Binary(BinaryOp::Min, Box::new(self), Box::new(other))
    }

    /// `max(self, other)`
    pub fn max(self, other: Expr) -> Expr {
        Expr::Binary(BinaryOp::Max, Box::new(self), Box::new(other))
    }

    /// `exp(self)`
    pub fn exp(self) -> Expr {
        Expr::Unary(UnaryOp::Exp, Box::new(self))
    }

    /// `ln(self)`
    pub fn ln(self) -> Expr {
        Expr::Unary(UnaryOp::Ln, Box::new(self))
    }

    /// `|self|`
    pub fn abs(self) -> Expr {
        Expr::Unary(UnaryOp::Abs, Box::new(self))
    }

    /// `sqrt(self)`
    pub fn sqrt(self) -> Expr {
        Expr::Unary(UnaryOp::Sqrt, Box::new(self))
    }

    /// `sigmoid(self)`
    pub fn sigmoid(self) -> Expr {
        Expr::Unary(UnaryOp::Sigmoid, Box::new(self))
    }

    /// Evaluate the expression given leaf values
    pub fn eval(&self, ctx: &impl ExprContext) -> Result<Value> {
        match self {
            Expr::Const(v) => Ok(Value::Scalar(*v)),
            Expr::Score(i) => ctx.score(*i),
            Expr::Weight(i) => ctx.weight(*i).map(Value::Scalar),
            Expr::Output(i) => ctx.output(*i),
            Expr::Input(i) => ctx.input(*i),
            Expr::Unary(op, e) => Ok(e.eval(ctx)?.map(|v| op.apply(v))),
            Expr::Binary(op, a, b) => a.eval(ctx)?.combine(b.eval(ctx)?, *op),
            Expr::Sum(terms) => terms
                .iter()
                .try_fold(Value::Scalar(0.), |acc, t| acc.combine(t.eval(ctx)?, BinaryOp::Add)),
            Expr::Product(terms) => terms
                .iter()
                .try_fold(Value::Scalar(1.), |acc, t| acc.combine(t.eval(ctx)?, BinaryOp::Mul)),
        }
    }

    /// Leaf counts referenced by this expression
    pub fn arity(&self) -> ExprArity {
        let mut arity = ExprArity::default();
        self.visit(&mut |e| match e {
            Expr::Score(i) => arity.scores = arity.scores.max(i + 1),
            Expr::Weight(i) => arity.weights = arity.weights.max(i + 1),
            Expr::Output(i) => arity.outputs = arity.outputs.max(i + 1),
            Expr::Input(i) => arity.inputs = arity.inputs.max(i + 1),
            _ => (),
        });
        arity
    }

    /// Whether every constant of this expression is finite
    pub fn has_finite_constants(&self) -> bool {
        let mut finite = true;
        self.visit(&mut |e| {
            if let Expr::Const(v) = e {
                finite &= v.is_finite();
            }
        });
        finite
    }

    fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Unary(_, e) => e.visit(f),
            Expr::Binary(_, a, b) => {
                a.visit(f);
                b.visit(f);
            }
            Expr::Sum(terms) | Expr::Product(terms) => terms.iter().for_each(|t| t.visit(f)),
            _ => (),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{v}"),
            Expr::Score(i) => write!(f, "score[{i}]"),
            Expr::Weight(i) => write!(f, "w[{i}]"),
            Expr::Output(i) => write!(f, "y[{i}]"),
            Expr::Input(i) => write!(f, "x[{i}]"),
            Expr::Unary(UnaryOp::Neg, e) => write!(f, "-({e})"),
            Expr::Unary(op, e) => write!(f, "{}({e})", format!("{op:?}").to_lowercase()),
            Expr::Binary(op @ (BinaryOp::Min | BinaryOp::Max), a, b) => {
                write!(f, "{}({a}, {b})", op.symbol())
            }
            Expr::Binary(op, a, b) => write!(f, "({a} {} {b})", op.symbol()),
            Expr::Sum(terms) => {
                let terms: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
                write!(f, "sum({})", terms.join(", "))
            }
            Expr::Product(terms) => {
                let terms: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
                write!(f, "prod({})", terms.join(", "))
            }
        }
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$trait for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::Binary($op, Box::new(self), Box::new(rhs))
            }
        }

        impl std::ops::$trait<f64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::Binary($op, Box::new(self), Box::new(Expr::Const(rhs)))
            }
        }
    };
}

impl_binary_op!(Add, add, BinaryOp::Add);
impl_binary_op!(Sub, sub, BinaryOp::Sub);
impl_binary_op!(Mul, mul, BinaryOp::Mul);
impl_binary_op!(Div, div, BinaryOp::Div);

impl std::ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Unary(UnaryOp::Neg, Box::new(self))
    }
}

/// Context giving scalar input values, used for nonlinear constraints on a single point
pub(crate) struct InputValues<'a>(pub &'a [f64]);

impl ExprContext for InputValues<'_> {
    fn score(&self, i: usize) -> Result<Value> {
        Err(SoboError::ExprError(format!(
            "score[{i}] is not available in an input expression"
        )))
    }

    fn weight(&self, i: usize) -> Result<f64> {
        Err(SoboError::ExprError(format!(
            "w[{i}] is not available in an input expression"
        )))
    }

    fn output(&self, i: usize) -> Result<Value> {
        Err(SoboError::ExprError(format!(
            "y[{i}] is not available in an input expression"
        )))
    }

    fn input(&self, i: usize) -> Result<Value> {
        self.0
            .get(i)
            .map(|v| Value::Scalar(*v))
            .ok_or_else(|| SoboError::ExprError(format!("x[{i}] out of range")))
    }
}
