//! This library implements a single objective Bayesian optimization strategy
//! for sequential experimental design.
//!
//! A problem is described declaratively by a [Domain]: input features
//! (continuous, discrete, categorical or described by numerical descriptors),
//! output features each carrying an [Objective], and input constraints
//! (linear, nonlinear, n-choose-k, interpoint equality).
//!
//! The [SoboStrategy] follows an ask and tell interface:
//! * `tell` appends experiments and trains one Gaussian process per output
//!   (see [sobox_gp]),
//! * `ask` builds a Monte-Carlo objective from the output objectives, sigmoid
//!   objectives acting as soft output constraints, instantiates the configured
//!   [AcquisitionFunction] (qEI, qNEI, qPI, qUCB, qSR, qLogEI, qLogNEI) and
//!   maximizes it to return a batch of candidates.
//!
//! The objective aggregation can also be a user supplied [Expr] which can be
//! serialized with [SoboStrategy::dumps] and restored with [SoboStrategy::loads].
//!
//! # Example
//!
//! ```
//! use ndarray::{Array2, ArrayView2, Axis};
//! use ndarray_rand::rand::SeedableRng;
//! use rand_xoshiro::Xoshiro256Plus;
//! use sobox::{
//!     Domain, Experiments, InputFeature, Inputs, Objective, OutputFeature, Outputs,
//!     SoboConfig, SoboStrategy,
//! };
//!
//! // x in [0, 25], min xsinx(x) ~ -15.1 at x ~ 18.9
//! fn xsinx(x: &ArrayView2<f64>) -> Array2<f64> {
//!     (x - 3.5) * ((x - 3.5) / std::f64::consts::PI).mapv(|v| v.sin())
//! }
//!
//! let domain = Domain::new(
//!     Inputs::new(vec![InputFeature::continuous("x", 0., 25.)]),
//!     Outputs::new(vec![OutputFeature::new("y", Objective::minimize())]),
//!     vec![],
//! )
//! .expect("valid domain");
//! let config = SoboConfig::default()
//!     .num_mc_samples(64)
//!     .num_raw_samples(64)
//!     .num_restarts(2)
//!     .seed(42);
//! let mut strategy = SoboStrategy::new(domain.clone(), config).expect("valid config");
//!
//! let mut rng = Xoshiro256Plus::seed_from_u64(0);
//! let x = domain.inputs().sample(5, &mut rng);
//! strategy.tell(&Experiments::new(&x, &xsinx(&x.view())).unwrap()).unwrap();
//! for _ in 0..3 {
//!     let candidates = strategy.ask(1, false).expect("candidates");
//!     let y = xsinx(&candidates.x.view());
//!     strategy.tell(&Experiments::new(&candidates.x, &y).unwrap()).unwrap();
//! }
//! assert_eq!(strategy.num_experiments(), 8);
//! ```
//!
//! Logging is configured with the `SOBOX_LOG` environment variable
//! (`info` by default), see [env_logger](https://docs.rs/env_logger).
pub mod config;
pub mod criteria;
pub mod domain;
pub mod objectives;
pub mod optimizers;
pub mod surrogate;

mod errors;
mod expr;
mod strategy;
mod types;
mod utils;

pub use crate::config::*;
pub use crate::domain::{
    Constraint, Domain, Experiments, InputFeature, InputKind, Inputs, Objective, OutputFeature,
    Outputs,
};
pub use crate::errors::*;
pub use crate::expr::*;
pub use crate::strategy::*;
pub use crate::surrogate::{HyperConfig, ModelList, SurrogateSpec};
pub use crate::types::*;

/// Environment variable controlling the log level
pub const SOBOX_LOG: &str = "SOBOX_LOG";
