//! Maximization of acquisition criteria over batches of candidates
mod candidates;
mod layout;
mod optimizer;

pub use candidates::*;
pub(crate) use layout::*;
pub use optimizer::{Algorithm, ACQ_MAX_EVAL_DEFAULT};
pub(crate) use optimizer::Optimizer;
