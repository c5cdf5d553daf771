mod smoothing;

pub(crate) use smoothing::*;
