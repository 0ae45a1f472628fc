//! GPU kernels for density accumulation and its adjoints.

mod backward;
mod density;
mod forward;
mod relevance;

pub(crate) use backward::*;
pub(crate) use forward::*;
pub(crate) use relevance::*;
