//! GPU kernels for atomgrid-rs density generation and gradient evaluation.

mod kernels;

pub(crate) use kernels::*;
