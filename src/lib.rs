//! atomgrid-rs core types, atom containers, and grid generation entry points.
//!
//! The crate rasterizes atomic structures into per-type voxel density grids
//! and propagates grid gradients back onto atom positions and type weights,
//! with a serial CPU reference path and WGPU kernels built on CubeCL.

mod atoms;
mod gpu;
mod gridder;
mod math;
mod tensor;
mod transform;

pub use atoms::{AtomTyping, CoordinateSet, Example};
pub use gridder::{GridError, GridMaker};
pub use math::{Quaternion, Vec3};
pub use tensor::{DeviceTensor, Tensor, TensorStorage};
pub use transform::{Pcg32, Transform};
