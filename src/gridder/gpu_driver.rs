//! CubeCL launch drivers for the device rasterizer paths.
//!
//! Forward launches are voxel-parallel; gradient and relevance launches are
//! atom-parallel. Every launch writes through handles owned by the caller's
//! tensors, so batch drivers can pass offset sub-ranges of a 5-D slab.

use cubecl::prelude::*;
use cubecl::server::Handle;
use cubecl::wgpu::{WgpuDevice, WgpuRuntime};
use log::debug;

use super::grid_maker::GridMaker;
use super::types::GridError;
use crate::atoms::{AtomTyping, CoordinateSet};
use crate::gpu;
use crate::math::Vec3;
use crate::tensor::{DeviceTensor, Tensor};

const CUBE_DIM: u32 = 256;

pub(crate) fn div_ceil(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

fn device_tensor(t: &Tensor) -> Result<&DeviceTensor, GridError> {
    t.device().ok_or(GridError::StorageMismatch(
        "expected a device-resident tensor",
    ))
}

// Device buffers are padded to one element at upload; launch lengths match.
fn launch_len(len: usize) -> usize {
    len.max(1)
}

fn checked_grid_len(maker: &GridMaker, ntypes: usize) -> Result<usize, GridError> {
    let dim = maker.dim;
    let total = dim
        .checked_mul(dim)
        .and_then(|v| v.checked_mul(dim))
        .and_then(|v| v.checked_mul(ntypes))
        .ok_or(GridError::InvalidConfiguration(
            "grid too large for device launch",
        ))?;
    if total > u32::MAX as usize {
        return Err(GridError::InvalidConfiguration(
            "grid too large for 1d launch",
        ));
    }
    Ok(total)
}

/// Rasterize a device-resident coordinate set into the grid behind
/// `out_handle` (length `ntypes * dim^3` floats).
pub(crate) fn forward_device(
    maker: &GridMaker,
    origin: Vec3,
    input: &CoordinateSet,
    device: &WgpuDevice,
    out_handle: &Handle,
) -> Result<(), GridError> {
    let natoms = input.len();
    let ntypes = input.num_types();
    let dim = maker.dim;
    let total = checked_grid_len(maker, ntypes)?;
    let nvox = (dim * dim * dim) as u32;

    let coords = device_tensor(&input.coords)?;
    let radii = device_tensor(&input.radii)?;
    let client = WgpuRuntime::client(device);
    let cube_dim = CubeDim::new_1d(CUBE_DIM);
    let count = CubeCount::new_1d(div_ceil(nvox, CUBE_DIM));
    debug!("device forward: {natoms} atoms, {ntypes} channels, dim {dim}");

    unsafe {
        match &input.typing {
            AtomTyping::Index(types) => {
                let types = device_tensor(types)?;
                gpu::splat_indexed::launch_unchecked::<WgpuRuntime>(
                    &client,
                    count,
                    cube_dim,
                    ArrayArg::from_raw_parts::<f32>(&coords.handle, launch_len(natoms * 3), 1),
                    ArrayArg::from_raw_parts::<f32>(&types.handle, launch_len(natoms), 1),
                    ArrayArg::from_raw_parts::<f32>(&radii.handle, launch_len(natoms), 1),
                    ScalarArg::new(natoms as u32),
                    ScalarArg::new(ntypes as u32),
                    ScalarArg::new(dim as u32),
                    ScalarArg::new(maker.resolution),
                    ScalarArg::new(origin.x),
                    ScalarArg::new(origin.y),
                    ScalarArg::new(origin.z),
                    ScalarArg::new(maker.radius_scale),
                    ScalarArg::new(maker.gaussian_radius_multiple),
                    ScalarArg::new(maker.final_radius_multiple),
                    ScalarArg::new(maker.coefs.a),
                    ScalarArg::new(maker.coefs.b),
                    ScalarArg::new(maker.coefs.c),
                    ScalarArg::new(maker.binary as u32),
                    ArrayArg::from_raw_parts::<f32>(out_handle, launch_len(total), 1),
                );
            }
            AtomTyping::Vector(types) => {
                let types = device_tensor(types)?;
                gpu::splat_vector::launch_unchecked::<WgpuRuntime>(
                    &client,
                    count,
                    cube_dim,
                    ArrayArg::from_raw_parts::<f32>(&coords.handle, launch_len(natoms * 3), 1),
                    ArrayArg::from_raw_parts::<f32>(
                        &types.handle,
                        launch_len(natoms * ntypes),
                        1,
                    ),
                    ArrayArg::from_raw_parts::<f32>(&radii.handle, launch_len(natoms), 1),
                    ScalarArg::new(natoms as u32),
                    ScalarArg::new(ntypes as u32),
                    ScalarArg::new(dim as u32),
                    ScalarArg::new(maker.resolution),
                    ScalarArg::new(origin.x),
                    ScalarArg::new(origin.y),
                    ScalarArg::new(origin.z),
                    ScalarArg::new(maker.radius_scale),
                    ScalarArg::new(maker.gaussian_radius_multiple),
                    ScalarArg::new(maker.final_radius_multiple),
                    ScalarArg::new(maker.coefs.a),
                    ScalarArg::new(maker.coefs.b),
                    ScalarArg::new(maker.coefs.c),
                    ScalarArg::new(maker.binary as u32),
                    ArrayArg::from_raw_parts::<f32>(out_handle, launch_len(total), 1),
                );
            }
        }
    }
    Ok(())
}

/// Coordinate gradients on device for indexed typing.
pub(crate) fn backward_indexed_device(
    maker: &GridMaker,
    origin: Vec3,
    input: &CoordinateSet,
    type_index: &Tensor,
    device: &WgpuDevice,
    diff: &Tensor,
    atom_gradients: &mut Tensor,
) -> Result<(), GridError> {
    let natoms = input.len();
    let ntypes = input.num_types();
    let dim = maker.dim;
    let total = checked_grid_len(maker, ntypes)?;

    let coords = device_tensor(&input.coords)?;
    let radii = device_tensor(&input.radii)?;
    let types = device_tensor(type_index)?;
    let diff_dev = device_tensor(diff)?;
    let grads = device_tensor(atom_gradients)?;
    let client = WgpuRuntime::client(device);
    let cube_dim = CubeDim::new_1d(CUBE_DIM);
    let count = CubeCount::new_1d(div_ceil(launch_len(natoms) as u32, CUBE_DIM));
    debug!("device backward: {natoms} atoms, {ntypes} channels, dim {dim}");

    unsafe {
        gpu::atom_gradients_indexed::launch_unchecked::<WgpuRuntime>(
            &client,
            count,
            cube_dim,
            ArrayArg::from_raw_parts::<f32>(&coords.handle, launch_len(natoms * 3), 1),
            ArrayArg::from_raw_parts::<f32>(&types.handle, launch_len(natoms), 1),
            ArrayArg::from_raw_parts::<f32>(&radii.handle, launch_len(natoms), 1),
            ScalarArg::new(natoms as u32),
            ScalarArg::new(ntypes as u32),
            ScalarArg::new(dim as u32),
            ScalarArg::new(maker.resolution),
            ScalarArg::new(origin.x),
            ScalarArg::new(origin.y),
            ScalarArg::new(origin.z),
            ScalarArg::new(maker.radius_scale),
            ScalarArg::new(maker.gaussian_radius_multiple),
            ScalarArg::new(maker.final_radius_multiple),
            ScalarArg::new(maker.coefs.d),
            ScalarArg::new(maker.coefs.e),
            ArrayArg::from_raw_parts::<f32>(&diff_dev.handle, launch_len(total), 1),
            ArrayArg::from_raw_parts::<f32>(&grads.handle, launch_len(natoms * 3), 1),
        );
    }
    Ok(())
}

/// Coordinate and type-weight gradients on device for vector typing.
pub(crate) fn backward_vector_device(
    maker: &GridMaker,
    origin: Vec3,
    input: &CoordinateSet,
    type_vector: &Tensor,
    device: &WgpuDevice,
    diff: &Tensor,
    atom_gradients: &mut Tensor,
    type_gradients: &mut Tensor,
) -> Result<(), GridError> {
    let natoms = input.len();
    let ntypes = input.num_types();
    let dim = maker.dim;
    let total = checked_grid_len(maker, ntypes)?;

    let coords = device_tensor(&input.coords)?;
    let radii = device_tensor(&input.radii)?;
    let types = device_tensor(type_vector)?;
    let diff_dev = device_tensor(diff)?;
    let grads = device_tensor(atom_gradients)?;
    let tgrads = device_tensor(type_gradients)?;
    let client = WgpuRuntime::client(device);
    let cube_dim = CubeDim::new_1d(CUBE_DIM);
    let count = CubeCount::new_1d(div_ceil(launch_len(natoms) as u32, CUBE_DIM));

    unsafe {
        gpu::atom_type_gradients_vector::launch_unchecked::<WgpuRuntime>(
            &client,
            count,
            cube_dim,
            ArrayArg::from_raw_parts::<f32>(&coords.handle, launch_len(natoms * 3), 1),
            ArrayArg::from_raw_parts::<f32>(&types.handle, launch_len(natoms * ntypes), 1),
            ArrayArg::from_raw_parts::<f32>(&radii.handle, launch_len(natoms), 1),
            ScalarArg::new(natoms as u32),
            ScalarArg::new(ntypes as u32),
            ScalarArg::new(dim as u32),
            ScalarArg::new(maker.resolution),
            ScalarArg::new(origin.x),
            ScalarArg::new(origin.y),
            ScalarArg::new(origin.z),
            ScalarArg::new(maker.radius_scale),
            ScalarArg::new(maker.gaussian_radius_multiple),
            ScalarArg::new(maker.final_radius_multiple),
            ScalarArg::new(maker.coefs.a),
            ScalarArg::new(maker.coefs.b),
            ScalarArg::new(maker.coefs.c),
            ScalarArg::new(maker.coefs.d),
            ScalarArg::new(maker.coefs.e),
            ArrayArg::from_raw_parts::<f32>(&diff_dev.handle, launch_len(total), 1),
            ArrayArg::from_raw_parts::<f32>(&grads.handle, launch_len(natoms * 3), 1),
            ArrayArg::from_raw_parts::<f32>(&tgrads.handle, launch_len(natoms * ntypes), 1),
        );
    }
    Ok(())
}

/// Relevance redistribution on device for indexed typing.
pub(crate) fn relevance_device(
    maker: &GridMaker,
    origin: Vec3,
    input: &CoordinateSet,
    type_index: &Tensor,
    device: &WgpuDevice,
    density: &Tensor,
    diff: &Tensor,
    relevance: &mut Tensor,
) -> Result<(), GridError> {
    let natoms = input.len();
    let ntypes = input.num_types();
    let dim = maker.dim;
    let total = checked_grid_len(maker, ntypes)?;

    let coords = device_tensor(&input.coords)?;
    let radii = device_tensor(&input.radii)?;
    let types = device_tensor(type_index)?;
    let density_dev = device_tensor(density)?;
    let diff_dev = device_tensor(diff)?;
    let rel = device_tensor(relevance)?;
    let client = WgpuRuntime::client(device);
    let cube_dim = CubeDim::new_1d(CUBE_DIM);
    let count = CubeCount::new_1d(div_ceil(launch_len(natoms) as u32, CUBE_DIM));

    unsafe {
        gpu::atom_relevance::launch_unchecked::<WgpuRuntime>(
            &client,
            count,
            cube_dim,
            ArrayArg::from_raw_parts::<f32>(&coords.handle, launch_len(natoms * 3), 1),
            ArrayArg::from_raw_parts::<f32>(&types.handle, launch_len(natoms), 1),
            ArrayArg::from_raw_parts::<f32>(&radii.handle, launch_len(natoms), 1),
            ScalarArg::new(natoms as u32),
            ScalarArg::new(ntypes as u32),
            ScalarArg::new(dim as u32),
            ScalarArg::new(maker.resolution),
            ScalarArg::new(origin.x),
            ScalarArg::new(origin.y),
            ScalarArg::new(origin.z),
            ScalarArg::new(maker.radius_scale),
            ScalarArg::new(maker.gaussian_radius_multiple),
            ScalarArg::new(maker.final_radius_multiple),
            ScalarArg::new(maker.coefs.a),
            ScalarArg::new(maker.coefs.b),
            ScalarArg::new(maker.coefs.c),
            ArrayArg::from_raw_parts::<f32>(&density_dev.handle, launch_len(total), 1),
            ArrayArg::from_raw_parts::<f32>(&diff_dev.handle, launch_len(total), 1),
            ArrayArg::from_raw_parts::<f32>(&rel.handle, launch_len(natoms), 1),
        );
    }
    Ok(())
}
