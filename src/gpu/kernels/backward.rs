//! Atom-parallel gradient kernels.
//!
//! One invocation owns one atom and therefore one row of each output tensor;
//! rows are zeroed up front so skipped atoms still produce defined output.

use super::density::*;
use cubecl::prelude::*;

/// Coordinate gradients for indexed typing; `atom_gradients` is `natoms x 3`.
#[cube(launch_unchecked)]
pub(crate) fn atom_gradients_indexed(
    coords: &Array<f32>,
    type_index: &Array<f32>,
    radii: &Array<f32>,
    natoms: u32,
    ntypes: u32,
    dim: u32,
    resolution: f32,
    origin_x: f32,
    origin_y: f32,
    origin_z: f32,
    radius_scale: f32,
    gaussian_radius_multiple: f32,
    final_radius_multiple: f32,
    coef_d: f32,
    coef_e: f32,
    diff: &Array<f32>,
    atom_gradients: &mut Array<f32>,
) {
    let n = ABSOLUTE_POS;
    if n >= natoms as usize {
        terminate!();
    }
    let zero = f32::new(0.0);
    let row = n * 3;
    atom_gradients[row] = zero;
    atom_gradients[row + 1] = zero;
    atom_gradients[row + 2] = zero;

    let ti = type_index[n];
    if ti < zero || ti >= f32::cast_from(ntypes) {
        terminate!();
    }

    let ax = coords[row];
    let ay = coords[row + 1];
    let az = coords[row + 2];
    let ar = radii[n] * radius_scale;
    let density_radius = ar * final_radius_multiple;
    let bx = density_bounds_1d(origin_x, ax, density_radius, resolution, dim);
    let by = density_bounds_1d(origin_y, ay, density_radius, resolution, dim);
    let bz = density_bounds_1d(origin_z, az, density_radius, resolution, dim);
    if bx[2] == u32::new(0) || by[2] == u32::new(0) || bz[2] == u32::new(0) {
        terminate!();
    }
    let xlo = bx[0];
    let xhi = bx[1];
    let ylo = by[0];
    let yhi = by[1];
    let zlo = bz[0];
    let zhi = bz[1];

    let nvox = dim * dim * dim;
    let channel = (ti as u32) * nvox;
    let mut gx = zero;
    let mut gy = zero;
    let mut gz = zero;
    for i in xlo..xhi + 1 {
        let x = origin_x + f32::cast_from(i) * resolution;
        for j in ylo..yhi + 1 {
            let y = origin_y + f32::cast_from(j) * resolution;
            for k in zlo..zhi + 1 {
                let z = origin_z + f32::cast_from(k) * resolution;
                let grid_val = diff[(channel + (i * dim + j) * dim + k) as usize];
                if grid_val != zero {
                    let g = atom_density_gradient(
                        ax,
                        ay,
                        az,
                        ar,
                        x,
                        y,
                        z,
                        gaussian_radius_multiple,
                        final_radius_multiple,
                        coef_d,
                        coef_e,
                    );
                    gx += grid_val * g[0];
                    gy += grid_val * g[1];
                    gz += grid_val * g[2];
                }
            }
        }
    }
    atom_gradients[row] = gx;
    atom_gradients[row + 1] = gy;
    atom_gradients[row + 2] = gz;
}

/// Coordinate and type-weight gradients for vector typing;
/// `atom_gradients` is `natoms x 3`, `type_gradients` is `natoms x ntypes`.
#[cube(launch_unchecked)]
pub(crate) fn atom_type_gradients_vector(
    coords: &Array<f32>,
    type_vector: &Array<f32>,
    radii: &Array<f32>,
    natoms: u32,
    ntypes: u32,
    dim: u32,
    resolution: f32,
    origin_x: f32,
    origin_y: f32,
    origin_z: f32,
    radius_scale: f32,
    gaussian_radius_multiple: f32,
    final_radius_multiple: f32,
    coef_a: f32,
    coef_b: f32,
    coef_c: f32,
    coef_d: f32,
    coef_e: f32,
    diff: &Array<f32>,
    atom_gradients: &mut Array<f32>,
    type_gradients: &mut Array<f32>,
) {
    let n = ABSOLUTE_POS;
    if n >= natoms as usize {
        terminate!();
    }
    let zero = f32::new(0.0);
    let row = n * 3;
    atom_gradients[row] = zero;
    atom_gradients[row + 1] = zero;
    atom_gradients[row + 2] = zero;
    let n_u = n as u32;
    for t in 0..ntypes {
        type_gradients[(n_u * ntypes + t) as usize] = zero;
    }

    let ax = coords[row];
    let ay = coords[row + 1];
    let az = coords[row + 2];
    let ar = radii[n] * radius_scale;
    let density_radius = ar * final_radius_multiple;
    let bx = density_bounds_1d(origin_x, ax, density_radius, resolution, dim);
    let by = density_bounds_1d(origin_y, ay, density_radius, resolution, dim);
    let bz = density_bounds_1d(origin_z, az, density_radius, resolution, dim);
    if bx[2] == u32::new(0) || by[2] == u32::new(0) || bz[2] == u32::new(0) {
        terminate!();
    }
    let xlo = bx[0];
    let xhi = bx[1];
    let ylo = by[0];
    let yhi = by[1];
    let zlo = bz[0];
    let zhi = bz[1];

    let nvox = dim * dim * dim;
    let mut gx = zero;
    let mut gy = zero;
    let mut gz = zero;
    for i in xlo..xhi + 1 {
        let x = origin_x + f32::cast_from(i) * resolution;
        for j in ylo..yhi + 1 {
            let y = origin_y + f32::cast_from(j) * resolution;
            for k in zlo..zhi + 1 {
                let z = origin_z + f32::cast_from(k) * resolution;
                let vox = (i * dim + j) * dim + k;
                let val = atom_density(
                    ax,
                    ay,
                    az,
                    ar,
                    x,
                    y,
                    z,
                    gaussian_radius_multiple,
                    final_radius_multiple,
                    coef_a,
                    coef_b,
                    coef_c,
                );
                let g = atom_density_gradient(
                    ax,
                    ay,
                    az,
                    ar,
                    x,
                    y,
                    z,
                    gaussian_radius_multiple,
                    final_radius_multiple,
                    coef_d,
                    coef_e,
                );
                // Fold every channel's upstream value into one weight for the
                // coordinate gradient; type gradients stay per channel.
                let mut combined = zero;
                for t in 0..ntypes {
                    let gv = diff[(t * nvox + vox) as usize];
                    if gv != zero {
                        let to = (n_u * ntypes + t) as usize;
                        type_gradients[to] = type_gradients[to] + gv * val;
                        combined += gv * type_vector[(n_u * ntypes + t) as usize];
                    }
                }
                gx += combined * g[0];
                gy += combined * g[1];
                gz += combined * g[2];
            }
        }
    }
    atom_gradients[row] = gx;
    atom_gradients[row + 1] = gy;
    atom_gradients[row + 2] = gz;
}
