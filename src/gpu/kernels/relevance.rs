//! Atom-parallel relevance redistribution kernel.

use super::density::*;
use cubecl::prelude::*;

/// Share each voxel's relevance among contributing atoms in proportion to
/// their forward density contributions. Indexed typing only; `relevance` is
/// one value per atom.
#[cube(launch_unchecked)]
pub(crate) fn atom_relevance(
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
    coef_a: f32,
    coef_b: f32,
    coef_c: f32,
    density: &Array<f32>,
    diff: &Array<f32>,
    relevance: &mut Array<f32>,
) {
    let n = ABSOLUTE_POS;
    if n >= natoms as usize {
        terminate!();
    }
    let zero = f32::new(0.0);
    relevance[n] = zero;

    let ti = type_index[n];
    if ti < zero || ti >= f32::cast_from(ntypes) {
        terminate!();
    }

    let row = n * 3;
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
    let mut sum = zero;
    for i in xlo..xhi + 1 {
        let x = origin_x + f32::cast_from(i) * resolution;
        for j in ylo..yhi + 1 {
            let y = origin_y + f32::cast_from(j) * resolution;
            for k in zlo..zhi + 1 {
                let z = origin_z + f32::cast_from(k) * resolution;
                let vox = (channel + (i * dim + j) * dim + k) as usize;
                let total = density[vox];
                if total > zero {
                    let own = atom_density(
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
                    sum += diff[vox] * own / total;
                }
            }
        }
    }
    relevance[n] = sum;
}
