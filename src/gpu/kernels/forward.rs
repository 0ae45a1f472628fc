//! Voxel-parallel density accumulation kernels.
//!
//! One invocation owns one spatial voxel across every channel, so no write
//! ever races and no atomics are needed; each invocation zeroes its own
//! cells before looping over the atoms.

use super::density::*;
use cubecl::prelude::*;

/// Indexed-type density accumulation over a `ntypes * dim^3` grid.
#[cube(launch_unchecked)]
pub(crate) fn splat_indexed(
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
    binary: u32,
    out: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    let nvox = dim * dim * dim;
    if idx >= nvox as usize {
        terminate!();
    }
    let idx_u = idx as u32;
    let k = idx_u % dim;
    let j = (idx_u / dim) % dim;
    let i = idx_u / (dim * dim);
    let x = origin_x + f32::cast_from(i) * resolution;
    let y = origin_y + f32::cast_from(j) * resolution;
    let z = origin_z + f32::cast_from(k) * resolution;

    let zero = f32::new(0.0);
    for t in 0..ntypes {
        out[(t * nvox + idx_u) as usize] = zero;
    }

    for n in 0..natoms {
        let ti = type_index[n as usize];
        if ti >= zero && ti < f32::cast_from(ntypes) {
            let base = (n * 3) as usize;
            let ax = coords[base];
            let ay = coords[base + 1];
            let az = coords[base + 2];
            let ar = radii[n as usize] * radius_scale;
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
            let o = ((ti as u32) * nvox + idx_u) as usize;
            if binary != 0 {
                if val >= f32::new(0.5) {
                    out[o] = f32::new(1.0);
                }
            } else {
                out[o] = out[o] + val;
            }
        }
    }
}

/// Vector-type density accumulation; the density is evaluated once per atom
/// and fanned out over the channels with its per-channel weights.
#[cube(launch_unchecked)]
pub(crate) fn splat_vector(
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
    binary: u32,
    out: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    let nvox = dim * dim * dim;
    if idx >= nvox as usize {
        terminate!();
    }
    let idx_u = idx as u32;
    let k = idx_u % dim;
    let j = (idx_u / dim) % dim;
    let i = idx_u / (dim * dim);
    let x = origin_x + f32::cast_from(i) * resolution;
    let y = origin_y + f32::cast_from(j) * resolution;
    let z = origin_z + f32::cast_from(k) * resolution;

    let zero = f32::new(0.0);
    for t in 0..ntypes {
        out[(t * nvox + idx_u) as usize] = zero;
    }

    for n in 0..natoms {
        let base = (n * 3) as usize;
        let ax = coords[base];
        let ay = coords[base + 1];
        let az = coords[base + 2];
        let ar = radii[n as usize] * radius_scale;
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
        if val != zero {
            for t in 0..ntypes {
                let w = type_vector[(n * ntypes + t) as usize];
                if w != zero {
                    let o = (t * nvox + idx_u) as usize;
                    let wv = w * val;
                    if binary != 0 {
                        if wv >= f32::new(0.5) {
                            out[o] = f32::new(1.0);
                        }
                    } else {
                        out[o] = out[o] + wv;
                    }
                }
            }
        }
    }
}
