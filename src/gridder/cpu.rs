//! Serial host reference implementation of the rasterizer operations.
//!
//! These loops are the semantic ground truth; the device kernels must agree
//! with them within floating-point summation tolerance. Cost per atom scales
//! with the atom's local density support, not with the grid volume.

use super::bounds::bounds_1d;
use super::density::binary_density;
use super::grid_maker::GridMaker;
use crate::math::Vec3;

fn atom_position(coords: &[f32], n: usize) -> Vec3 {
    Vec3::new(coords[3 * n], coords[3 * n + 1], coords[3 * n + 2])
}

/// Inclusive per-axis voxel bounds for one atom, or `None` when the atom's
/// support misses the grid.
fn atom_bounds(
    maker: &GridMaker,
    origin: Vec3,
    atom: Vec3,
    radius: f32,
) -> Option<[(usize, usize); 3]> {
    let dr = maker.density_radius(radius);
    let res = maker.resolution;
    let dim = maker.dim;
    let x = bounds_1d(origin.x, atom.x, dr, res, dim)?;
    let y = bounds_1d(origin.y, atom.y, dr, res, dim)?;
    let z = bounds_1d(origin.z, atom.z, dr, res, dim)?;
    Some([x, y, z])
}

/// Accumulate indexed-type densities into `out` (`T x dim^3`, zeroed here).
pub(crate) fn forward_indexed(
    maker: &GridMaker,
    origin: Vec3,
    coords: &[f32],
    type_index: &[f32],
    radii: &[f32],
    ntypes: usize,
    out: &mut [f32],
) {
    out.fill(0.0);
    let dim = maker.dim;
    let nvox = dim * dim * dim;
    for n in 0..radii.len() {
        let t = type_index[n];
        if t < 0.0 || t >= ntypes as f32 {
            continue;
        }
        let channel = &mut out[t as usize * nvox..(t as usize + 1) * nvox];
        let atom = atom_position(coords, n);
        let radius = radii[n];
        let Some([bx, by, bz]) = atom_bounds(maker, origin, atom, radius) else {
            continue;
        };
        splat_atom(maker, origin, atom, radius, [bx, by, bz], 1.0, channel);
    }
}

/// Accumulate vector-type densities into `out` (`T x dim^3`, zeroed here).
pub(crate) fn forward_vector(
    maker: &GridMaker,
    origin: Vec3,
    coords: &[f32],
    type_vector: &[f32],
    radii: &[f32],
    ntypes: usize,
    out: &mut [f32],
) {
    out.fill(0.0);
    let dim = maker.dim;
    let nvox = dim * dim * dim;
    for n in 0..radii.len() {
        let atom = atom_position(coords, n);
        let radius = radii[n];
        let Some([bx, by, bz]) = atom_bounds(maker, origin, atom, radius) else {
            continue;
        };
        let weights = &type_vector[n * ntypes..(n + 1) * ntypes];
        for (t, &w) in weights.iter().enumerate() {
            if w == 0.0 {
                continue;
            }
            let channel = &mut out[t * nvox..(t + 1) * nvox];
            splat_atom(maker, origin, atom, radius, [bx, by, bz], w, channel);
        }
    }
}

/// Write one atom's weighted density into a single channel slab.
fn splat_atom(
    maker: &GridMaker,
    origin: Vec3,
    atom: Vec3,
    radius: f32,
    bounds: [(usize, usize); 3],
    weight: f32,
    channel: &mut [f32],
) {
    let dim = maker.dim;
    let res = maker.resolution;
    let [(xlo, xhi), (ylo, yhi), (zlo, zhi)] = bounds;
    for i in xlo..=xhi {
        let x = origin.x + i as f32 * res;
        for j in ylo..=yhi {
            let y = origin.y + j as f32 * res;
            for k in zlo..=zhi {
                let z = origin.z + k as f32 * res;
                let val = weight * maker.calc_point(atom, radius, Vec3::new(x, y, z));
                let cell = &mut channel[(i * dim + j) * dim + k];
                if maker.binary {
                    *cell = cell.max(binary_density(val));
                } else {
                    *cell += val;
                }
            }
        }
    }
}

/// Per-atom coordinate gradients for indexed typing. `atom_gradients` is
/// `N x 3` and is overwritten.
pub(crate) fn backward_indexed(
    maker: &GridMaker,
    origin: Vec3,
    coords: &[f32],
    type_index: &[f32],
    radii: &[f32],
    ntypes: usize,
    diff: &[f32],
    atom_gradients: &mut [f32],
) {
    atom_gradients.fill(0.0);
    let dim = maker.dim;
    let res = maker.resolution;
    let nvox = dim * dim * dim;
    for n in 0..radii.len() {
        let t = type_index[n];
        if t < 0.0 || t >= ntypes as f32 {
            continue;
        }
        let channel = &diff[t as usize * nvox..(t as usize + 1) * nvox];
        let atom = atom_position(coords, n);
        let radius = radii[n];
        let Some([(xlo, xhi), (ylo, yhi), (zlo, zhi)]) =
            atom_bounds(maker, origin, atom, radius)
        else {
            continue;
        };
        let mut agrad = Vec3::ZERO;
        for i in xlo..=xhi {
            let x = origin.x + i as f32 * res;
            for j in ylo..=yhi {
                let y = origin.y + j as f32 * res;
                for k in zlo..=zhi {
                    let z = origin.z + k as f32 * res;
                    let grid_val = channel[(i * dim + j) * dim + k];
                    if grid_val != 0.0 {
                        maker.accumulate_atom_gradient(
                            atom,
                            radius,
                            Vec3::new(x, y, z),
                            grid_val,
                            &mut agrad,
                        );
                    }
                }
            }
        }
        atom_gradients[3 * n] = agrad.x;
        atom_gradients[3 * n + 1] = agrad.y;
        atom_gradients[3 * n + 2] = agrad.z;
    }
}

/// Per-atom coordinate and type-weight gradients for vector typing.
/// `atom_gradients` is `N x 3`, `type_gradients` is `N x T`; both overwritten.
pub(crate) fn backward_vector(
    maker: &GridMaker,
    origin: Vec3,
    coords: &[f32],
    type_vector: &[f32],
    radii: &[f32],
    ntypes: usize,
    diff: &[f32],
    atom_gradients: &mut [f32],
    type_gradients: &mut [f32],
) {
    atom_gradients.fill(0.0);
    type_gradients.fill(0.0);
    let dim = maker.dim;
    let res = maker.resolution;
    let nvox = dim * dim * dim;
    for n in 0..radii.len() {
        let atom = atom_position(coords, n);
        let radius = radii[n];
        let Some([(xlo, xhi), (ylo, yhi), (zlo, zhi)]) =
            atom_bounds(maker, origin, atom, radius)
        else {
            continue;
        };
        let weights = &type_vector[n * ntypes..(n + 1) * ntypes];
        let tgrads = &mut type_gradients[n * ntypes..(n + 1) * ntypes];
        let mut agrad = Vec3::ZERO;
        for i in xlo..=xhi {
            let x = origin.x + i as f32 * res;
            for j in ylo..=yhi {
                let y = origin.y + j as f32 * res;
                for k in zlo..=zhi {
                    let z = origin.z + k as f32 * res;
                    let pt = Vec3::new(x, y, z);
                    let val = maker.calc_point(atom, radius, pt);
                    let vox = (i * dim + j) * dim + k;
                    // Fold all channels into one upstream value for the
                    // coordinate gradient; the type gradient is per channel.
                    let mut combined = 0.0;
                    for t in 0..ntypes {
                        let g = diff[t * nvox + vox];
                        if g != 0.0 {
                            tgrads[t] += g * val;
                            combined += g * weights[t];
                        }
                    }
                    if combined != 0.0 {
                        maker.accumulate_atom_gradient(atom, radius, pt, combined, &mut agrad);
                    }
                }
            }
        }
        atom_gradients[3 * n] = agrad.x;
        atom_gradients[3 * n + 1] = agrad.y;
        atom_gradients[3 * n + 2] = agrad.z;
    }
}

/// Redistribute a relevance grid onto atoms in proportion to each atom's
/// share of the forward density. Indexed typing only; `relevance` is `N`.
pub(crate) fn backward_relevance(
    maker: &GridMaker,
    origin: Vec3,
    coords: &[f32],
    type_index: &[f32],
    radii: &[f32],
    ntypes: usize,
    density: &[f32],
    diff: &[f32],
    relevance: &mut [f32],
) {
    relevance.fill(0.0);
    let dim = maker.dim;
    let res = maker.resolution;
    let nvox = dim * dim * dim;
    for n in 0..radii.len() {
        let t = type_index[n];
        if t < 0.0 || t >= ntypes as f32 {
            continue;
        }
        let channel_base = t as usize * nvox;
        let atom = atom_position(coords, n);
        let radius = radii[n];
        let Some([(xlo, xhi), (ylo, yhi), (zlo, zhi)]) =
            atom_bounds(maker, origin, atom, radius)
        else {
            continue;
        };
        let mut sum = 0.0;
        for i in xlo..=xhi {
            let x = origin.x + i as f32 * res;
            for j in ylo..=yhi {
                let y = origin.y + j as f32 * res;
                for k in zlo..=zhi {
                    let z = origin.z + k as f32 * res;
                    let vox = channel_base + (i * dim + j) * dim + k;
                    let total = density[vox];
                    if total > 0.0 {
                        let own = maker.calc_point(atom, radius, Vec3::new(x, y, z));
                        sum += diff[vox] * own / total;
                    }
                }
            }
        }
        relevance[n] = sum;
    }
}
