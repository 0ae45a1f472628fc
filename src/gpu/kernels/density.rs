//! Shared device math: the piecewise density function, its Cartesian
//! gradient, and per-axis support bounds.

use cubecl::prelude::*;

#[cube]
pub(super) fn min_f32(a: f32, b: f32) -> f32 {
    if a < b {
        a
    } else {
        b
    }
}

#[cube]
pub(super) fn max_f32(a: f32, b: f32) -> f32 {
    if a > b {
        a
    } else {
        b
    }
}

/// Piecewise atom density at a grid point; `ar` is the scaled atomic radius.
#[cube]
pub(super) fn atom_density(
    ax: f32,
    ay: f32,
    az: f32,
    ar: f32,
    x: f32,
    y: f32,
    z: f32,
    gaussian_radius_multiple: f32,
    final_radius_multiple: f32,
    coef_a: f32,
    coef_b: f32,
    coef_c: f32,
) -> f32 {
    let dx = x - ax;
    let dy = y - ay;
    let dz = z - az;
    let dist_sq = dx * dx + dy * dy + dz * dz;
    let dist = dist_sq.sqrt();
    let zero = f32::new(0.0);
    if dist >= ar * final_radius_multiple {
        zero
    } else if dist <= ar * gaussian_radius_multiple {
        (-f32::new(2.0) * dist_sq / (ar * ar)).exp()
    } else {
        let dr = dist / ar;
        max_f32(coef_a * dr * dr + coef_b * dr + coef_c, zero)
    }
}

/// Cartesian derivative of the density with respect to the atom position,
/// packed as (d/dax, d/day, d/daz). Zero at the atom center and outside the
/// density support.
#[cube]
pub(super) fn atom_density_gradient(
    ax: f32,
    ay: f32,
    az: f32,
    ar: f32,
    x: f32,
    y: f32,
    z: f32,
    gaussian_radius_multiple: f32,
    final_radius_multiple: f32,
    coef_d: f32,
    coef_e: f32,
) -> Line<f32> {
    let mut out = Line::empty(3usize);
    let zero = f32::new(0.0);
    out[0] = zero;
    out[1] = zero;
    out[2] = zero;
    let dx = x - ax;
    let dy = y - ay;
    let dz = z - az;
    let dist_sq = dx * dx + dy * dy + dz * dz;
    let dist = dist_sq.sqrt();
    if dist < ar * final_radius_multiple && dist > zero {
        let d_dist = if dist <= ar * gaussian_radius_multiple {
            (-f32::new(4.0) * dist / (ar * ar)) * (-f32::new(2.0) * dist_sq / (ar * ar)).exp()
        } else {
            (coef_d * (dist / ar) + coef_e) / ar
        };
        let scale = -d_dist / dist;
        out[0] = dx * scale;
        out[1] = dy * scale;
        out[2] = dz * scale;
    }
    out
}

/// Inclusive voxel bounds of an atom's support on one axis, packed as
/// (lo, hi, valid).
#[cube]
pub(super) fn density_bounds_1d(
    origin: f32,
    coord: f32,
    density_radius: f32,
    resolution: f32,
    dim: u32,
) -> Line<u32> {
    let mut out = Line::empty(3usize);
    let lo_f = ((coord - density_radius - origin) / resolution).ceil();
    let hi_f = ((coord + density_radius - origin) / resolution).floor();
    let lo = max_f32(lo_f, f32::new(0.0));
    let hi = min_f32(hi_f, f32::cast_from(dim - u32::new(1)));
    if hi < lo {
        out[0] = u32::new(0);
        out[1] = u32::new(0);
        out[2] = u32::new(0);
    } else {
        out[0] = lo as u32;
        out[1] = hi as u32;
        out[2] = u32::new(1);
    }
    out
}
