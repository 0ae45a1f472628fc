//! Per-axis bounding of an atom's density support.

/// Inclusive voxel-index interval on one axis that can receive nonzero
/// density from an atom at `coord` whose density reaches `density_radius`.
/// Returns `None` when the support misses the grid entirely on this axis.
pub(crate) fn bounds_1d(
    grid_origin: f32,
    coord: f32,
    density_radius: f32,
    resolution: f32,
    dim: usize,
) -> Option<(usize, usize)> {
    let lo = ((coord - density_radius - grid_origin) / resolution).ceil();
    let hi = ((coord + density_radius - grid_origin) / resolution).floor();
    let lo = lo.max(0.0);
    let hi = hi.min((dim - 1) as f32);
    if hi < lo {
        return None;
    }
    Some((lo as usize, hi as usize))
}
