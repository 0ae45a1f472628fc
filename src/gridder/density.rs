//! The piecewise atom density function and its derivatives.
//!
//! Density falls off as a Gaussian out to `gaussian_radius_multiple` times the
//! scaled atomic radius, then as a quadratic tail that reaches zero with zero
//! slope at `final_radius_multiple` times the scaled radius. The tail
//! coefficients depend only on the Gaussian multiple and are cached on the
//! [`GridMaker`] whenever the configuration changes.

use super::grid_maker::GridMaker;
use crate::math::Vec3;

/// Configuration-derived constants for the quadratic tail.
///
/// `a`, `b`, `c` evaluate the tail in units of distance over scaled radius;
/// `d`, `e` evaluate its slope in the same units. All are functions of the
/// Gaussian radius multiple alone.
#[derive(Debug, Copy, Clone, Default)]
pub(crate) struct TailCoefficients {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub final_radius_multiple: f32,
}

impl TailCoefficients {
    /// Derive the tail for Gaussian multiple `g`.
    ///
    /// The tail matches the Gaussian's value and slope at `g` and touches
    /// zero tangentially at `(1 + 2g^2) / (2g)`.
    pub(crate) fn for_multiple(g: f32) -> Self {
        let eg = (-2.0 * g * g).exp();
        let a = 4.0 * g * g * eg;
        let b = -(8.0 * g * g * g + 4.0 * g) * eg;
        let c = (4.0 * g * g * g * g + 4.0 * g * g + 1.0) * eg;
        Self {
            a,
            b,
            c,
            d: 2.0 * a,
            e: b,
            final_radius_multiple: (1.0 + 2.0 * g * g) / (2.0 * g),
        }
    }
}

/// Clamp a density value to binary occupancy.
pub(crate) fn binary_density(val: f32) -> f32 {
    if val >= 0.5 {
        1.0
    } else {
        0.0
    }
}

impl GridMaker {
    /// Radius beyond which the atom's density is identically zero.
    pub(crate) fn density_radius(&self, radius: f32) -> f32 {
        radius * self.radius_scale * self.final_radius_multiple
    }

    /// Atom density at a grid point for an atom of base radius `radius`.
    pub(crate) fn calc_point(&self, atom: Vec3, radius: f32, grid_pt: Vec3) -> f32 {
        let ar = radius * self.radius_scale;
        let dist_sq = (grid_pt - atom).length_squared();
        let dist = dist_sq.sqrt();
        if dist >= ar * self.final_radius_multiple {
            0.0
        } else if dist <= ar * self.gaussian_radius_multiple {
            (-2.0 * dist_sq / (ar * ar)).exp()
        } else {
            let dr = dist / ar;
            // The tangent construction can round to a tiny negative value.
            (self.coefs.a * dr * dr + self.coefs.b * dr + self.coefs.c).max(0.0)
        }
    }

    /// Accumulate one grid point's contribution to an atom's coordinate
    /// gradient: `grid_val` times the density's Cartesian derivative at the
    /// point. The derivative at zero distance is the smooth-maximum limit 0.
    pub(crate) fn accumulate_atom_gradient(
        &self,
        atom: Vec3,
        radius: f32,
        grid_pt: Vec3,
        grid_val: f32,
        agrad: &mut Vec3,
    ) {
        let ar = radius * self.radius_scale;
        let delta = grid_pt - atom;
        let dist_sq = delta.length_squared();
        let dist = dist_sq.sqrt();
        if dist >= ar * self.final_radius_multiple || dist == 0.0 {
            return;
        }
        let d_dist = if dist <= ar * self.gaussian_radius_multiple {
            (-4.0 * dist / (ar * ar)) * (-2.0 * dist_sq / (ar * ar)).exp()
        } else {
            (self.coefs.d * (dist / ar) + self.coefs.e) / ar
        };
        // d f / d atom = (df/dd) * (atom - grid) / dist; delta points grid-ward.
        *agrad += delta * (-grid_val * d_dist / dist);
    }
}
