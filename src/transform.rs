//! Rigid-body coordinate transforms and the deterministic RNG that seeds
//! random augmentation.

use crate::atoms::CoordinateSet;
use crate::gridder::GridError;
use crate::math::{Quaternion, Vec3};
use crate::tensor::Tensor;

/// PCG32 default multiplier.
const PCG_MULT: u64 = 6364136223846793005;
/// PCG32 default increment base.
const PCG_INIT: u64 = 0x853c49e6748fea9b;

const TAU: f32 = core::f32::consts::TAU;

/// Small PCG32 RNG for deterministic augmentation draws.
pub struct Pcg32 {
    state: u64,
    inc: u64,
}

impl Pcg32 {
    /// Create a new RNG stream from a stream index and global seed.
    pub fn new(idx: u64, seed: u64) -> Self {
        let mut rng = Self {
            state: 0,
            inc: ((idx + 1) << 1) | 1,
        };
        rng.next_u32();
        rng.state = rng.state.wrapping_add(PCG_INIT.wrapping_add(seed));
        rng.next_u32();
        rng
    }

    /// Generate the next 32-bit random value.
    pub fn next_u32(&mut self) -> u32 {
        let old = self.state;
        self.state = old.wrapping_mul(PCG_MULT).wrapping_add(self.inc | 1);
        let xorshifted = (((old >> 18) ^ old) >> 27) as u32;
        let rot = (old >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    /// Generate a uniform float in the half-open interval [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        let u = self.next_u32();
        let bits = (u >> 9) | 0x3f800000;
        f32::from_bits(bits) - 1.0
    }

    /// Generate a uniform float in [-max, max].
    pub fn next_f32_signed(&mut self, max: f32) -> f32 {
        (self.next_f32() * 2.0 - 1.0) * max
    }

    /// Generate a uniformly distributed unit quaternion (Shoemake's method).
    pub fn next_rotation(&mut self) -> Quaternion {
        let u1 = self.next_f32();
        let u2 = self.next_f32();
        let u3 = self.next_f32();
        let s1 = (1.0 - u1).sqrt();
        let s2 = u1.sqrt();
        let (sin2, cos2) = (TAU * u2).sin_cos();
        let (sin3, cos3) = (TAU * u3).sin_cos();
        Quaternion::new(s1 * sin2, s1 * cos2, s2 * sin3, s2 * cos3).normalized()
    }
}

/// Rigid-body transform: rotation about a center followed by a translation.
#[derive(Debug, Copy, Clone)]
pub struct Transform {
    rotation: Quaternion,
    center: Vec3,
    translation: Vec3,
}

impl Transform {
    /// Transform rotating by `rotation` about `center`, then translating.
    pub fn new(center: Vec3, translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            rotation,
            center,
            translation,
        }
    }

    /// Identity transform about the given center.
    pub fn identity(center: Vec3) -> Self {
        Self::new(center, Vec3::ZERO, Quaternion::IDENTITY)
    }

    /// Random augmentation transform: uniform translation in
    /// `[-max_translation, max_translation]` per axis and, optionally, a
    /// uniform random rotation.
    pub fn random(
        center: Vec3,
        max_translation: f32,
        random_rotation: bool,
        rng: &mut Pcg32,
    ) -> Self {
        let translation = Vec3::new(
            rng.next_f32_signed(max_translation),
            rng.next_f32_signed(max_translation),
            rng.next_f32_signed(max_translation),
        );
        let rotation = if random_rotation {
            rng.next_rotation()
        } else {
            Quaternion::IDENTITY
        };
        Self::new(center, translation, rotation)
    }

    /// Center of rotation; convenience forwards use this as the grid center.
    pub fn center(&self) -> Vec3 {
        self.center
    }

    /// Translation component.
    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    /// Rotation component.
    pub fn rotation(&self) -> Quaternion {
        self.rotation
    }

    /// Apply the transform to a single point.
    pub fn apply(&self, pt: Vec3) -> Vec3 {
        self.rotation.rotate(pt - self.center) + self.center + self.translation
    }

    /// Transformed copy of a coordinate set; requires host coordinates.
    pub fn forward(&self, input: &CoordinateSet) -> Result<CoordinateSet, GridError> {
        let mut out = input.clone();
        self.forward_in_place(&mut out)?;
        Ok(out)
    }

    /// Transform a coordinate set's positions in place.
    pub fn forward_in_place(&self, set: &mut CoordinateSet) -> Result<(), GridError> {
        let coords = set.coords.host_mut().ok_or(GridError::StorageMismatch(
            "transform requires host-resident coordinates",
        ))?;
        for atom in coords.chunks_exact_mut(3) {
            let p = self.apply(Vec3::new(atom[0], atom[1], atom[2]));
            atom[0] = p.x;
            atom[1] = p.y;
            atom[2] = p.z;
        }
        Ok(())
    }

    /// Map gradients (or points, with `translate`) back through the inverse
    /// transform, so gradients computed on transformed coordinates apply to
    /// the originals.
    pub fn backward(&self, gradients: &mut Tensor, translate: bool) -> Result<(), GridError> {
        if gradients.shape().len() != 2 || gradients.shape()[1] != 3 {
            return Err(GridError::ShapeMismatch("gradients must have shape [N, 3]"));
        }
        let data = gradients.host_mut().ok_or(GridError::StorageMismatch(
            "transform backward requires host-resident gradients",
        ))?;
        let inverse = self.rotation.conjugate();
        for row in data.chunks_exact_mut(3) {
            let v = Vec3::new(row[0], row[1], row[2]);
            let v = if translate {
                inverse.rotate(v - self.translation - self.center) + self.center
            } else {
                inverse.rotate(v)
            };
            row[0] = v.x;
            row[1] = v.y;
            row[2] = v.z;
        }
        Ok(())
    }
}
