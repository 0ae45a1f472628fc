//! Atom containers consumed by the rasterizer.
//!
//! A [`CoordinateSet`] bundles positions, radii, and one of two typing
//! representations: a single channel index per atom, or a dense weight vector
//! over all channels. Operations dispatch on the typing tag.

use cubecl::wgpu::WgpuDevice;

use crate::gridder::GridError;
use crate::math::Vec3;
use crate::tensor::Tensor;

/// Typing representation for a coordinate set.
#[derive(Debug, Clone)]
pub enum AtomTyping {
    /// One channel id per atom, stored as float; negative values and values
    /// at or above the channel count contribute nowhere.
    Index(Tensor),
    /// One weight per atom per channel (`N x T`).
    Vector(Tensor),
}

/// Atom positions, typing, and radii for one structure.
#[derive(Debug, Clone)]
pub struct CoordinateSet {
    /// Atom positions in Angstroms (`N x 3`).
    pub coords: Tensor,
    /// Channel assignment, indexed or vector form.
    pub typing: AtomTyping,
    /// Base van der Waals-style radii in Angstroms (`N`).
    pub radii: Tensor,
    num_types: usize,
}

impl CoordinateSet {
    /// Coordinate set with indexed typing over `num_types` channels.
    pub fn indexed(
        coords: Tensor,
        type_index: Tensor,
        radii: Tensor,
        num_types: usize,
    ) -> Result<Self, GridError> {
        let n = check_coords_radii(&coords, &radii)?;
        if type_index.shape() != [n] {
            return Err(GridError::ShapeMismatch("type_index must have shape [N]"));
        }
        check_same_storage(&[&coords, &type_index, &radii])?;
        Ok(Self {
            coords,
            typing: AtomTyping::Index(type_index),
            radii,
            num_types,
        })
    }

    /// Coordinate set with vector typing; the channel count is taken from the
    /// second dimension of `type_vector`.
    pub fn vector(coords: Tensor, type_vector: Tensor, radii: Tensor) -> Result<Self, GridError> {
        let n = check_coords_radii(&coords, &radii)?;
        if type_vector.shape().len() != 2 || type_vector.shape()[0] != n {
            return Err(GridError::ShapeMismatch("type_vector must have shape [N, T]"));
        }
        check_same_storage(&[&coords, &type_vector, &radii])?;
        let num_types = type_vector.shape()[1];
        Ok(Self {
            coords,
            typing: AtomTyping::Vector(type_vector),
            radii,
            num_types,
        })
    }

    /// Number of atoms.
    pub fn len(&self) -> usize {
        self.coords.shape()[0]
    }

    /// Whether the set holds no atoms.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of output channels.
    pub fn num_types(&self) -> usize {
        self.num_types
    }

    /// Whether typing is the indexed representation.
    pub fn has_indexed_types(&self) -> bool {
        matches!(self.typing, AtomTyping::Index(_))
    }

    /// Whether typing is the vector representation.
    pub fn has_vector_types(&self) -> bool {
        matches!(self.typing, AtomTyping::Vector(_))
    }

    /// Whether every tensor in the set is device-resident.
    pub fn is_device(&self) -> bool {
        self.coords.is_device()
    }

    /// Coordinate centroid; requires host-resident coordinates.
    pub fn center(&self) -> Result<Vec3, GridError> {
        let coords = self
            .coords
            .host()
            .ok_or(GridError::StorageMismatch(
                "coordinate centroid requires host-resident coordinates",
            ))?;
        let n = self.len();
        if n == 0 {
            return Ok(Vec3::ZERO);
        }
        let mut sum = Vec3::ZERO;
        for atom in coords.chunks_exact(3) {
            sum += Vec3::new(atom[0], atom[1], atom[2]);
        }
        Ok(sum / n as f32)
    }

    fn typing_tensor(&self) -> &Tensor {
        match &self.typing {
            AtomTyping::Index(t) => t,
            AtomTyping::Vector(t) => t,
        }
    }

    /// Copy of this set with every tensor on the given device.
    pub fn to_device(&self, device: &WgpuDevice) -> Self {
        let typing = match &self.typing {
            AtomTyping::Index(t) => AtomTyping::Index(t.to_device(device)),
            AtomTyping::Vector(t) => AtomTyping::Vector(t.to_device(device)),
        };
        Self {
            coords: self.coords.to_device(device),
            typing,
            radii: self.radii.to_device(device),
            num_types: self.num_types,
        }
    }

    /// Copy of this set with every tensor in host memory.
    pub fn to_host(&self) -> Self {
        let typing = match &self.typing {
            AtomTyping::Index(t) => AtomTyping::Index(t.to_host()),
            AtomTyping::Vector(t) => AtomTyping::Vector(t.to_host()),
        };
        Self {
            coords: self.coords.to_host(),
            typing,
            radii: self.radii.to_host(),
            num_types: self.num_types,
        }
    }
}

fn check_coords_radii(coords: &Tensor, radii: &Tensor) -> Result<usize, GridError> {
    if coords.shape().len() != 2 || coords.shape()[1] != 3 {
        return Err(GridError::ShapeMismatch("coords must have shape [N, 3]"));
    }
    let n = coords.shape()[0];
    if radii.shape() != [n] {
        return Err(GridError::ShapeMismatch("radii must have shape [N]"));
    }
    Ok(n)
}

fn check_same_storage(tensors: &[&Tensor]) -> Result<(), GridError> {
    let device = tensors[0].is_device();
    if tensors.iter().any(|t| t.is_device() != device) {
        return Err(GridError::StorageMismatch(
            "coordinate set tensors must share one storage kind",
        ));
    }
    Ok(())
}

/// One training example: the coordinate sets that rasterize into one grid.
#[derive(Debug, Clone)]
pub struct Example {
    /// Component structures, e.g. receptor then ligand.
    pub sets: Vec<CoordinateSet>,
}

impl Example {
    /// Example over the given coordinate sets.
    pub fn new(sets: Vec<CoordinateSet>) -> Self {
        Self { sets }
    }

    /// Total channel count across all sets.
    pub fn num_types(&self) -> usize {
        self.sets.iter().map(|s| s.num_types()).sum()
    }

    /// Concatenate all sets into one host coordinate set, offsetting each
    /// set's channels by the cumulative type count so channel ranges stay
    /// disjoint. Negative index sentinels are preserved unshifted.
    pub fn merge_coordinates(&self) -> Result<CoordinateSet, GridError> {
        if self.sets.is_empty() {
            return Err(GridError::ShapeMismatch("example holds no coordinate sets"));
        }
        let indexed = self.sets[0].has_indexed_types();
        if self.sets.iter().any(|s| s.has_indexed_types() != indexed) {
            return Err(GridError::MissingTyping(
                "cannot merge indexed and vector typed sets",
            ));
        }

        let total_atoms: usize = self.sets.iter().map(|s| s.len()).sum();
        let total_types = self.num_types();
        let mut coords = Vec::with_capacity(total_atoms * 3);
        let mut radii = Vec::with_capacity(total_atoms);

        for set in &self.sets {
            let c = set.coords.host().ok_or(GridError::StorageMismatch(
                "merge_coordinates requires host-resident sets",
            ))?;
            let r = set.radii.host().ok_or(GridError::StorageMismatch(
                "merge_coordinates requires host-resident sets",
            ))?;
            coords.extend_from_slice(c);
            radii.extend_from_slice(r);
        }

        let coords = Tensor::from_vec(coords, &[total_atoms, 3])?;
        let radii = Tensor::from_vec(radii, &[total_atoms])?;

        if indexed {
            let mut types = Vec::with_capacity(total_atoms);
            let mut offset = 0.0f32;
            for set in &self.sets {
                let t = set.typing_tensor().host().ok_or(GridError::StorageMismatch(
                    "merge_coordinates requires host-resident sets",
                ))?;
                for &v in t {
                    types.push(if v < 0.0 { v } else { v + offset });
                }
                offset += set.num_types() as f32;
            }
            let types = Tensor::from_vec(types, &[total_atoms])?;
            CoordinateSet::indexed(coords, types, radii, total_types)
        } else {
            let mut vectors = vec![0.0f32; total_atoms * total_types];
            let mut row = 0usize;
            let mut offset = 0usize;
            for set in &self.sets {
                let t = set.typing_tensor().host().ok_or(GridError::StorageMismatch(
                    "merge_coordinates requires host-resident sets",
                ))?;
                let t_width = set.num_types();
                if t_width == 0 {
                    row += set.len();
                    continue;
                }
                for atom in t.chunks_exact(t_width) {
                    let base = row * total_types + offset;
                    vectors[base..base + t_width].copy_from_slice(atom);
                    row += 1;
                }
                offset += t_width;
            }
            let vectors = Tensor::from_vec(vectors, &[total_atoms, total_types])?;
            CoordinateSet::vector(coords, vectors, radii)
        }
    }
}
