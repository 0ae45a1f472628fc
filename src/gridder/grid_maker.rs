//! Grid configuration and the public rasterizer operations.

use cubecl::wgpu::WgpuDevice;
use log::debug;

use super::cpu;
use super::density::TailCoefficients;
use super::gpu_driver;
use super::types::GridError;
use crate::atoms::{AtomTyping, CoordinateSet, Example};
use crate::math::Vec3;
use crate::tensor::Tensor;
use crate::transform::{Pcg32, Transform};

/// Rasterizes coordinate sets into per-type density grids and maps grid
/// gradients back onto atoms.
///
/// The configuration is immutable during a call; the grid center is supplied
/// per call because transformations applied to the coordinates externally may
/// move it. Every operation accepts host- or device-resident tensors and
/// dispatches to a serial reference loop or a data-parallel WGPU path; the
/// two agree within floating-point summation tolerance.
#[derive(Debug, Clone)]
pub struct GridMaker {
    pub(crate) resolution: f32,
    pub(crate) dimension: f32,
    pub(crate) radius_scale: f32,
    pub(crate) gaussian_radius_multiple: f32,
    pub(crate) final_radius_multiple: f32,
    pub(crate) coefs: TailCoefficients,
    pub(crate) binary: bool,
    pub(crate) dim: usize,
}

enum Placement {
    Host,
    Device(WgpuDevice),
}

impl GridMaker {
    /// Grid maker with the given spacing and side length and the default
    /// summed Gaussian density.
    pub fn new(resolution: f32, dimension: f32) -> Result<Self, GridError> {
        Self::with_options(resolution, dimension, false, 1.0, 1.0)
    }

    /// Grid maker with every setting explicit.
    pub fn with_options(
        resolution: f32,
        dimension: f32,
        binary: bool,
        radius_scale: f32,
        gaussian_radius_multiple: f32,
    ) -> Result<Self, GridError> {
        let mut maker = Self {
            resolution: 0.0,
            dimension: 0.0,
            radius_scale: 0.0,
            gaussian_radius_multiple: 0.0,
            final_radius_multiple: 0.0,
            coefs: TailCoefficients::default(),
            binary: false,
            dim: 1,
        };
        maker.initialize(
            resolution,
            dimension,
            binary,
            radius_scale,
            gaussian_radius_multiple,
        )?;
        Ok(maker)
    }

    /// Reconfigure every grid setting, recomputing the voxel count and the
    /// cached density coefficients.
    pub fn initialize(
        &mut self,
        resolution: f32,
        dimension: f32,
        binary: bool,
        radius_scale: f32,
        gaussian_radius_multiple: f32,
    ) -> Result<(), GridError> {
        if !(resolution > 0.0) {
            return Err(GridError::InvalidConfiguration("resolution must be positive"));
        }
        if !(dimension >= 0.0) {
            return Err(GridError::InvalidConfiguration(
                "dimension must be non-negative",
            ));
        }
        if !(radius_scale > 0.0) {
            return Err(GridError::InvalidConfiguration(
                "radius_scale must be positive",
            ));
        }
        if !(gaussian_radius_multiple > 0.0) {
            return Err(GridError::InvalidConfiguration(
                "gaussian_radius_multiple must be positive",
            ));
        }
        self.resolution = resolution;
        self.dimension = dimension;
        self.binary = binary;
        self.radius_scale = radius_scale;
        self.gaussian_radius_multiple = gaussian_radius_multiple;
        self.coefs = TailCoefficients::for_multiple(gaussian_radius_multiple);
        self.final_radius_multiple = self.coefs.final_radius_multiple;
        self.dim = (dimension / resolution).round() as usize + 1;
        Ok(())
    }

    /// Grid spacing in Angstroms.
    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    /// Set the grid spacing, recomputing the voxel count.
    pub fn set_resolution(&mut self, resolution: f32) -> Result<(), GridError> {
        self.initialize(
            resolution,
            self.dimension,
            self.binary,
            self.radius_scale,
            self.gaussian_radius_multiple,
        )
    }

    /// Grid side length in Angstroms.
    pub fn dimension(&self) -> f32 {
        self.dimension
    }

    /// Set the grid side length, recomputing the voxel count.
    pub fn set_dimension(&mut self, dimension: f32) -> Result<(), GridError> {
        self.initialize(
            self.resolution,
            dimension,
            self.binary,
            self.radius_scale,
            self.gaussian_radius_multiple,
        )
    }

    /// Whether densities are clamped to binary occupancy.
    pub fn binary(&self) -> bool {
        self.binary
    }

    /// Switch between summed and binary occupancy density.
    pub fn set_binary(&mut self, binary: bool) {
        self.binary = binary;
    }

    /// Global multiplier applied to every input radius.
    pub fn radius_scale(&self) -> f32 {
        self.radius_scale
    }

    /// Set the global radius multiplier.
    pub fn set_radius_scale(&mut self, radius_scale: f32) -> Result<(), GridError> {
        self.initialize(
            self.resolution,
            self.dimension,
            self.binary,
            radius_scale,
            self.gaussian_radius_multiple,
        )
    }

    /// Multiple of the scaled radius that the Gaussian region extends to.
    pub fn gaussian_radius_multiple(&self) -> f32 {
        self.gaussian_radius_multiple
    }

    /// Set the Gaussian extent, recomputing the quadratic tail.
    pub fn set_gaussian_radius_multiple(&mut self, multiple: f32) -> Result<(), GridError> {
        self.initialize(
            self.resolution,
            self.dimension,
            self.binary,
            self.radius_scale,
            multiple,
        )
    }

    /// Voxel count along each spatial axis.
    pub fn grid_dims(&self) -> (usize, usize, usize) {
        (self.dim, self.dim, self.dim)
    }

    /// Multiple of an input radius at which its density reaches zero.
    pub fn radius_multiple(&self) -> f32 {
        self.radius_scale * self.final_radius_multiple
    }

    /// World coordinate of voxel (0, 0, 0) for a grid centered at `center`.
    pub fn grid_origin(&self, center: Vec3) -> Vec3 {
        center - Vec3::splat(self.dimension * 0.5)
    }

    /// Rasterize a coordinate set into `out` (`T x dim^3`, zeroed first).
    ///
    /// Indexed-mode atoms with out-of-range types, and atoms whose density
    /// support misses the grid, are skipped silently.
    pub fn forward(
        &self,
        grid_center: Vec3,
        input: &CoordinateSet,
        out: &mut Tensor,
    ) -> Result<(), GridError> {
        let ntypes = input.num_types();
        self.check_grid_shape(ntypes, out, "output grid dimensions do not match configuration")?;
        let typing = typing_tensor(input);
        let placement = placement_of(&[&input.coords, typing, &input.radii, &*out])?;
        let origin = self.grid_origin(grid_center);
        match placement {
            Placement::Host => {
                let coords = host_slice(&input.coords)?;
                let radii = host_slice(&input.radii)?;
                check_radii(radii)?;
                match &input.typing {
                    AtomTyping::Index(t) => {
                        let types = host_slice(t)?;
                        let out_data = host_slice_mut(out)?;
                        cpu::forward_indexed(self, origin, coords, types, radii, ntypes, out_data);
                    }
                    AtomTyping::Vector(t) => {
                        let types = host_slice(t)?;
                        let out_data = host_slice_mut(out)?;
                        cpu::forward_vector(self, origin, coords, types, radii, ntypes, out_data);
                    }
                }
            }
            Placement::Device(device) => {
                let handle = out
                    .device()
                    .ok_or(GridError::StorageMismatch(
                        "expected a device-resident tensor",
                    ))?
                    .handle
                    .clone();
                gpu_driver::forward_device(self, origin, input, &device, &handle)?;
            }
        }
        Ok(())
    }

    /// Rasterize an example after applying a transform; the transform's
    /// center becomes the grid center. Use this variant when the transform
    /// must be retained, e.g. to map gradients back during training.
    pub fn forward_transformed(
        &self,
        example: &Example,
        transform: &Transform,
        out: &mut Tensor,
    ) -> Result<(), GridError> {
        let mut merged = example.merge_coordinates()?;
        transform.forward_in_place(&mut merged)?;
        let set = match out.device() {
            Some(dev) => merged.to_device(&dev.device),
            None => merged,
        };
        self.forward(transform.center(), &set, out)
    }

    /// Rasterize a batch of examples into a 5-D grid, drawing one random
    /// augmentation transform per example from `seed`. Each example's grid
    /// is centered on its last coordinate set before transformation.
    pub fn forward_batch(
        &self,
        examples: &[Example],
        out: &mut Tensor,
        random_translation: f32,
        random_rotation: bool,
        seed: u64,
    ) -> Result<(), GridError> {
        let d = self.dim;
        let shape = out.shape().to_vec();
        if shape.len() != 5 || shape[0] != examples.len() {
            return Err(GridError::ShapeMismatch(
                "batch output leading dimension must match example count",
            ));
        }
        if shape[2] != d || shape[3] != d || shape[4] != d {
            return Err(GridError::ShapeMismatch(
                "batch output spatial dimensions do not match configuration",
            ));
        }
        let ntypes = shape[1];
        let grid_len = ntypes * d * d * d;

        // Assemble and validate every example before touching the output so
        // a failure cannot leave the batch partially written.
        let mut prepared = Vec::with_capacity(examples.len());
        for (i, example) in examples.iter().enumerate() {
            if example.num_types() != ntypes {
                return Err(GridError::ShapeMismatch(
                    "example channel count does not match batch output",
                ));
            }
            let last = example.sets.last().ok_or(GridError::ShapeMismatch(
                "example holds no coordinate sets",
            ))?;
            let center = last.center()?;
            let mut rng = Pcg32::new(i as u64, seed);
            let transform = Transform::random(center, random_translation, random_rotation, &mut rng);
            let mut merged = example.merge_coordinates()?;
            transform.forward_in_place(&mut merged)?;
            if let Some(radii) = merged.radii.host() {
                check_radii(radii)?;
            }
            prepared.push((transform, merged));
        }
        debug!("rasterizing batch of {} examples", prepared.len());

        for (i, (transform, set)) in prepared.iter().enumerate() {
            let origin = self.grid_origin(transform.center());
            let slab_target = out.device().map(|dev| {
                let offset = (i * grid_len * core::mem::size_of::<f32>()) as u64;
                (dev.device.clone(), dev.handle.clone().offset_start(offset))
            });
            if let Some((device, handle)) = slab_target {
                let set = set.to_device(&device);
                gpu_driver::forward_device(self, origin, &set, &device, &handle)?;
            } else {
                let data = host_slice_mut(out)?;
                let slab = &mut data[i * grid_len..(i + 1) * grid_len];
                let coords = host_slice(&set.coords)?;
                let radii = host_slice(&set.radii)?;
                match &set.typing {
                    AtomTyping::Index(t) => {
                        let types = host_slice(t)?;
                        cpu::forward_indexed(self, origin, coords, types, radii, ntypes, slab);
                    }
                    AtomTyping::Vector(t) => {
                        let types = host_slice(t)?;
                        cpu::forward_vector(self, origin, coords, types, radii, ntypes, slab);
                    }
                }
            }
        }
        Ok(())
    }

    /// Map an upstream gradient grid onto per-atom coordinate gradients.
    /// Requires indexed typing; `atom_gradients` (`N x 3`) is overwritten.
    ///
    /// The coordinates, types, and radii must be the ones that produced the
    /// forward grid; no state is carried between forward and backward.
    pub fn backward(
        &self,
        grid_center: Vec3,
        input: &CoordinateSet,
        diff: &Tensor,
        atom_gradients: &mut Tensor,
    ) -> Result<(), GridError> {
        let AtomTyping::Index(type_index) = &input.typing else {
            return Err(GridError::MissingTyping(
                "index types required for coordinate backward",
            ));
        };
        let n = input.len();
        let ntypes = input.num_types();
        self.check_grid_shape(ntypes, diff, "gradient grid dimensions do not match configuration")?;
        if atom_gradients.shape() != [n, 3] {
            return Err(GridError::ShapeMismatch(
                "atom_gradients must have shape [N, 3]",
            ));
        }
        let placement = placement_of(&[
            &input.coords,
            type_index,
            &input.radii,
            diff,
            &*atom_gradients,
        ])?;
        let origin = self.grid_origin(grid_center);
        match placement {
            Placement::Host => {
                let coords = host_slice(&input.coords)?;
                let types = host_slice(type_index)?;
                let radii = host_slice(&input.radii)?;
                check_radii(radii)?;
                let diff_data = host_slice(diff)?;
                let grads = host_slice_mut(atom_gradients)?;
                cpu::backward_indexed(
                    self, origin, coords, types, radii, ntypes, diff_data, grads,
                );
            }
            Placement::Device(device) => {
                gpu_driver::backward_indexed_device(
                    self,
                    origin,
                    input,
                    type_index,
                    &device,
                    diff,
                    atom_gradients,
                )?;
            }
        }
        Ok(())
    }

    /// Map an upstream gradient grid onto per-atom coordinate and type-weight
    /// gradients. Requires vector typing; `atom_gradients` (`N x 3`) and
    /// `type_gradients` (`N x T`) are overwritten.
    pub fn backward_with_types(
        &self,
        grid_center: Vec3,
        input: &CoordinateSet,
        diff: &Tensor,
        atom_gradients: &mut Tensor,
        type_gradients: &mut Tensor,
    ) -> Result<(), GridError> {
        let AtomTyping::Vector(type_vector) = &input.typing else {
            return Err(GridError::MissingTyping(
                "vector types required for type backward",
            ));
        };
        let n = input.len();
        let ntypes = input.num_types();
        self.check_grid_shape(ntypes, diff, "gradient grid dimensions do not match configuration")?;
        if atom_gradients.shape() != [n, 3] {
            return Err(GridError::ShapeMismatch(
                "atom_gradients must have shape [N, 3]",
            ));
        }
        if type_gradients.shape() != [n, ntypes] {
            return Err(GridError::ShapeMismatch(
                "type_gradients must have shape [N, T]",
            ));
        }
        let placement = placement_of(&[
            &input.coords,
            type_vector,
            &input.radii,
            diff,
            &*atom_gradients,
            &*type_gradients,
        ])?;
        let origin = self.grid_origin(grid_center);
        match placement {
            Placement::Host => {
                let coords = host_slice(&input.coords)?;
                let types = host_slice(type_vector)?;
                let radii = host_slice(&input.radii)?;
                check_radii(radii)?;
                let diff_data = host_slice(diff)?;
                let grads = host_slice_mut(atom_gradients)?;
                let tgrads = host_slice_mut(type_gradients)?;
                cpu::backward_vector(
                    self, origin, coords, types, radii, ntypes, diff_data, grads, tgrads,
                );
            }
            Placement::Device(device) => {
                gpu_driver::backward_vector_device(
                    self,
                    origin,
                    input,
                    type_vector,
                    &device,
                    diff,
                    atom_gradients,
                    type_gradients,
                )?;
            }
        }
        Ok(())
    }

    /// Redistribute a relevance grid onto atoms in proportion to each atom's
    /// contribution to the forward density. Requires indexed typing;
    /// relevance over vector weights is ill-defined and rejected.
    /// `relevance` (`N`) is overwritten.
    pub fn backward_relevance(
        &self,
        grid_center: Vec3,
        input: &CoordinateSet,
        density: &Tensor,
        diff: &Tensor,
        relevance: &mut Tensor,
    ) -> Result<(), GridError> {
        let AtomTyping::Index(type_index) = &input.typing else {
            return Err(GridError::MissingTyping(
                "index types required for relevance backward",
            ));
        };
        let n = input.len();
        let ntypes = input.num_types();
        self.check_grid_shape(ntypes, density, "density grid dimensions do not match configuration")?;
        self.check_grid_shape(ntypes, diff, "relevance grid dimensions do not match configuration")?;
        if relevance.shape() != [n] {
            return Err(GridError::ShapeMismatch("relevance must have shape [N]"));
        }
        let placement = placement_of(&[
            &input.coords,
            type_index,
            &input.radii,
            density,
            diff,
            &*relevance,
        ])?;
        let origin = self.grid_origin(grid_center);
        match placement {
            Placement::Host => {
                let coords = host_slice(&input.coords)?;
                let types = host_slice(type_index)?;
                let radii = host_slice(&input.radii)?;
                check_radii(radii)?;
                let density_data = host_slice(density)?;
                let diff_data = host_slice(diff)?;
                let rel = host_slice_mut(relevance)?;
                cpu::backward_relevance(
                    self,
                    origin,
                    coords,
                    types,
                    radii,
                    ntypes,
                    density_data,
                    diff_data,
                    rel,
                );
            }
            Placement::Device(device) => {
                gpu_driver::relevance_device(
                    self,
                    origin,
                    input,
                    type_index,
                    &device,
                    density,
                    diff,
                    relevance,
                )?;
            }
        }
        Ok(())
    }

    fn check_grid_shape(
        &self,
        ntypes: usize,
        grid: &Tensor,
        msg: &'static str,
    ) -> Result<(), GridError> {
        let d = self.dim;
        if grid.shape() != [ntypes, d, d, d] {
            return Err(GridError::ShapeMismatch(msg));
        }
        Ok(())
    }
}

fn typing_tensor(input: &CoordinateSet) -> &Tensor {
    match &input.typing {
        AtomTyping::Index(t) => t,
        AtomTyping::Vector(t) => t,
    }
}

fn host_slice(t: &Tensor) -> Result<&[f32], GridError> {
    t.host().ok_or(GridError::StorageMismatch(
        "expected host-resident tensors",
    ))
}

fn host_slice_mut(t: &mut Tensor) -> Result<&mut [f32], GridError> {
    t.host_mut().ok_or(GridError::StorageMismatch(
        "expected host-resident tensors",
    ))
}

fn check_radii(radii: &[f32]) -> Result<(), GridError> {
    if radii.iter().any(|&r| !(r >= 0.0)) {
        return Err(GridError::InvalidConfiguration(
            "radii must be non-negative",
        ));
    }
    Ok(())
}

fn placement_of(tensors: &[&Tensor]) -> Result<Placement, GridError> {
    let mut device: Option<WgpuDevice> = None;
    let mut any_host = false;
    for t in tensors {
        match t.device() {
            Some(dev) => match &device {
                None => device = Some(dev.device.clone()),
                Some(d) if *d == dev.device => {}
                Some(_) => {
                    return Err(GridError::StorageMismatch("tensors span multiple devices"))
                }
            },
            None => any_host = true,
        }
    }
    match (any_host, device) {
        (true, Some(_)) => Err(GridError::StorageMismatch(
            "cannot mix host and device tensors in one call",
        )),
        (false, Some(d)) => Ok(Placement::Device(d)),
        _ => Ok(Placement::Host),
    }
}
