//! Dense float tensors with host- or device-resident storage.
//!
//! Every rasterizer operation borrows its inputs and outputs as [`Tensor`]s
//! and dispatches on where the data lives. Host tensors wrap a plain `Vec`;
//! device tensors wrap a WGPU buffer handle owned by a CubeCL client.

use cubecl::prelude::*;
use cubecl::server::Handle;
use cubecl::wgpu::{WgpuDevice, WgpuRuntime};

use crate::gridder::GridError;

/// Device-resident buffer plus the device that owns it.
#[derive(Debug, Clone)]
pub struct DeviceTensor {
    pub(crate) device: WgpuDevice,
    pub(crate) handle: Handle,
}

/// Where a tensor's elements live.
#[derive(Debug, Clone)]
pub enum TensorStorage {
    /// Elements in host memory.
    Host(Vec<f32>),
    /// Elements in a device buffer.
    Device(DeviceTensor),
}

/// Shaped float tensor, row-major, host- or device-resident.
#[derive(Debug, Clone)]
pub struct Tensor {
    shape: Vec<usize>,
    storage: TensorStorage,
}

impl Tensor {
    /// Zero-filled host tensor with the given shape.
    pub fn zeros(shape: &[usize]) -> Self {
        let len = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            storage: TensorStorage::Host(vec![0.0; len]),
        }
    }

    /// Host tensor wrapping existing data; the data length must match the shape.
    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Result<Self, GridError> {
        let len: usize = shape.iter().product();
        if data.len() != len {
            return Err(GridError::ShapeMismatch(
                "tensor data length does not match shape",
            ));
        }
        Ok(Self {
            shape: shape.to_vec(),
            storage: TensorStorage::Host(data),
        })
    }

    /// Zero-filled tensor allocated on the given device.
    pub fn zeros_on(device: &WgpuDevice, shape: &[usize]) -> Self {
        let len: usize = shape.iter().product();
        let client = WgpuRuntime::client(device);
        let init = vec![0.0f32; len.max(1)];
        let handle = client.create(f32::as_bytes(&init));
        Self {
            shape: shape.to_vec(),
            storage: TensorStorage::Device(DeviceTensor {
                device: device.clone(),
                handle,
            }),
        }
    }

    /// Tensor shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Whether the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the elements live in a device buffer.
    pub fn is_device(&self) -> bool {
        matches!(self.storage, TensorStorage::Device(_))
    }

    /// Host elements, if host-resident.
    pub fn host(&self) -> Option<&[f32]> {
        match &self.storage {
            TensorStorage::Host(data) => Some(data),
            TensorStorage::Device(_) => None,
        }
    }

    /// Mutable host elements, if host-resident.
    pub fn host_mut(&mut self) -> Option<&mut [f32]> {
        match &mut self.storage {
            TensorStorage::Host(data) => Some(data),
            TensorStorage::Device(_) => None,
        }
    }

    pub(crate) fn device(&self) -> Option<&DeviceTensor> {
        match &self.storage {
            TensorStorage::Device(dev) => Some(dev),
            TensorStorage::Host(_) => None,
        }
    }

    /// Copy of this tensor on the given device.
    pub fn to_device(&self, device: &WgpuDevice) -> Tensor {
        let host = self.to_host();
        let data = host.host().unwrap_or(&[]);
        let client = WgpuRuntime::client(device);
        let upload: &[f32] = if data.is_empty() { &[0.0] } else { data };
        let handle = client.create(f32::as_bytes(upload));
        Tensor {
            shape: self.shape.clone(),
            storage: TensorStorage::Device(DeviceTensor {
                device: device.clone(),
                handle,
            }),
        }
    }

    /// Copy of this tensor in host memory; synchronizes a device tensor.
    pub fn to_host(&self) -> Tensor {
        match &self.storage {
            TensorStorage::Host(data) => Tensor {
                shape: self.shape.clone(),
                storage: TensorStorage::Host(data.clone()),
            },
            TensorStorage::Device(dev) => {
                let client = WgpuRuntime::client(&dev.device);
                let bytes = client.read_one(dev.handle.clone().binding());
                let mut data = f32::from_bytes(&bytes).to_vec();
                data.truncate(self.len());
                Tensor {
                    shape: self.shape.clone(),
                    storage: TensorStorage::Host(data),
                }
            }
        }
    }
}
