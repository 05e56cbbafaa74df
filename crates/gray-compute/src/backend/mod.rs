//! Compute backends for the grayscale kernel.
//!
//! Provides CPU (rayon), wgpu, and CUDA backends with automatic selection.
//!
//! # Architecture
//!
//! ```text
//! run_grayscale<G: DevicePrimitives>
//!     +-- CpuPrimitives  (rayon parallelization)
//!     +-- WgpuPrimitives (Vulkan/Metal/DX12)
//!     +-- CudaPrimitives (NVIDIA CUDA)
//! ```

mod primitives;
mod limits;
mod geometry;
mod detect;
mod cpu_backend;
pub mod memory;

#[cfg(feature = "wgpu")]
mod wgpu_backend;

#[cfg(feature = "cuda")]
mod cuda_backend;

// Core types
pub use primitives::{DeviceMirror, DevicePrimitives};
pub use limits::GpuLimits;
pub use geometry::{LaunchGeometry, DEFAULT_GROUP_SIZE};
pub use detect::{detect_backends, select_best_backend, describe_backends, BackendInfo};

// Backends
pub use cpu_backend::{CpuPrimitives, CpuMirror};

#[cfg(feature = "wgpu")]
pub use wgpu_backend::{WgpuPrimitives, WgpuMirror};

#[cfg(feature = "cuda")]
pub use cuda_backend::{CudaPrimitives, CudaMirror};

use std::str::FromStr;

use crate::{ComputeError, ComputeResult};

/// Available compute backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Backend {
    /// Auto-select best available (CUDA > wgpu > CPU).
    #[default]
    Auto,
    /// CPU backend using rayon for parallelization.
    Cpu,
    /// wgpu backend (Vulkan/Metal/DX12).
    Wgpu,
    /// NVIDIA CUDA backend.
    Cuda,
}

impl Backend {
    /// Concrete backends, most preferred first.
    pub const PREFERENCE: [Backend; 3] = [Self::Cuda, Self::Wgpu, Self::Cpu];

    /// Whether support for this backend was compiled in.
    pub fn is_compiled(&self) -> bool {
        match self {
            Self::Auto | Self::Cpu => true,
            Self::Wgpu => cfg!(feature = "wgpu"),
            Self::Cuda => cfg!(feature = "cuda"),
        }
    }

    /// Whether this backend has a device on the current system.
    pub fn is_available(&self) -> bool {
        match self {
            Self::Auto => true,
            b => detect::probe(*b).is_some(),
        }
    }

    /// Get human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
            Self::Wgpu => "wgpu",
            Self::Cuda => "cuda",
        }
    }
}

impl FromStr for Backend {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "wgpu" | "gpu" => Ok(Self::Wgpu),
            "cuda" => Ok(Self::Cuda),
            other => Err(ComputeError::BackendNotAvailable(format!("unknown backend '{other}'"))),
        }
    }
}

/// Device handle for dynamic dispatch over the compiled-in backends.
pub enum AnyDevice {
    Cpu(CpuPrimitives),
    #[cfg(feature = "wgpu")]
    Wgpu(WgpuPrimitives),
    #[cfg(feature = "cuda")]
    Cuda(CudaPrimitives),
}

impl AnyDevice {
    /// Get backend name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cpu(d) => d.name(),
            #[cfg(feature = "wgpu")]
            Self::Wgpu(d) => d.name(),
            #[cfg(feature = "cuda")]
            Self::Cuda(d) => d.name(),
        }
    }

    /// Get device limits.
    pub fn limits(&self) -> &GpuLimits {
        match self {
            Self::Cpu(d) => d.limits(),
            #[cfg(feature = "wgpu")]
            Self::Wgpu(d) => d.limits(),
            #[cfg(feature = "cuda")]
            Self::Cuda(d) => d.limits(),
        }
    }

    fn limits_mut(&mut self) -> &mut GpuLimits {
        match self {
            Self::Cpu(d) => d.limits_mut(),
            #[cfg(feature = "wgpu")]
            Self::Wgpu(d) => d.limits_mut(),
            #[cfg(feature = "cuda")]
            Self::Cuda(d) => d.limits_mut(),
        }
    }
}

impl std::fmt::Debug for AnyDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyDevice")
            .field("backend", &self.name())
            .field("limits", self.limits())
            .finish()
    }
}

/// Create a device for the specified backend.
///
/// `memory_cap` lowers the largest mirror the device accepts, on any backend.
pub fn create_device(backend: Backend, memory_cap: Option<u64>) -> ComputeResult<AnyDevice> {
    let mut device = match backend {
        Backend::Auto => return create_device(select_best_backend(), memory_cap),
        Backend::Cpu => AnyDevice::Cpu(CpuPrimitives::new()),
        Backend::Wgpu => {
            #[cfg(feature = "wgpu")]
            {
                AnyDevice::Wgpu(WgpuPrimitives::new()?)
            }
            #[cfg(not(feature = "wgpu"))]
            {
                return Err(ComputeError::BackendNotAvailable(
                    "wgpu feature not enabled".to_string()
                ));
            }
        }
        Backend::Cuda => {
            #[cfg(feature = "cuda")]
            {
                AnyDevice::Cuda(CudaPrimitives::new()?)
            }
            #[cfg(not(feature = "cuda"))]
            {
                return Err(ComputeError::BackendNotAvailable(
                    "cuda feature not enabled".to_string()
                ));
            }
        }
    };

    if let Some(bytes) = memory_cap {
        device.limits_mut().cap_memory(bytes);
    }
    Ok(device)
}
