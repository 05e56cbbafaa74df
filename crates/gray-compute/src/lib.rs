//! Accelerated RGB to grayscale conversion.
//!
//! Computes the BT.601 luma of every pixel of a caller-owned buffer on a
//! data-parallel device and writes it back in place. CPU (rayon), wgpu and
//! CUDA backends share one host orchestration path.
//!
//! # Architecture
//!
//! ```text
//! Processor (backend dispatch)
//!     └── run_grayscale<G: DevicePrimitives>
//!             allocate -> copy_in -> launch -> synchronize -> copy_out
//!             └── any failure -> device_fail (free mirror, log, return status)
//!
//! DevicePrimitives
//!     ├── CpuPrimitives  (rayon)
//!     ├── WgpuPrimitives (Vulkan/Metal/DX12 compute shaders)
//!     └── CudaPrimitives (NVRTC kernel)
//! ```
//!
//! # Example
//!
//! ```
//! use gray_compute::{Pixel, Processor};
//!
//! let proc = Processor::cpu()?;
//! let mut pixels = vec![Pixel::rgb(255, 0, 0), Pixel::rgb(10, 20, 30)];
//! proc.grayscale(&mut pixels)?;
//! assert_eq!(pixels[0].gray, 76);
//! # Ok::<(), gray_compute::ComputeError>(())
//! ```

pub mod backend;
pub mod pixel;
pub mod processor;
pub mod status;
mod shaders;

pub use backend::{
    Backend, DeviceMirror, DevicePrimitives, GpuLimits, LaunchGeometry,
    BackendInfo, describe_backends, detect_backends, select_best_backend,
};
pub use pixel::{Pixel, luma_bt601};
pub use processor::{Processor, ProcessorBuilder, ProcessorConfig, run_grayscale};
pub use status::Status;

use thiserror::Error;

/// Direction of a host/device copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Pixel buffer into the device mirror.
    HostToDevice,
    /// Device mirror back into the pixel buffer.
    DeviceToHost,
}

impl std::fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HostToDevice => f.write_str("host to device"),
            Self::DeviceToHost => f.write_str("device to host"),
        }
    }
}

/// Compute operation errors
#[derive(Error, Debug)]
pub enum ComputeError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No suitable GPU adapter found")]
    NoAdapter,

    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("Failed to create device: {0}")]
    DeviceCreation(String),

    #[error("Failed to compile kernel: {0}")]
    ShaderCompilation(String),

    #[error("Failed to allocate {bytes} bytes of device memory: {reason}")]
    Allocation { bytes: u64, reason: String },

    #[error("Invalid launch geometry: {0}")]
    InvalidGeometry(String),

    #[error("Transfer {direction} failed: {reason}")]
    Transfer { direction: TransferDirection, reason: String },

    #[error("Kernel launch failed: {0}")]
    Launch(String),

    #[error("Device synchronization failed: {0}")]
    Synchronization(String),
}

impl ComputeError {
    /// Status code reported for this error.
    pub fn status(&self) -> Status {
        match self {
            Self::InvalidInput(_) => Status::InvalidValue,
            Self::NoAdapter | Self::BackendNotAvailable(_) => Status::NoDevice,
            Self::DeviceCreation(_) => Status::InitializationError,
            Self::ShaderCompilation(_) => Status::KernelCompilation,
            Self::Allocation { .. } => Status::MemoryAllocation,
            Self::InvalidGeometry(_) => Status::InvalidConfiguration,
            Self::Transfer { .. } => Status::TransferFailed,
            Self::Launch(_) => Status::LaunchFailure,
            Self::Synchronization(_) => Status::SynchronizationFailed,
        }
    }
}

impl From<&ComputeError> for Status {
    fn from(err: &ComputeError) -> Self {
        err.status()
    }
}

pub type ComputeResult<T> = Result<T, ComputeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ComputeError::InvalidInput("null".into()), Status::InvalidValue),
            (ComputeError::NoAdapter, Status::NoDevice),
            (ComputeError::BackendNotAvailable("cuda".into()), Status::NoDevice),
            (ComputeError::DeviceCreation("x".into()), Status::InitializationError),
            (ComputeError::ShaderCompilation("x".into()), Status::KernelCompilation),
            (ComputeError::Allocation { bytes: 16, reason: "x".into() }, Status::MemoryAllocation),
            (ComputeError::InvalidGeometry("x".into()), Status::InvalidConfiguration),
            (
                ComputeError::Transfer { direction: TransferDirection::DeviceToHost, reason: "x".into() },
                Status::TransferFailed,
            ),
            (ComputeError::Launch("x".into()), Status::LaunchFailure),
            (ComputeError::Synchronization("x".into()), Status::SynchronizationFailed),
        ];

        for (err, status) in &cases {
            assert_eq!(err.status(), *status, "{err}");
            assert_eq!(Status::from(err), *status);
        }
    }

    #[test]
    fn test_transfer_message() {
        let err = ComputeError::Transfer {
            direction: TransferDirection::HostToDevice,
            reason: "bus error".into(),
        };
        assert_eq!(err.to_string(), "Transfer host to device failed: bus error");
    }
}
