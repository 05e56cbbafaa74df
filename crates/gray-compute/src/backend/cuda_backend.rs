//! CUDA GPU compute backend.
//!
//! Requires the `cuda` feature and an NVIDIA GPU with CUDA support. The
//! driver library is loaded at runtime, so a missing driver shows up as an
//! unavailable backend instead of a link error.

use std::sync::Arc;

use cudarc::driver::{CudaContext, CudaFunction, CudaModule, CudaSlice, CudaStream, LaunchConfig, PushKernelArg};
use tracing::debug;

use super::{DeviceMirror, DevicePrimitives, GpuLimits, LaunchGeometry};
use crate::pixel::Pixel;
use crate::{ComputeError, ComputeResult, TransferDirection};

// =============================================================================
// CUDA Kernel Source
// =============================================================================

/// CUDA kernel source, compiled at runtime via NVRTC.
///
/// `grayscale_kernel` writes the BT.601 luma of each pixel into its `gray`
/// byte using the same fixed-point rounding as the CPU and wgpu kernels.
const CUDA_KERNELS: &str = r#"
struct pixel {
    unsigned char r;
    unsigned char g;
    unsigned char b;
    unsigned char gray;
};

extern "C" {

__global__ void grayscale_kernel(pixel* data, unsigned int count) {
    unsigned int group = blockIdx.y * gridDim.x + blockIdx.x;
    unsigned int i = group * blockDim.x + threadIdx.x;
    if (i >= count) return;

    pixel p = data[i];
    unsigned int w = 299u * p.r + 587u * p.g + 114u * p.b;
    data[i].gray = (unsigned char)min((w + 500u) / 1000u, 255u);
}

}
"#;

// =============================================================================
// CudaMirror Handle
// =============================================================================

/// Pixel mirror in CUDA device memory, stored as raw bytes.
///
/// The allocation is freed when the handle is dropped.
pub struct CudaMirror {
    buffer: CudaSlice<u8>,
    count: usize,
}

impl DeviceMirror for CudaMirror {
    fn len(&self) -> usize {
        self.count
    }
}

// =============================================================================
// CudaPrimitives
// =============================================================================

/// CUDA primitives implementation.
pub struct CudaPrimitives {
    /// CUDA context - kept alive for the lifetime of primitives.
    #[allow(dead_code)]
    ctx: Arc<CudaContext>,
    stream: Arc<CudaStream>,
    /// Compiled CUDA module - kept alive for kernel lifetime.
    #[allow(dead_code)]
    module: Arc<CudaModule>,
    k_grayscale: CudaFunction,
    limits: GpuLimits,
}

/// Open a context on device 0, treating a driver-loading panic as failure.
fn open_context() -> ComputeResult<Arc<CudaContext>> {
    match std::panic::catch_unwind(|| CudaContext::new(0)) {
        Ok(Ok(ctx)) => Ok(ctx),
        Ok(Err(e)) => Err(ComputeError::DeviceCreation(format!("CUDA init failed: {e:?}"))),
        Err(_) => Err(ComputeError::BackendNotAvailable("CUDA driver could not be loaded".into())),
    }
}

impl CudaPrimitives {
    /// Create new CUDA primitives.
    pub fn new() -> ComputeResult<Self> {
        let ctx = open_context()?;

        let stream = ctx.default_stream();
        let available = query_available_memory();
        let limits = GpuLimits {
            max_group_size: 1024,
            max_groups_per_dim: i32::MAX as u32,
            max_buffer_bytes: available,
            total_memory: available,
            available_memory: available,
            detected: true,
        };

        let ptx = cudarc::nvrtc::compile_ptx(CUDA_KERNELS).map_err(|e| {
            ComputeError::ShaderCompilation(format!("CUDA kernel compile failed: {e:?}"))
        })?;

        let module = ctx.load_module(ptx).map_err(|e| {
            ComputeError::ShaderCompilation(format!("CUDA module load failed: {e:?}"))
        })?;

        let k_grayscale = module.load_function("grayscale_kernel").map_err(|e| {
            ComputeError::ShaderCompilation(format!("Failed to load grayscale_kernel: {e:?}"))
        })?;

        debug!(available_memory = available, "CUDA device created");

        Ok(Self {
            ctx,
            stream,
            module,
            k_grayscale,
            limits,
        })
    }

    /// Describe device 0, or `None` if no context can be opened.
    pub fn probe() -> Option<String> {
        let _ctx = open_context().ok()?;
        Some(format!("device 0, {} usable", super::memory::format_bytes(query_available_memory())))
    }

    /// Check if CUDA is available.
    pub fn is_available() -> bool {
        open_context().is_ok()
    }

    pub(crate) fn limits_mut(&mut self) -> &mut GpuLimits {
        &mut self.limits
    }

    /// Launch config matching `geometry`: one thread per pixel.
    fn launch_config(geometry: &LaunchGeometry) -> LaunchConfig {
        LaunchConfig {
            block_dim: (geometry.group_size, 1, 1),
            grid_dim: (geometry.grid.0, geometry.grid.1, 1),
            shared_mem_bytes: 0,
        }
    }
}

impl DevicePrimitives for CudaPrimitives {
    type Mirror = CudaMirror;

    fn allocate(&self, count: usize) -> ComputeResult<Self::Mirror> {
        if !self.limits.fits_memory(count) {
            return Err(self.limits.exceeded(count));
        }

        let bytes = GpuLimits::mirror_bytes(count);

        let buffer: CudaSlice<u8> = self.stream.alloc_zeros(count * Pixel::SIZE).map_err(|e| {
            ComputeError::Allocation { bytes, reason: format!("{e:?}") }
        })?;
        Ok(CudaMirror { buffer, count })
    }

    fn copy_in(&self, mirror: &mut Self::Mirror, src: &[Pixel]) -> ComputeResult<()> {
        let err = |reason: String| ComputeError::Transfer {
            direction: TransferDirection::HostToDevice,
            reason,
        };
        if src.len() != mirror.count {
            return Err(err(format!("mirror holds {} pixels, host buffer {}", mirror.count, src.len())));
        }

        let bytes: &[u8] = bytemuck::cast_slice(src);
        self.stream.memcpy_htod(bytes, &mut mirror.buffer).map_err(|e| err(format!("{e:?}")))
    }

    fn launch_grayscale(&self, mirror: &mut Self::Mirror, geometry: &LaunchGeometry) -> ComputeResult<()> {
        if geometry.count as usize != mirror.count {
            return Err(ComputeError::Launch(format!(
                "geometry covers {} pixels, mirror holds {}",
                geometry.count, mirror.count
            )));
        }
        if geometry.count == 0 {
            return Ok(());
        }

        let count = geometry.count;
        let cfg = Self::launch_config(geometry);
        let mut builder = self.stream.launch_builder(&self.k_grayscale);
        builder.arg(&mut mirror.buffer);
        builder.arg(&count);

        #[allow(unsafe_code)]
        unsafe { builder.launch(cfg) }.map_err(|e| {
            ComputeError::Launch(format!("grayscale_kernel failed: {e:?}"))
        })?;
        Ok(())
    }

    fn synchronize(&self) -> ComputeResult<()> {
        self.stream.synchronize().map_err(|e| {
            ComputeError::Synchronization(format!("{e:?}"))
        })
    }

    fn copy_out(&self, mirror: &Self::Mirror, dst: &mut [Pixel]) -> ComputeResult<()> {
        let err = |reason: String| ComputeError::Transfer {
            direction: TransferDirection::DeviceToHost,
            reason,
        };
        if dst.len() != mirror.count {
            return Err(err(format!("mirror holds {} pixels, host buffer {}", mirror.count, dst.len())));
        }

        let bytes: &mut [u8] = bytemuck::cast_slice_mut(dst);
        self.stream.memcpy_dtoh(&mirror.buffer, bytes).map_err(|e| err(format!("{e:?}")))
    }

    fn limits(&self) -> &GpuLimits {
        &self.limits
    }

    fn name(&self) -> &'static str {
        "CUDA"
    }
}

// =============================================================================
// VRAM Detection
// =============================================================================

/// Query available VRAM from CUDA driver.
///
/// Returns 60% of free memory to leave headroom for other allocations.
/// Falls back to 4GB if query fails.
fn query_available_memory() -> u64 {
    use cudarc::driver::sys as cuda_sys;

    let mut free: usize = 0;
    let mut total: usize = 0;

    #[allow(unsafe_code)]
    let result = unsafe {
        cuda_sys::cuMemGetInfo_v2(&raw mut free, &raw mut total)
    };

    if result == cuda_sys::CUresult::CUDA_SUCCESS {
        (free as f64 * 0.6) as u64
    } else {
        4 * 1024 * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_source_names_entry_point() {
        assert!(CUDA_KERNELS.contains("__global__ void grayscale_kernel"));
    }

    #[test]
    fn test_launch_config_follows_geometry() {
        let limits = GpuLimits { max_group_size: 1024, ..GpuLimits::default() };
        let geometry = LaunchGeometry::for_elements(1000, 128, &limits).unwrap();
        let cfg = CudaPrimitives::launch_config(&geometry);
        assert_eq!(cfg.block_dim, (128, 1, 1));
        assert_eq!(cfg.grid_dim, (8, 1, 1));
    }

    #[test]
    fn test_roundtrip_if_available() {
        if !CudaPrimitives::is_available() {
            println!("CUDA not available, skipping");
            return;
        }
        let gpu = CudaPrimitives::new().unwrap();
        let mut pixels = vec![Pixel::rgb(255, 0, 0), Pixel::rgb(0, 0, 250), Pixel::splat(77)];
        crate::run_grayscale(&gpu, &mut pixels, 256).unwrap();
        assert_eq!(pixels.iter().map(|p| p.gray).collect::<Vec<_>>(), vec![76, 29, 77]);
    }
}
