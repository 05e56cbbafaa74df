//! Device primitives abstraction shared by every backend.

use crate::pixel::Pixel;
use crate::ComputeResult;
use super::{GpuLimits, LaunchGeometry};

/// Owning handle to a pixel mirror in device memory.
///
/// Dropping the handle frees the device allocation, so a mirror is released
/// exactly once on every exit path of the orchestrator.
pub trait DeviceMirror: Send {
    /// Number of pixels the mirror holds.
    fn len(&self) -> usize;

    /// Whether the mirror holds no pixels.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size in bytes of device memory used.
    fn size_bytes(&self) -> u64 {
        (self.len() as u64) * (Pixel::SIZE as u64)
    }
}

/// Core device operations used by the grayscale orchestrator.
///
/// Every call is blocking from the caller's point of view except
/// [`launch_grayscale`](Self::launch_grayscale), which may return before the
/// kernel finishes; [`synchronize`](Self::synchronize) is the barrier.
pub trait DevicePrimitives: Send + Sync {
    /// Backend-specific mirror type.
    type Mirror: DeviceMirror;

    /// Allocate a mirror for `count` pixels.
    fn allocate(&self, count: usize) -> ComputeResult<Self::Mirror>;

    /// Copy the host buffer into the mirror. Lengths must match.
    fn copy_in(&self, mirror: &mut Self::Mirror, src: &[Pixel]) -> ComputeResult<()>;

    /// Run the luma kernel over the mirror with the given geometry.
    fn launch_grayscale(&self, mirror: &mut Self::Mirror, geometry: &LaunchGeometry) -> ComputeResult<()>;

    /// Block until all launched work has completed.
    fn synchronize(&self) -> ComputeResult<()>;

    /// Copy the mirror back into the host buffer. Lengths must match.
    fn copy_out(&self, mirror: &Self::Mirror, dst: &mut [Pixel]) -> ComputeResult<()>;

    /// Device limits.
    fn limits(&self) -> &GpuLimits;

    /// Backend name.
    fn name(&self) -> &'static str;
}
