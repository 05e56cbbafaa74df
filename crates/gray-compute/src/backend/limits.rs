//! Device resource limits.
//!
//! Detected (or defaulted) capabilities used to validate launch geometry and
//! to reject mirror allocations the device cannot hold.

use crate::pixel::Pixel;

/// Memory safety margin: use at most 60% of device memory.
const VRAM_SAFETY_MARGIN: f64 = 0.4;

/// Default assumptions when device info is unavailable.
const DEFAULT_VRAM_BYTES: u64 = 2 * 1024 * 1024 * 1024; // 2 GB
const DEFAULT_MAX_GROUP_SIZE: u32 = 256;
const DEFAULT_MAX_GROUPS_PER_DIM: u32 = 65_535;
const DEFAULT_MAX_BUFFER_BYTES: u64 = 256 * 1024 * 1024; // 256 MB

/// Device resource limits.
#[derive(Debug, Clone)]
pub struct GpuLimits {
    /// Maximum invocations per group (threads per block / workgroup size).
    pub max_group_size: u32,
    /// Maximum number of groups along one grid dimension.
    pub max_groups_per_dim: u32,
    /// Maximum size of a single device buffer in bytes.
    pub max_buffer_bytes: u64,
    /// Total device memory in bytes (detected or estimated).
    pub total_memory: u64,
    /// Available device memory in bytes (after safety margin).
    pub available_memory: u64,
    /// Whether values were auto-detected vs defaults.
    pub detected: bool,
}

impl Default for GpuLimits {
    fn default() -> Self {
        Self {
            max_group_size: DEFAULT_MAX_GROUP_SIZE,
            max_groups_per_dim: DEFAULT_MAX_GROUPS_PER_DIM,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            total_memory: DEFAULT_VRAM_BYTES,
            available_memory: (DEFAULT_VRAM_BYTES as f64 * (1.0 - VRAM_SAFETY_MARGIN)) as u64,
            detected: false,
        }
    }
}

impl GpuLimits {
    /// Creates limits from wgpu adapter limits.
    #[cfg(feature = "wgpu")]
    pub fn from_wgpu_limits(limits: &wgpu::Limits, total_vram: Option<u64>) -> Self {
        let total = total_vram.unwrap_or(DEFAULT_VRAM_BYTES);
        let available = (total as f64 * (1.0 - VRAM_SAFETY_MARGIN)) as u64;
        let max_binding = limits.max_storage_buffer_binding_size as u64;

        Self {
            max_group_size: limits
                .max_compute_workgroup_size_x
                .min(limits.max_compute_invocations_per_workgroup),
            max_groups_per_dim: limits.max_compute_workgroups_per_dimension,
            max_buffer_bytes: limits.max_buffer_size.min(max_binding),
            total_memory: total,
            available_memory: available,
            detected: true,
        }
    }

    /// Bytes needed to mirror `count` pixels.
    #[inline]
    pub fn mirror_bytes(count: usize) -> u64 {
        (count as u64).saturating_mul(Pixel::SIZE as u64)
    }

    /// Largest pixel count a single mirror may hold.
    pub fn max_pixels(&self) -> u64 {
        self.max_buffer_bytes.min(self.available_memory) / Pixel::SIZE as u64
    }

    /// Check if a mirror of `count` pixels fits the device.
    pub fn fits_memory(&self, count: usize) -> bool {
        (count as u64) <= self.max_pixels()
    }

    /// Lower the buffer and memory limits to at most `bytes`.
    pub fn cap_memory(&mut self, bytes: u64) {
        self.max_buffer_bytes = self.max_buffer_bytes.min(bytes);
        self.available_memory = self.available_memory.min(bytes);
    }

    /// Allocation error for a mirror of `count` pixels that does not fit.
    pub(crate) fn exceeded(&self, count: usize) -> crate::ComputeError {
        crate::ComputeError::Allocation {
            bytes: Self::mirror_bytes(count),
            reason: format!(
                "exceeds device limit of {} bytes",
                self.max_buffer_bytes.min(self.available_memory)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = GpuLimits::default();
        assert!(!limits.detected);
        assert_eq!(limits.max_group_size, 256);
        assert!(limits.available_memory < limits.total_memory);
    }

    #[test]
    fn test_cap_memory() {
        let mut limits = GpuLimits::default();
        limits.cap_memory(1000);
        assert_eq!(limits.max_buffer_bytes, 1000);
        assert_eq!(limits.available_memory, 1000);
        assert_eq!(limits.max_pixels(), 250);

        // A cap never raises a limit.
        limits.cap_memory(u64::MAX);
        assert_eq!(limits.max_pixels(), 250);
        assert_eq!(limits.exceeded(251).status(), crate::Status::MemoryAllocation);
    }

    #[test]
    fn test_available_memory_bounds_pixels() {
        let limits = GpuLimits {
            max_buffer_bytes: u64::MAX,
            available_memory: 40,
            ..GpuLimits::default()
        };
        assert!(limits.fits_memory(10));
        assert!(!limits.fits_memory(11));
    }

    #[test]
    fn test_fits_memory() {
        let limits = GpuLimits {
            max_buffer_bytes: 64,
            available_memory: 1024,
            ..GpuLimits::default()
        };
        assert!(limits.fits_memory(16));
        assert!(!limits.fits_memory(17));
        assert_eq!(GpuLimits::mirror_bytes(17), 68);
    }
}
