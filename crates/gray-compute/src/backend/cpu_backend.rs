//! CPU backend using rayon for parallelization.
//!
//! Emulates the device model: the mirror is a separate RAM allocation, copies
//! are explicit, and each launch group runs as one rayon task.

use rayon::prelude::*;

use super::memory::{available_system_memory, system_memory};
use super::{DeviceMirror, DevicePrimitives, GpuLimits, LaunchGeometry};
use crate::pixel::{Pixel, grayscale_kernel};
use crate::{ComputeError, ComputeResult, TransferDirection};

/// CPU mirror - pixel data stored in RAM.
#[derive(Debug)]
pub struct CpuMirror {
    data: Vec<Pixel>,
}

impl DeviceMirror for CpuMirror {
    fn len(&self) -> usize {
        self.data.len()
    }
}

/// CPU primitives implementation.
#[derive(Debug)]
pub struct CpuPrimitives {
    limits: GpuLimits,
}

impl CpuPrimitives {
    pub fn new() -> Self {
        let available = available_system_memory();

        Self {
            limits: GpuLimits {
                max_group_size: u32::MAX,
                max_groups_per_dim: u32::MAX,
                max_buffer_bytes: u64::MAX,
                total_memory: system_memory(),
                available_memory: available,
                detected: true,
            },
        }
    }

    pub(crate) fn limits_mut(&mut self) -> &mut GpuLimits {
        &mut self.limits
    }
}

impl Default for CpuPrimitives {
    fn default() -> Self {
        Self::new()
    }
}

fn check_len(direction: TransferDirection, mirror: usize, host: usize) -> ComputeResult<()> {
    if mirror != host {
        return Err(ComputeError::Transfer {
            direction,
            reason: format!("mirror holds {mirror} pixels, host buffer {host}"),
        });
    }
    Ok(())
}

impl DevicePrimitives for CpuPrimitives {
    type Mirror = CpuMirror;

    fn allocate(&self, count: usize) -> ComputeResult<Self::Mirror> {
        if !self.limits.fits_memory(count) {
            return Err(self.limits.exceeded(count));
        }

        let bytes = GpuLimits::mirror_bytes(count);
        let mut data = Vec::new();
        data.try_reserve_exact(count).map_err(|e| ComputeError::Allocation {
            bytes,
            reason: e.to_string(),
        })?;
        data.resize(count, Pixel::default());
        Ok(CpuMirror { data })
    }

    fn copy_in(&self, mirror: &mut Self::Mirror, src: &[Pixel]) -> ComputeResult<()> {
        check_len(TransferDirection::HostToDevice, mirror.len(), src.len())?;
        mirror.data.copy_from_slice(src);
        Ok(())
    }

    fn launch_grayscale(&self, mirror: &mut Self::Mirror, geometry: &LaunchGeometry) -> ComputeResult<()> {
        if geometry.count as usize != mirror.len() {
            return Err(ComputeError::Launch(format!(
                "geometry covers {} pixels, mirror holds {}",
                geometry.count,
                mirror.len()
            )));
        }
        if geometry.count == 0 {
            return Ok(());
        }

        let group_size = geometry.group_size as usize;
        mirror.data
            .par_chunks_mut(group_size)
            .for_each(|group| {
                // The last group may be short; its padding lanes have no pixel.
                for lane in 0..group.len() {
                    grayscale_kernel(lane, group);
                }
            });

        Ok(())
    }

    fn synchronize(&self) -> ComputeResult<()> {
        // rayon joins every group before launch_grayscale returns
        Ok(())
    }

    fn copy_out(&self, mirror: &Self::Mirror, dst: &mut [Pixel]) -> ComputeResult<()> {
        check_len(TransferDirection::DeviceToHost, mirror.len(), dst.len())?;
        dst.copy_from_slice(&mirror.data);
        Ok(())
    }

    fn limits(&self) -> &GpuLimits {
        &self.limits
    }

    fn name(&self) -> &'static str {
        "CPU"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_respects_cap() {
        let mut cpu = CpuPrimitives::new();
        cpu.limits_mut().cap_memory(16);
        assert_eq!(cpu.allocate(4).unwrap().size_bytes(), 16);

        let err = cpu.allocate(5).unwrap_err();
        assert_eq!(err.status(), crate::Status::MemoryAllocation);
    }

    #[test]
    fn test_copy_length_mismatch() {
        let cpu = CpuPrimitives::new();
        let mut mirror = cpu.allocate(3).unwrap();
        let err = cpu.copy_in(&mut mirror, &[Pixel::default(); 2]).unwrap_err();
        assert!(matches!(
            err,
            ComputeError::Transfer { direction: TransferDirection::HostToDevice, .. }
        ));
    }

    #[test]
    fn test_launch_partial_group() {
        let cpu = CpuPrimitives::new();
        let src: Vec<Pixel> = (0..5u8).map(|i| Pixel::rgb(i * 50, 0, 0)).collect();
        let mut mirror = cpu.allocate(src.len()).unwrap();
        cpu.copy_in(&mut mirror, &src).unwrap();

        let geometry = LaunchGeometry::for_elements(5, 2, cpu.limits()).unwrap();
        cpu.launch_grayscale(&mut mirror, &geometry).unwrap();
        cpu.synchronize().unwrap();

        let mut out = vec![Pixel::default(); src.len()];
        cpu.copy_out(&mirror, &mut out).unwrap();
        for (px, orig) in out.iter().zip(&src) {
            assert_eq!(px.gray, orig.luma());
            assert_eq!((px.r, px.g, px.b), (orig.r, orig.g, orig.b));
        }
    }

    #[test]
    fn test_huge_group_runs_only_live_lanes() {
        let cpu = CpuPrimitives::new();
        let src = [Pixel::rgb(255, 0, 0), Pixel::rgb(0, 255, 0), Pixel::rgb(0, 0, 255)];
        let mut mirror = cpu.allocate(src.len()).unwrap();
        cpu.copy_in(&mut mirror, &src).unwrap();

        let geometry = LaunchGeometry::for_elements(3, 1 << 31, cpu.limits()).unwrap();
        let start = std::time::Instant::now();
        cpu.launch_grayscale(&mut mirror, &geometry).unwrap();
        assert!(start.elapsed() < std::time::Duration::from_millis(500));

        let mut out = [Pixel::default(); 3];
        cpu.copy_out(&mirror, &mut out).unwrap();
        assert_eq!(out.map(|p| p.gray), [76, 150, 29]);
    }

    #[test]
    fn test_launch_geometry_mismatch() {
        let cpu = CpuPrimitives::new();
        let mut mirror = cpu.allocate(4).unwrap();
        let geometry = LaunchGeometry::for_elements(8, 4, cpu.limits()).unwrap();
        let err = cpu.launch_grayscale(&mut mirror, &geometry).unwrap_err();
        assert_eq!(err.status(), crate::Status::LaunchFailure);
    }
}
