//! Launch geometry for one-invocation-per-pixel kernels.
//!
//! `count` elements are partitioned into groups of `group_size` invocations,
//! with enough groups to cover every element. The last group is partial when
//! `count` is not a multiple of `group_size`; kernels guard on `i >= count`.
//!
//! When the group count exceeds the device's per-dimension limit the groups
//! are laid out on a 2-D grid, and the global index becomes
//! `(group_y * grid_x + group_x) * group_size + lane`.

use crate::{ComputeError, ComputeResult};
use super::GpuLimits;

/// Default invocations per group.
pub const DEFAULT_GROUP_SIZE: u32 = 256;

/// Partition of `count` elements into parallel groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    /// Number of elements (pixels).
    pub count: u32,
    /// Invocations per group.
    pub group_size: u32,
    /// Number of groups actually needed.
    pub groups: u32,
    /// Grid dimensions `(x, y)`; `x * y >= groups`.
    pub grid: (u32, u32),
}

impl LaunchGeometry {
    /// Compute geometry for `count` elements.
    ///
    /// Fails when `group_size` is zero or above the device maximum, or the
    /// groups do not fit a 2-D grid.
    pub fn for_elements(count: u32, group_size: u32, limits: &GpuLimits) -> ComputeResult<Self> {
        if group_size == 0 {
            return Err(ComputeError::InvalidGeometry("group size must be non-zero".into()));
        }
        if group_size > limits.max_group_size {
            return Err(ComputeError::InvalidGeometry(format!(
                "group size {group_size} exceeds device maximum {}",
                limits.max_group_size
            )));
        }

        let groups = count.div_ceil(group_size);
        let max_dim = limits.max_groups_per_dim.max(1);

        let grid = if groups <= max_dim {
            (groups, 1)
        } else {
            let rows = groups.div_ceil(max_dim);
            if rows > max_dim {
                return Err(ComputeError::InvalidGeometry(format!(
                    "{groups} groups exceed a {max_dim}x{max_dim} grid"
                )));
            }
            (max_dim, rows)
        };

        Ok(Self { count, group_size, groups, grid })
    }

    /// Total invocations launched, including the padding of the last group
    /// and of the last grid row.
    #[inline]
    pub fn invocations(&self) -> u64 {
        self.grid.0 as u64 * self.grid.1 as u64 * self.group_size as u64
    }
}
