//! Memory detection and environment overrides.
//!
//! # Environment Variables
//!
//! - `GRAY_BACKEND` - Backend to use (`auto`, `cpu`, `wgpu`, `cuda`)
//! - `GRAY_GROUP_SIZE` - Invocations per launch group (1-1024)
//! - `GRAY_DEVICE_MEM_MB` - Cap on device memory a mirror may use, in megabytes
//!
//! Malformed values are ignored with a warning.

use std::env;
use std::sync::OnceLock;

use tracing::warn;

use super::Backend;

/// Backend override variable.
pub const ENV_BACKEND: &str = "GRAY_BACKEND";
/// Group size override variable.
pub const ENV_GROUP_SIZE: &str = "GRAY_GROUP_SIZE";
/// Device memory cap variable.
pub const ENV_DEVICE_MEM_MB: &str = "GRAY_DEVICE_MEM_MB";

/// Largest group size accepted from the environment.
pub const MAX_ENV_GROUP_SIZE: u32 = 1024;

/// Cache for system memory detection.
static SYSTEM_MEMORY: OnceLock<u64> = OnceLock::new();

/// Detect total system RAM in bytes.
pub fn system_memory() -> u64 {
    *SYSTEM_MEMORY.get_or_init(|| {
        sys_info::mem_info()
            .map(|m| m.total * 1024) // KB to bytes
            .unwrap_or(8 * 1024 * 1024 * 1024) // 8 GB fallback
    })
}

/// Currently available system RAM in bytes.
pub fn available_system_memory() -> u64 {
    sys_info::mem_info()
        .map(|m| m.avail * 1024)
        .unwrap_or(4 * 1024 * 1024 * 1024)
}

/// Overrides read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// `GRAY_BACKEND`.
    pub backend: Option<Backend>,
    /// `GRAY_GROUP_SIZE`.
    pub group_size: Option<u32>,
    /// `GRAY_DEVICE_MEM_MB`, converted to bytes.
    pub device_memory: Option<u64>,
}

impl EnvOverrides {
    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read overrides through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = lookup(ENV_BACKEND).and_then(|v| match v.parse::<Backend>() {
            Ok(b) => Some(b),
            Err(_) => {
                warn!(var = ENV_BACKEND, value = %v, "ignoring unknown backend");
                None
            }
        });

        let group_size = lookup(ENV_GROUP_SIZE).and_then(|v| {
            match v.trim().parse::<u32>() {
                Ok(n) if (1..=MAX_ENV_GROUP_SIZE).contains(&n) => Some(n),
                _ => {
                    warn!(var = ENV_GROUP_SIZE, value = %v, "ignoring invalid group size");
                    None
                }
            }
        });

        let device_memory = lookup(ENV_DEVICE_MEM_MB).and_then(|v| {
            match v.trim().parse::<u64>() {
                Ok(mb) => Some(mb.saturating_mul(1024 * 1024)),
                Err(_) => {
                    warn!(var = ENV_DEVICE_MEM_MB, value = %v, "ignoring invalid memory cap");
                    None
                }
            }
        });

        Self { backend, group_size, device_memory }
    }
}

/// Format bytes as human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{} KB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
