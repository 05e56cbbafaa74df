//! Grayscale processor and host orchestration.
//!
//! [`run_grayscale`] drives one conversion on any [`DevicePrimitives`]
//! implementation: allocate a mirror, copy in, launch, synchronize, copy
//! out. Every failing step goes through [`device_fail`], which releases the
//! mirror, logs the failure and hands the error back unchanged.
//!
//! # Configuration
//!
//! Use [`ProcessorBuilder`] for fine-grained control:
//!
//! ```
//! use gray_compute::{Backend, ProcessorBuilder};
//!
//! let proc = ProcessorBuilder::new()
//!     .backend(Backend::Cpu)
//!     .group_size(128)
//!     .device_memory_mb(64)
//!     .build()?;
//! assert_eq!(proc.backend_name(), "CPU");
//! # Ok::<(), gray_compute::ComputeError>(())
//! ```

use tracing::{debug, error, info, trace};

use crate::backend::memory::{EnvOverrides, format_bytes};
use crate::backend::{
    AnyDevice, Backend, DeviceMirror, DevicePrimitives, GpuLimits, LaunchGeometry,
    DEFAULT_GROUP_SIZE, create_device,
};
use crate::pixel::Pixel;
use crate::{ComputeError, ComputeResult};

// ============================================================================
// Configuration
// ============================================================================

/// Processing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Backend to create.
    pub backend: Backend,
    /// Invocations per launch group.
    pub group_size: u32,
    /// Cap on mirror size in bytes (None = device limits).
    pub device_memory: Option<u64>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Auto,
            group_size: DEFAULT_GROUP_SIZE,
            device_memory: None,
        }
    }
}

impl ProcessorConfig {
    /// Default config with `GRAY_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::from_overrides(&EnvOverrides::from_env())
    }

    /// Default config with the given overrides applied.
    pub fn from_overrides(env: &EnvOverrides) -> Self {
        let mut config = Self::default();
        if let Some(backend) = env.backend {
            config.backend = backend;
        }
        if let Some(size) = env.group_size {
            config.group_size = size;
        }
        if env.device_memory.is_some() {
            config.device_memory = env.device_memory;
        }
        config
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Processor`] with configuration options.
#[derive(Debug, Clone, Default)]
pub struct ProcessorBuilder {
    config: ProcessorConfig,
}

impl ProcessorBuilder {
    /// Create new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing config.
    pub fn with_config(config: ProcessorConfig) -> Self {
        Self { config }
    }

    /// Set compute backend.
    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    /// Set invocations per launch group.
    ///
    /// Not validated here; an unsupported size fails the launch with
    /// `InvalidConfiguration`.
    pub fn group_size(mut self, size: u32) -> Self {
        self.config.group_size = size;
        self
    }

    /// Cap device memory in bytes.
    ///
    /// Applies to every backend. It can only lower the detected limit.
    pub fn device_memory(mut self, bytes: u64) -> Self {
        self.config.device_memory = Some(bytes);
        self
    }

    /// Cap device memory in megabytes.
    pub fn device_memory_mb(mut self, mb: u64) -> Self {
        self.config.device_memory = Some(mb.saturating_mul(1024 * 1024));
        self
    }

    /// Build the Processor.
    pub fn build(self) -> ComputeResult<Processor> {
        Processor::with_config(self.config)
    }
}

// ============================================================================
// Processor
// ============================================================================

/// Grayscale processor bound to one compute device.
///
/// `Processor` is `Send + Sync`; concurrent calls each own their mirror.
///
/// # Example
/// ```
/// use gray_compute::{Pixel, Processor};
///
/// let proc = Processor::cpu()?;
/// let mut pixels = vec![Pixel::splat(200); 1000];
/// proc.grayscale(&mut pixels)?;
/// assert!(pixels.iter().all(|p| p.gray == 200));
/// # Ok::<(), gray_compute::ComputeError>(())
/// ```
pub struct Processor {
    device: AnyDevice,
    config: ProcessorConfig,
}

impl Processor {
    /// Create with specified backend and default config.
    pub fn new(backend: Backend) -> ComputeResult<Self> {
        Self::with_config(ProcessorConfig { backend, ..ProcessorConfig::default() })
    }

    /// Create with custom config.
    pub fn with_config(config: ProcessorConfig) -> ComputeResult<Self> {
        let device = create_device(config.backend, config.device_memory)?;
        info!(
            backend = device.name(),
            group_size = config.group_size,
            memory = %format_bytes(device.limits().available_memory),
            "compute backend ready"
        );
        Ok(Self { device, config })
    }

    /// Create builder for fine-grained configuration.
    pub fn builder() -> ProcessorBuilder {
        ProcessorBuilder::new()
    }

    /// Create with auto-selected backend (GPU if available, else CPU).
    pub fn auto() -> ComputeResult<Self> {
        Self::new(Backend::Auto)
    }

    /// Create with CPU backend.
    pub fn cpu() -> ComputeResult<Self> {
        Self::new(Backend::Cpu)
    }

    /// Create from `GRAY_*` environment variables.
    pub fn from_env() -> ComputeResult<Self> {
        Self::with_config(ProcessorConfig::from_env())
    }

    /// Name of the backend in use.
    pub fn backend_name(&self) -> &'static str {
        self.device.name()
    }

    /// Active configuration.
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Device limits.
    pub fn limits(&self) -> &GpuLimits {
        self.device.limits()
    }

    /// Write the luma of every pixel into its `gray` field.
    ///
    /// On error `gray` fields are unreliable; `r`, `g`, `b` are never touched.
    pub fn grayscale(&self, pixels: &mut [Pixel]) -> ComputeResult<()> {
        let group_size = self.config.group_size;
        match &self.device {
            AnyDevice::Cpu(d) => run_grayscale(d, pixels, group_size),
            #[cfg(feature = "wgpu")]
            AnyDevice::Wgpu(d) => run_grayscale(d, pixels, group_size),
            #[cfg(feature = "cuda")]
            AnyDevice::Cuda(d) => run_grayscale(d, pixels, group_size),
        }
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("device", &self.device)
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// Orchestration
// ============================================================================

/// Convert `pixels` in place on `gpu`.
///
/// A zero-length buffer succeeds without touching the device. Buffers longer
/// than `u32::MAX` are rejected with `InvalidInput`. For failures at or
/// before copy-in the buffer is left exactly as supplied.
pub fn run_grayscale<G: DevicePrimitives>(
    gpu: &G,
    pixels: &mut [Pixel],
    group_size: u32,
) -> ComputeResult<()> {
    let count = match u32::try_from(pixels.len()) {
        Ok(n) => n,
        Err(_) => {
            let err = ComputeError::InvalidInput(format!(
                "{} pixels exceed the 32-bit element index",
                pixels.len()
            ));
            return Err(device_fail::<G::Mirror>("Invalid pixel count", None, err));
        }
    };
    if count == 0 {
        trace!("empty buffer, nothing to do");
        return Ok(());
    }

    debug!(
        backend = gpu.name(),
        count,
        bytes = GpuLimits::mirror_bytes(pixels.len()),
        "allocating device mirror"
    );
    let mut mirror = match gpu.allocate(pixels.len()) {
        Ok(m) => m,
        Err(e) => return Err(device_fail::<G::Mirror>("Failed to allocate device memory", None, e)),
    };

    if let Err(e) = gpu.copy_in(&mut mirror, pixels) {
        return Err(device_fail("Failed to copy pixels to device", Some(mirror), e));
    }

    let geometry = match LaunchGeometry::for_elements(count, group_size, gpu.limits()) {
        Ok(g) => g,
        Err(e) => return Err(device_fail("Invalid launch configuration", Some(mirror), e)),
    };
    trace!(
        groups = geometry.groups,
        grid_x = geometry.grid.0,
        grid_y = geometry.grid.1,
        group_size = geometry.group_size,
        invocations = geometry.invocations(),
        "launching grayscale kernel"
    );

    if let Err(e) = gpu.launch_grayscale(&mut mirror, &geometry) {
        return Err(device_fail("Failed to launch grayscale kernel", Some(mirror), e));
    }
    if let Err(e) = gpu.synchronize() {
        return Err(device_fail("Failed to synchronize device", Some(mirror), e));
    }

    if let Err(e) = gpu.copy_out(&mirror, pixels) {
        return Err(device_fail("Failed to copy pixels from device", Some(mirror), e));
    }

    drop(mirror);
    debug!(count, "grayscale complete");
    Ok(())
}

/// Release `mirror`, log `message` with the error's status, return `err`.
pub(crate) fn device_fail<M: DeviceMirror>(
    message: &str,
    mirror: Option<M>,
    err: ComputeError,
) -> ComputeError {
    drop(mirror);
    let status = err.status();
    error!(
        status = status.code(),
        description = status.description(),
        error = %err,
        "{message}"
    );
    err
}
