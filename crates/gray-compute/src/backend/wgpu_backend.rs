//! wgpu backend implementation.
//!
//! Runs the grayscale kernel as a WGSL compute shader. Device errors are
//! captured with error scopes and reported as statuses instead of reaching
//! wgpu's uncaptured-error handler.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytemuck::{Pod, Zeroable};
use tracing::{debug, trace};
use wgpu::util::DeviceExt;

use super::{DeviceMirror, DevicePrimitives, GpuLimits, LaunchGeometry};
use crate::pixel::Pixel;
use crate::{ComputeError, ComputeResult, TransferDirection};
use crate::shaders;

// =============================================================================
// Uniform Buffers
// =============================================================================

/// Kernel parameters uniform: [count, grid_x, pad, pad]
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct ParamsUniform {
    count: u32,
    grid_x: u32,
    _pad: [u32; 2],
}

// =============================================================================
// WgpuMirror Handle
// =============================================================================

/// GPU storage buffer holding the pixel mirror.
///
/// The buffer is released when the handle is dropped.
pub struct WgpuMirror {
    buffer: wgpu::Buffer,
    count: usize,
    size_bytes: u64,
}

impl DeviceMirror for WgpuMirror {
    fn len(&self) -> usize {
        self.count
    }

    fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

// =============================================================================
// WgpuPrimitives
// =============================================================================

/// wgpu GPU primitives implementation.
pub struct WgpuPrimitives {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    /// Grayscale pipelines keyed by workgroup size.
    pipelines: Mutex<HashMap<u32, Arc<wgpu::ComputePipeline>>>,
    /// Held across every push/pop of an error scope. wgpu keeps one scope
    /// stack per device, so interleaved scopes would swap errors.
    scope_lock: Mutex<()>,
    adapter_name: String,
    limits: GpuLimits,
}

fn instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}

async fn request_adapter(instance: &wgpu::Instance) -> Option<wgpu::Adapter> {
    instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
}

impl WgpuPrimitives {
    /// Describe the adapter `new` would pick, or `None` if there is none.
    pub fn probe() -> Option<String> {
        pollster::block_on(async {
            let info = request_adapter(&instance()).await?.get_info();
            Some(format!("{} ({:?})", info.name, info.backend))
        })
    }

    /// Check if wgpu is available.
    pub fn is_available() -> bool {
        Self::probe().is_some()
    }

    /// Create new wgpu primitives.
    pub fn new() -> ComputeResult<Self> {
        pollster::block_on(Self::new_async())
    }

    /// Create new wgpu primitives asynchronously.
    pub async fn new_async() -> ComputeResult<Self> {
        let instance = instance();
        let adapter = request_adapter(&instance).await.ok_or(ComputeError::NoAdapter)?;

        let adapter_limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("gray_compute_device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter_limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
            }, None)
            .await
            .map_err(|e| ComputeError::DeviceCreation(e.to_string()))?;

        let adapter_info = adapter.get_info();
        let total_vram = estimate_vram(adapter_info.device_type, adapter_limits.max_buffer_size);
        let limits = GpuLimits::from_wgpu_limits(&adapter_limits, Some(total_vram));

        debug!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            max_group_size = limits.max_group_size,
            "wgpu device created"
        );

        let primitives = Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            pipelines: Mutex::new(HashMap::new()),
            scope_lock: Mutex::new(()),
            adapter_name: adapter_info.name,
            limits,
        };

        // Compile the default pipeline up front so shader errors surface at creation.
        let default_group = super::DEFAULT_GROUP_SIZE.min(primitives.limits.max_group_size);
        primitives.pipeline(default_group)?;

        Ok(primitives)
    }

    pub(crate) fn limits_mut(&mut self) -> &mut GpuLimits {
        &mut self.limits
    }

    /// Adapter (GPU) name.
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Get or build the grayscale pipeline for `group_size`.
    fn pipeline(&self, group_size: u32) -> ComputeResult<Arc<wgpu::ComputePipeline>> {
        let mut cache = self.pipelines.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(p) = cache.get(&group_size) {
            return Ok(Arc::clone(p));
        }

        trace!(group_size, "compiling grayscale pipeline");
        let source = shaders::grayscale(group_size);

        let (pipeline, err) = self.scoped(wgpu::ErrorFilter::Validation, || {
            let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("grayscale_shader"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("grayscale_pipeline"),
                layout: None, // Auto layout
                module: &module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            })
        });
        if let Some(err) = err {
            return Err(ComputeError::ShaderCompilation(err.to_string()));
        }

        let pipeline = Arc::new(pipeline);
        cache.insert(group_size, Arc::clone(&pipeline));
        Ok(pipeline)
    }

    /// Run `f` inside an error scope and return the captured error, if any.
    ///
    /// `f` must not call `scoped` itself.
    fn scoped<T>(&self, filter: wgpu::ErrorFilter, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
        let _guard = self.scope_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.device.push_error_scope(filter);
        let value = f();
        let err = pollster::block_on(self.device.pop_error_scope());
        (value, err)
    }
}

impl DevicePrimitives for WgpuPrimitives {
    type Mirror = WgpuMirror;

    fn allocate(&self, count: usize) -> ComputeResult<Self::Mirror> {
        if !self.limits.fits_memory(count) {
            return Err(self.limits.exceeded(count));
        }

        let size_bytes = GpuLimits::mirror_bytes(count);

        let (buffer, err) = self.scoped(wgpu::ErrorFilter::OutOfMemory, || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("pixel_mirror"),
                size: size_bytes,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        if let Some(err) = err {
            return Err(ComputeError::Allocation { bytes: size_bytes, reason: err.to_string() });
        }

        Ok(WgpuMirror { buffer, count, size_bytes })
    }

    fn copy_in(&self, mirror: &mut Self::Mirror, src: &[Pixel]) -> ComputeResult<()> {
        if src.len() != mirror.count {
            return Err(ComputeError::Transfer {
                direction: TransferDirection::HostToDevice,
                reason: format!("mirror holds {} pixels, host buffer {}", mirror.count, src.len()),
            });
        }

        let ((), err) = self.scoped(wgpu::ErrorFilter::Validation, || {
            self.queue.write_buffer(&mirror.buffer, 0, bytemuck::cast_slice(src));
            self.queue.submit(std::iter::empty());
        });
        if let Some(err) = err {
            return Err(ComputeError::Transfer {
                direction: TransferDirection::HostToDevice,
                reason: err.to_string(),
            });
        }
        Ok(())
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

        let pipeline = self.pipeline(geometry.group_size)?;

        let params = ParamsUniform { count: geometry.count, grid_x: geometry.grid.0, _pad: [0; 2] };
        let ((), err) = self.scoped(wgpu::ErrorFilter::Validation, || {
            let params_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("params_uniform"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });

            let layout = pipeline.get_bind_group_layout(0);
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("grayscale_bind_group"),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: mirror.buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: params_buf.as_entire_binding() },
                ],
            });

            let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("grayscale_encoder"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("grayscale_pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(geometry.grid.0, geometry.grid.1, 1);
            }
            self.queue.submit(std::iter::once(encoder.finish()));
        });
        if let Some(err) = err {
            return Err(ComputeError::Launch(err.to_string()));
        }
        Ok(())
    }

    fn synchronize(&self) -> ComputeResult<()> {
        self.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }

    fn copy_out(&self, mirror: &Self::Mirror, dst: &mut [Pixel]) -> ComputeResult<()> {
        let transfer_err = |reason: String| ComputeError::Transfer {
            direction: TransferDirection::DeviceToHost,
            reason,
        };

        if dst.len() != mirror.count {
            return Err(transfer_err(format!(
                "mirror holds {} pixels, host buffer {}",
                mirror.count,
                dst.len()
            )));
        }
        if mirror.count == 0 {
            return Ok(());
        }

        let size = mirror.size_bytes;

        // Create staging buffer
        let (staging, err) = self.scoped(wgpu::ErrorFilter::Validation, || {
            let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("staging_buffer"),
                size,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            });

            let mut encoder = self.device.create_command_encoder(&Default::default());
            encoder.copy_buffer_to_buffer(&mirror.buffer, 0, &staging, 0, size);
            self.queue.submit(std::iter::once(encoder.finish()));
            staging
        });
        if let Some(err) = err {
            return Err(transfer_err(err.to_string()));
        }

        // Map and read
        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| { let _ = tx.send(r); });
        self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|_| transfer_err("map channel closed".into()))?
            .map_err(|e| transfer_err(format!("map failed: {e}")))?;

        {
            let mapped = slice.get_mapped_range();
            let pixels: &[Pixel] = bytemuck::cast_slice(&mapped);
            dst.copy_from_slice(pixels);
        }
        staging.unmap();

        Ok(())
    }

    fn limits(&self) -> &GpuLimits {
        &self.limits
    }

    fn name(&self) -> &'static str {
        "wgpu"
    }
}

// =============================================================================
// VRAM Detection
// =============================================================================

/// Rough VRAM estimate; wgpu exposes no memory query.
fn estimate_vram(device_type: wgpu::DeviceType, max_buffer_bytes: u64) -> u64 {
    let from_buffer = max_buffer_bytes.saturating_mul(2);

    match device_type {
        wgpu::DeviceType::DiscreteGpu => from_buffer.clamp(2u64 << 30, 24u64 << 30),
        wgpu::DeviceType::IntegratedGpu => from_buffer.clamp(512u64 << 20, 4u64 << 30),
        wgpu::DeviceType::VirtualGpu => from_buffer.clamp(1u64 << 30, 8u64 << 30),
        _ => from_buffer.clamp(256u64 << 20, 2u64 << 30),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<ParamsUniform>(), 16);
    }

    #[test]
    fn test_vram_estimate_bounds() {
        let integrated = wgpu::DeviceType::IntegratedGpu;
        assert_eq!(estimate_vram(integrated, 1 << 20), 512u64 << 20);
        assert_eq!(estimate_vram(integrated, u64::MAX), 4u64 << 30);
    }

    #[test]
    fn test_wgpu_grayscale() {
        if !WgpuPrimitives::is_available() {
            println!("wgpu not available, skipping");
            return;
        }
        let gpu = WgpuPrimitives::new().unwrap();
        println!("adapter: {}", gpu.adapter_name());

        let mut pixels = vec![
            Pixel::rgb(255, 0, 0),
            Pixel::rgb(0, 255, 0),
            Pixel::rgb(0, 0, 250),
            Pixel::new(7, 7, 7, 99),
        ];
        crate::run_grayscale(&gpu, &mut pixels, 64).unwrap();
        assert_eq!(pixels.iter().map(|p| p.gray).collect::<Vec<_>>(), vec![76, 150, 29, 7]);
        assert_eq!((pixels[3].r, pixels[3].g, pixels[3].b), (7, 7, 7));
    }

    #[test]
    fn test_wgpu_oversized_group() {
        if !WgpuPrimitives::is_available() {
            return;
        }
        let gpu = WgpuPrimitives::new().unwrap();
        let too_big = gpu.limits().max_group_size + 1;
        let err = crate::run_grayscale(&gpu, &mut [Pixel::splat(1); 4], too_big).unwrap_err();
        assert_eq!(err.status(), crate::Status::InvalidConfiguration);
    }

    #[test]
    fn test_wgpu_concurrent_errors_stay_with_caller() {
        if !WgpuPrimitives::is_available() {
            return;
        }
        let gpu = WgpuPrimitives::new().unwrap();
        let group_size = crate::backend::DEFAULT_GROUP_SIZE.min(gpu.limits().max_group_size);
        let rounds = 200;

        std::thread::scope(|s| {
            let valid = s.spawn(|| {
                (0..rounds)
                    .filter(|i| {
                        let mut pixels = vec![Pixel::rgb((*i % 256) as u8, 10, 20); 1000];
                        crate::run_grayscale(&gpu, &mut pixels, group_size).is_err()
                    })
                    .count()
            });
            let invalid = s.spawn(|| {
                let mut mirror = gpu.allocate(16).unwrap();
                let geometry = LaunchGeometry {
                    count: 16,
                    group_size,
                    groups: 1,
                    grid: (gpu.limits().max_groups_per_dim.saturating_add(1), 1),
                };
                (0..rounds)
                    .filter(|_| gpu.launch_grayscale(&mut mirror, &geometry).is_ok())
                    .count()
            });

            assert_eq!(valid.join().unwrap(), 0, "valid calls failed");
            assert_eq!(invalid.join().unwrap(), 0, "oversized dispatches reported Ok");
        });
    }
}
