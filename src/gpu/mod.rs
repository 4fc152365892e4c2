// SPDX-License-Identifier: GPL-3.0-only

//! GPU initialization for the compute pipelines.
//!
//! There is exactly one device per process. Failing to get one is fatal for
//! the GPU path; callers either report [`GpuError`] or fall back to the CPU
//! reference backend when the user asked for it explicitly.

use crate::errors::GpuError;
use std::sync::Arc;
use tracing::{debug, info};

pub use wgpu;

/// Information about the created GPU device
#[derive(Debug, Clone)]
pub struct GpuDeviceInfo {
    /// Name of the GPU adapter
    pub adapter_name: String,
    /// Backend being used (Vulkan, Metal, DX12, etc.)
    pub backend: wgpu::Backend,
    /// Largest 2D texture edge the device accepts
    pub max_texture_dimension: u32,
}

/// Device and queue shared by the bridge and the renderer
#[derive(Clone)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub info: GpuDeviceInfo,
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext").field("info", &self.info).finish()
    }
}

/// Create a wgpu device and queue for compute work.
///
/// # Arguments
///
/// * `label` - A label for the device (for debugging)
pub async fn create_compute_device(label: &str) -> Result<GpuContext, GpuError> {
    info!(label = label, "Creating GPU device for compute");

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| GpuError::NoAdapter(e.to_string()))?;

    let adapter_info = adapter.get_info();
    let adapter_limits = adapter.limits();

    info!(
        adapter = %adapter_info.name,
        backend = ?adapter_info.backend,
        "GPU adapter selected for compute"
    );
    debug!(
        max_texture_dimension = adapter_limits.max_texture_dimension_2d,
        max_storage_buffer = adapter_limits.max_storage_buffer_binding_size,
        "Adapter limits"
    );

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: adapter_limits.clone(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        })
        .await
        .map_err(|e| GpuError::DeviceCreation(e.to_string()))?;

    let info = GpuDeviceInfo {
        adapter_name: adapter_info.name.clone(),
        backend: adapter_info.backend,
        max_texture_dimension: adapter_limits.max_texture_dimension_2d,
    };

    Ok(GpuContext {
        device: Arc::new(device),
        queue: Arc::new(queue),
        info,
    })
}

/// Blocking variant for worker threads that have no executor
pub fn create_compute_device_blocking(label: &str) -> Result<GpuContext, GpuError> {
    pollster::block_on(create_compute_device(label))
}
