// SPDX-License-Identifier: GPL-3.0-only

//! Compute renderer and presentable surface
//!
//! Runs the invariant or pass-through program over the current image into
//! the next slot of a small ring of storage textures, then presents the slot
//! by copying it back and publishing it as the newest [`PresentedFrame`].
//!
//! Both programs share one bind group layout:
//!
//! | binding | resource                               |
//! |---------|----------------------------------------|
//! | 0       | source texture (RGBA or BGRA)          |
//! | 1       | output storage texture (`rgba8unorm`)  |
//! | 2       | uniform `alpha: f32`                   |
//! | 3       | log table, 256 × `f32`                 |

use super::bridge::GpuImage;
use super::gpu_processor::{
    CachedDimensions, compute_dispatch_size, padded_bytes_per_row, read_buffer_async, unpad_rows,
};
use super::{INVARIANT_SHADER, PASSTHROUGH_SHADER};
use crate::constants::gpu::{SURFACE_SLOT_COUNT, TILE_SIZE};
use crate::errors::{GpuError, RenderError};
use crate::gpu::{GpuContext, wgpu};
use crate::invariant::{PipelineVariant, SharedParameters, log_table};
use crate::pipelines::{FramePresenter, FramePublisher, PresentedFrame};
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Uniform block, one `f32` at offset 0
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct AlphaUniform {
    alpha: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenderState {
    Idle,
    Encoding,
    Presenting,
}

struct SurfaceSlot {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    readback: wgpu::Buffer,
}

/// Ring of drawable targets sized to the current image
pub struct SurfaceRing {
    slots: Vec<SurfaceSlot>,
    slot_count: usize,
    dims: CachedDimensions,
    padded_row: u32,
    next: usize,
}

impl SurfaceRing {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: Vec::with_capacity(slot_count.max(1)),
            slot_count: slot_count.max(1),
            dims: CachedDimensions::default(),
            padded_row: 0,
            next: 0,
        }
    }

    /// Current drawable size, zero before the first frame
    pub fn dimensions(&self) -> (u32, u32) {
        (self.dims.width, self.dims.height)
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Index of the slot the next acquire hands out
    pub fn next_slot(&self) -> usize {
        self.next
    }

    /// Take the next slot, reallocating all of them if the size changed
    fn acquire(&mut self, device: &wgpu::Device, width: u32, height: u32) -> usize {
        if self.dims.needs_update(width, height) {
            self.resize(device, width, height);
        }
        let index = self.next;
        self.next = (self.next + 1) % self.slot_count;
        index
    }

    fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        info!(width, height, slots = self.slot_count, "Resizing presentable surface");

        self.padded_row = padded_bytes_per_row(width);
        let readback_size = self.padded_row as u64 * height as u64;

        self.slots = (0..self.slot_count)
            .map(|i| {
                let texture = device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(&format!("surface_slot_{}", i)),
                    size: wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                });
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                let readback = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("surface_readback_{}", i)),
                    size: readback_size,
                    usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                    mapped_at_creation: false,
                });
                SurfaceSlot {
                    texture,
                    view,
                    readback,
                }
            })
            .collect();

        self.dims.update(width, height);
        self.next = 0;
    }
}

/// GPU implementation of [`FramePresenter`]
pub struct ComputeRenderer {
    ctx: GpuContext,
    bind_group_layout: wgpu::BindGroupLayout,
    invariant_pipeline: wgpu::ComputePipeline,
    passthrough_pipeline: wgpu::ComputePipeline,
    uniform_buffer: wgpu::Buffer,
    log_table_buffer: wgpu::Buffer,
    surface: SurfaceRing,
    params: SharedParameters,
    publisher: FramePublisher,
    device_lost: Arc<AtomicBool>,
    state: RenderState,
}

impl ComputeRenderer {
    /// Build both programs and upload the log table.
    ///
    /// Failing to build either program is fatal.
    pub fn new(
        ctx: GpuContext,
        params: SharedParameters,
        publisher: FramePublisher,
    ) -> Result<Self, GpuError> {
        info!("Initializing compute renderer");
        let device = &ctx.device;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("invariance_bind_group_layout"),
            entries: &[
                // Source texture
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // Output storage texture
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::Rgba8Unorm,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
                // Alpha uniform
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(std::mem::size_of::<AlphaUniform>() as u64),
                    },
                    count: None,
                },
                // Log table
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("invariance_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let invariant_pipeline = build_program(
            device,
            &pipeline_layout,
            PipelineVariant::Invariant,
            INVARIANT_SHADER,
        )?;
        let passthrough_pipeline = build_program(
            device,
            &pipeline_layout,
            PipelineVariant::PassThrough,
            PASSTHROUGH_SHADER,
        )?;

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("alpha_uniform_buffer"),
            size: std::mem::size_of::<AlphaUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let table = log_table().to_gpu_values();
        let log_table_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("log_table_buffer"),
            size: std::mem::size_of_val(&table) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        ctx.queue
            .write_buffer(&log_table_buffer, 0, bytemuck::cast_slice(&table));

        let device_lost = Arc::new(AtomicBool::new(false));
        let lost_flag = Arc::clone(&device_lost);
        device.set_device_lost_callback(move |reason, message| {
            warn!(?reason, %message, "GPU device lost");
            lost_flag.store(true, Ordering::SeqCst);
        });

        Ok(Self {
            bind_group_layout,
            invariant_pipeline,
            passthrough_pipeline,
            uniform_buffer,
            log_table_buffer,
            surface: SurfaceRing::new(SURFACE_SLOT_COUNT),
            params,
            publisher,
            device_lost,
            state: RenderState::Idle,
            ctx,
        })
    }

    /// True between frames
    pub fn is_idle(&self) -> bool {
        self.state == RenderState::Idle
    }

    /// The presentable surface
    pub fn surface(&self) -> &SurfaceRing {
        &self.surface
    }

    fn pipeline_for(&self, variant: PipelineVariant) -> &wgpu::ComputePipeline {
        match variant {
            PipelineVariant::Invariant => &self.invariant_pipeline,
            PipelineVariant::PassThrough => &self.passthrough_pipeline,
        }
    }

    /// Encode and submit one frame; returns the slot it was drawn into
    fn encode(&mut self, image: &GpuImage) -> usize {
        self.state = RenderState::Encoding;

        let params = self.params.snapshot();
        let variant = params.variant();
        let (width, height) = (image.width(), image.height());

        self.ctx.queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&AlphaUniform {
                alpha: params.alpha,
            }),
        );

        let slot_index = self.surface.acquire(&self.ctx.device, width, height);
        let slot = &self.surface.slots[slot_index];

        let bind_group = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("invariance_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(image.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&slot.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.log_table_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("invariance_encoder"),
            });

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("invariance_compute_pass"),
                timestamp_writes: None,
            });

            compute_pass.set_pipeline(self.pipeline_for(variant));
            compute_pass.set_bind_group(0, Some(&bind_group), &[]);

            // Partial edge tiles are covered and bounds-checked in the program
            compute_pass.dispatch_workgroups(
                compute_dispatch_size(width, TILE_SIZE),
                compute_dispatch_size(height, TILE_SIZE),
                1,
            );
        }

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &slot.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &slot.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.surface.padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        self.ctx.queue.submit(std::iter::once(encoder.finish()));

        debug!(
            width,
            height,
            slot = slot_index,
            variant = %variant,
            alpha = params.alpha,
            "Frame encoded"
        );
        slot_index
    }

    /// Read a slot back and publish it
    fn publish(&mut self, slot_index: usize, sequence: u64) -> Result<(), RenderError> {
        self.state = RenderState::Presenting;

        let (width, height) = self.surface.dimensions();
        let padded_row = self.surface.padded_row;
        let slot = &self.surface.slots[slot_index];

        let padded = pollster::block_on(read_buffer_async(&self.ctx.device, &slot.readback))
            .map_err(RenderError::Readback)?;
        let rgba = unpad_rows(&padded, width, height, padded_row);

        self.publisher.send_replace(Some(PresentedFrame {
            width,
            height,
            rgba,
            sequence,
        }));
        Ok(())
    }
}

impl FramePresenter for ComputeRenderer {
    type Image = GpuImage;

    fn present(&mut self, image: GpuImage, sequence: u64) -> Result<(), RenderError> {
        if self.device_lost.load(Ordering::SeqCst) {
            return Err(RenderError::DeviceLost(
                "device was lost before rendering".to_string(),
            ));
        }
        if !image.is_valid() {
            return Err(RenderError::StaleImage);
        }

        let slot_index = self.encode(&image);
        let result = self.publish(slot_index, sequence);
        self.state = RenderState::Idle;

        if result.is_ok() && self.device_lost.load(Ordering::SeqCst) {
            return Err(RenderError::DeviceLost(
                "device was lost while rendering".to_string(),
            ));
        }
        result
    }
}

fn build_program(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    variant: PipelineVariant,
    source: &str,
) -> Result<wgpu::ComputePipeline, GpuError> {
    let label = variant.label();
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        module: &shader,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    });

    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(GpuError::PipelineCreation {
            program: label,
            message: error.to_string(),
        });
    }

    debug!(program = label, "Compute program built");
    Ok(pipeline)
}
