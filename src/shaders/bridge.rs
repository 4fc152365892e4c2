// SPDX-License-Identifier: GPL-3.0-only

//! Texture/buffer bridge
//!
//! Live frames are wrapped by the [`TextureCache`]. The frame's buffer is
//! passed to `Queue::write_texture` with its reported stride, so rows are
//! never repacked, but wgpu stages that data in its own upload buffer before
//! the copy to the texture. Together with the copy the capture source makes
//! out of its mapped buffer, a live frame is copied twice on the CPU. wgpu
//! has no portable way to import host memory as a texture. The cache keeps
//! the frame's memory alive until `release_aliases()`. BGRA frames land in a
//! `Bgra8Unorm` texture so the compute programs always read logical RGBA.
//!
//! Still images are uploaded into a fresh owned texture.

use super::gpu_processor::CachedDimensions;
use crate::backends::camera::types::{ChannelOrder, FrameData, FrameLayout, TextureSource};
use crate::errors::BridgeError;
use crate::gpu::{GpuContext, wgpu};
use crate::pipelines::ImageBridge;
use crate::pipelines::alias::{AliasLedger, AliasToken};
use image::RgbaImage;
use tracing::{debug, info};

/// Texture format matching a channel order
pub fn texture_format_for(order: ChannelOrder) -> wgpu::TextureFormat {
    match order {
        ChannelOrder::Rgba => wgpu::TextureFormat::Rgba8Unorm,
        ChannelOrder::Bgra => wgpu::TextureFormat::Bgra8Unorm,
    }
}

/// Reject dimensions the device cannot hold in one texture
pub fn check_texture_limit(width: u32, height: u32, limit: u32) -> Result<(), BridgeError> {
    if width > limit || height > limit {
        return Err(BridgeError::TooLarge {
            width,
            height,
            limit,
        });
    }
    Ok(())
}

/// GPU-resident source image
pub struct GpuImage {
    view: wgpu::TextureView,
    dims: CachedDimensions,
    format: wgpu::TextureFormat,
    alias: Option<AliasToken>,
}

impl GpuImage {
    pub fn width(&self) -> u32 {
        self.dims.width
    }

    pub fn height(&self) -> u32 {
        self.dims.height
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// True for images wrapping live frame memory
    pub fn is_alias(&self) -> bool {
        self.alias.is_some()
    }

    /// Owned images are always valid; aliases until the cache is released
    pub fn is_valid(&self) -> bool {
        self.alias.as_ref().is_none_or(AliasToken::is_valid)
    }
}

impl std::fmt::Debug for GpuImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuImage")
            .field("width", &self.dims.width)
            .field("height", &self.dims.height)
            .field("format", &self.format)
            .field("alias", &self.alias.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AliasKey {
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
}

struct AliasEntry {
    key: AliasKey,
    texture: wgpu::Texture,
    // Kept alive until release
    _data: FrameData,
}

/// Bounded cache of textures aliasing live frames
pub struct TextureCache {
    ctx: GpuContext,
    ledger: AliasLedger,
    in_flight: Vec<AliasEntry>,
    free: Vec<(AliasKey, wgpu::Texture)>,
}

impl TextureCache {
    pub fn new(ctx: GpuContext, capacity: usize) -> Self {
        let ledger = AliasLedger::new(capacity);
        info!(capacity = ledger.capacity(), "Texture cache created");
        Self {
            ctx,
            in_flight: Vec::with_capacity(ledger.capacity()),
            free: Vec::with_capacity(ledger.capacity()),
            ledger,
        }
    }

    /// Upload a frame's pixel buffer into a reusable alias texture.
    ///
    /// The returned image is valid until the next [`Self::release_aliases`];
    /// the cache holds on to `data` until then.
    pub fn wrap_external_buffer(
        &mut self,
        data: FrameData,
        layout: FrameLayout,
    ) -> Result<GpuImage, BridgeError> {
        layout.check(data.len())?;
        check_texture_limit(layout.width, layout.height, self.ctx.info.max_texture_dimension)?;
        let token = self.ledger.acquire()?;

        let key = AliasKey {
            width: layout.width,
            height: layout.height,
            format: texture_format_for(layout.order),
        };
        let texture = self.take_texture(key);

        self.ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data[..layout.min_buffer_len()],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(layout.stride),
                rows_per_image: Some(layout.height),
            },
            wgpu::Extent3d {
                width: layout.width,
                height: layout.height,
                depth_or_array_layers: 1,
            },
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.in_flight.push(AliasEntry {
            key,
            texture,
            _data: data,
        });

        Ok(GpuImage {
            view,
            dims: CachedDimensions::new(layout.width, layout.height),
            format: key.format,
            alias: Some(token),
        })
    }

    /// Invalidate all aliases, drop the frame memory and recycle textures
    pub fn release_aliases(&mut self) -> usize {
        for entry in self.in_flight.drain(..) {
            self.free.push((entry.key, entry.texture));
        }
        let excess = self.free.len().saturating_sub(self.ledger.capacity());
        self.free.drain(..excess);
        self.ledger.release_all()
    }

    /// Aliases handed out since the last release
    pub fn in_flight(&self) -> usize {
        self.ledger.in_flight()
    }

    /// Recycled textures waiting for reuse
    pub fn free_textures(&self) -> usize {
        self.free.len()
    }

    fn take_texture(&mut self, key: AliasKey) -> wgpu::Texture {
        if let Some(pos) = self.free.iter().position(|(k, _)| *k == key) {
            return self.free.swap_remove(pos).1;
        }

        debug!(
            width = key.width,
            height = key.height,
            format = ?key.format,
            "Allocating alias texture"
        );
        create_source_texture(&self.ctx.device, "alias_texture", key.width, key.height, key.format)
    }
}

fn create_source_texture(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

/// GPU implementation of [`ImageBridge`]
pub struct TextureBridge {
    cache: TextureCache,
}

impl TextureBridge {
    pub fn new(ctx: GpuContext, alias_capacity: usize) -> Self {
        Self {
            cache: TextureCache::new(ctx, alias_capacity),
        }
    }

    pub fn cache(&self) -> &TextureCache {
        &self.cache
    }

    /// Upload a decoded image into a new owned texture
    pub fn upload_still(&self, image: &RgbaImage) -> Result<GpuImage, BridgeError> {
        let (width, height) = image.dimensions();
        let layout = FrameLayout::packed(width, height, ChannelOrder::Rgba);
        layout.check(image.as_raw().len())?;
        check_texture_limit(width, height, self.cache.ctx.info.max_texture_dimension)?;

        let format = texture_format_for(ChannelOrder::Rgba);
        let texture =
            create_source_texture(&self.cache.ctx.device, "still_texture", width, height, format);

        self.cache.ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(layout.stride),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        Ok(GpuImage {
            view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
            dims: CachedDimensions::new(width, height),
            format,
            alias: None,
        })
    }
}

impl ImageBridge for TextureBridge {
    type Image = GpuImage;

    fn adapt(&mut self, source: TextureSource) -> Result<GpuImage, BridgeError> {
        match source {
            TextureSource::Frame(frame) => self.cache.wrap_external_buffer(frame.data, frame.layout),
            TextureSource::Image(image) => self.upload_still(&image),
        }
    }

    fn release_aliases(&mut self) -> usize {
        self.cache.release_aliases()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::create_compute_device_blocking;

    fn gpu_or_skip() -> Option<GpuContext> {
        match create_compute_device_blocking("bridge_test") {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                None
            }
        }
    }

    #[test]
    fn test_texture_format_for_order() {
        assert_eq!(
            texture_format_for(ChannelOrder::Bgra),
            wgpu::TextureFormat::Bgra8Unorm
        );
        assert_eq!(
            texture_format_for(ChannelOrder::Rgba),
            wgpu::TextureFormat::Rgba8Unorm
        );
    }

    #[test]
    fn test_texture_limit() {
        assert!(check_texture_limit(8192, 10, 8192).is_ok());
        assert_eq!(
            check_texture_limit(8193, 10, 8192),
            Err(BridgeError::TooLarge {
                width: 8193,
                height: 10,
                limit: 8192
            })
        );
    }

    #[test]
    fn test_wrap_retains_and_releases_frame_memory() {
        let Some(ctx) = gpu_or_skip() else { return };
        let mut cache = TextureCache::new(ctx, 2);

        let layout = FrameLayout::new(4, 3, 20, ChannelOrder::Bgra);
        let data = FrameData::from(vec![128u8; layout.min_buffer_len()]);

        let image = cache.wrap_external_buffer(data.clone(), layout).unwrap();
        assert!(image.is_alias());
        assert!(image.is_valid());
        assert_eq!(image.format(), wgpu::TextureFormat::Bgra8Unorm);
        assert_eq!(data.holders(), 2);

        assert_eq!(cache.release_aliases(), 1);
        assert!(!image.is_valid());
        assert_eq!(data.holders(), 1);
        assert_eq!(cache.free_textures(), 1);

        // Same shape reuses the recycled texture
        let _again = cache.wrap_external_buffer(data.clone(), layout).unwrap();
        assert_eq!(cache.free_textures(), 0);
    }

    #[test]
    fn test_wrap_refuses_when_full() {
        let Some(ctx) = gpu_or_skip() else { return };
        let mut cache = TextureCache::new(ctx, 1);
        let layout = FrameLayout::packed(2, 2, ChannelOrder::Rgba);
        let data = FrameData::from(vec![0u8; layout.packed_len()]);

        let _held = cache.wrap_external_buffer(data.clone(), layout).unwrap();
        assert_eq!(
            cache.wrap_external_buffer(data, layout).err(),
            Some(BridgeError::CacheExhausted { capacity: 1 })
        );
    }

    #[test]
    fn test_still_images_are_owned() {
        let Some(ctx) = gpu_or_skip() else { return };
        let mut bridge = TextureBridge::new(ctx, 3);

        let image = bridge
            .adapt(TextureSource::Image(std::sync::Arc::new(RgbaImage::new(5, 7))))
            .unwrap();
        assert!(!image.is_alias());
        assert_eq!((image.width(), image.height()), (5, 7));

        bridge.release_aliases();
        assert!(image.is_valid());
    }
}
