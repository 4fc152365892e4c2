// SPDX-License-Identifier: GPL-3.0-only

//! CPU reference bridge and presenter
//!
//! Same contract as the GPU pair, computed with the scalar kernel. Live
//! frames are still aliased (the image keeps the frame memory alive and is
//! invalidated by `release_aliases`), so orchestrator behaviour is identical.

use super::alias::{AliasLedger, AliasToken};
use super::{FramePresenter, FramePublisher, ImageBridge, PresentedFrame};
use crate::backends::camera::types::{ChannelOrder, FrameData, FrameLayout, TextureSource};
use crate::errors::{BridgeError, RenderError};
use crate::invariant::kernel::{invariant_to_rgba, passthrough_to_rgba};
use crate::invariant::{PipelineVariant, SharedParameters};
use image::RgbaImage;
use std::sync::Arc;
use tracing::debug;

enum CpuPixels {
    Alias { data: FrameData, token: AliasToken },
    Owned(Arc<RgbaImage>),
}

/// Image as seen by the CPU presenter
pub struct CpuImage {
    pixels: CpuPixels,
    layout: FrameLayout,
}

impl CpuImage {
    /// False once the alias behind this image has been released
    pub fn is_valid(&self) -> bool {
        match &self.pixels {
            CpuPixels::Alias { token, .. } => token.is_valid(),
            CpuPixels::Owned(_) => true,
        }
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    fn bytes(&self) -> &[u8] {
        match &self.pixels {
            CpuPixels::Alias { data, .. } => &data[..],
            CpuPixels::Owned(image) => image.as_raw().as_slice(),
        }
    }
}

/// Bridge that keeps frames in host memory
pub struct CpuBridge {
    ledger: AliasLedger,
    held: Vec<FrameData>,
}

impl CpuBridge {
    pub fn new(alias_capacity: usize) -> Self {
        Self {
            ledger: AliasLedger::new(alias_capacity),
            held: Vec::with_capacity(alias_capacity),
        }
    }
}

impl ImageBridge for CpuBridge {
    type Image = CpuImage;

    fn adapt(&mut self, source: TextureSource) -> Result<CpuImage, BridgeError> {
        match source {
            TextureSource::Frame(frame) => {
                frame.layout.check(frame.data.len())?;
                let token = self.ledger.acquire()?;
                self.held.push(frame.data.clone());
                Ok(CpuImage {
                    pixels: CpuPixels::Alias {
                        data: frame.data,
                        token,
                    },
                    layout: frame.layout,
                })
            }
            TextureSource::Image(image) => {
                let (width, height) = image.dimensions();
                let layout = FrameLayout::packed(width, height, ChannelOrder::Rgba);
                layout.check(image.as_raw().len())?;
                Ok(CpuImage {
                    pixels: CpuPixels::Owned(image),
                    layout,
                })
            }
        }
    }

    fn release_aliases(&mut self) -> usize {
        self.held.clear();
        self.ledger.release_all()
    }
}

/// Presenter running the scalar kernel
pub struct CpuPresenter {
    params: SharedParameters,
    publisher: FramePublisher,
}

impl CpuPresenter {
    pub fn new(params: SharedParameters, publisher: FramePublisher) -> Self {
        Self { params, publisher }
    }
}

impl FramePresenter for CpuPresenter {
    type Image = CpuImage;

    fn present(&mut self, image: CpuImage, sequence: u64) -> Result<(), RenderError> {
        if !image.is_valid() {
            return Err(RenderError::StaleImage);
        }

        let params = self.params.snapshot();
        let layout = image.layout();
        let rgba = match params.variant() {
            PipelineVariant::Invariant => invariant_to_rgba(image.bytes(), &layout, params.alpha),
            PipelineVariant::PassThrough => passthrough_to_rgba(image.bytes(), &layout),
        };

        debug!(
            sequence,
            width = layout.width,
            height = layout.height,
            variant = %params.variant(),
            "CPU frame presented"
        );

        self.publisher.send_replace(Some(PresentedFrame {
            width: layout.width,
            height: layout.height,
            rgba,
            sequence,
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::Frame;
    use crate::invariant::TransformParameters;
    use crate::pipelines::presented_channel;

    fn bgra_frame(pixels: &[[u8; 4]], width: u32, stride: u32) -> Frame {
        let height = pixels.len() as u32 / width;
        let mut data = vec![0xEE; (stride * height) as usize];
        for (i, px) in pixels.iter().enumerate() {
            let (x, y) = (i as u32 % width, i as u32 / width);
            let at = (y * stride + x * 4) as usize;
            data[at..at + 4].copy_from_slice(px);
        }
        Frame::new(
            FrameData::from(data),
            FrameLayout::new(width, height, stride, ChannelOrder::Bgra),
            0,
        )
    }

    #[test]
    fn test_adapt_retains_frame_until_release() {
        let mut bridge = CpuBridge::new(3);
        let frame = bgra_frame(&[[1, 2, 3, 4]], 1, 4);
        let data = frame.data.clone();

        let image = bridge.adapt(TextureSource::Frame(frame)).unwrap();
        assert!(image.is_valid());
        assert!(data.holders() >= 3);

        assert_eq!(bridge.release_aliases(), 1);
        assert!(!image.is_valid());
        drop(image);
        assert_eq!(data.holders(), 1);
    }

    #[test]
    fn test_adapt_rejects_bad_layouts() {
        let mut bridge = CpuBridge::new(3);
        let short = Frame::new(
            FrameData::from(vec![0u8; 7]),
            FrameLayout::packed(2, 1, ChannelOrder::Bgra),
            0,
        );
        assert_eq!(
            bridge.adapt(TextureSource::Frame(short)).err(),
            Some(BridgeError::BufferTooShort {
                len: 7,
                required: 8
            })
        );
    }

    #[test]
    fn test_stale_alias_is_refused() {
        let mut bridge = CpuBridge::new(1);
        let (publisher, receiver) = presented_channel();
        let mut presenter = CpuPresenter::new(SharedParameters::default(), publisher);

        let image = bridge
            .adapt(TextureSource::Frame(bgra_frame(&[[9, 9, 9, 9]], 1, 4)))
            .unwrap();
        bridge.release_aliases();

        assert!(matches!(
            presenter.present(image, 1),
            Err(RenderError::StaleImage)
        ));
        assert!(receiver.borrow().is_none());
    }

    #[test]
    fn test_invariant_on_padded_bgra() {
        let mut bridge = CpuBridge::new(3);
        let (publisher, receiver) = presented_channel();
        let mut presenter = CpuPresenter::new(SharedParameters::default(), publisher);

        // BGRA bytes: (r,g,b) = (255,0,255) then (0,255,0)
        let frame = bgra_frame(&[[255, 0, 255, 200], [0, 255, 0, 100]], 2, 12);
        let image = bridge.adapt(TextureSource::Frame(frame)).unwrap();
        presenter.present(image, 7).unwrap();

        let shown = receiver.borrow().clone().unwrap();
        assert_eq!(shown.sequence, 7);
        assert_eq!(shown.pixel(0, 0), Some([0, 0, 0, 200]));
        assert_eq!(shown.pixel(1, 0), Some([255, 255, 255, 100]));
    }

    #[test]
    fn test_passthrough_reorders_to_rgba() {
        let mut bridge = CpuBridge::new(3);
        let (publisher, receiver) = presented_channel();
        let params = SharedParameters::new(TransformParameters {
            alpha: 0.45,
            invariance_enabled: false,
        });
        let mut presenter = CpuPresenter::new(params, publisher);

        let frame = bgra_frame(&[[10, 20, 30, 40]], 1, 4);
        let image = bridge.adapt(TextureSource::Frame(frame)).unwrap();
        presenter.present(image, 1).unwrap();

        assert_eq!(receiver.borrow().as_ref().unwrap().rgba, vec![30, 20, 10, 40]);
    }
}
