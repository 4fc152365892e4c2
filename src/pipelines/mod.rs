// SPDX-License-Identifier: GPL-3.0-only

//! Frame processing pipeline
//!
//! Every frame makes the same trip, one at a time:
//!
//! ```text
//! ┌──────────────┐   ┌────────────────────┐   ┌────────────────────┐
//! │ frame source │──▶│ texture-update ctx │──▶│     render ctx     │──▶ PresentedFrame
//! │  (submit)    │   │  ImageBridge::adapt│   │ FramePresenter     │    (watch channel)
//! │   blocks ◀───┼───│  release_aliases   │◀──│   ::present        │
//! └──────────────┘   └────────────────────┘   └────────────────────┘
//! ```
//!
//! The bridge and presenter are traits so the GPU pair and the CPU reference
//! pair plug into the same orchestrator.
//!
//! # Modules
//!
//! - [`alias`]: generation-counted validity for images borrowing frame memory
//! - [`cpu`]: scalar bridge and presenter
//! - [`orchestrator`]: serial admission and the bridge → render hand-off
//! - [`work_queue`]: single-worker execution contexts

pub mod alias;
pub mod cpu;
pub mod orchestrator;
pub mod work_queue;

pub use orchestrator::{CompletionHook, FrameOrchestrator};
pub use work_queue::{WorkQueue, WorkQueueHandle};

use crate::backends::camera::types::TextureSource;
use crate::errors::{AppError, BridgeError, RenderError};
use tokio::sync::watch;

/// Turns frame sources into images a presenter can render.
///
/// Lives on the texture-update context.
pub trait ImageBridge: 'static {
    type Image: Send + 'static;

    /// Adapt a source into an image; live frames become aliases
    fn adapt(&mut self, source: TextureSource) -> Result<Self::Image, BridgeError>;

    /// Invalidate every alias handed out so far and let go of frame memory.
    /// Returns the number of aliases released.
    fn release_aliases(&mut self) -> usize;
}

/// Runs the selected program over an image and presents the result.
///
/// Lives on the render context, the only place that touches the surface.
pub trait FramePresenter: 'static {
    type Image: Send + 'static;

    /// Render and present one image under the admission sequence number
    fn present(&mut self, image: Self::Image, sequence: u64) -> Result<(), RenderError>;
}

/// Something frames can be submitted to
pub trait FrameSink: Send + Sync {
    /// Run one frame through the pipeline, blocking until it is done
    fn submit(&self, source: Option<TextureSource>) -> FrameOutcome;

    /// Running totals since construction
    fn counts(&self) -> FrameCounts;
}

/// How one submission ended
#[derive(Debug, Clone)]
pub enum FrameOutcome {
    /// The frame was rendered and published
    Presented { sequence: u64 },
    /// The bridge refused the frame; nothing was rendered
    Dropped,
    /// Rendering failed or an execution context is gone
    Failed(AppError),
}

impl FrameOutcome {
    pub fn is_presented(&self) -> bool {
        matches!(self, FrameOutcome::Presented { .. })
    }
}

/// Outcome totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounts {
    pub presented: u64,
    pub dropped: u64,
    pub failed: u64,
}

/// Newest displayed image, tightly packed RGBA8
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    pub sequence: u64,
}

impl PresentedFrame {
    /// RGBA of the pixel at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.rgba
            .get(i..i + 4)
            .and_then(|px| px.try_into().ok())
    }

    /// Copy into an `image` buffer for encoding
    pub fn to_image(&self) -> Option<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.rgba.clone())
    }
}

/// Sending side of the presented-frame channel
pub type FramePublisher = watch::Sender<Option<PresentedFrame>>;

/// Receiving side of the presented-frame channel
pub type PresentedReceiver = watch::Receiver<Option<PresentedFrame>>;

/// Channel pair a presenter publishes into
pub fn presented_channel() -> (FramePublisher, PresentedReceiver) {
    watch::channel(None)
}
