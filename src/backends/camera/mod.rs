// SPDX-License-Identifier: GPL-3.0-only

//! Frame sources
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐
//! │  V4L2 device │   │  Still image │
//! └──────┬───────┘   └──────┬───────┘
//!        │ Frame            │ Arc<RgbaImage>
//!        └────────┬─────────┘
//!                 ▼
//!          TextureSource  ──►  bridge
//! ```
//!
//! A live source owns a capture thread and pushes every frame through a
//! [`FrameCallback`]. A still source is just a decoded image; the blank
//! placeholder stands in when neither is available.

pub mod frame_loop;
pub mod still;
pub mod types;
pub mod v4l2;

pub use still::{blank_placeholder, load_still_image, source_or_placeholder};
pub use types::*;
pub use v4l2::{CaptureRequest, DeviceSummary, V4l2Source, list_devices};
