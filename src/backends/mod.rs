// SPDX-License-Identifier: GPL-3.0-only

//! Hardware access
//!
//! - [`camera`]: live V4L2 capture, still images and the frame types shared
//!   with the bridge

pub mod camera;
