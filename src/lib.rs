// SPDX-License-Identifier: GPL-3.0-only

//! Invariance - real-time illumination-invariant camera viewer
//!
//! Each camera frame is turned into a single-channel image that is largely
//! independent of the illuminant, using the log-chromaticity transform
//!
//! ```text
//! v = 0.5 + L(G) - alpha * L(B) - (1 - alpha) * L(R),   L(c) = ln(c / 255)
//! ```
//!
//! evaluated per pixel in a wgpu compute program.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`invariant`]: Log table, scalar kernel and transform parameters
//! - [`backends`]: Frame sources (V4L2 camera, still images, placeholder)
//! - [`gpu`]: Compute device creation
//! - [`shaders`]: Texture bridge and compute renderer
//! - [`pipelines`]: Frame orchestrator, work queues and the CPU reference pair
//! - [`session`]: Pipeline wiring used by the viewer and the CLI
//! - [`terminal`]: Terminal viewer
//! - [`config`]: User configuration handling

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod gpu;
pub mod invariant;
pub mod pipelines;
pub mod session;
pub mod shaders;
pub mod terminal;

// Re-export commonly used types
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use invariant::{PipelineVariant, SharedParameters, TransformParameters};
pub use pipelines::{FrameOutcome, PresentedFrame};
pub use session::{RenderBackend, Session};
