// SPDX-License-Identifier: GPL-3.0-only

//! Log-chromaticity invariant transform
//!
//! The lookup table, the scalar per-pixel kernel and the parameters the UI
//! adjusts. The GPU version of the kernel lives in `shaders/invariant.wgsl`
//! and must agree with [`kernel::invariant_intensity_f32`].

pub mod kernel;
pub mod log_table;
pub mod params;

pub use kernel::{clamp01, invariant_intensity, invariant_intensity_f32, invariant_value};
pub use log_table::{LOG_TABLE_LEN, LogTable, log_table};
pub use params::{PipelineVariant, SharedParameters, TransformParameters};
