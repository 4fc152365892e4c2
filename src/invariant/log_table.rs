// SPDX-License-Identifier: GPL-3.0-only

//! Log-chromaticity lookup table
//!
//! Maps every 8-bit channel intensity `i` to `ln(i / 255)`. The table is
//! built on first use and shared by the CPU kernel and the GPU upload. A
//! single-precision copy is kept alongside; it is exactly what the compute
//! program reads.

use crate::constants::gpu::GPU_LOG_ZERO;
use std::sync::OnceLock;

/// Number of distinct 8-bit channel values
pub const LOG_TABLE_LEN: usize = 256;

/// Immutable `ln(i / 255)` table
#[derive(Debug)]
pub struct LogTable {
    values: [f64; LOG_TABLE_LEN],
    gpu_values: [f32; LOG_TABLE_LEN],
}

static LOG_TABLE: OnceLock<LogTable> = OnceLock::new();

/// Shared table instance, built on first call
pub fn log_table() -> &'static LogTable {
    LOG_TABLE.get_or_init(LogTable::build)
}

impl LogTable {
    fn build() -> Self {
        let mut values = [0.0; LOG_TABLE_LEN];
        for (i, value) in values.iter_mut().enumerate() {
            // ln(0) is -inf; the kernel clamps it
            *value = (i as f64 / 255.0).ln();
        }

        let mut gpu_values = [0.0f32; LOG_TABLE_LEN];
        for (dst, &src) in gpu_values.iter_mut().zip(values.iter()) {
            *dst = if src.is_finite() {
                src as f32
            } else {
                GPU_LOG_ZERO
            };
        }

        Self { values, gpu_values }
    }

    /// Natural log of `i / 255`
    #[inline]
    pub fn value(&self, i: u8) -> f64 {
        self.values[i as usize]
    }

    /// Single-precision copy for upload to the GPU.
    ///
    /// `ln(0)` is replaced by [`GPU_LOG_ZERO`]; the compute kernel never reads
    /// that entry because zero channels take an explicit branch.
    pub fn to_gpu_values(&self) -> [f32; LOG_TABLE_LEN] {
        self.gpu_values
    }

    /// Entry `i` of the single-precision table
    #[inline]
    pub fn gpu_value(&self, i: u8) -> f32 {
        self.gpu_values[i as usize]
    }
}
