// SPDX-License-Identifier: GPL-3.0-only

//! Scalar invariant transform
//!
//! CPU reference for `invariant.wgsl`. Both compute
//!
//! ```text
//! v = 0.5 + ln(g) - alpha * ln(b) - (1 - alpha) * ln(r)
//! ```
//!
//! clamp it to [0, 1], scale by 255 and floor. Terms with a zero weight are
//! skipped so `alpha = 0` and `alpha = 1` never multiply an infinity by zero.
//!
//! [`invariant_intensity`] works in double precision. The compute program
//! works in single precision over the uploaded table, which can floor to
//! one step lower near a quantization boundary; [`invariant_intensity_f32`]
//! reproduces that path operation for operation.

use super::log_table::log_table;
use crate::backends::camera::types::{ChannelOrder, FrameLayout};
use crate::constants::transform::NEUTRAL_OFFSET;

/// Clamp to [0, 1]; NaN (an indeterminate `-inf + inf`) maps to 0
#[inline]
pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Unclamped log-chromaticity sum for one pixel
#[inline]
pub fn invariant_value(r: u8, g: u8, b: u8, alpha: f32) -> f64 {
    let table = log_table();
    let alpha = alpha.clamp(0.0, 1.0) as f64;

    let mut value = NEUTRAL_OFFSET + table.value(g);
    if alpha != 0.0 {
        value -= alpha * table.value(b);
    }
    if alpha != 1.0 {
        value -= (1.0 - alpha) * table.value(r);
    }
    value
}

/// Greyscale intensity for one pixel
#[inline]
pub fn invariant_intensity(r: u8, g: u8, b: u8, alpha: f32) -> u8 {
    (clamp01(invariant_value(r, g, b, alpha)) * 255.0).floor() as u8
}

/// Greyscale intensity evaluated the way `invariant.wgsl` does: zero
/// channels branch first, then single-precision sums in the program's order
/// over [`LogTable::to_gpu_values`](super::log_table::LogTable::to_gpu_values).
pub fn invariant_intensity_f32(r: u8, g: u8, b: u8, alpha: f32) -> u8 {
    let alpha = alpha.clamp(0.0, 1.0);
    if g == 0 {
        return 0;
    }
    if (b == 0 && alpha != 0.0) || (r == 0 && alpha != 1.0) {
        return 255;
    }

    let table = log_table();
    let mut value = NEUTRAL_OFFSET as f32 + table.gpu_value(g);
    if alpha != 0.0 {
        value -= alpha * table.gpu_value(b);
    }
    if alpha != 1.0 {
        value -= (1.0 - alpha) * table.gpu_value(r);
    }
    (value.clamp(0.0, 1.0) * 255.0).floor() as u8
}

/// Transform a packed 4-byte-per-pixel buffer in place.
///
/// Colour channels of every pixel are replaced by the invariant intensity;
/// the alpha byte and any row padding beyond `width * 4` are left alone.
pub fn apply_invariant_in_place(data: &mut [u8], layout: &FrameLayout, alpha: f32) {
    let (ri, gi, bi) = layout.order.rgb_offsets();
    let row_bytes = layout.row_bytes();

    for y in 0..layout.height as usize {
        let start = y * layout.stride as usize;
        let Some(row) = data.get_mut(start..start + row_bytes) else {
            break;
        };
        for px in row.chunks_exact_mut(4) {
            let v = invariant_intensity(px[ri], px[gi], px[bi], alpha);
            px[0] = v;
            px[1] = v;
            px[2] = v;
        }
    }
}

/// Transform a strided source into a tightly packed RGBA buffer
pub fn invariant_to_rgba(src: &[u8], layout: &FrameLayout, alpha: f32) -> Vec<u8> {
    let (ri, gi, bi) = layout.order.rgb_offsets();
    let mut out = Vec::with_capacity(layout.packed_len());

    for_each_pixel(src, layout, |px| {
        let v = invariant_intensity(px[ri], px[gi], px[bi], alpha);
        out.extend_from_slice(&[v, v, v, px[3]]);
    });
    out
}

/// Repack a strided source into tightly packed RGBA, unchanged otherwise
pub fn passthrough_to_rgba(src: &[u8], layout: &FrameLayout) -> Vec<u8> {
    let (ri, gi, bi) = layout.order.rgb_offsets();
    let mut out = Vec::with_capacity(layout.packed_len());

    for_each_pixel(src, layout, |px| {
        out.extend_from_slice(&[px[ri], px[gi], px[bi], px[3]]);
    });
    out
}

fn for_each_pixel<F: FnMut(&[u8])>(src: &[u8], layout: &FrameLayout, mut f: F) {
    let row_bytes = layout.row_bytes();
    for y in 0..layout.height as usize {
        let start = y * layout.stride as usize;
        let Some(row) = src.get(start..start + row_bytes) else {
            break;
        };
        row.chunks_exact(4).for_each(&mut f);
    }
}

impl ChannelOrder {
    /// Byte offsets of R, G and B within a packed pixel
    pub fn rgb_offsets(&self) -> (usize, usize, usize) {
        match self {
            ChannelOrder::Rgba => (0, 1, 2),
            ChannelOrder::Bgra => (2, 1, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn general(r: u8, g: u8, b: u8, alpha: f64) -> u8 {
        let t = log_table();
        let v = 0.5 + t.value(g) - alpha * t.value(b) - (1.0 - alpha) * t.value(r);
        (clamp01(v) * 255.0).floor() as u8
    }

    #[test]
    fn test_white_is_mid_grey() {
        assert_eq!(invariant_intensity(255, 255, 255, 0.45), 127);
        assert_eq!(invariant_intensity(255, 255, 255, 0.0), 127);
        assert_eq!(invariant_intensity(255, 255, 255, 1.0), 127);
    }

    #[test]
    fn test_matches_general_formula_for_nonzero_channels() {
        for &alpha in &[0.0f32, 0.2, 0.45, 0.5, 0.8, 1.0] {
            for r in (1..=255u8).step_by(37) {
                for g in (1..=255u8).step_by(29) {
                    for b in (1..=255u8).step_by(41) {
                        assert_eq!(
                            invariant_intensity(r, g, b, alpha),
                            general(r, g, b, alpha as f64),
                            "rgb=({}, {}, {}) alpha={}",
                            r,
                            g,
                            b,
                            alpha
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_alpha_zero_specialization() {
        let t = log_table();
        for (r, g, b) in [(10u8, 200u8, 0u8), (128, 64, 32), (255, 1, 77)] {
            let expected = (clamp01(0.5 + t.value(g) - t.value(r)) * 255.0).floor() as u8;
            assert_eq!(invariant_intensity(r, g, b, 0.0), expected);
        }
    }

    #[test]
    fn test_alpha_one_specialization() {
        let t = log_table();
        for (r, g, b) in [(0u8, 200u8, 10u8), (128, 64, 32), (1, 255, 77)] {
            let expected = (clamp01(0.5 + t.value(g) - t.value(b)) * 255.0).floor() as u8;
            assert_eq!(invariant_intensity(r, g, b, 1.0), expected);
        }
    }

    #[test]
    fn test_zero_channels_never_nan() {
        // g = 0 alone drives the sum to -inf
        assert_eq!(invariant_intensity(255, 0, 255, 0.45), 0);
        // b = 0 or r = 0 alone drives it to +inf
        assert_eq!(invariant_intensity(0, 255, 0, 0.45), 255);
        assert_eq!(invariant_intensity(255, 255, 0, 0.45), 255);
        // -inf + inf is indeterminate and clamps to black
        assert_eq!(invariant_intensity(0, 0, 0, 0.45), 0);
        assert!(!invariant_value(0, 0, 0, 0.45).is_infinite());
    }

    #[test]
    fn test_clamp01_handles_infinities() {
        assert_eq!(clamp01(f64::INFINITY), 1.0);
        assert_eq!(clamp01(f64::NEG_INFINITY), 0.0);
        assert_eq!(clamp01(f64::NAN), 0.0);
        assert_eq!(clamp01(0.25), 0.25);
    }

    #[test]
    fn test_out_of_range_alpha_is_clamped() {
        assert_eq!(
            invariant_intensity(90, 140, 30, 7.0),
            invariant_intensity(90, 140, 30, 1.0)
        );
        assert_eq!(
            invariant_intensity(90, 140, 30, -3.0),
            invariant_intensity(90, 140, 30, 0.0)
        );
    }

    #[test]
    fn test_in_place_honours_stride_and_order() {
        // 2x2 BGRA with 4 bytes of row padding marked 0xEE
        let layout = FrameLayout::new(2, 2, 12, ChannelOrder::Bgra);
        let mut data = vec![
            30, 140, 90, 200, 255, 255, 255, 255, 0xEE, 0xEE, 0xEE, 0xEE, //
            0, 255, 0, 10, 255, 0, 255, 20, 0xEE, 0xEE, 0xEE, 0xEE,
        ];
        apply_invariant_in_place(&mut data, &layout, 0.45);

        let first = invariant_intensity(90, 140, 30, 0.45);
        assert_eq!(&data[0..4], &[first, first, first, 200]);
        assert_eq!(&data[4..8], &[127, 127, 127, 255]);
        assert_eq!(&data[8..12], &[0xEE; 4]);
        // BGRA (0,255,0) is r=0 g=255 b=0
        assert_eq!(&data[12..16], &[255, 255, 255, 10]);
        assert_eq!(&data[20..24], &[0xEE; 4]);
    }

    #[test]
    fn test_to_rgba_is_tightly_packed() {
        let layout = FrameLayout::new(1, 2, 8, ChannelOrder::Bgra);
        let src = [1, 2, 3, 4, 9, 9, 9, 9, 5, 6, 7, 8, 9, 9, 9, 9];
        let out = passthrough_to_rgba(&src, &layout);
        assert_eq!(out, vec![3, 2, 1, 4, 7, 6, 5, 8]);

        let inv = invariant_to_rgba(&src, &layout, 0.45);
        assert_eq!(inv.len(), 8);
        assert_eq!(inv[3], 4);
        assert_eq!(inv[7], 8);
    }

    #[test]
    fn test_invariant_twice_is_not_idempotent() {
        let layout = FrameLayout::new(1, 1, 4, ChannelOrder::Rgba);
        let once = invariant_to_rgba(&[200, 120, 40, 255], &layout, 0.45);
        let twice = invariant_to_rgba(&once, &layout, 0.45);
        // The second pass sees a grey pixel and collapses it further
        assert_ne!(once, twice);
        assert_eq!(twice[0], twice[1]);
    }

    #[test]
    fn test_single_precision_floors_below_boundary() {
        // Double precision lands just above 34/255, single just below
        assert_eq!(invariant_intensity(21, 37, 167, 0.45), 34);
        assert_eq!(invariant_intensity_f32(21, 37, 167, 0.45), 33);
    }

    #[test]
    fn test_single_precision_agrees_elsewhere() {
        for &alpha in &[0.0f32, 0.2, 0.45, 0.5, 0.8, 1.0] {
            for r in (1..=255u8).step_by(37) {
                for g in (1..=255u8).step_by(29) {
                    for b in (1..=255u8).step_by(41) {
                        assert_eq!(
                            invariant_intensity_f32(r, g, b, alpha),
                            invariant_intensity(r, g, b, alpha),
                            "rgb=({}, {}, {}) alpha={}",
                            r,
                            g,
                            b,
                            alpha
                        );
                    }
                }
            }
        }
        assert_eq!(invariant_intensity_f32(255, 255, 255, 0.45), 127);
    }

    #[test]
    fn test_single_precision_zero_channels() {
        assert_eq!(invariant_intensity_f32(255, 0, 255, 0.45), 0);
        assert_eq!(invariant_intensity_f32(0, 0, 0, 0.45), 0);
        assert_eq!(invariant_intensity_f32(0, 255, 0, 0.45), 255);
        // Zero-weight terms are skipped, as in double precision
        assert_eq!(
            invariant_intensity_f32(90, 140, 0, 0.0),
            invariant_intensity(90, 140, 0, 0.0)
        );
        assert_eq!(
            invariant_intensity_f32(0, 140, 30, 1.0),
            invariant_intensity(0, 140, 30, 1.0)
        );
    }
}
