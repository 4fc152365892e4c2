// SPDX-License-Identifier: GPL-3.0-only

//! Transform parameters shared between the UI and the render context
//!
//! Written from the UI thread at any time and read once at the start of each
//! render. Each field is its own atomic; the two are not updated together.

use crate::constants::transform::{DEFAULT_ALPHA, DEFAULT_INVARIANCE_ENABLED};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Which compute program processes a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineVariant {
    /// Log-chromaticity greyscale
    Invariant,
    /// Source copied unchanged
    PassThrough,
}

impl PipelineVariant {
    /// Program label used in logs and pipeline descriptors
    pub fn label(&self) -> &'static str {
        match self {
            PipelineVariant::Invariant => "invariant",
            PipelineVariant::PassThrough => "passthrough",
        }
    }
}

impl std::fmt::Display for PipelineVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Snapshot of the parameters for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParameters {
    /// Sensor alpha, always within [0, 1]
    pub alpha: f32,
    /// Run the invariant program instead of pass-through
    pub invariance_enabled: bool,
}

impl TransformParameters {
    /// Variant selected by these parameters
    pub fn variant(&self) -> PipelineVariant {
        if self.invariance_enabled {
            PipelineVariant::Invariant
        } else {
            PipelineVariant::PassThrough
        }
    }
}

impl Default for TransformParameters {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            invariance_enabled: DEFAULT_INVARIANCE_ENABLED,
        }
    }
}

/// Clamp a UI-provided alpha into [0, 1]; `None` for NaN
pub fn sanitize_alpha(alpha: f32) -> Option<f32> {
    if alpha.is_nan() {
        None
    } else {
        Some(alpha.clamp(0.0, 1.0))
    }
}

/// Lock-free, cloneable handle to the live parameters
#[derive(Debug, Clone)]
pub struct SharedParameters {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    alpha_bits: AtomicU32,
    invariance_enabled: AtomicBool,
}

impl SharedParameters {
    /// Start from the given values (alpha is clamped)
    pub fn new(initial: TransformParameters) -> Self {
        let alpha = sanitize_alpha(initial.alpha).unwrap_or(DEFAULT_ALPHA);
        Self {
            inner: Arc::new(Inner {
                alpha_bits: AtomicU32::new(alpha.to_bits()),
                invariance_enabled: AtomicBool::new(initial.invariance_enabled),
            }),
        }
    }

    /// Set alpha, clamping to [0, 1]. NaN is ignored.
    pub fn set_alpha(&self, alpha: f32) {
        if let Some(alpha) = sanitize_alpha(alpha) {
            self.inner
                .alpha_bits
                .store(alpha.to_bits(), Ordering::Relaxed);
        }
    }

    /// Nudge alpha by `delta`, clamped; returns the new value
    pub fn adjust_alpha(&self, delta: f32) -> f32 {
        let next = sanitize_alpha(self.alpha() + delta).unwrap_or(self.alpha());
        self.set_alpha(next);
        next
    }

    /// Current alpha
    pub fn alpha(&self) -> f32 {
        f32::from_bits(self.inner.alpha_bits.load(Ordering::Relaxed))
    }

    /// Enable or disable the invariant program
    pub fn set_invariance_enabled(&self, enabled: bool) {
        self.inner
            .invariance_enabled
            .store(enabled, Ordering::Relaxed);
    }

    /// Flip the invariance flag; returns the new value
    pub fn toggle_invariance(&self) -> bool {
        !self.inner.invariance_enabled.fetch_xor(true, Ordering::Relaxed)
    }

    /// Current invariance flag
    pub fn invariance_enabled(&self) -> bool {
        self.inner.invariance_enabled.load(Ordering::Relaxed)
    }

    /// Read both fields for the frame about to render
    pub fn snapshot(&self) -> TransformParameters {
        TransformParameters {
            alpha: self.alpha(),
            invariance_enabled: self.invariance_enabled(),
        }
    }
}

impl Default for SharedParameters {
    fn default() -> Self {
        Self::new(TransformParameters::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = SharedParameters::default();
        let snap = params.snapshot();
        assert_eq!(snap.alpha, 0.45);
        assert!(snap.invariance_enabled);
        assert_eq!(snap.variant(), PipelineVariant::Invariant);
    }

    #[test]
    fn test_alpha_is_clamped() {
        let params = SharedParameters::default();
        params.set_alpha(1.7);
        assert_eq!(params.alpha(), 1.0);
        params.set_alpha(-0.2);
        assert_eq!(params.alpha(), 0.0);
    }

    #[test]
    fn test_nan_alpha_is_ignored() {
        let params = SharedParameters::default();
        params.set_alpha(0.3);
        params.set_alpha(f32::NAN);
        assert_eq!(params.alpha(), 0.3);
    }

    #[test]
    fn test_initial_alpha_is_clamped() {
        let params = SharedParameters::new(TransformParameters {
            alpha: 3.0,
            invariance_enabled: false,
        });
        assert_eq!(params.alpha(), 1.0);
        assert_eq!(params.snapshot().variant(), PipelineVariant::PassThrough);
    }

    #[test]
    fn test_adjust_alpha_saturates() {
        let params = SharedParameters::default();
        for _ in 0..40 {
            params.adjust_alpha(0.05);
        }
        assert_eq!(params.alpha(), 1.0);
        for _ in 0..40 {
            params.adjust_alpha(-0.05);
        }
        assert_eq!(params.alpha(), 0.0);
    }

    #[test]
    fn test_toggle_invariance() {
        let params = SharedParameters::default();
        assert!(!params.toggle_invariance());
        assert!(!params.invariance_enabled());
        assert!(params.toggle_invariance());
        assert!(params.invariance_enabled());
    }

    #[test]
    fn test_clones_share_state() {
        let ui = SharedParameters::default();
        let render = ui.clone();
        ui.set_alpha(0.8);
        ui.set_invariance_enabled(false);
        assert_eq!(render.snapshot().alpha, 0.8);
        assert!(!render.snapshot().invariance_enabled);
    }
}
