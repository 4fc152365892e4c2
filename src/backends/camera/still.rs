// SPDX-License-Identifier: GPL-3.0-only

//! Still-image sources for the static fallback mode

use super::types::{BackendError, BackendResult, TextureSource};
use crate::constants::placeholder;
use image::RgbaImage;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Decode any raster image the `image` crate understands into RGBA8
pub fn load_still_image(path: &Path) -> BackendResult<Arc<RgbaImage>> {
    info!(path = %path.display(), "Loading still image");

    let img = image::open(path).map_err(|e| {
        BackendError::ImageLoad(format!("'{}': {}", path.display(), e))
    })?;

    let rgba = img.to_rgba8();
    info!(
        width = rgba.width(),
        height = rgba.height(),
        "Still image loaded"
    );

    Ok(Arc::new(rgba))
}

/// Transparent black image shown when there is nothing else to display
pub fn blank_placeholder() -> Arc<RgbaImage> {
    Arc::new(RgbaImage::new(placeholder::SIZE, placeholder::SIZE))
}

/// Resolve an optional source to something the bridge can always adapt
pub fn source_or_placeholder(source: Option<TextureSource>) -> TextureSource {
    source.unwrap_or_else(|| TextureSource::Image(blank_placeholder()))
}
