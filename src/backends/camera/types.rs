// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for frame sources

use crate::errors::BridgeError;
use image::RgbaImage;
use std::sync::Arc;
use std::time::Instant;

/// Pixel storage shared between a frame source and the texture cache
///
/// Cloning is a reference-count bump. The texture cache keeps a clone for as
/// long as it aliases the frame, so the memory outlives the capture callback
/// exactly until `release_aliases()`.
#[derive(Clone)]
pub struct FrameData(Arc<[u8]>);

impl FrameData {
    /// Wrap already shared bytes
    pub fn new(data: Arc<[u8]>) -> Self {
        FrameData(data)
    }

    /// Copy a borrowed buffer (e.g. a driver mmap slot) into shared storage
    pub fn copy_from_slice(data: &[u8]) -> Self {
        FrameData(Arc::from(data))
    }

    /// Get the length of the frame data in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the frame data is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of live handles to this buffer, including this one
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl From<Vec<u8>> for FrameData {
    fn from(data: Vec<u8>) -> Self {
        FrameData(Arc::from(data))
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FrameData({} bytes)", self.0.len())
    }
}

impl AsRef<[u8]> for FrameData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::ops::Deref for FrameData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

/// Byte order of the colour channels within a packed 32-bit pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelOrder {
    /// R G B A
    #[default]
    Rgba,
    /// B G R A, the usual native camera layout
    Bgra,
}

impl std::fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelOrder::Rgba => write!(f, "RGBA"),
            ChannelOrder::Bgra => write!(f, "BGRA"),
        }
    }
}

/// Geometry of a packed 4-byte-per-pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, may include padding beyond `width * 4`
    pub stride: u32,
    pub order: ChannelOrder,
}

impl FrameLayout {
    /// Bytes per pixel for every supported layout
    pub const BYTES_PER_PIXEL: u32 = 4;

    pub fn new(width: u32, height: u32, stride: u32, order: ChannelOrder) -> Self {
        Self {
            width,
            height,
            stride,
            order,
        }
    }

    /// Layout with no row padding
    pub fn packed(width: u32, height: u32, order: ChannelOrder) -> Self {
        Self::new(width, height, width * Self::BYTES_PER_PIXEL, order)
    }

    /// Bytes of pixel data in one row, excluding padding
    pub fn row_bytes(&self) -> usize {
        self.width as usize * Self::BYTES_PER_PIXEL as usize
    }

    /// Size of the same image with padding removed
    pub fn packed_len(&self) -> usize {
        self.row_bytes() * self.height as usize
    }

    /// Smallest buffer that holds this layout (the last row needs no padding)
    pub fn min_buffer_len(&self) -> usize {
        if self.height == 0 {
            return 0;
        }
        (self.height as usize - 1) * self.stride as usize + self.row_bytes()
    }

    /// Check that a buffer of `data_len` bytes can be read with this layout
    pub fn check(&self, data_len: usize) -> Result<(), BridgeError> {
        if self.width == 0 || self.height == 0 {
            return Err(BridgeError::EmptyFrame);
        }
        if (self.stride as usize) < self.row_bytes() {
            return Err(BridgeError::StrideTooSmall {
                stride: self.stride,
                row_bytes: self.row_bytes() as u32,
            });
        }
        let required = self.min_buffer_len();
        if data_len < required {
            return Err(BridgeError::BufferTooShort {
                len: data_len,
                required,
            });
        }
        Ok(())
    }
}

/// A single frame from a live source
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: FrameData,
    pub layout: FrameLayout,
    /// Source-assigned sequence number
    pub sequence: u64,
    /// When the frame was dequeued (for latency diagnostics)
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(data: FrameData, layout: FrameLayout, sequence: u64) -> Self {
        Self {
            data,
            layout,
            sequence,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.layout.width
    }

    pub fn height(&self) -> u32 {
        self.layout.height
    }
}

/// Something the bridge can turn into a GPU image
#[derive(Debug, Clone)]
pub enum TextureSource {
    /// Live frame, aliased until the cache is flushed
    Frame(Frame),
    /// Decoded still image, uploaded as an owned copy
    Image(Arc<RgbaImage>),
}

impl TextureSource {
    /// Dimensions of the source
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            TextureSource::Frame(frame) => (frame.width(), frame.height()),
            TextureSource::Image(image) => image.dimensions(),
        }
    }
}

/// Callback a live source invokes once per captured frame
pub type FrameCallback = Box<dyn FnMut(Frame) + Send + 'static>;

/// Result type for frame source operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for frame source operations
#[derive(Debug, Clone)]
pub enum BackendError {
    /// Capture device not found or not openable
    DeviceNotFound(String),
    /// Device does not offer a packed 32-bit RGB format
    FormatNotSupported(String),
    /// Failed to start streaming
    InitializationFailed(String),
    /// Still image could not be read or decoded
    ImageLoad(String),
    /// General I/O error
    IoError(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::FormatNotSupported(msg) => write!(f, "Format not supported: {}", msg),
            BackendError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            BackendError::ImageLoad(msg) => write!(f, "Failed to load image: {}", msg),
            BackendError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_buffer_len_skips_last_padding() {
        let layout = FrameLayout::new(3, 4, 16, ChannelOrder::Bgra);
        assert_eq!(layout.row_bytes(), 12);
        assert_eq!(layout.min_buffer_len(), 3 * 16 + 12);
        assert_eq!(layout.packed_len(), 48);
    }

    #[test]
    fn test_packed_layout() {
        let layout = FrameLayout::packed(5, 2, ChannelOrder::Rgba);
        assert_eq!(layout.stride, 20);
        assert_eq!(layout.min_buffer_len(), layout.packed_len());
    }

    #[test]
    fn test_layout_check() {
        let layout = FrameLayout::new(3, 4, 16, ChannelOrder::Bgra);
        assert_eq!(layout.check(60), Ok(()));
        assert_eq!(
            layout.check(59),
            Err(BridgeError::BufferTooShort {
                len: 59,
                required: 60
            })
        );
        assert_eq!(
            FrameLayout::new(3, 4, 8, ChannelOrder::Rgba).check(1024),
            Err(BridgeError::StrideTooSmall {
                stride: 8,
                row_bytes: 12
            })
        );
        assert_eq!(
            FrameLayout::packed(0, 4, ChannelOrder::Rgba).check(1024),
            Err(BridgeError::EmptyFrame)
        );
    }

    #[test]
    fn test_frame_data_sharing() {
        let data = FrameData::from(vec![1u8, 2, 3, 4]);
        assert_eq!(data.holders(), 1);
        let alias = data.clone();
        assert_eq!(data.holders(), 2);
        drop(alias);
        assert_eq!(data.holders(), 1);
        assert_eq!(&data[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_source_dimensions() {
        let image = Arc::new(RgbaImage::new(7, 3));
        assert_eq!(TextureSource::Image(image).dimensions(), (7, 3));
    }
}
