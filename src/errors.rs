// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the invariance pipeline

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Top-level application error
#[derive(Debug, Clone)]
pub enum AppError {
    /// GPU setup failed; nothing can be displayed
    Gpu(GpuError),
    /// Rendering a frame failed
    Render(RenderError),
    /// A work queue's worker thread is gone
    Queue(QueueError),
    /// Frame source errors
    Backend(crate::backends::camera::types::BackendError),
    /// Configuration errors
    Config(ConfigError),
    /// Image decoding or encoding failed
    Image(String),
    /// Filesystem or terminal I/O
    Io(String),
    /// Generic error with message
    Other(String),
}

/// Fatal GPU initialization errors
#[derive(Debug, Clone)]
pub enum GpuError {
    /// No adapter matched the request
    NoAdapter(String),
    /// The adapter refused to create a device
    DeviceCreation(String),
    /// A compute program failed to build
    PipelineCreation {
        /// Which program failed
        program: &'static str,
        /// Validation message from wgpu
        message: String,
    },
}

/// Per-frame adaptation failures; the frame is skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Width or height is zero
    EmptyFrame,
    /// Row stride is smaller than one packed row
    StrideTooSmall {
        /// Reported stride in bytes
        stride: u32,
        /// Minimum bytes needed per row
        row_bytes: u32,
    },
    /// Buffer is shorter than the layout requires
    BufferTooShort {
        /// Bytes available
        len: usize,
        /// Bytes needed
        required: usize,
    },
    /// Dimensions exceed what the device can sample
    TooLarge {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
        /// Device texture limit
        limit: u32,
    },
    /// Every alias slot is in use
    CacheExhausted {
        /// Configured capacity
        capacity: usize,
    },
}

/// Errors while encoding, presenting or reading back a frame
#[derive(Debug, Clone)]
pub enum RenderError {
    /// The image's alias was released before rendering
    StaleImage,
    /// Mapping the readback buffer failed
    Readback(String),
    /// The renderer's device was lost
    DeviceLost(String),
}

/// A work queue could not run a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The worker thread exited before accepting the job
    Closed(String),
    /// The worker dropped the job without replying (panic)
    Abandoned(String),
    /// Worker state construction failed on the worker thread
    Init(String),
}

/// Configuration loading and saving errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// Reading or writing the file failed
    Io(String),
    /// The file is not valid configuration JSON
    Parse(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Gpu(e) => write!(f, "GPU error: {}", e),
            AppError::Render(e) => write!(f, "Render error: {}", e),
            AppError::Queue(e) => write!(f, "Work queue error: {}", e),
            AppError::Backend(e) => write!(f, "Frame source error: {}", e),
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Image(msg) => write!(f, "Image error: {}", msg),
            AppError::Io(msg) => write!(f, "I/O error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoAdapter(msg) => write!(f, "No suitable GPU adapter: {}", msg),
            GpuError::DeviceCreation(msg) => write!(f, "Failed to create GPU device: {}", msg),
            GpuError::PipelineCreation { program, message } => {
                write!(f, "Failed to build '{}' compute program: {}", program, message)
            }
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::EmptyFrame => write!(f, "Frame has zero width or height"),
            BridgeError::StrideTooSmall { stride, row_bytes } => write!(
                f,
                "Row stride {} is smaller than packed row size {}",
                stride, row_bytes
            ),
            BridgeError::BufferTooShort { len, required } => {
                write!(f, "Buffer holds {} bytes, layout needs {}", len, required)
            }
            BridgeError::TooLarge {
                width,
                height,
                limit,
            } => write!(
                f,
                "Frame {}x{} exceeds device texture limit {}",
                width, height, limit
            ),
            BridgeError::CacheExhausted { capacity } => {
                write!(f, "All {} texture cache aliases are in use", capacity)
            }
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::StaleImage => write!(f, "Image alias was released before rendering"),
            RenderError::Readback(msg) => write!(f, "Readback failed: {}", msg),
            RenderError::DeviceLost(msg) => write!(f, "Device lost: {}", msg),
        }
    }
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Closed(name) => write!(f, "Queue '{}' is closed", name),
            QueueError::Abandoned(name) => write!(f, "Queue '{}' dropped a job", name),
            QueueError::Init(msg) => write!(f, "Worker initialization failed: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "{}", msg),
            ConfigError::Parse(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for GpuError {}
impl std::error::Error for BridgeError {}
impl std::error::Error for RenderError {}
impl std::error::Error for QueueError {}
impl std::error::Error for ConfigError {}

impl From<GpuError> for AppError {
    fn from(err: GpuError) -> Self {
        AppError::Gpu(err)
    }
}

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        AppError::Render(err)
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        AppError::Queue(err)
    }
}

impl From<crate::backends::camera::types::BackendError> for AppError {
    fn from(err: crate::backends::camera::types::BackendError) -> Self {
        AppError::Backend(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Image(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_messages() {
        let err = BridgeError::StrideTooSmall {
            stride: 10,
            row_bytes: 16,
        };
        assert!(err.to_string().contains("10"));
        assert!(err.to_string().contains("16"));
    }

    #[test]
    fn test_app_error_wraps_gpu_error() {
        let err: AppError = GpuError::NoAdapter("none".into()).into();
        assert!(matches!(err, AppError::Gpu(GpuError::NoAdapter(_))));
        assert!(err.to_string().starts_with("GPU error"));
    }
}
