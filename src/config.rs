// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::v4l2::CaptureRequest;
use crate::constants::{capture, config_file, gpu, transform, viewer};
use crate::errors::ConfigError;
use crate::invariant::TransformParameters;
use crate::invariant::params::sanitize_alpha;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Persistent settings, stored as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sensor alpha in [0, 1]
    pub alpha: f32,
    /// Start with the invariant view (pass-through otherwise)
    pub invariance_enabled: bool,
    /// Start from the camera instead of the still image
    pub start_live: bool,
    /// V4L2 device to capture from
    pub camera_device: String,
    /// Requested capture width
    pub capture_width: u32,
    /// Requested capture height
    pub capture_height: u32,
    /// Image shown in static mode; the blank placeholder when unset
    pub fallback_image: Option<PathBuf>,
    /// Live-frame aliases the texture cache may hold
    pub alias_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alpha: transform::DEFAULT_ALPHA,
            invariance_enabled: transform::DEFAULT_INVARIANCE_ENABLED,
            start_live: viewer::DEFAULT_START_LIVE,
            camera_device: capture::DEFAULT_DEVICE.to_string(),
            capture_width: capture::DEFAULT_WIDTH,
            capture_height: capture::DEFAULT_HEIGHT,
            fallback_image: None,
            alias_capacity: gpu::DEFAULT_ALIAS_CAPACITY,
        }
    }
}

impl Config {
    /// Default location: `<config dir>/invariance/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(config_file::APP_DIR).join(config_file::FILE_NAME))
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&text)?;

        info!(path = %path.display(), "Config loaded");
        Ok(config.sanitized())
    }

    /// Load from the default location, or defaults if there is none
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Clamp values into their valid ranges
    pub fn sanitized(mut self) -> Self {
        self.alpha = sanitize_alpha(self.alpha).unwrap_or(transform::DEFAULT_ALPHA);
        self.alias_capacity = self.alias_capacity.max(1);
        if self.capture_width == 0 || self.capture_height == 0 {
            self.capture_width = capture::DEFAULT_WIDTH;
            self.capture_height = capture::DEFAULT_HEIGHT;
        }
        self
    }

    /// Initial transform parameters
    pub fn transform_parameters(&self) -> TransformParameters {
        TransformParameters {
            alpha: self.alpha,
            invariance_enabled: self.invariance_enabled,
        }
    }

    /// What to ask the camera for
    pub fn capture_request(&self) -> CaptureRequest {
        CaptureRequest {
            device_path: self.camera_device.clone(),
            width: self.capture_width,
            height: self.capture_height,
        }
    }
}
