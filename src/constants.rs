// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Transform parameter defaults
pub mod transform {
    /// Sensor alpha used until the user moves the slider
    pub const DEFAULT_ALPHA: f32 = 0.45;

    /// Invariance is on at startup
    pub const DEFAULT_INVARIANCE_ENABLED: bool = true;

    /// Offset added to the log-chromaticity sum so a neutral pixel lands mid-grey
    pub const NEUTRAL_OFFSET: f64 = 0.5;

    /// Step applied by the viewer's alpha keys
    pub const ALPHA_STEP: f32 = 0.05;
}

/// GPU dispatch and resource sizing
pub mod gpu {
    /// Tile edge in pixels, one workgroup per tile
    pub const TILE_SIZE: u32 = 8;

    /// Number of drawable slots in the presentable surface
    pub const SURFACE_SLOT_COUNT: usize = 3;

    /// Live-frame aliases the texture cache holds before refusing new ones
    pub const DEFAULT_ALIAS_CAPACITY: usize = 3;

    /// Stand-in for `ln(0)` in the GPU copy of the log table.
    ///
    /// Shaders must not rely on IEEE infinities, so zero channels are handled
    /// explicitly in the kernel and this value is never read for them.
    pub const GPU_LOG_ZERO: f32 = -1.0e4;
}

/// Placeholder image used when no source is available
pub mod placeholder {
    /// Width and height of the blank placeholder
    pub const SIZE: u32 = 16;
}

/// Live capture defaults
pub mod capture {
    use super::Duration;

    /// Device opened when nothing else is configured
    pub const DEFAULT_DEVICE: &str = "/dev/video0";

    /// Requested capture width
    pub const DEFAULT_WIDTH: u32 = 640;

    /// Requested capture height
    pub const DEFAULT_HEIGHT: u32 = 480;

    /// Memory-mapped buffers queued with the driver
    pub const MMAP_BUFFER_COUNT: u32 = 4;

    /// Longest blocking wait for a filled buffer; the stop flag is checked
    /// between waits
    pub const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(250);

    /// Pause before retrying after a failed dequeue
    pub const RETRY_DELAY: Duration = Duration::from_millis(10);

    /// Frames between periodic capture log lines
    pub const LOG_INTERVAL_FRAMES: u64 = 60;
}

/// Terminal viewer timing and defaults
pub mod viewer {
    use super::Duration;

    /// Input poll timeout, also bounds the redraw interval (~60 Hz)
    pub const INPUT_POLL: Duration = Duration::from_millis(16);

    /// Status bar refresh period for the frame-rate estimate
    pub const FPS_WINDOW: Duration = Duration::from_secs(1);

    /// The viewer opens on the still image; `c` switches to the camera
    pub const DEFAULT_START_LIVE: bool = false;
}

/// Configuration file location
pub mod config_file {
    /// Directory name under the platform config dir
    pub const APP_DIR: &str = "invariance";

    /// File name within [`APP_DIR`]
    pub const FILE_NAME: &str = "config.json";
}
