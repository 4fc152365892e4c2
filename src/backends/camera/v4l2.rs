// SPDX-License-Identifier: GPL-3.0-only

//! Live capture from V4L2 devices
//!
//! Only packed 32-bit RGB layouts are requested; YUV and compressed formats
//! are not converted. Frames are handed to the callback on the capture
//! thread, and the callback blocks until the frame has been shown. While it
//! blocks the driver keeps filling its queue. Before the next delivery every
//! buffer that is already filled is dequeued and only the newest one is
//! passed on, so a slow consumer sees current frames instead of a backlog.

use super::frame_loop::{CaptureLoopController, LoopAction};
use super::types::*;
use crate::constants::capture::{
    DEQUEUE_TIMEOUT, LOG_INTERVAL_FRAMES, MMAP_BUFFER_COUNT, RETRY_DELAY,
};
use std::io;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Packed formats we accept, in preference order
const PACKED_FORMATS: [(&[u8; 4], ChannelOrder); 5] = [
    (b"AR24", ChannelOrder::Bgra),
    (b"XR24", ChannelOrder::Bgra),
    (b"BGR4", ChannelOrder::Bgra),
    (b"AB24", ChannelOrder::Rgba),
    (b"XB24", ChannelOrder::Rgba),
];

/// Channel order for a FourCC, if it is one of the accepted packed formats
pub fn channel_order_for(fourcc: FourCC) -> Option<ChannelOrder> {
    PACKED_FORMATS
        .iter()
        .find(|(code, _)| FourCC::new(code) == fourcc)
        .map(|(_, order)| *order)
}

/// What to open and at which size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub device_path: String,
    pub width: u32,
    pub height: u32,
}

/// A capture device found during enumeration
#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub path: String,
    pub name: String,
    /// Accepted packed formats the device advertises
    pub packed_formats: Vec<String>,
}

/// Enumerate `/dev/video*` nodes and the packed formats each offers
pub fn list_devices() -> Vec<DeviceSummary> {
    v4l::context::enum_devices()
        .into_iter()
        .filter_map(|node| {
            let path = node.path().to_string_lossy().to_string();
            let dev = match Device::with_path(&path) {
                Ok(dev) => dev,
                Err(e) => {
                    debug!(path = %path, error = %e, "Skipping unopenable device");
                    return None;
                }
            };

            let name = node
                .name()
                .or_else(|| dev.query_caps().ok().map(|caps| caps.card))
                .unwrap_or_else(|| path.clone());

            let packed_formats = dev
                .enum_formats()
                .unwrap_or_default()
                .into_iter()
                .filter(|desc| channel_order_for(desc.fourcc).is_some())
                .map(|desc| desc.fourcc.to_string())
                .collect();

            Some(DeviceSummary {
                path,
                name,
                packed_formats,
            })
        })
        .collect()
}

/// Running capture from one device
pub struct V4l2Source {
    controller: CaptureLoopController,
    device_path: String,
}

struct CaptureState {
    stream: MmapStream<'static>,
    layout: FrameLayout,
    delivered: u64,
    skipped: u64,
    // A timed-out `next()` has already re-queued the current buffer
    resync: bool,
    _device: Device,
}

impl V4l2Source {
    /// Open the device, negotiate a packed format and start delivering frames.
    ///
    /// `on_frame` is called on the capture thread, at most once per frame and
    /// never concurrently with itself.
    pub fn start(request: &CaptureRequest, mut on_frame: FrameCallback) -> BackendResult<Self> {
        let init_request = request.clone();

        let controller = CaptureLoopController::start_with_init(
            "v4l2-capture",
            move || open_stream(&init_request),
            move |state: &mut CaptureState| {
                if let Some(frame) = capture_newest(state) {
                    on_frame(frame);
                }
                LoopAction::Continue
            },
        )
        .map_err(BackendError::InitializationFailed)?;

        Ok(Self {
            controller,
            device_path: request.device_path.clone(),
        })
    }

    /// Path of the device being captured
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Check if the capture thread is alive
    pub fn is_running(&self) -> bool {
        self.controller.is_running()
    }

    /// Stop capturing and wait for the thread
    pub fn stop(mut self) {
        info!(device = %self.device_path, "Stopping V4L2 capture");
        self.controller.stop();
    }
}

/// Wait for the next frame, then drain whatever else is already filled and
/// return only the newest. `None` means nothing arrived within the timeout.
fn capture_newest(state: &mut CaptureState) -> Option<Frame> {
    if state.resync {
        match CaptureStream::dequeue(&mut state.stream) {
            Ok(_) => state.resync = false,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return None,
            Err(e) => {
                warn!(error = %e, "Failed to dequeue frame");
                std::thread::sleep(RETRY_DELAY);
                return None;
            }
        }
    }

    let first = match dequeue_frame(state) {
        Ok(frame) => frame,
        Err(e) if e.kind() == io::ErrorKind::TimedOut => {
            state.resync = true;
            return None;
        }
        Err(e) => {
            warn!(error = %e, "Failed to dequeue frame");
            std::thread::sleep(RETRY_DELAY);
            return None;
        }
    };

    let max_extra = MMAP_BUFFER_COUNT.saturating_sub(1) as usize;
    let (frame, skipped) = keep_newest(first, max_extra, || {
        if !frame_ready(&state.stream) {
            return None;
        }
        match dequeue_frame(state) {
            Ok(frame) => Some(frame),
            Err(e) => {
                state.resync = e.kind() == io::ErrorKind::TimedOut;
                debug!(error = %e, "Stopped draining filled buffers");
                None
            }
        }
    });

    state.delivered += 1;
    state.skipped += skipped as u64;
    if state.delivered % LOG_INTERVAL_FRAMES == 0 {
        debug!(
            delivered = state.delivered,
            skipped = state.skipped,
            sequence = frame.sequence,
            "Frame captured"
        );
    }

    Some(frame)
}

/// Dequeue one filled buffer into an owned frame.
fn dequeue_frame(state: &mut CaptureState) -> io::Result<Frame> {
    let (buf, meta) = state.stream.next()?;
    let used = match meta.bytesused as usize {
        0 => buf.len(),
        n => n.min(buf.len()),
    };
    // The mapped buffer goes back to the driver on the next dequeue
    Ok(Frame::new(
        FrameData::copy_from_slice(&buf[..used]),
        state.layout,
        meta.sequence as u64,
    ))
}

/// True when a filled buffer can be dequeued without blocking
fn frame_ready(stream: &MmapStream<'static>) -> bool {
    matches!(stream.handle().poll(libc::POLLIN, 0), Ok(n) if n > 0)
}

/// Replace `first` with each value `more` yields, at most `max_extra` times.
///
/// Returns the last value seen and how many older ones it replaced.
fn keep_newest<T>(first: T, max_extra: usize, mut more: impl FnMut() -> Option<T>) -> (T, usize) {
    let mut newest = first;
    let mut replaced = 0;
    while replaced < max_extra {
        match more() {
            Some(next) => {
                newest = next;
                replaced += 1;
            }
            None => break,
        }
    }
    (newest, replaced)
}

fn open_stream(request: &CaptureRequest) -> Result<CaptureState, String> {
    info!(
        device = %request.device_path,
        width = request.width,
        height = request.height,
        "Opening V4L2 device"
    );

    let dev = Device::with_path(&request.device_path).map_err(|e| {
        BackendError::DeviceNotFound(format!("{}: {}", request.device_path, e)).to_string()
    })?;

    let advertised: Vec<FourCC> = dev
        .enum_formats()
        .map_err(|e| format!("Failed to enumerate formats: {}", e))?
        .into_iter()
        .map(|desc| desc.fourcc)
        .collect();

    let mut negotiated = None;
    for (code, order) in PACKED_FORMATS {
        let fourcc = FourCC::new(code);
        if !advertised.contains(&fourcc) {
            continue;
        }

        let mut format = dev
            .format()
            .map_err(|e| format!("Failed to query format: {}", e))?;
        format.width = request.width;
        format.height = request.height;
        format.fourcc = fourcc;

        match dev.set_format(&format) {
            Ok(applied) if applied.fourcc == fourcc => {
                negotiated = Some((applied, order));
                break;
            }
            Ok(applied) => {
                debug!(requested = %fourcc, got = %applied.fourcc, "Driver substituted format");
            }
            Err(e) => {
                debug!(requested = %fourcc, error = %e, "Format rejected");
            }
        }
    }

    let (format, order) = negotiated.ok_or_else(|| {
        BackendError::FormatNotSupported(format!(
            "{} offers no packed RGBA/BGRA format",
            request.device_path
        ))
        .to_string()
    })?;

    let stride = if format.stride >= format.width * FrameLayout::BYTES_PER_PIXEL {
        format.stride
    } else {
        format.width * FrameLayout::BYTES_PER_PIXEL
    };
    let layout = FrameLayout::new(format.width, format.height, stride, order);

    let mut stream = MmapStream::with_buffers(&dev, Type::VideoCapture, MMAP_BUFFER_COUNT)
        .map_err(|e| format!("Failed to create buffer stream: {}", e))?;
    stream.set_timeout(DEQUEUE_TIMEOUT);

    info!(
        width = layout.width,
        height = layout.height,
        stride = layout.stride,
        order = %layout.order,
        fourcc = %format.fourcc,
        "V4L2 capture stream started"
    );

    Ok(CaptureState {
        stream,
        layout,
        delivered: 0,
        skipped: 0,
        resync: false,
        _device: dev,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_order_mapping() {
        assert_eq!(
            channel_order_for(FourCC::new(b"AR24")),
            Some(ChannelOrder::Bgra)
        );
        assert_eq!(
            channel_order_for(FourCC::new(b"XB24")),
            Some(ChannelOrder::Rgba)
        );
        assert_eq!(channel_order_for(FourCC::new(b"YUYV")), None);
        assert_eq!(channel_order_for(FourCC::new(b"MJPG")), None);
    }

    #[test]
    fn test_keep_newest_without_backlog() {
        let (frame, replaced) = keep_newest(7, 3, || None);
        assert_eq!((frame, replaced), (7, 0));
    }

    #[test]
    fn test_keep_newest_takes_last_of_backlog() {
        let mut backlog = vec![10, 11, 12].into_iter();
        let (frame, replaced) = keep_newest(9, 3, || backlog.next());
        assert_eq!((frame, replaced), (12, 3));
    }

    #[test]
    fn test_keep_newest_stops_at_bound() {
        let mut calls = 0;
        let (frame, replaced) = keep_newest(0, 3, || {
            calls += 1;
            Some(calls)
        });
        assert_eq!((frame, replaced), (3, 3));
        assert_eq!(calls, 3);

        let (frame, replaced) = keep_newest(5, 0, || -> Option<i32> {
            panic!("nothing may be pulled with a zero bound")
        });
        assert_eq!((frame, replaced), (5, 0));
    }

    #[test]
    fn test_missing_device_fails_to_start() {
        let request = CaptureRequest {
            device_path: "/dev/video-does-not-exist".to_string(),
            width: 640,
            height: 480,
        };
        let result = V4l2Source::start(&request, Box::new(|_frame| {}));
        assert!(matches!(
            result,
            Err(BackendError::InitializationFailed(_))
        ));
    }
}
