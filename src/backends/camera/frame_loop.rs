// SPDX-License-Identifier: GPL-3.0-only

//! Thread lifecycle management for capture loops
//!
//! A capture loop runs one closure repeatedly on its own thread until the
//! closure asks to stop or the controller is stopped. Live sources use it to
//! own the device and deliver frames from a thread nobody else touches.

use futures::channel::oneshot;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Action returned by the capture loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for a capture loop running in a separate thread
///
/// ```ignore
/// let mut controller = CaptureLoopController::start_with_init(
///     "capture",
///     || open_device(),
///     |device| {
///         deliver_next_frame(device);
///         LoopAction::Continue
///     },
/// )?;
/// controller.stop();
/// ```
pub struct CaptureLoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl CaptureLoopController {
    /// Start a capture loop whose state is built on the loop thread.
    ///
    /// Blocks until `init_fn` has run so the caller learns about failures
    /// (device busy, format refused) directly. The state never leaves the
    /// loop thread, so it need not be `Send`.
    pub fn start_with_init<S, I, F>(name: &str, init_fn: I, mut loop_fn: F) -> Result<Self, String>
    where
        S: 'static,
        I: FnOnce() -> Result<S, String> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();

        info!(name = %name, "Starting capture loop with initialization");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Capture loop thread started, initializing...");

                let mut state = match init_fn() {
                    Ok(s) => {
                        debug!(name = %name_clone, "Initialization successful");
                        let _ = ready_tx.send(Ok(()));
                        s
                    }
                    Err(e) => {
                        warn!(name = %name_clone, error = %e, "Initialization failed");
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                run_loop(&name_clone, &stop_signal_clone, || loop_fn(&mut state));
                info!(name = %name_clone, "Capture loop thread exiting");
            })
            .map_err(|e| format!("Failed to spawn {}: {}", name, e))?;

        let mut controller = Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        };

        match pollster::block_on(ready_rx) {
            Ok(Ok(())) => Ok(controller),
            Ok(Err(e)) => {
                controller.join();
                Err(e)
            }
            Err(_) => {
                controller.join();
                Err(format!("{} exited during initialization", name))
            }
        }
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for capture loop thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Capture loop thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Capture loop thread finished");
            }
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureLoopController dropped, stopping loop");
            self.stop();
        }
    }
}

fn run_loop<F: FnMut() -> LoopAction>(name: &str, stop_signal: &AtomicBool, mut step: F) {
    loop {
        if stop_signal.load(Ordering::SeqCst) {
            debug!(name = %name, "Stop signal received");
            break;
        }

        if step() == LoopAction::Stop {
            debug!(name = %name, "Loop requested stop");
            break;
        }
    }
}
