// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline wiring
//!
//! A [`Session`] owns the orchestrator, the live source (when running) and
//! the still image. The viewer and the CLI only talk to this type.

use crate::backends::camera::{CaptureRequest, TextureSource, V4l2Source, load_still_image};
use crate::constants::gpu::DEFAULT_ALIAS_CAPACITY;
use crate::errors::{AppError, AppResult};
use crate::gpu;
use crate::invariant::{SharedParameters, TransformParameters};
use crate::pipelines::cpu::{CpuBridge, CpuPresenter};
use crate::pipelines::{
    CompletionHook, FrameCounts, FrameOrchestrator, FrameOutcome, FrameSink, PresentedFrame,
    PresentedReceiver, presented_channel,
};
use crate::shaders::{ComputeRenderer, TextureBridge};
use image::RgbaImage;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Which implementation renders frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderBackend {
    /// wgpu compute programs
    #[default]
    Gpu,
    /// Scalar reference kernel
    Cpu,
}

impl std::fmt::Display for RenderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderBackend::Gpu => write!(f, "GPU"),
            RenderBackend::Cpu => write!(f, "CPU"),
        }
    }
}

/// Build an orchestrator for the chosen backend.
///
/// For the GPU backend a missing device or a program that fails to build is
/// returned as an error; nothing falls back silently.
pub fn build_pipeline(
    backend: RenderBackend,
    params: SharedParameters,
    alias_capacity: usize,
    hook: Option<CompletionHook>,
) -> AppResult<(Arc<dyn FrameSink>, PresentedReceiver)> {
    let (publisher, receiver) = presented_channel();

    let sink: Arc<dyn FrameSink> = match backend {
        RenderBackend::Gpu => {
            let ctx = gpu::create_compute_device_blocking("invariance")?;
            info!(
                adapter = %ctx.info.adapter_name,
                backend = ?ctx.info.backend,
                "GPU pipeline selected"
            );
            let bridge_ctx = ctx.clone();
            Arc::new(FrameOrchestrator::new(
                move || Ok(TextureBridge::new(bridge_ctx, alias_capacity)),
                move || Ok(ComputeRenderer::new(ctx, params, publisher)?),
                hook,
            )?)
        }
        RenderBackend::Cpu => {
            info!("CPU reference pipeline selected");
            Arc::new(FrameOrchestrator::new(
                move || Ok(CpuBridge::new(alias_capacity)),
                move || Ok(CpuPresenter::new(params, publisher)),
                hook,
            )?)
        }
    };

    Ok((sink, receiver))
}

/// Run a single image through a fresh pipeline and return what was shown
pub fn process_still(
    backend: RenderBackend,
    params: TransformParameters,
    image: Arc<RgbaImage>,
) -> AppResult<PresentedFrame> {
    let (sink, presented) = build_pipeline(
        backend,
        SharedParameters::new(params),
        DEFAULT_ALIAS_CAPACITY,
        None,
    )?;

    match sink.submit(Some(TextureSource::Image(image))) {
        FrameOutcome::Presented { sequence } => {
            debug!(sequence, "Still image processed");
        }
        FrameOutcome::Dropped => return Err(AppError::Other("Frame was dropped".into())),
        FrameOutcome::Failed(e) => return Err(e),
    }

    let shown = presented.borrow().clone();
    shown.ok_or_else(|| AppError::Other("Nothing was presented".into()))
}

/// Running pipeline plus its sources
pub struct Session {
    // Stopped before the pipeline it submits to
    live: Option<V4l2Source>,
    sink: Arc<dyn FrameSink>,
    presented: PresentedReceiver,
    params: SharedParameters,
    still: Option<Arc<RgbaImage>>,
    capture: CaptureRequest,
    backend: RenderBackend,
}

impl Session {
    pub fn new(
        backend: RenderBackend,
        params: SharedParameters,
        alias_capacity: usize,
        capture: CaptureRequest,
    ) -> AppResult<Self> {
        let (sink, presented) = build_pipeline(backend, params.clone(), alias_capacity, None)?;
        Ok(Self {
            live: None,
            sink,
            presented,
            params,
            still: None,
            capture,
            backend,
        })
    }

    /// Decode and remember the image shown in static mode
    pub fn load_still(&mut self, path: &Path) -> AppResult<()> {
        self.still = Some(load_still_image(path)?);
        Ok(())
    }

    /// Show the still image, or the placeholder if there is none
    pub fn submit_still(&self) -> FrameOutcome {
        self.sink
            .submit(self.still.clone().map(TextureSource::Image))
    }

    /// Start pushing camera frames through the pipeline
    pub fn start_live(&mut self) -> AppResult<()> {
        if self.live.is_some() {
            return Ok(());
        }

        let sink = Arc::clone(&self.sink);
        let source = V4l2Source::start(
            &self.capture,
            Box::new(move |frame| {
                sink.submit(Some(TextureSource::Frame(frame)));
            }),
        )?;

        info!(device = %source.device_path(), "Live mode started");
        self.live = Some(source);
        Ok(())
    }

    /// Stop the camera; the last presented frame stays visible
    pub fn stop_live(&mut self) {
        if let Some(source) = self.live.take() {
            source.stop();
            info!("Live mode stopped");
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.as_ref().is_some_and(V4l2Source::is_running)
    }

    /// Receiver for the newest presented frame
    pub fn presented(&self) -> PresentedReceiver {
        self.presented.clone()
    }

    pub fn params(&self) -> &SharedParameters {
        &self.params
    }

    pub fn counts(&self) -> FrameCounts {
        self.sink.counts()
    }

    pub fn backend(&self) -> RenderBackend {
        self.backend
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_live();
    }
}
