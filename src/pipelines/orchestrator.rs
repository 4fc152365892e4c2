// SPDX-License-Identifier: GPL-3.0-only

//! Frame orchestration
//!
//! [`FrameOrchestrator::submit`] is the only way into the pipeline. Every
//! submission is queued on the texture-update context, which adapts it,
//! hands the image to the render context and waits for the presentation to
//! finish before releasing aliases and taking the next one. The submitter
//! blocks for the whole cycle, so a frame source never has more than one
//! frame outstanding.

use super::work_queue::{WorkQueue, WorkQueueHandle};
use super::{FrameCounts, FrameOutcome, FramePresenter, FrameSink, ImageBridge};
use crate::backends::camera::source_or_placeholder;
use crate::backends::camera::types::TextureSource;
use crate::constants::capture::LOG_INTERVAL_FRAMES;
use crate::errors::{AppError, AppResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Called on the texture-update context after every cycle
pub type CompletionHook = Box<dyn FnMut(&FrameOutcome) + Send + 'static>;

#[derive(Debug, Default)]
struct OutcomeCounters {
    presented: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl OutcomeCounters {
    fn record(&self, outcome: &FrameOutcome) {
        let counter = match outcome {
            FrameOutcome::Presented { .. } => &self.presented,
            FrameOutcome::Dropped => &self.dropped,
            FrameOutcome::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> FrameCounts {
        FrameCounts {
            presented: self.presented.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// State owned by the texture-update context
struct BridgeContext<B, P> {
    bridge: B,
    render: WorkQueueHandle<P>,
    hook: Option<CompletionHook>,
    counters: Arc<OutcomeCounters>,
    admitted: u64,
}

impl<B, P> BridgeContext<B, P>
where
    B: ImageBridge,
    P: FramePresenter<Image = B::Image>,
{
    fn run_cycle(&mut self, source: Option<TextureSource>) -> FrameOutcome {
        self.admitted += 1;
        let sequence = self.admitted;
        let source = source_or_placeholder(source);
        let (width, height) = source.dimensions();

        let outcome = match self.bridge.adapt(source) {
            Ok(image) => {
                match self
                    .render
                    .dispatch_sync(move |presenter: &mut P| presenter.present(image, sequence))
                {
                    Ok(Ok(())) => FrameOutcome::Presented { sequence },
                    Ok(Err(e)) => {
                        warn!(sequence, error = %e, "Render failed");
                        FrameOutcome::Failed(e.into())
                    }
                    Err(e) => {
                        warn!(sequence, error = %e, "Render context unavailable");
                        FrameOutcome::Failed(e.into())
                    }
                }
            }
            Err(e) => {
                debug!(sequence, width, height, reason = %e, "Frame dropped by bridge");
                FrameOutcome::Dropped
            }
        };

        let released = self.bridge.release_aliases();
        self.counters.record(&outcome);

        if sequence % LOG_INTERVAL_FRAMES == 0 {
            let counts = self.counters.snapshot();
            debug!(
                sequence,
                released,
                presented = counts.presented,
                dropped = counts.dropped,
                failed = counts.failed,
                "Pipeline progress"
            );
        }

        if let Some(hook) = self.hook.as_mut() {
            hook(&outcome);
        }
        outcome
    }
}

/// Serial bridge → render driver
pub struct FrameOrchestrator<B, P>
where
    B: ImageBridge,
    P: FramePresenter<Image = B::Image>,
{
    texture_queue: WorkQueue<BridgeContext<B, P>>,
    render_queue: WorkQueue<P>,
    counters: Arc<OutcomeCounters>,
}

impl<B, P> FrameOrchestrator<B, P>
where
    B: ImageBridge,
    P: FramePresenter<Image = B::Image>,
{
    /// Start both execution contexts.
    ///
    /// The presenter is built first on the render context and the bridge on
    /// the texture-update context; either constructor's error is returned.
    pub fn new<BI, PI>(
        bridge_init: BI,
        presenter_init: PI,
        hook: Option<CompletionHook>,
    ) -> AppResult<Self>
    where
        BI: FnOnce() -> AppResult<B> + Send + 'static,
        PI: FnOnce() -> AppResult<P> + Send + 'static,
    {
        let render_queue = WorkQueue::spawn("render", presenter_init)?;
        let render = render_queue.handle();
        let counters = Arc::new(OutcomeCounters::default());
        let context_counters = Arc::clone(&counters);

        let texture_queue = WorkQueue::spawn("texture-update", move || {
            Ok(BridgeContext {
                bridge: bridge_init()?,
                render,
                hook,
                counters: context_counters,
                admitted: 0,
            })
        })?;

        info!("Frame orchestrator started");

        Ok(Self {
            texture_queue,
            render_queue,
            counters,
        })
    }

    /// Run one frame through bridge, render and present.
    ///
    /// `None` shows the blank placeholder. Blocks until the cycle is over,
    /// including alias release.
    pub fn submit(&self, source: Option<TextureSource>) -> FrameOutcome {
        match self
            .texture_queue
            .dispatch_sync(move |ctx: &mut BridgeContext<B, P>| ctx.run_cycle(source))
        {
            Ok(outcome) => outcome,
            Err(e) => {
                let outcome = FrameOutcome::Failed(AppError::Queue(e));
                self.counters.record(&outcome);
                outcome
            }
        }
    }

    /// Totals since construction
    pub fn counts(&self) -> FrameCounts {
        self.counters.snapshot()
    }
}

impl<B, P> Drop for FrameOrchestrator<B, P>
where
    B: ImageBridge,
    P: FramePresenter<Image = B::Image>,
{
    fn drop(&mut self) {
        // The bridge context holds a render handle; finish its jobs first
        self.texture_queue.shutdown();
        self.render_queue.shutdown();
        debug!("Frame orchestrator stopped");
    }
}

impl<B, P> FrameSink for FrameOrchestrator<B, P>
where
    B: ImageBridge,
    P: FramePresenter<Image = B::Image>,
{
    fn submit(&self, source: Option<TextureSource>) -> FrameOutcome {
        FrameOrchestrator::submit(self, source)
    }

    fn counts(&self) -> FrameCounts {
        FrameOrchestrator::counts(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{ChannelOrder, Frame, FrameData, FrameLayout};
    use crate::errors::{BridgeError, RenderError};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    /// Records what happened, in the order it happened
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Adapt(u32),
        PresentStart(u64, u32),
        PresentEnd(u64),
        Release,
    }

    type Log = Arc<Mutex<Vec<Event>>>;

    struct RecordingBridge {
        log: Log,
    }

    impl ImageBridge for RecordingBridge {
        type Image = u32;

        fn adapt(&mut self, source: TextureSource) -> Result<u32, BridgeError> {
            let (width, _) = source.dimensions();
            self.log.lock().unwrap().push(Event::Adapt(width));
            if width == 0 {
                Err(BridgeError::EmptyFrame)
            } else {
                Ok(width)
            }
        }

        fn release_aliases(&mut self) -> usize {
            self.log.lock().unwrap().push(Event::Release);
            1
        }
    }

    struct RecordingPresenter {
        log: Log,
        fail_on: Option<u32>,
    }

    impl FramePresenter for RecordingPresenter {
        type Image = u32;

        fn present(&mut self, image: u32, sequence: u64) -> Result<(), RenderError> {
            self.log
                .lock()
                .unwrap()
                .push(Event::PresentStart(sequence, image));
            thread::sleep(Duration::from_millis(2));
            self.log.lock().unwrap().push(Event::PresentEnd(sequence));
            if self.fail_on == Some(image) {
                return Err(RenderError::DeviceLost("test".into()));
            }
            Ok(())
        }
    }

    fn frame_of_width(width: u32) -> Option<TextureSource> {
        let layout = FrameLayout::packed(width, 1, ChannelOrder::Bgra);
        let data = FrameData::from(vec![0u8; layout.packed_len()]);
        Some(TextureSource::Frame(Frame::new(data, layout, 0)))
    }

    fn orchestrator(
        log: &Log,
        fail_on: Option<u32>,
        hook: Option<CompletionHook>,
    ) -> FrameOrchestrator<RecordingBridge, RecordingPresenter> {
        let bridge_log = Arc::clone(log);
        let presenter_log = Arc::clone(log);
        FrameOrchestrator::new(
            move || Ok(RecordingBridge { log: bridge_log }),
            move || {
                Ok(RecordingPresenter {
                    log: presenter_log,
                    fail_on,
                })
            },
            hook,
        )
        .expect("orchestrator should start")
    }

    #[test]
    fn test_cycle_order_within_one_frame() {
        let log: Log = Arc::default();
        let orch = orchestrator(&log, None, None);

        let outcome = orch.submit(frame_of_width(4));
        assert!(matches!(outcome, FrameOutcome::Presented { sequence: 1 }));
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Event::Adapt(4),
                Event::PresentStart(1, 4),
                Event::PresentEnd(1),
                Event::Release,
            ]
        );
    }

    #[test]
    fn test_missing_source_uses_placeholder() {
        let log: Log = Arc::default();
        let orch = orchestrator(&log, None, None);

        assert!(orch.submit(None).is_presented());
        assert_eq!(log.lock().unwrap()[0], Event::Adapt(16));
    }

    #[test]
    fn test_bridge_refusal_drops_frame_and_continues() {
        let log: Log = Arc::default();
        let orch = orchestrator(&log, None, None);

        assert!(matches!(orch.submit(frame_of_width(0)), FrameOutcome::Dropped));
        assert!(matches!(
            orch.submit(frame_of_width(3)),
            FrameOutcome::Presented { sequence: 2 }
        ));
        assert_eq!(
            orch.counts(),
            FrameCounts {
                presented: 1,
                dropped: 1,
                failed: 0
            }
        );
        // Aliases are released after a drop too
        let releases = log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| **e == Event::Release)
            .count();
        assert_eq!(releases, 2);
    }

    #[test]
    fn test_render_failure_is_reported() {
        let log: Log = Arc::default();
        let orch = orchestrator(&log, Some(5), None);

        match orch.submit(frame_of_width(5)) {
            FrameOutcome::Failed(AppError::Render(RenderError::DeviceLost(_))) => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(orch.submit(frame_of_width(6)).is_presented());
        assert_eq!(orch.counts().failed, 1);
    }

    #[test]
    fn test_concurrent_submissions_are_serialized() {
        let log: Log = Arc::default();
        let completions = Arc::new(Mutex::new(Vec::new()));
        let hook_completions = Arc::clone(&completions);
        let hook: CompletionHook = Box::new(move |outcome| {
            if let FrameOutcome::Presented { sequence } = outcome {
                hook_completions.lock().unwrap().push(*sequence);
            }
        });
        let orch = Arc::new(orchestrator(&log, None, Some(hook)));

        let workers: Vec<_> = (1..=8)
            .map(|width| {
                let orch = Arc::clone(&orch);
                thread::spawn(move || {
                    for _ in 0..5 {
                        assert!(orch.submit(frame_of_width(width)).is_presented());
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let events = log.lock().unwrap().clone();
        assert_eq!(events.len(), 40 * 4);

        // Every cycle is adapt, start, end, release with nothing interleaved
        for (i, cycle) in events.chunks(4).enumerate() {
            let sequence = i as u64 + 1;
            let Event::Adapt(width) = cycle[0] else {
                panic!("cycle {} does not start with adapt: {:?}", i, cycle);
            };
            assert_eq!(cycle[1], Event::PresentStart(sequence, width));
            assert_eq!(cycle[2], Event::PresentEnd(sequence));
            assert_eq!(cycle[3], Event::Release);
        }

        // Completions fire in admission order
        assert_eq!(*completions.lock().unwrap(), (1..=40).collect::<Vec<u64>>());
        assert_eq!(orch.counts().presented, 40);
    }

    #[test]
    fn test_presenter_init_failure_is_fatal() {
        let result = FrameOrchestrator::<RecordingBridge, RecordingPresenter>::new(
            || Ok(RecordingBridge { log: Arc::default() }),
            || Err(AppError::Other("no program".into())),
            None,
        );
        assert!(matches!(result, Err(AppError::Other(msg)) if msg == "no program"));
    }
}
