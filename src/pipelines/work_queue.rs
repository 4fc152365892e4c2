// SPDX-License-Identifier: GPL-3.0-only

//! Serial execution contexts
//!
//! A [`WorkQueue`] owns one worker thread and one piece of state that only
//! that thread ever touches. Jobs run one at a time in submission order.
//! `dispatch` returns a future for the job's result; `dispatch_sync` blocks
//! the caller on it.
//!
//! ```text
//!  caller ──job──► [ FIFO ] ──► worker thread ──► &mut S
//!     ▲                                   │
//!     └────────── oneshot result ◄────────┘
//! ```

use crate::errors::{AppError, AppResult, QueueError};
use futures::channel::{mpsc, oneshot};
use std::future::Future;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

type Job<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

/// Cloneable submission side of a [`WorkQueue`]
pub struct WorkQueueHandle<S> {
    name: Arc<str>,
    sender: mpsc::UnboundedSender<Job<S>>,
}

impl<S> Clone for WorkQueueHandle<S> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            sender: self.sender.clone(),
        }
    }
}

impl<S: 'static> WorkQueueHandle<S> {
    /// Queue a job; the returned future resolves with its result
    pub fn dispatch<R, F>(&self, job: F) -> impl Future<Output = Result<R, QueueError>> + Send + 'static
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let queued = self
            .sender
            .unbounded_send(Box::new(move |state: &mut S| {
                let _ = tx.send(job(state));
            }))
            .is_ok();
        let name = Arc::clone(&self.name);

        async move {
            if !queued {
                return Err(QueueError::Closed(name.to_string()));
            }
            rx.await.map_err(|_| QueueError::Abandoned(name.to_string()))
        }
    }

    /// Queue a job and block until it has run
    pub fn dispatch_sync<R, F>(&self, job: F) -> Result<R, QueueError>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        pollster::block_on(self.dispatch(job))
    }
}

/// Single-worker serial queue owning state of type `S`
pub struct WorkQueue<S> {
    handle: WorkQueueHandle<S>,
    thread: Option<JoinHandle<()>>,
}

impl<S: 'static> WorkQueue<S> {
    /// Spawn the worker and build its state on it.
    ///
    /// Blocks until `init` has run; its error is returned unchanged.
    pub fn spawn<I>(name: &str, init: I) -> AppResult<Self>
    where
        I: FnOnce() -> AppResult<S> + Send + 'static,
    {
        let (sender, receiver) = mpsc::unbounded::<Job<S>>();
        let (ready_tx, ready_rx) = oneshot::channel::<AppResult<()>>();
        let thread_name = name.to_string();

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut state = match init() {
                    Ok(state) => {
                        let _ = ready_tx.send(Ok(()));
                        state
                    }
                    Err(e) => {
                        warn!(queue = %thread_name, error = %e, "Worker initialization failed");
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                debug!(queue = %thread_name, "Worker ready");
                for job in futures::executor::block_on_stream(receiver) {
                    job(&mut state);
                }
                debug!(queue = %thread_name, "Worker exiting");
            })
            .map_err(|e| QueueError::Init(format!("Failed to spawn {}: {}", name, e)))?;

        let mut queue = Self {
            handle: WorkQueueHandle {
                name: Arc::from(name),
                sender,
            },
            thread: Some(thread),
        };

        match pollster::block_on(ready_rx) {
            Ok(Ok(())) => {
                info!(queue = %name, "Work queue started");
                Ok(queue)
            }
            Ok(Err(e)) => {
                queue.shutdown();
                Err(e)
            }
            Err(_) => {
                queue.shutdown();
                Err(AppError::Queue(QueueError::Init(format!(
                    "{} exited during initialization",
                    name
                ))))
            }
        }
    }

    /// Cloneable handle for submitting from other contexts
    pub fn handle(&self) -> WorkQueueHandle<S> {
        self.handle.clone()
    }

    /// See [`WorkQueueHandle::dispatch`]
    pub fn dispatch<R, F>(&self, job: F) -> impl Future<Output = Result<R, QueueError>> + Send + 'static
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        self.handle.dispatch(job)
    }

    /// See [`WorkQueueHandle::dispatch_sync`]
    pub fn dispatch_sync<R, F>(&self, job: F) -> Result<R, QueueError>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        self.handle.dispatch_sync(job)
    }
}

impl<S> WorkQueue<S> {
    /// Close the queue for every handle and wait for queued jobs to finish
    pub fn shutdown(&mut self) {
        self.handle.sender.close_channel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(queue = %self.handle.name, "Worker thread panicked");
            }
        }
    }
}

impl<S> Drop for WorkQueue<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_jobs_run_in_order() {
        let queue = WorkQueue::spawn("test-order", || Ok(Vec::<u32>::new())).unwrap();
        let pending: Vec<_> = (0..20)
            .map(|i| queue.dispatch(move |log: &mut Vec<u32>| log.push(i)))
            .collect();
        for job in pending {
            pollster::block_on(job).unwrap();
        }

        let log = queue.dispatch_sync(|log: &mut Vec<u32>| log.clone()).unwrap();
        assert_eq!(log, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_state_need_not_be_send() {
        let queue = WorkQueue::spawn("test-local", || Ok(Rc::new(RefCell::new(0u32)))).unwrap();
        queue
            .dispatch_sync(|state: &mut Rc<RefCell<u32>>| *state.borrow_mut() += 5)
            .unwrap();
        let value = queue
            .dispatch_sync(|state: &mut Rc<RefCell<u32>>| *state.borrow())
            .unwrap();
        assert_eq!(value, 5);
    }

    #[test]
    fn test_init_error_is_returned() {
        let result = WorkQueue::<()>::spawn("test-init-error", || Err("no device".into()));
        match result {
            Err(AppError::Other(msg)) => assert_eq!(msg, "no device"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("init should fail"),
        }
    }

    #[test]
    fn test_closed_queue_rejects_jobs() {
        let mut queue = WorkQueue::spawn("test-closed", || Ok(())).unwrap();
        let handle = queue.handle();
        queue.shutdown();

        assert_eq!(
            handle.dispatch_sync(|_: &mut ()| ()),
            Err(QueueError::Closed("test-closed".to_string()))
        );
    }

    #[test]
    fn test_panicking_job_is_reported() {
        let queue = WorkQueue::spawn("test-panic", || Ok(())).unwrap();
        let result = queue.dispatch_sync(|_: &mut ()| -> u32 { panic!("job failed") });
        assert_eq!(result, Err(QueueError::Abandoned("test-panic".to_string())));
    }
}
