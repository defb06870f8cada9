//! FIFO, single-worker runner for asynchronous tasks.
//!
//! Every task submitted through [`TaskQueue::enqueue`] runs to completion before the next one
//! starts, in submission order, even when tasks await network I/O. A failing or panicking task
//! only affects its own caller.

use std::{any::Any, future::Future, panic::AssertUnwindSafe};

use futures::{FutureExt, future::BoxFuture};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type Job = BoxFuture<'static, ()>;

/// Errors delivered to the caller of a queued task.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The worker is gone, so the task was never run or its result was lost.
    #[error("task queue `{0}` is closed")]
    Closed(&'static str),
    /// The task panicked; the queue kept going.
    #[error("queued task panicked: {0}")]
    TaskPanicked(String),
}

/// Handle to a serialized task queue. Cloning shares the same worker.
#[derive(Clone)]
pub struct TaskQueue {
    name: &'static str,
    sender: mpsc::UnboundedSender<Job>,
}

impl TaskQueue {
    /// Spawn the worker on the current Tokio runtime and return a handle to it.
    pub fn spawn(name: &'static str) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                job.await;
            }
            debug!(queue = name, "task queue worker stopped");
        });

        Self { name, sender }
    }

    /// Submit `task` and return a future resolving to its output.
    ///
    /// The task is queued when this method is called, not when the returned future is first
    /// polled, so submission order is call order.
    pub fn enqueue<F, T>(&self, task: F) -> BoxFuture<'static, Result<T, QueueError>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let name = self.name;
        let (reply_tx, reply_rx) = oneshot::channel();

        let job = async move {
            let outcome = AssertUnwindSafe(task)
                .catch_unwind()
                .await
                .map_err(|payload| {
                    let message = panic_message(payload.as_ref());
                    warn!(queue = name, panic = %message, "queued task panicked");
                    QueueError::TaskPanicked(message)
                });
            // The caller may have dropped its future; the task still ran.
            let _ = reply_tx.send(outcome);
        }
        .boxed();

        let submitted = self.sender.send(job).is_ok();

        Box::pin(async move {
            if !submitted {
                return Err(QueueError::Closed(name));
            }
            reply_rx.await.map_err(|_| QueueError::Closed(name))?
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".into()
    }
}
