//! Bounded copy queue and the worker pool draining it
//!
//! A single producer (the traversal) pushes [`CopyTask`]s into a fixed-capacity FIFO channel
//! and a fixed number of workers pull from it concurrently. Both sides watch a run-scoped
//! [`CancellationToken`]:
//!
//! - a push blocked on a full queue returns [`QueueError::Cancelled`] as soon as the token
//!   is cancelled,
//! - workers stop pulling new tasks once the token is cancelled; a task that was already
//!   dequeued runs to completion.
//!
//! Workers exit when the queue is closed and drained. A failed copy is logged and counted,
//! it never stops a worker.

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::copy::{CopyTask, copy_file};

pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("sync was cancelled")]
    Cancelled,
    #[error("copy queue is closed")]
    Closed,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub files_copied: usize,
    pub bytes_copied: u64,
    pub copy_errors: usize,
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            files_copied: self.files_copied + other.files_copied,
            bytes_copied: self.bytes_copied + other.bytes_copied,
            copy_errors: self.copy_errors + other.copy_errors,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "bytes copied: {}\n\
            files copied: {}\n\
            copy errors: {}\n",
            bytesize::ByteSize(self.bytes_copied),
            self.files_copied,
            self.copy_errors,
        )
    }
}

/// Producer handle of the copy queue.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    sender: async_channel::Sender<CopyTask>,
    cancel: CancellationToken,
}

impl TaskQueue {
    /// Waits for a free slot and enqueues `task`.
    pub async fn push(&self, task: CopyTask) -> Result<(), QueueError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(QueueError::Cancelled),
            res = self.sender.send(task) => res.map_err(|_| QueueError::Closed),
        }
    }

    /// Closes the queue: workers finish whatever is still queued and exit.
    pub fn close(&self) {
        self.sender.close();
    }
}

/// Consumer side: the set of spawned workers.
#[derive(Debug)]
pub struct WorkerPool {
    join_set: tokio::task::JoinSet<Summary>,
}

impl WorkerPool {
    /// Waits for every worker to exit and returns the combined summary.
    ///
    /// Workers only exit once the queue is closed and drained (or the run is cancelled), so
    /// the queue must be closed before calling this.
    pub async fn join(mut self) -> anyhow::Result<Summary> {
        let mut summary = Summary::default();
        while let Some(res) = self.join_set.join_next().await {
            summary = summary + res?;
        }
        Ok(summary)
    }
}

/// Creates a queue with `capacity` slots and spawns `workers` tasks draining it.
///
/// Must be called from within a tokio runtime.
pub fn spawn(
    workers: usize,
    capacity: usize,
    cancel: CancellationToken,
) -> (TaskQueue, WorkerPool) {
    assert!(workers > 0);
    assert!(capacity > 0);
    let (sender, receiver) = async_channel::bounded(capacity);
    let mut join_set = tokio::task::JoinSet::new();
    for id in 0..workers {
        join_set.spawn(copy_worker(id, receiver.clone(), cancel.clone()));
    }
    (TaskQueue { sender, cancel }, WorkerPool { join_set })
}

#[instrument(skip(receiver, cancel))]
async fn copy_worker(
    id: usize,
    receiver: async_channel::Receiver<CopyTask>,
    cancel: CancellationToken,
) -> Summary {
    let mut summary = Summary::default();
    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("cancelled, not pulling any more tasks");
                break;
            }
            res = receiver.recv() => match res {
                Ok(task) => task,
                // closed and drained
                Err(_) => break,
            },
        };
        match copy_file(&task.src, &task.dst).await {
            Ok(bytes) => {
                tracing::debug!("copied {:?} -> {:?}", &task.src, &task.dst);
                summary.files_copied += 1;
                summary.bytes_copied += bytes;
            }
            Err(error) => {
                tracing::error!("copy error: {}", &error);
                summary.copy_errors += 1;
            }
        }
    }
    tracing::debug!("worker done");
    summary
}
