use std::sync::Arc;

use lariat_core::{DeleteRequest, Storage};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info};

/// Buffered requests that force a flush.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Producer handle for the deletion pipeline.
///
/// Cheap to clone. Dropping the last handle disconnects the queue, which
/// lets the worker flush its buffer and exit.
#[derive(Debug, Clone)]
pub struct DeleteQueue {
    tx: UnboundedSender<DeleteRequest>,
}

impl DeleteQueue {
    /// Enqueues one delete request without blocking. Returns `false` if the
    /// worker is gone; deletions are best-effort, so callers may ignore it.
    pub fn enqueue(&self, request: DeleteRequest) -> bool {
        self.tx.send(request).is_ok()
    }
}

/// Background task draining the deletion queue into the store in batches.
///
/// Waits on the queue only while its buffer is empty. With anything
/// buffered it polls without blocking, so a momentarily idle queue gets
/// flushed eagerly instead of waiting for a full batch.
pub struct DeleteWorker<S: ?Sized> {
    storage: Arc<S>,
    queue: UnboundedReceiver<DeleteRequest>,
    batch_size: usize,
}

/// Creates the queue/worker pair for `storage`. Spawn [`DeleteWorker::run`]
/// on the runtime and hand clones of the queue to request handlers.
pub fn delete_pipeline<S: Storage + ?Sized>(storage: Arc<S>) -> (DeleteQueue, DeleteWorker<S>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        DeleteQueue { tx },
        DeleteWorker {
            storage,
            queue: rx,
            batch_size: DEFAULT_BATCH_SIZE,
        },
    )
}

impl<S: Storage + ?Sized> DeleteWorker<S> {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Runs until the queue disconnects, then drains the remaining buffer.
    pub async fn run(mut self) {
        info!(batch_size = self.batch_size, "delete worker started");
        let mut buffer: Vec<DeleteRequest> = Vec::with_capacity(self.batch_size);

        loop {
            match self.queue.try_recv() {
                Ok(request) => {
                    buffer.push(request);
                    if buffer.len() >= self.batch_size {
                        flush(self.storage.as_ref(), &mut buffer).await;
                    }
                }
                Err(TryRecvError::Empty) => {
                    // Nothing immediately available: apply what we have,
                    // then block until the next request or disconnect.
                    if !buffer.is_empty() {
                        flush(self.storage.as_ref(), &mut buffer).await;
                    }
                    match self.queue.recv().await {
                        Some(request) => buffer.push(request),
                        None => break,
                    }
                }
                Err(TryRecvError::Disconnected) => break,
            }
        }

        if !buffer.is_empty() {
            flush(self.storage.as_ref(), &mut buffer).await;
        }
        info!("delete worker stopped");
    }
}

/// Applies the buffer to the store. Failures are logged and the buffer is
/// dropped either way: nobody is waiting on an asynchronous deletion, so
/// there is no retry and no requeue.
async fn flush<S: Storage + ?Sized>(storage: &S, buffer: &mut Vec<DeleteRequest>) {
    debug!(count = buffer.len(), "flushing delete batch");
    if let Err(err) = storage.delete_batch(buffer).await {
        error!(error = %err, dropped = buffer.len(), "delete batch failed");
    }
    buffer.clear();
}
