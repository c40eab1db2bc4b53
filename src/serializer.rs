//! In-order, one-at-a-time execution of queued write jobs.
//!
//! Jobs are pushed onto a [`BoundedFifoQueue`] and executed by a single
//! background drain loop. The loop is spawned on the current Tokio runtime
//! the first time a job arrives while the serializer is idle, and exits as
//! soon as the queue is empty again.
//!
//! Failures inside a job (or its completion callback) are logged and never
//! stop the loop: one failing write must not block the writes behind it.
//! Callers that need the outcome pass a completion callback, which receives
//! the job's `Result`.

use crate::queue::{BoundedFifoQueue, QueueError};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, warn};

/// Errors returned when handing work to a [`WriteSerializer`]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SerializerError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("no Tokio runtime available to run queued writes")]
    NoRuntime,
}

/// Boxed error type produced by queued work
pub type JobError = Box<dyn std::error::Error + Send + Sync>;

/// Result type of queued work
pub type JobResult<T> = Result<T, JobError>;

type Task = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct Inner {
    queue: Mutex<BoundedFifoQueue<Task>>,
    draining: AtomicBool,
    /// Signalled whenever a drain loop exits
    idle: Notify,
}

/// Serializes asynchronous write jobs in submission order
///
/// Cloning yields another handle onto the same queue and drain loop.
#[derive(Clone)]
pub struct WriteSerializer {
    inner: Arc<Inner>,
}

impl WriteSerializer {
    /// Create a serializer that holds at most `capacity` pending jobs
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        Ok(Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(BoundedFifoQueue::new(capacity)?),
                draining: AtomicBool::new(false),
                idle: Notify::new(),
            }),
        })
    }

    /// Queue `work` for execution after every previously queued job
    ///
    /// Returns once the job is accepted, not once it has run. Outside a Tokio
    /// runtime nothing is queued and [`SerializerError::NoRuntime`] is returned.
    pub fn enqueue<W, Fut, T>(&self, work: W) -> Result<(), SerializerError>
    where
        W: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = JobResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.push(Box::new(move || {
            Box::pin(async move {
                if let Err(error) = work().await {
                    warn!(error = %error, "queued write failed");
                }
            })
        }))
    }

    /// Queue `work` and hand its result to `on_complete` once it has run
    pub fn enqueue_with_completion<W, Fut, T, C, CFut>(
        &self,
        work: W,
        on_complete: C,
    ) -> Result<(), SerializerError>
    where
        W: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = JobResult<T>> + Send + 'static,
        T: Send + 'static,
        C: FnOnce(JobResult<T>) -> CFut + Send + 'static,
        CFut: Future<Output = JobResult<()>> + Send + 'static,
    {
        self.push(Box::new(move || {
            Box::pin(async move {
                let result = work().await;
                if let Err(error) = &result {
                    warn!(error = %error, "queued write failed");
                }
                if let Err(error) = on_complete(result).await {
                    warn!(error = %error, "write completion callback failed");
                }
            })
        }))
    }

    /// Wait until every job accepted before this call has finished
    pub async fn flush(&self) -> Result<(), SerializerError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.push(Box::new(move || {
            Box::pin(async move {
                let _ = done_tx.send(());
            })
        }))?;

        // A dropped sender means the barrier task was lost to a panic in the
        // drain loop; either way nothing queued before it is still pending.
        let _ = done_rx.await;
        Ok(())
    }

    /// Wait until the queue is empty and no drain loop is running
    ///
    /// Unlike [`flush`](Self::flush) this never enqueues, so it also works
    /// when the queue is at capacity.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_draining() && self.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Number of jobs waiting to run (excluding the one currently running)
    pub fn len(&self) -> usize {
        self.lock_queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_queue().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock_queue().capacity()
    }

    /// Whether a drain loop is currently running
    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::SeqCst)
    }

    fn lock_queue(&self) -> MutexGuard<'_, BoundedFifoQueue<Task>> {
        Self::lock(&self.inner)
    }

    fn lock(inner: &Inner) -> MutexGuard<'_, BoundedFifoQueue<Task>> {
        // Tasks run outside the lock, so a poisoned queue is still consistent
        inner.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, task: Task) -> Result<(), SerializerError> {
        // Resolve the runtime first so a job is never queued without a loop
        // that can run it.
        let runtime = Handle::try_current().map_err(|_| SerializerError::NoRuntime)?;
        Self::lock(&self.inner).enqueue(task)?;
        self.start_draining(&runtime);
        Ok(())
    }

    fn start_draining(&self, runtime: &Handle) {
        if self
            .inner
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            runtime.spawn(Self::execute(Arc::clone(&self.inner)));
        }
    }

    /// Drain loop: runs queued tasks one at a time until the queue is empty
    async fn execute(inner: Arc<Inner>) {
        debug!("write drain loop started");
        let mut executed = 0usize;

        loop {
            let next = {
                let mut queue = Self::lock(&inner);
                if queue.is_empty() {
                    None
                } else {
                    queue.dequeue().ok()
                }
            };

            match next {
                Some(task) => {
                    if AssertUnwindSafe(task()).catch_unwind().await.is_err() {
                        warn!("queued write panicked");
                    }
                    executed += 1;
                }
                None => {
                    inner.draining.store(false, Ordering::SeqCst);

                    // A producer may have pushed between the empty check and
                    // the flag reset without starting its own loop.
                    let pending = !Self::lock(&inner).is_empty();
                    if pending
                        && inner
                            .draining
                            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok()
                    {
                        continue;
                    }
                    break;
                }
            }
        }

        inner.idle.notify_waiters();
        debug!(executed, "write drain loop finished");
    }
}

impl std::fmt::Debug for WriteSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteSerializer")
            .field("pending", &self.len())
            .field("draining", &self.is_draining())
            .finish()
    }
}
