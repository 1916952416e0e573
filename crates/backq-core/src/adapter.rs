//! Queue adapter contract
//!
//! A [`QueueAdapter`] is the only thing the worker loop needs from a queue
//! backend. Concrete adapters wrap a backend client (or a [`SocketIo`]
//! connection) and translate these calls into the backend's own protocol.
//!
//! Call order during a run:
//!
//! 1. [`set_work_timeout`](QueueAdapter::set_work_timeout), before connecting
//! 2. [`connect`](QueueAdapter::connect), then [`bind_read`](QueueAdapter::bind_read)
//! 3. repeatedly [`pick_task`](QueueAdapter::pick_task), each returned job
//!    followed by exactly one of
//!    [`after_work_success`](QueueAdapter::after_work_success) /
//!    [`after_work_failed`](QueueAdapter::after_work_failed)
//! 4. [`disconnect`](QueueAdapter::disconnect), only if binding succeeded
//!
//! [`SocketIo`]: backq_transport::SocketIo

use crate::error::AdapterError;
use crate::job::{Job, JobHandle};
use async_trait::async_trait;
use std::time::Duration;

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

#[async_trait]
pub trait QueueAdapter: Send {
    /// How long `pick_task` may block. `None` means block until a job arrives.
    fn set_work_timeout(&mut self, timeout: Option<Duration>);

    async fn connect(&mut self) -> AdapterResult<()>;

    /// Subscribe to `queue` for reading.
    async fn bind_read(&mut self, queue: &str) -> AdapterResult<()>;

    /// Fetch one job. `Ok(None)` is a normal empty poll when a work timeout
    /// is set; it must not happen without one.
    async fn pick_task(&mut self) -> AdapterResult<Option<Job>>;

    async fn after_work_success(&mut self, handle: &JobHandle) -> AdapterResult<()>;

    async fn after_work_failed(&mut self, handle: &JobHandle) -> AdapterResult<()>;

    /// Best effort; errors are the adapter's to log.
    async fn disconnect(&mut self);
}

#[async_trait]
impl<A: QueueAdapter + ?Sized> QueueAdapter for Box<A> {
    fn set_work_timeout(&mut self, timeout: Option<Duration>) {
        (**self).set_work_timeout(timeout)
    }

    async fn connect(&mut self) -> AdapterResult<()> {
        (**self).connect().await
    }

    async fn bind_read(&mut self, queue: &str) -> AdapterResult<()> {
        (**self).bind_read(queue).await
    }

    async fn pick_task(&mut self) -> AdapterResult<Option<Job>> {
        (**self).pick_task().await
    }

    async fn after_work_success(&mut self, handle: &JobHandle) -> AdapterResult<()> {
        (**self).after_work_success(handle).await
    }

    async fn after_work_failed(&mut self, handle: &JobHandle) -> AdapterResult<()> {
        (**self).after_work_failed(handle).await
    }

    async fn disconnect(&mut self) {
        (**self).disconnect().await
    }
}

/// Reject jobs an adapter must never hand out.
pub fn check_job(job: &Job) -> AdapterResult<()> {
    if job.handle.is_empty() {
        return Err(AdapterError::Contract(
            "job handed out with an empty handle".to_string(),
        ));
    }
    Ok(())
}
