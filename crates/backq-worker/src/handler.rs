use async_trait::async_trait;
use backq_core::{Job, Outcome};
use tracing::info;

/// Caller-supplied processing logic driven by [`Worker::work`].
///
/// [`Worker::work`]: crate::Worker::work
#[async_trait]
pub trait JobHandler: Send {
    /// Process one job. [`Outcome::Failure`] makes the worker acknowledge the
    /// job as failed; it is not an engine error.
    async fn handle(&mut self, job: &Job) -> Outcome;

    /// Called at every no-value suspension point of the worker loop: once
    /// after each acknowledged job, twice after an empty poll.
    async fn checkpoint(&mut self) {}
}

/// Adapts a closure into a [`JobHandler`]
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: FnMut(&Job) -> Outcome + Send,
{
    pub fn new(f: F) -> Self {
        FnHandler { f }
    }
}

#[async_trait]
impl<F> JobHandler for FnHandler<F>
where
    F: FnMut(&Job) -> Outcome + Send,
{
    async fn handle(&mut self, job: &Job) -> Outcome {
        (self.f)(job)
    }
}

/// Handler that logs each payload and reports success
#[derive(Debug, Default)]
pub struct LogHandler {
    handled: u64,
}

impl LogHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handled(&self) -> u64 {
        self.handled
    }
}

#[async_trait]
impl JobHandler for LogHandler {
    async fn handle(&mut self, job: &Job) -> Outcome {
        self.handled += 1;
        info!("Job {}: {}", job.handle, job.payload_lossy());
        Outcome::Success
    }
}
