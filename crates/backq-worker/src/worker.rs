use crate::handler::JobHandler;
use crate::signal::{SignalHandle, SignalMonitor};
use backq_core::{
    check_job, BindPhase, Job, JobHandle, Outcome, QueueAdapter, Result, WorkerConfig,
    WorkerError,
};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, Instrument};

/// Adapter binding of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Unbound,
    Bound,
    Disconnected,
}

/// What the worker hands back each time it suspends
#[derive(Debug)]
pub enum Step {
    /// A fetched job; resume with its [`Outcome`].
    Job(Job),
    /// A no-value suspension; resume with `None`.
    Checkpoint,
    /// The loop has stopped; call [`Worker::finish`].
    Finished,
}

/// Decides what happens when a voluntary limit is reached.
///
/// Both hooks default to `true`, which stops the worker.
pub trait WorkerHooks: Send {
    fn on_idle_timeout(&mut self, _inactive: Duration) -> bool {
        true
    }

    fn on_restart_threshold(&mut self, _processed: u64) -> bool {
        true
    }
}

pub struct DefaultHooks;

impl WorkerHooks for DefaultHooks {}

enum Phase {
    /// Loop not entered yet
    Ready,
    /// Next resume starts an iteration
    Fetch,
    /// A job was yielded and awaits its outcome
    Processing(JobHandle),
    /// First of the two checkpoints after an empty poll was yielded
    EmptyPoll,
    /// Last checkpoint of the iteration was yielded
    Settled,
    Terminated,
}

/// Single-instance worker: fetches, hands out and acknowledges jobs one at a
/// time until a signal, a voluntary limit or a fatal error stops it.
///
/// The loop can be driven step by step with [`resume`](Worker::resume) or
/// with a [`JobHandler`] via [`work`](Worker::work) / [`run`](Worker::run).
pub struct Worker<A> {
    adapter: A,
    config: WorkerConfig,
    worker_id: String,
    state: BindingState,
    phase: Phase,
    hooks: Box<dyn WorkerHooks>,
    monitor: Option<SignalMonitor>,
    debug: bool,
    jobs_processed: u64,
    last_active: Instant,
}

impl<A: QueueAdapter> Worker<A> {
    pub fn new(adapter: A, config: WorkerConfig) -> Self {
        let worker_id = config.generate_worker_id();

        Worker {
            adapter,
            config,
            worker_id,
            state: BindingState::Unbound,
            phase: Phase::Ready,
            hooks: Box::new(DefaultHooks),
            monitor: None,
            debug: false,
            jobs_processed: 0,
            last_active: Instant::now(),
        }
    }

    pub fn with_hooks(mut self, hooks: impl WorkerHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    /// Use `monitor` instead of installing OS signal handlers in `start()`.
    pub fn with_signal_monitor(mut self, monitor: SignalMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.config.queue_name
    }

    pub fn set_queue_name(&mut self, name: impl Into<String>) {
        self.config.queue_name = name.into();
    }

    pub fn set_work_timeout(&mut self, secs: u64) {
        self.config.work_timeout_secs = secs;
    }

    pub fn set_idle_timeout(&mut self, secs: u64) {
        self.config.idle_timeout_secs = secs;
    }

    pub fn set_restart_threshold(&mut self, count: u64) {
        self.config.restart_threshold = count;
    }

    /// Print idle-timeout and restart-threshold diagnostics at `info` level.
    pub fn toggle_debug(&mut self, enabled: bool) {
        self.debug = enabled;
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn binding_state(&self) -> BindingState {
        self.state
    }

    pub fn jobs_processed(&self) -> u64 {
        self.jobs_processed
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    /// Handle for injecting a termination signal into this worker only.
    pub fn signal_handle(&self) -> Option<SignalHandle> {
        self.monitor.as_ref().map(SignalMonitor::handle)
    }

    /// Validate the configuration, connect the adapter and bind the queue.
    pub async fn start(&mut self) -> Result<()> {
        self.config.validate()?;

        if self.state != BindingState::Unbound {
            return Err(WorkerError::Configuration(format!(
                "worker cannot start from {:?} state",
                self.state
            )));
        }

        let queue = self.config.queue_name.clone();

        // Some adapters need the timeout before connecting.
        self.adapter.set_work_timeout(self.config.work_timeout());

        self.adapter
            .connect()
            .await
            .map_err(|source| WorkerError::Bind {
                phase: BindPhase::Connect,
                queue: queue.clone(),
                source,
            })?;

        self.adapter
            .bind_read(&queue)
            .await
            .map_err(|source| WorkerError::Bind {
                phase: BindPhase::BindRead,
                queue: queue.clone(),
                source,
            })?;

        self.state = BindingState::Bound;
        self.phase = Phase::Ready;

        if self.monitor.is_none() {
            self.monitor = Some(SignalMonitor::install(self.config.signal_dispatch)?);
        }

        info!("Worker {} bound to queue '{}'", self.worker_id, queue);
        Ok(())
    }

    /// Advance the loop to its next suspension point.
    ///
    /// After [`Step::Job`], pass the job's outcome; `None` counts as success.
    /// After [`Step::Checkpoint`], pass `None`.
    pub async fn resume(&mut self, outcome: Option<Outcome>) -> Result<Step> {
        loop {
            match std::mem::replace(&mut self.phase, Phase::Terminated) {
                Phase::Ready => {
                    if self.state != BindingState::Bound {
                        self.phase = Phase::Ready;
                        return Ok(Step::Finished);
                    }
                    self.config.validate()?;
                    self.jobs_processed = 0;
                    self.last_active = Instant::now();
                    self.phase = Phase::Fetch;
                }
                Phase::Fetch => return self.fetch().await,
                Phase::Processing(handle) => {
                    let outcome = outcome.unwrap_or(Outcome::Success);
                    return self.acknowledge(handle, outcome).await;
                }
                Phase::EmptyPoll => {
                    self.phase = Phase::Settled;
                    return Ok(Step::Checkpoint);
                }
                Phase::Settled => {
                    if self.limit_reached() {
                        return Ok(Step::Finished);
                    }
                    self.phase = Phase::Fetch;
                }
                Phase::Terminated => return Ok(Step::Finished),
            }
        }
    }

    /// Drive the loop with `handler` until it stops. Returns the number of
    /// acknowledged jobs.
    pub async fn work<H>(&mut self, handler: &mut H) -> Result<u64>
    where
        H: JobHandler + ?Sized,
    {
        let mut outcome = None;

        loop {
            match self.resume(outcome.take()).await? {
                Step::Job(job) => outcome = Some(handler.handle(&job).await),
                Step::Checkpoint => handler.checkpoint().await,
                Step::Finished => break,
            }
        }

        Ok(self.jobs_processed)
    }

    /// `start`, `work` and `finish` in one call. `finish` runs even when the
    /// loop failed; the loop's error is returned.
    pub async fn run<H>(&mut self, handler: &mut H) -> Result<u64>
    where
        H: JobHandler + ?Sized,
    {
        let span = info_span!("worker", id = %self.worker_id, queue = %self.config.queue_name);

        async move {
            let result = match self.start().await {
                Ok(()) => self.work(handler).await,
                Err(e) => Err(e),
            };

            if let Err(e) = &result {
                error!("Worker stopped: {}", e);
            }

            self.finish().await;
            result
        }
        .instrument(span)
        .await
    }

    /// Disconnect the adapter if it was bound. Returns whether it was.
    pub async fn finish(&mut self) -> bool {
        if self.state != BindingState::Bound {
            return false;
        }

        self.adapter.disconnect().await;
        self.state = BindingState::Disconnected;
        self.phase = Phase::Terminated;

        info!(
            "Worker {} disconnected after {} jobs",
            self.worker_id, self.jobs_processed
        );
        true
    }

    async fn fetch(&mut self) -> Result<Step> {
        if let Some(monitor) = self.monitor.as_mut() {
            if !monitor.is_automatic() {
                monitor.dispatch();
            }
            if monitor.is_termination_requested() {
                info!(
                    "Termination requested ({}), stopping after {} jobs",
                    monitor.pending(),
                    self.jobs_processed
                );
                return Ok(Step::Finished);
            }
        }

        let picked = match self.adapter.pick_task().await {
            Ok(Some(job)) => check_job(&job).map(|()| Some(job)),
            other => other,
        };

        match picked {
            Ok(Some(job)) => {
                self.last_active = Instant::now();
                debug!("Picked job {}", job.handle);
                self.phase = Phase::Processing(job.handle.clone());
                Ok(Step::Job(job))
            }
            Ok(None) if self.config.work_timeout().is_none() => {
                Err(WorkerError::FetchProtocolViolation {
                    processed: self.jobs_processed,
                })
            }
            Ok(None) => {
                self.phase = Phase::EmptyPoll;
                Ok(Step::Checkpoint)
            }
            Err(source) => Err(WorkerError::Fetch {
                processed: self.jobs_processed,
                source,
            }),
        }
    }

    async fn acknowledge(&mut self, handle: JobHandle, outcome: Outcome) -> Result<Step> {
        let acked = match outcome {
            Outcome::Success => self.adapter.after_work_success(&handle).await,
            Outcome::Failure => self.adapter.after_work_failed(&handle).await,
        };

        if let Err(source) = acked {
            return Err(WorkerError::Acknowledgment {
                handle,
                outcome,
                processed: self.jobs_processed,
                source,
            });
        }

        debug!("Acknowledged job {} as {}", handle, outcome);
        self.jobs_processed += 1;
        self.phase = Phase::Settled;
        Ok(Step::Checkpoint)
    }

    fn limit_reached(&mut self) -> bool {
        if let Some(idle_timeout) = self.config.idle_timeout() {
            let work_timeout = self.config.work_timeout().unwrap_or_default();
            let inactive = self.last_active.elapsed();

            if inactive > idle_timeout.saturating_sub(work_timeout) {
                self.diagnostic(format_args!(
                    "Idle timeout reached after {}s without work, quitting",
                    inactive.as_secs()
                ));
                if self.hooks.on_idle_timeout(inactive) {
                    return true;
                }
            }
        }

        let threshold = self.config.restart_threshold;
        if threshold > 0 && self.jobs_processed > threshold - 1 {
            self.diagnostic(format_args!(
                "Restart threshold reached after {} jobs, quitting",
                self.jobs_processed
            ));
            if self.hooks.on_restart_threshold(self.jobs_processed) {
                return true;
            }
        }

        false
    }

    fn diagnostic(&self, message: fmt::Arguments<'_>) {
        if self.debug {
            info!("{}", message);
        } else {
            debug!("{}", message);
        }
    }
}
