//! In-process queue backend

use crate::adapter::{AdapterResult, QueueAdapter};
use crate::error::AdapterError;
use crate::job::{Job, JobHandle, JobPayload};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Acknowledged handles kept per outcome by default
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

struct InFlight {
    owner: Uuid,
    queue: String,
    job: Job,
}

struct QueueState {
    queues: HashMap<String, VecDeque<Job>>,
    in_flight: HashMap<JobHandle, InFlight>,
    succeeded: VecDeque<JobHandle>,
    failed: VecDeque<JobHandle>,
    succeeded_total: u64,
    failed_total: u64,
    history_limit: usize,
    reject_acks: bool,
}

impl QueueState {
    fn new(history_limit: usize) -> Self {
        QueueState {
            queues: HashMap::new(),
            in_flight: HashMap::new(),
            succeeded: VecDeque::new(),
            failed: VecDeque::new(),
            succeeded_total: 0,
            failed_total: 0,
            history_limit,
            reject_acks: false,
        }
    }

    fn record(&mut self, handle: JobHandle, success: bool) {
        let limit = self.history_limit;
        let history = if success {
            self.succeeded_total += 1;
            &mut self.succeeded
        } else {
            self.failed_total += 1;
            &mut self.failed
        };

        if limit == 0 {
            return;
        }
        if history.len() == limit {
            history.pop_front();
        }
        history.push_back(handle);
    }
}

struct Shared {
    state: Mutex<QueueState>,
    arrived: Notify,
}

/// Named in-memory queues, shared between producers and [`MemoryAdapter`]s
#[derive(Clone)]
pub struct MemoryQueue {
    shared: Arc<Shared>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Keep at most `limit` acknowledged handles per outcome; `0` keeps none.
    /// Totals are counted regardless.
    pub fn with_history_limit(limit: usize) -> Self {
        MemoryQueue {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::new(limit)),
                arrived: Notify::new(),
            }),
        }
    }

    /// Enqueue a payload and return the handle it will be fetched with.
    pub fn push(&self, queue: &str, payload: impl Into<JobPayload>) -> JobHandle {
        let handle = JobHandle::new(Uuid::new_v4().to_string());
        let job = Job::new(handle.clone(), payload);

        self.shared
            .state
            .lock()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(job);
        self.shared.arrived.notify_waiters();

        handle
    }

    /// Jobs waiting in `queue`
    pub fn len(&self, queue: &str) -> usize {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    /// Jobs fetched but not yet acknowledged
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }

    /// Most recently succeeded handles, oldest first
    pub fn succeeded(&self) -> Vec<JobHandle> {
        self.shared.state.lock().succeeded.iter().cloned().collect()
    }

    /// Most recently failed handles, oldest first
    pub fn failed(&self) -> Vec<JobHandle> {
        self.shared.state.lock().failed.iter().cloned().collect()
    }

    /// Number of success and failure acknowledgments since creation
    pub fn totals(&self) -> (u64, u64) {
        let state = self.shared.state.lock();
        (state.succeeded_total, state.failed_total)
    }

    /// Make every following acknowledgment fail, as a backend outage would.
    pub fn reject_acks(&self, reject: bool) {
        self.shared.state.lock().reject_acks = reject;
    }

    fn take(&self, queue: &str, owner: Uuid) -> Option<Job> {
        let mut state = self.shared.state.lock();
        let job = state.queues.get_mut(queue)?.pop_front()?;
        state.in_flight.insert(
            job.handle.clone(),
            InFlight {
                owner,
                queue: queue.to_string(),
                job: job.clone(),
            },
        );
        Some(job)
    }

    fn settle(&self, handle: &JobHandle, success: bool) -> AdapterResult<()> {
        let operation = if success { "success ack" } else { "failure ack" };
        let mut state = self.shared.state.lock();

        if state.reject_acks {
            return Err(AdapterError::rejected(operation, "acknowledgments disabled"));
        }

        if state.in_flight.remove(handle).is_none() {
            return Err(AdapterError::rejected(
                operation,
                format!("unknown job handle {}", handle),
            ));
        }

        state.record(handle.clone(), success);
        Ok(())
    }

    /// Put the jobs `owner` fetched but never acknowledged back at the head
    /// of their queues.
    fn requeue_in_flight(&self, owner: Uuid) -> usize {
        let mut state = self.shared.state.lock();
        let handles: Vec<JobHandle> = state
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.owner == owner)
            .map(|(handle, _)| handle.clone())
            .collect();

        for handle in &handles {
            if let Some(entry) = state.in_flight.remove(handle) {
                state.queues.entry(entry.queue).or_default().push_front(entry.job);
            }
        }
        if !handles.is_empty() {
            self.shared.arrived.notify_waiters();
        }
        handles.len()
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// [`QueueAdapter`] over a [`MemoryQueue`]
pub struct MemoryAdapter {
    id: Uuid,
    queue: MemoryQueue,
    work_timeout: Option<Duration>,
    connected: bool,
    bound: Option<String>,
}

impl MemoryAdapter {
    pub fn new(queue: MemoryQueue) -> Self {
        MemoryAdapter {
            id: Uuid::new_v4(),
            queue,
            work_timeout: None,
            connected: false,
            bound: None,
        }
    }

    pub fn queue(&self) -> &MemoryQueue {
        &self.queue
    }
}

#[async_trait]
impl QueueAdapter for MemoryAdapter {
    fn set_work_timeout(&mut self, timeout: Option<Duration>) {
        self.work_timeout = timeout;
    }

    async fn connect(&mut self) -> AdapterResult<()> {
        self.connected = true;
        Ok(())
    }

    async fn bind_read(&mut self, queue: &str) -> AdapterResult<()> {
        if !self.connected {
            return Err(AdapterError::Contract("bind_read before connect".to_string()));
        }
        if queue.is_empty() {
            return Err(AdapterError::rejected("bind", "empty queue name"));
        }
        self.bound = Some(queue.to_string());
        Ok(())
    }

    async fn pick_task(&mut self) -> AdapterResult<Option<Job>> {
        let queue = self
            .bound
            .clone()
            .ok_or_else(|| AdapterError::Contract("pick_task before bind_read".to_string()))?;
        let deadline = self.work_timeout.map(|timeout| Instant::now() + timeout);

        loop {
            // Registered before checking so a push in between is not missed.
            let arrived = self.queue.shared.arrived.notified();

            if let Some(job) = self.queue.take(&queue, self.id) {
                return Ok(Some(job));
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, arrived).await.is_err() {
                        return Ok(None);
                    }
                }
                None => arrived.await,
            }
        }
    }

    async fn after_work_success(&mut self, handle: &JobHandle) -> AdapterResult<()> {
        self.queue.settle(handle, true)
    }

    async fn after_work_failed(&mut self, handle: &JobHandle) -> AdapterResult<()> {
        self.queue.settle(handle, false)
    }

    async fn disconnect(&mut self) {
        let requeued = self.queue.requeue_in_flight(self.id);
        if requeued > 0 {
            debug!("Returned {} unacknowledged jobs to their queues", requeued);
        }
        self.bound = None;
        self.connected = false;
    }
}
