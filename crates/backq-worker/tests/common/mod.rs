#![allow(dead_code)]

use async_trait::async_trait;
use backq_core::{AdapterError, AdapterResult, Job, JobHandle, Outcome, QueueAdapter, WorkerConfig};
use backq_worker::{JobHandler, SignalMonitor, Worker};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SetWorkTimeout(Option<Duration>),
    Connect,
    BindRead(String),
    PickTask,
    Success(JobHandle),
    Failed(JobHandle),
    Disconnect,
}

/// Adapter that hands out a fixed list of jobs and records every call.
///
/// Once the list is exhausted, `pick_task` sleeps for the work timeout (if
/// any) and returns no task.
#[derive(Default)]
pub struct ScriptedAdapter {
    pub calls: Vec<Call>,
    pub jobs: VecDeque<Job>,
    pub work_timeout: Option<Duration>,
    pub fail_connect: bool,
    pub fail_bind: bool,
    pub fail_pick: bool,
    pub reject_acks: bool,
}

impl ScriptedAdapter {
    pub fn with_jobs(payloads: &[&str]) -> Self {
        let jobs = payloads
            .iter()
            .enumerate()
            .map(|(i, payload)| Job::new(format!("job-{}", i + 1), payload.as_bytes().to_vec()))
            .collect();

        ScriptedAdapter {
            jobs,
            ..Default::default()
        }
    }

    pub fn picks(&self) -> usize {
        self.calls.iter().filter(|c| **c == Call::PickTask).count()
    }

    /// Calls made after `start()` finished binding
    pub fn loop_calls(&self) -> Vec<Call> {
        self.calls
            .iter()
            .skip_while(|c| !matches!(c, Call::BindRead(_)))
            .skip(1)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl QueueAdapter for ScriptedAdapter {
    fn set_work_timeout(&mut self, timeout: Option<Duration>) {
        self.calls.push(Call::SetWorkTimeout(timeout));
        self.work_timeout = timeout;
    }

    async fn connect(&mut self) -> AdapterResult<()> {
        self.calls.push(Call::Connect);
        if self.fail_connect {
            return Err(AdapterError::Backend("connection refused".to_string()));
        }
        Ok(())
    }

    async fn bind_read(&mut self, queue: &str) -> AdapterResult<()> {
        self.calls.push(Call::BindRead(queue.to_string()));
        if self.fail_bind {
            return Err(AdapterError::rejected("bind", "no such queue"));
        }
        Ok(())
    }

    async fn pick_task(&mut self) -> AdapterResult<Option<Job>> {
        self.calls.push(Call::PickTask);
        if self.fail_pick {
            return Err(AdapterError::Backend("connection reset".to_string()));
        }

        match self.jobs.pop_front() {
            Some(job) => Ok(Some(job)),
            None => {
                if let Some(timeout) = self.work_timeout {
                    tokio::time::sleep(timeout).await;
                }
                Ok(None)
            }
        }
    }

    async fn after_work_success(&mut self, handle: &JobHandle) -> AdapterResult<()> {
        self.calls.push(Call::Success(handle.clone()));
        if self.reject_acks {
            return Err(AdapterError::rejected("success ack", "backend unavailable"));
        }
        Ok(())
    }

    async fn after_work_failed(&mut self, handle: &JobHandle) -> AdapterResult<()> {
        self.calls.push(Call::Failed(handle.clone()));
        if self.reject_acks {
            return Err(AdapterError::rejected("failure ack", "backend unavailable"));
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.calls.push(Call::Disconnect);
    }
}

/// Fails jobs whose payload starts with "fail", succeeds the rest.
#[derive(Default)]
pub struct RecordingHandler {
    pub handled: Vec<JobHandle>,
    pub checkpoints: usize,
}

#[async_trait]
impl JobHandler for RecordingHandler {
    async fn handle(&mut self, job: &Job) -> Outcome {
        self.handled.push(job.handle.clone());
        Outcome::from(!job.payload.starts_with(b"fail"))
    }

    async fn checkpoint(&mut self) {
        self.checkpoints += 1;
    }
}

pub fn config(work_timeout: u64, idle_timeout: u64, restart_threshold: u64) -> WorkerConfig {
    WorkerConfig {
        work_timeout_secs: work_timeout,
        idle_timeout_secs: idle_timeout,
        restart_threshold,
        worker_id: Some("test-worker".to_string()),
        ..WorkerConfig::new("emails")
    }
}

/// Worker with a detached signal monitor, so tests never touch OS handlers.
pub fn worker(adapter: ScriptedAdapter, config: WorkerConfig) -> Worker<ScriptedAdapter> {
    Worker::new(adapter, config).with_signal_monitor(SignalMonitor::detached())
}

pub fn handle(name: &str) -> JobHandle {
    JobHandle::new(name)
}
