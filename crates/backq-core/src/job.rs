use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Adapter-defined identifier used only to acknowledge a fetched job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        JobHandle(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobHandle {
    fn from(handle: &str) -> Self {
        JobHandle::new(handle)
    }
}

impl From<String> for JobHandle {
    fn from(handle: String) -> Self {
        JobHandle(handle)
    }
}

/// Job payload (arbitrary bytes, never inspected by the worker)
pub type JobPayload = Vec<u8>;

/// A unit of work handed out by a queue adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub handle: JobHandle,
    pub payload: JobPayload,
    /// When the adapter handed the job out
    pub fetched_at: DateTime<Utc>,
}

impl Job {
    pub fn new(handle: impl Into<JobHandle>, payload: impl Into<JobPayload>) -> Self {
        Job {
            handle: handle.into(),
            payload: payload.into(),
            fetched_at: Utc::now(),
        }
    }

    /// Payload as UTF-8 text, lossily.
    pub fn payload_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Result of processing a job, reported back to the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<bool> for Outcome {
    fn from(success: bool) -> Self {
        if success {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

impl<T, E> From<&Result<T, E>> for Outcome {
    fn from(result: &Result<T, E>) -> Self {
        Outcome::from(result.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_bool() {
        assert_eq!(Outcome::from(true), Outcome::Success);
        assert_eq!(Outcome::from(false), Outcome::Failure);
        assert!(Outcome::Success.is_success());
        assert!(!Outcome::Failure.is_success());
    }

    #[test]
    fn test_outcome_from_result() {
        let ok: Result<(), String> = Ok(());
        let err: Result<(), String> = Err("boom".to_string());
        assert_eq!(Outcome::from(&ok), Outcome::Success);
        assert_eq!(Outcome::from(&err), Outcome::Failure);
    }

    #[test]
    fn test_job_creation() {
        let job = Job::new("42", b"hello".to_vec());
        assert_eq!(job.handle.as_str(), "42");
        assert_eq!(job.payload_lossy(), "hello");
        assert!(!job.handle.is_empty());
        assert_eq!(job.handle.to_string(), "42");
    }
}
