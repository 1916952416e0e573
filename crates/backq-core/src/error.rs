use crate::job::{JobHandle, Outcome};
use backq_transport::TransportError;
use thiserror::Error;

/// Failures reported by a queue adapter.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The backend answered, but refused the request.
    #[error("Backend rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    #[error("Backend error: {0}")]
    Backend(String),

    /// The adapter broke the interface contract.
    #[error("Adapter contract violation: {0}")]
    Contract(String),
}

impl AdapterError {
    pub fn rejected(operation: &'static str, reason: impl Into<String>) -> Self {
        AdapterError::Rejected {
            operation,
            reason: reason.into(),
        }
    }
}

/// Phase of `start()` in which binding failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindPhase {
    Connect,
    BindRead,
}

impl std::fmt::Display for BindPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindPhase::Connect => f.write_str("connect"),
            BindPhase::BindRead => f.write_str("bind"),
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to {phase} queue '{queue}': {source}")]
    Bind {
        phase: BindPhase,
        queue: String,
        #[source]
        source: AdapterError,
    },

    #[error("Worker failed to fetch new job: adapter returned no task without a work timeout (after {processed} jobs)")]
    FetchProtocolViolation { processed: u64 },

    #[error("Worker failed to fetch new job (after {processed} jobs): {source}")]
    Fetch {
        processed: u64,
        #[source]
        source: AdapterError,
    },

    #[error("Worker failed to acknowledge {outcome} of job {handle} (after {processed} jobs): {source}")]
    Acknowledgment {
        handle: JobHandle,
        outcome: Outcome,
        processed: u64,
        #[source]
        source: AdapterError,
    },

    #[error("Failed to install signal handlers: {0}")]
    Signal(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
