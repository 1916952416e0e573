pub mod adapter;
pub mod config;
mod error;
mod job;
pub mod memory;

pub use crate::adapter::{check_job, AdapterResult, QueueAdapter};
pub use crate::config::{SignalDispatch, WorkerConfig};
pub use crate::error::{AdapterError, BindPhase, Result, WorkerError};
pub use crate::job::{Job, JobHandle, JobPayload, Outcome};
pub use crate::memory::{MemoryAdapter, MemoryQueue};

pub use backq_transport::{SocketIo, TransportError};
