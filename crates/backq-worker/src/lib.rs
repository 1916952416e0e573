//! BackQ worker
//!
//! Single-instance worker engine: binds a [`QueueAdapter`], fetches one job
//! at a time, hands it to caller code and acknowledges the outcome, until a
//! termination signal, an idle timeout, a restart threshold or a fatal error
//! stops it.
//!
//! [`QueueAdapter`]: backq_core::QueueAdapter

pub mod handler;
pub mod signal;
pub mod worker;

pub use handler::{FnHandler, JobHandler, LogHandler};
pub use signal::{SignalHandle, SignalMonitor, TerminationSignal};
pub use worker::{BindingState, DefaultHooks, Step, Worker, WorkerHooks};
