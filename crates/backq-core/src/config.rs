//! Worker configuration

use crate::error::{Result, WorkerError};
use ::config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How termination signals reach the worker loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDispatch {
    /// Signals are recorded as they arrive
    #[default]
    Reactive,
    /// Signals are collected once per loop iteration
    Polled,
}

/// Worker configuration, fixed for the duration of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Queue to bind for reading
    pub queue_name: String,
    /// How long a single fetch may block (0 = block indefinitely)
    pub work_timeout_secs: u64,
    /// Quit after this long without fetching a job (0 = disabled)
    pub idle_timeout_secs: u64,
    /// Quit after processing this many jobs (0 = disabled)
    pub restart_threshold: u64,
    pub signal_dispatch: SignalDispatch,
    /// Worker ID (auto-generated if not provided)
    pub worker_id: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            queue_name: "default".to_string(),
            work_timeout_secs: 5,
            idle_timeout_secs: 0,
            restart_threshold: 0,
            signal_dispatch: SignalDispatch::Reactive,
            worker_id: None,
        }
    }
}

impl WorkerConfig {
    pub fn new(queue_name: impl Into<String>) -> Self {
        WorkerConfig {
            queue_name: queue_name.into(),
            ..Default::default()
        }
    }

    /// Load configuration from an optional file, overridden by `BACKQ_*`
    /// environment variables.
    pub fn load(path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder
            .add_source(Environment::with_prefix("BACKQ").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn work_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.work_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.idle_timeout_secs)
    }

    /// Check the invariants that must hold before any adapter I/O.
    pub fn validate(&self) -> Result<()> {
        if self.queue_name.is_empty() {
            return Err(WorkerError::Configuration(
                "queue name must not be empty".to_string(),
            ));
        }

        match (self.work_timeout_secs, self.idle_timeout_secs) {
            (_, 0) => Ok(()),
            (0, idle) => Err(WorkerError::Configuration(format!(
                "idle timeout ({}s) requires a work timeout",
                idle
            ))),
            (work, idle) if idle <= work => Err(WorkerError::Configuration(format!(
                "idle timeout ({}s) must be greater than work timeout ({}s)",
                idle, work
            ))),
            _ => Ok(()),
        }
    }

    pub fn generate_worker_id(&self) -> String {
        use std::process;
        use uuid::Uuid;

        if let Some(id) = &self.worker_id {
            return id.clone();
        }

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let pid = process::id();
        let suffix = Uuid::new_v4().simple().to_string();

        format!("{}-{}-{}", hostname, pid, &suffix[..8])
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    fn config(work: u64, idle: u64) -> WorkerConfig {
        WorkerConfig {
            work_timeout_secs: work,
            idle_timeout_secs: idle,
            ..WorkerConfig::new("emails")
        }
    }

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.queue_name, "default");
        assert_eq!(config.work_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.idle_timeout(), None);
        assert_eq!(config.signal_dispatch, SignalDispatch::Reactive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_queue_name_rejected() {
        let config = WorkerConfig::new("");
        assert!(matches!(
            config.validate(),
            Err(WorkerError::Configuration(_))
        ));
    }

    #[test]
    fn test_idle_without_work_timeout_rejected() {
        assert!(config(0, 10).validate().is_err());
        assert!(config(0, 0).validate().is_ok());
        assert!(config(2, 10).validate().is_ok());
    }

    proptest! {
        #[test]
        fn prop_idle_must_exceed_work(work in 1u64..10_000, idle in 1u64..10_000) {
            let result = config(work, idle).validate();
            prop_assert_eq!(result.is_ok(), idle > work);
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "queue_name: pushes\nwork_timeout_secs: 2\nidle_timeout_secs: 10\nsignal_dispatch: polled"
        )
        .unwrap();

        let config = WorkerConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.queue_name, "pushes");
        assert_eq!(config.work_timeout_secs, 2);
        assert_eq!(config.idle_timeout_secs, 10);
        assert_eq!(config.restart_threshold, 0);
        assert_eq!(config.signal_dispatch, SignalDispatch::Polled);
    }

    #[test]
    fn test_explicit_worker_id() {
        let config = WorkerConfig {
            worker_id: Some("worker-1".to_string()),
            ..Default::default()
        };
        assert_eq!(config.generate_worker_id(), "worker-1");
        assert!(!WorkerConfig::default().generate_worker_id().is_empty());
    }
}
