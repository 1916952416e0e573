//! Termination signal monitor
//!
//! Translates SIGINT, SIGTERM and SIGHUP into one pending value the worker
//! loop reads at the top of every iteration. The pending value belongs to the
//! monitor instance, so several workers in one process never see each other's
//! injected signals.
//!
//! In [`SignalDispatch::Reactive`] mode a listener task records signals as
//! they are delivered. In [`SignalDispatch::Polled`] mode nothing happens until
//! [`SignalMonitor::dispatch`] drains whatever arrived since the last call.

use backq_core::SignalDispatch;
use futures::FutureExt;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TerminationSignal {
    None = 0,
    Interrupt = 1,
    Terminate = 2,
    Hangup = 3,
}

impl TerminationSignal {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TerminationSignal::Interrupt,
            2 => TerminationSignal::Terminate,
            3 => TerminationSignal::Hangup,
            _ => TerminationSignal::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationSignal::None => "none",
            TerminationSignal::Interrupt => "SIGINT",
            TerminationSignal::Terminate => "SIGTERM",
            TerminationSignal::Hangup => "SIGHUP",
        }
    }

    pub fn requests_termination(&self) -> bool {
        !matches!(self, TerminationSignal::None)
    }
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records a pending signal on the monitor it was taken from
#[derive(Debug, Clone)]
pub struct SignalHandle {
    pending: Arc<AtomicU8>,
}

impl SignalHandle {
    pub fn raise(&self, signal: TerminationSignal) {
        self.pending.store(signal as u8, Ordering::SeqCst);
    }
}

#[cfg(unix)]
struct SignalStreams {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalStreams {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(SignalStreams {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    async fn next(&mut self) -> Option<TerminationSignal> {
        tokio::select! {
            Some(()) = self.interrupt.recv() => Some(TerminationSignal::Interrupt),
            Some(()) = self.terminate.recv() => Some(TerminationSignal::Terminate),
            Some(()) = self.hangup.recv() => Some(TerminationSignal::Hangup),
            else => None,
        }
    }
}

#[cfg(not(unix))]
struct SignalStreams {
    interrupt: tokio::signal::windows::CtrlC,
}

#[cfg(not(unix))]
impl SignalStreams {
    fn register() -> std::io::Result<Self> {
        Ok(SignalStreams {
            interrupt: tokio::signal::windows::ctrl_c()?,
        })
    }

    async fn next(&mut self) -> Option<TerminationSignal> {
        self.interrupt
            .recv()
            .await
            .map(|()| TerminationSignal::Interrupt)
    }
}

pub struct SignalMonitor {
    pending: Arc<AtomicU8>,
    mode: SignalDispatch,
    polled: Option<SignalStreams>,
    listener: Option<JoinHandle<()>>,
}

impl SignalMonitor {
    /// Register the OS signal handlers. Must run inside a tokio runtime.
    pub fn install(mode: SignalDispatch) -> std::io::Result<Self> {
        let streams = SignalStreams::register()?;
        let pending = Arc::new(AtomicU8::new(TerminationSignal::None as u8));

        let monitor = match mode {
            SignalDispatch::Reactive => {
                let handle = SignalHandle {
                    pending: pending.clone(),
                };
                let listener = tokio::spawn(listen(streams, handle));
                SignalMonitor {
                    pending,
                    mode,
                    polled: None,
                    listener: Some(listener),
                }
            }
            SignalDispatch::Polled => SignalMonitor {
                pending,
                mode,
                polled: Some(streams),
                listener: None,
            },
        };

        debug!("Signal monitor installed ({:?})", mode);
        Ok(monitor)
    }

    /// A monitor without OS handlers; signals arrive only through
    /// [`handle`](Self::handle).
    pub fn detached() -> Self {
        SignalMonitor {
            pending: Arc::new(AtomicU8::new(TerminationSignal::None as u8)),
            mode: SignalDispatch::Reactive,
            polled: None,
            listener: None,
        }
    }

    pub fn handle(&self) -> SignalHandle {
        SignalHandle {
            pending: self.pending.clone(),
        }
    }

    pub fn mode(&self) -> SignalDispatch {
        self.mode
    }

    /// Whether signals are recorded without calling [`dispatch`](Self::dispatch).
    pub fn is_automatic(&self) -> bool {
        self.mode == SignalDispatch::Reactive
    }

    /// Collect signals delivered since the last call, without waiting.
    pub fn dispatch(&mut self) {
        let Some(streams) = self.polled.as_mut() else {
            return;
        };

        while let Some(Some(signal)) = streams.next().now_or_never() {
            info!("Received {}", signal);
            self.pending.store(signal as u8, Ordering::SeqCst);
        }
    }

    pub fn pending(&self) -> TerminationSignal {
        TerminationSignal::from_u8(self.pending.load(Ordering::SeqCst))
    }

    /// True once SIGINT, SIGTERM or SIGHUP is pending. Never cleared.
    pub fn is_termination_requested(&self) -> bool {
        self.pending().requests_termination()
    }
}

impl Drop for SignalMonitor {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

async fn listen(mut streams: SignalStreams, handle: SignalHandle) {
    while let Some(signal) = streams.next().await {
        info!("Received {}", signal);
        handle.raise(signal);
    }
}
