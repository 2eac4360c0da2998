//! Graceful, exactly-once shutdown on SIGINT / SIGTERM.
//!
//! Signals are caught on a dedicated thread and forwarded over a channel. The
//! polling thread consumes them, raises the stop flag and disconnects every
//! device; devices are never touched from the signal side.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind as UnixSignal};

use crate::interfaces::mqtt::SessionFactory;

use super::registry::DeviceRegistry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalKind {
    Interrupt,
    Terminate,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SignalKind::Interrupt => f.write_str("interrupt"),
            SignalKind::Terminate => f.write_str("termination"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Initiated,
    AlreadyInProgress,
}

/// Process-wide stop flag. Only the coordinator can raise it, and only once.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    // true for the call that flipped the flag
    fn raise(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }
}

/// Sending half handed to whatever delivers termination requests
#[derive(Clone, Debug)]
pub struct ShutdownTrigger(flume::Sender<SignalKind>);

impl ShutdownTrigger {
    /// Returns false once the coordinator is gone
    pub fn notify(&self, kind: SignalKind) -> bool {
        self.0.send(kind).is_ok()
    }
}

pub struct ShutdownCoordinator {
    requests_tx: flume::Sender<SignalKind>,
    requests: flume::Receiver<SignalKind>,
    stop: StopFlag,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (requests_tx, requests) = flume::unbounded();
        ShutdownCoordinator {
            requests_tx,
            requests,
            stop: StopFlag::default(),
        }
    }

    pub fn trigger(&self) -> ShutdownTrigger {
        ShutdownTrigger(self.requests_tx.clone())
    }

    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    /// Catch SIGINT and SIGTERM on a background thread and forward them to this coordinator
    pub fn listen_for_signals(&self) -> io::Result<thread::JoinHandle<()>> {
        let trigger = self.trigger();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (mut sigint, mut sigterm) = runtime.block_on(async {
            Ok::<_, io::Error>((
                signal(UnixSignal::interrupt())?,
                signal(UnixSignal::terminate())?,
            ))
        })?;

        thread::Builder::new()
            .name("signals".into())
            .spawn(move || {
                runtime.block_on(async move {
                    loop {
                        let kind = tokio::select! {
                            Some(()) = sigint.recv() => SignalKind::Interrupt,
                            Some(()) = sigterm.recv() => SignalKind::Terminate,
                            else => break,
                        };
                        log::debug!("Caught {} signal", kind);
                        if !trigger.notify(kind) {
                            break;
                        }
                    }
                })
            })
    }

    /// Handle pending requests without blocking
    pub fn check<F: SessionFactory>(
        &self,
        registry: &mut DeviceRegistry<F>,
    ) -> Option<ShutdownOutcome> {
        let mut first = None;
        while let Ok(kind) = self.requests.try_recv() {
            let outcome = self.shutdown(kind, registry);
            first.get_or_insert(outcome);
        }
        first
    }

    /// Like [`check`](Self::check), but parks up to `timeout` for the first request
    pub fn wait<F: SessionFactory>(
        &self,
        registry: &mut DeviceRegistry<F>,
        timeout: Duration,
    ) -> Option<ShutdownOutcome> {
        let kind = self.requests.recv_timeout(timeout).ok()?;
        let outcome = self.shutdown(kind, registry);
        self.check(registry);
        Some(outcome)
    }

    /// Raise the stop flag and disconnect everything, the first time only
    pub fn shutdown<F: SessionFactory>(
        &self,
        kind: SignalKind,
        registry: &mut DeviceRegistry<F>,
    ) -> ShutdownOutcome {
        if !self.stop.raise() {
            log::warn!("Shutdown already in progress; ignoring {} request", kind);
            return ShutdownOutcome::AlreadyInProgress;
        }

        log::info!("Stopped by {}", kind);
        registry.disconnect_all();
        ShutdownOutcome::Initiated
    }
}
