// src/pipeline/shutdown.rs
//! Shutdown signal and bounded actor joins

use crate::error::{Actor, ScopeError, ScopeResult};
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info_span};

/// One-way running -> stopped flag shared by every actor.
///
/// Once set it stays set; actors observe it at their poll points.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    stopped: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signal. Returns true only for the call that set it.
    pub fn trigger(&self) -> bool {
        !self.stopped.swap(true, Ordering::AcqRel)
    }

    pub fn is_set(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Sets the signal if the actor unwinds
struct PanicGuard {
    signal: ShutdownSignal,
    actor: Actor,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(actor = %self.actor, "actor panicked");
            self.signal.trigger();
        }
    }
}

/// A running actor thread
#[derive(Debug)]
pub struct ActorHandle {
    actor: Actor,
    handle: JoinHandle<ScopeResult<()>>,
    exited: Receiver<()>,
}

impl ActorHandle {
    pub fn actor(&self) -> Actor {
        self.actor
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Join within `timeout`.
    ///
    /// Threads cannot be killed, so an actor still running after `timeout`
    /// is detached and reported as [`ScopeError::JoinTimeout`]; with the
    /// signal set it exits at its next poll point.
    pub fn join_within(self, timeout: Duration) -> ScopeResult<()> {
        match self.exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => Err(ScopeError::JoinTimeout {
                actor: self.actor,
                timeout,
            }),
            // The sender is never used; disconnection means the thread is done
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match self.handle.join() {
                Ok(result) => result,
                Err(_) => Err(ScopeError::ActorPanicked { actor: self.actor }),
            },
        }
    }
}

/// Run `body` on a named thread.
///
/// An error returned by the body sets the signal before the thread exits so
/// its peers stop as well.
pub fn spawn_actor<F>(actor: Actor, signal: ShutdownSignal, body: F) -> ScopeResult<ActorHandle>
where
    F: FnOnce(&ShutdownSignal) -> ScopeResult<()> + Send + 'static,
{
    let (exit_tx, exited) = channel::bounded::<()>(0);
    let handle = thread::Builder::new()
        .name(actor.thread_name().to_string())
        .spawn(move || {
            let _exit = exit_tx;
            let _guard = PanicGuard {
                signal: signal.clone(),
                actor,
            };
            let span = info_span!("actor", name = actor.thread_name());
            let _enter = span.enter();

            let result = body(&signal);
            match &result {
                Ok(()) => debug!("actor finished"),
                Err(err) => {
                    signal.trigger();
                    error!(error = %err, "actor failed");
                }
            }
            result
        })
        .map_err(|e| ScopeError::Spawn {
            actor,
            reason: e.to_string(),
        })?;

    Ok(ActorHandle { actor, handle, exited })
}
