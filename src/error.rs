// src/error.rs
//! Unified error handling for the streaming core
//!
//! Every failure the pipeline can surface is a [`ScopeError`]. Per-transfer
//! failures are recovered locally and only reported; session loss and broken
//! inter-stage channels are fatal and trip the shutdown signal; join timeouts
//! are warnings produced by [`crate::pipeline::ShutdownHandle::stop`].

use crate::hal::SessionError;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Where an error was raised
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorContext {
    pub component: String,
    pub operation: String,
    pub file: Option<&'static str>,
    pub line: Option<u32>,
    pub thread: Option<String>,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
            file: None,
            line: None,
            thread: std::thread::current().name().map(str::to_string),
        }
    }

    /// Create error context with file and line information
    pub fn with_location(component: &str, operation: &str, file: &'static str, line: u32) -> Self {
        let mut context = Self::new(component, operation);
        context.file = Some(file);
        context.line = Some(line);
        context
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.component, self.operation)?;
        if let (Some(file), Some(line)) = (self.file, self.line) {
            write!(f, " at {}:{}", file, line)?;
        }
        Ok(())
    }
}

/// Macro for creating error context with file and line info
#[macro_export]
macro_rules! error_context {
    ($component:expr, $operation:expr) => {
        $crate::error::ErrorContext::with_location($component, $operation, file!(), line!())
    };
}

/// The concurrent actors of a running pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Actor {
    Acquisition,
    Trigger,
    Poller,
}

impl Actor {
    /// Thread name used when the actor is spawned
    pub fn thread_name(self) -> &'static str {
        match self {
            Actor::Acquisition => "scope-acquisition",
            Actor::Trigger => "scope-trigger",
            Actor::Poller => "scope-poller",
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Acquisition => write!(f, "acquisition stage"),
            Actor::Trigger => write!(f, "trigger stage"),
            Actor::Poller => write!(f, "result poller"),
        }
    }
}

/// Inter-stage channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageChannel {
    /// Acquisition -> trigger sample bytes
    Samples,
    /// Trigger -> poller windows
    Results,
}

impl fmt::Display for StageChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageChannel::Samples => write!(f, "sample stream"),
            StageChannel::Results => write!(f, "trigger result"),
        }
    }
}

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum ScopeError {
    /// A single completion reported an error; the slot is retried
    #[error("[TRANSFER] slot {slot} failed: {reason} ({context})")]
    TransferFailure {
        slot: usize,
        reason: String,
        context: ErrorContext,
    },

    /// The device session became invalid underneath the engine
    #[error("[SESSION] device session lost: {reason} ({context})")]
    SessionLost { reason: String, context: ErrorContext },

    /// The session refused an operation but is still usable
    #[error("[SESSION] {reason} ({context})")]
    Session { reason: String, context: ErrorContext },

    /// A peer stage dropped its end of a channel while the pipeline was running
    #[error("[CHANNEL] {channel} channel closed unexpectedly ({context})")]
    ChannelClosed {
        channel: StageChannel,
        context: ErrorContext,
    },

    /// An actor outlived its join timeout and was abandoned
    #[error("[JOIN] {actor} did not stop within {timeout:?}; thread abandoned")]
    JoinTimeout { actor: Actor, timeout: Duration },

    /// The OS refused to start an actor thread
    #[error("[SPAWN] could not start {actor}: {reason}")]
    Spawn { actor: Actor, reason: String },

    /// An actor panicked instead of returning
    #[error("[JOIN] {actor} panicked")]
    ActorPanicked { actor: Actor },

    /// Invalid pipeline configuration, rejected before anything is spawned
    #[error("[CONFIG] invalid {field}: {reason}")]
    Configuration { field: String, reason: String },

    /// Configuration sources could not be read or parsed
    #[error("[CONFIG] {0}")]
    ConfigSource(#[from] config::ConfigError),
}

impl ScopeError {
    /// Shorthand for a configuration error
    pub fn configuration(field: &str, reason: impl Into<String>) -> Self {
        ScopeError::Configuration {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors that end the pipeline
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScopeError::SessionLost { .. }
                | ScopeError::ChannelClosed { .. }
                | ScopeError::ActorPanicked { .. }
        )
    }

    /// True for errors that are surfaced as warnings only
    pub fn is_warning(&self) -> bool {
        matches!(self, ScopeError::JoinTimeout { .. })
    }
}

impl From<SessionError> for ScopeError {
    fn from(err: SessionError) -> Self {
        let context = error_context!("session", "device_operation");
        if err.is_fatal() {
            ScopeError::SessionLost {
                reason: err.to_string(),
                context,
            }
        } else {
            ScopeError::Session {
                reason: err.to_string(),
                context,
            }
        }
    }
}

/// Result type alias for pipeline operations
pub type ScopeResult<T> = Result<T, ScopeError>;

/// Non-blocking reporter for recoverable errors.
///
/// Actors never wait on the caller: when the sink is full the report is
/// discarded and counted.
#[derive(Debug, Clone)]
pub struct ErrorSink {
    tx: Sender<ScopeError>,
    dropped: Arc<AtomicU64>,
}

impl ErrorSink {
    pub fn new(capacity: usize) -> (Self, Receiver<ScopeError>) {
        let (tx, rx) = channel::bounded(capacity.max(1));
        let sink = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (sink, rx)
    }

    pub fn report(&self, err: ScopeError) {
        match self.tx.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Reports discarded because nobody drained the sink
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_creation() {
        let context = ErrorContext::new("test_component", "test_operation");
        assert_eq!(context.component, "test_component");
        assert_eq!(context.operation, "test_operation");
        assert!(context.file.is_none());
    }

    #[test]
    fn test_error_context_macro_records_location() {
        let context = error_context!("engine", "resubmit");
        assert_eq!(context.file, Some(file!()));
        assert!(context.line.is_some());
        assert!(context.to_string().starts_with("engine::resubmit at "));
    }

    #[test]
    fn test_error_display() {
        let err = ScopeError::TransferFailure {
            slot: 3,
            reason: "stall".to_string(),
            context: ErrorContext::new("engine", "completion"),
        };

        let display = format!("{}", err);
        assert!(display.contains("slot 3"));
        assert!(display.contains("stall"));
        assert!(display.contains("engine::completion"));
    }

    #[test]
    fn test_fatal_classification() {
        let lost = ScopeError::SessionLost {
            reason: "unplugged".to_string(),
            context: ErrorContext::new("engine", "wait"),
        };
        let closed = ScopeError::ChannelClosed {
            channel: StageChannel::Samples,
            context: ErrorContext::new("acquisition", "forward"),
        };
        let transfer = ScopeError::TransferFailure {
            slot: 0,
            reason: "crc".to_string(),
            context: ErrorContext::new("engine", "completion"),
        };
        let timeout = ScopeError::JoinTimeout {
            actor: Actor::Trigger,
            timeout: Duration::from_millis(10),
        };

        assert!(lost.is_fatal());
        assert!(closed.is_fatal());
        assert!(!transfer.is_fatal());
        assert!(!timeout.is_fatal());
        assert!(timeout.is_warning());
    }

    #[test]
    fn test_session_error_conversion() {
        let fatal: ScopeError = SessionError::Disconnected("gone".to_string()).into();
        assert!(matches!(fatal, ScopeError::SessionLost { .. }));

        let recoverable: ScopeError = SessionError::Rejected("busy".to_string()).into();
        assert!(matches!(recoverable, ScopeError::Session { .. }));
        assert!(!recoverable.is_fatal());
    }

    #[test]
    fn test_error_sink_drops_when_full() {
        let (sink, rx) = ErrorSink::new(1);
        sink.report(ScopeError::configuration("a", "first"));
        sink.report(ScopeError::configuration("b", "second"));

        assert_eq!(sink.dropped(), 1);
        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received.len(), 1);
        assert!(received[0].to_string().contains("first"));
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ScopeError>();
    }
}
