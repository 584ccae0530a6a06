// tests/error_propagation.rs
//! Error propagation from actors to the caller
//!
//! Covers the error taxonomy end to end:
//! - Recoverable transfer failures surface through the error sink
//! - Session loss stops the pipeline and is reported by `stop`
//! - An actor that ignores the signal is abandoned with a warning
//! - Invalid configuration is rejected before anything runs

use scope_core::error::{Actor, ScopeError};
use scope_core::hal::simulator::{SimulatedSession, SimulatorConfig};
use scope_core::hal::{Completion, EndpointInfo, SessionError, StreamingSession, TransferRequest};
use scope_core::{start, PipelineConfig, ShutdownHandle};
use serial_test::serial;
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(timeout: Duration, done: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        poll_interval_ms: 10,
        drain_timeout_ms: 100,
        ..PipelineConfig::new(180, 64, 64, 3, 512)
    }
}

#[test]
#[serial]
fn test_transfer_failures_are_recovered() {
    let session = SimulatedSession::new(SimulatorConfig {
        fail_every: Some(3),
        stop_after: Some(30),
        ..SimulatorConfig::default()
    });
    let (handle, _queue) = start(session, fast_config()).expect("pipeline starts");

    // The last resubmission happens after the completion's failure is reported
    assert!(wait_until(Duration::from_secs(5), || handle.metrics().transfer.resubmissions == 30));
    assert!(handle.is_running());

    let errors = handle.take_errors();
    assert_eq!(errors.len(), 10);
    assert!(errors
        .iter()
        .all(|err| matches!(err, ScopeError::TransferFailure { .. }) && !err.is_fatal()));
    assert!(handle.take_errors().is_empty());

    let report = handle.stop(Duration::from_secs(5));
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(handle.metrics().transfer.failures, 10);
}

#[test]
#[serial]
fn test_session_loss_stops_pipeline() {
    let session = SimulatedSession::new(SimulatorConfig {
        interval: Some(Duration::from_millis(1)),
        lose_after: Some(20),
        ..SimulatorConfig::default()
    });
    let (handle, _queue) = start(session, fast_config()).expect("pipeline starts");

    assert!(wait_until(Duration::from_secs(5), || !handle.is_running()));

    let report = handle.stop(Duration::from_secs(5));
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
    assert!(matches!(report.errors[0], ScopeError::SessionLost { .. }));
    assert!(report.errors[0].is_fatal());

    // Stopping again after a fatal error is still safe
    assert!(handle.stop(Duration::from_secs(1)).already_stopped);
}

/// Session whose completion wait ignores its timeout
struct StuckSession {
    endpoint: EndpointInfo,
}

impl StreamingSession for StuckSession {
    fn endpoint(&self) -> &EndpointInfo {
        &self.endpoint
    }

    fn submit(&mut self, _request: TransferRequest) -> Result<(), SessionError> {
        Ok(())
    }

    fn wait_completion(&mut self, _timeout: Duration) -> Result<Option<Completion>, SessionError> {
        thread::sleep(Duration::from_millis(500));
        Ok(None)
    }

    fn cancel_all(&mut self) -> Vec<TransferRequest> {
        Vec::new()
    }
}

#[test]
#[serial]
fn test_unresponsive_actor_is_abandoned_with_warning() {
    let session = StuckSession {
        endpoint: EndpointInfo::default(),
    };
    let (handle, _queue) = start(session, fast_config()).expect("pipeline starts");
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    let report = handle.stop(Duration::from_millis(50));

    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(report.warnings.len(), 1);
    assert!(matches!(
        report.warnings[0],
        ScopeError::JoinTimeout {
            actor: Actor::Acquisition,
            ..
        }
    ));
    assert!(!report.warnings[0].is_fatal());
    // Trigger stage and poller still joined normally
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_invalid_configuration_rejected_synchronously() {
    let cases = [
        PipelineConfig { pre_samples: 0, ..PipelineConfig::default() },
        PipelineConfig { post_samples: 0, ..PipelineConfig::default() },
        PipelineConfig { threshold: 0, ..PipelineConfig::default() },
        PipelineConfig { outstanding_slots: 0, ..PipelineConfig::default() },
    ];

    for config in cases {
        let session = SimulatedSession::new(SimulatorConfig::default());
        let stats = session.stats();
        let result: Result<(ShutdownHandle, _), ScopeError> = start(session, config);
        assert!(matches!(result, Err(ScopeError::Configuration { .. })));
        assert_eq!(stats.submissions(), 0);
    }
}
