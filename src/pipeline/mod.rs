// src/pipeline/mod.rs
//! Pipeline assembly and lifecycle
//!
//! [`start`] wires three actors together:
//!
//! ```text
//! session -> [acquisition] --samples--> [trigger] --windows--> [poller] -> ResultQueue
//! ```
//!
//! Each runs on its own thread and talks to its neighbours only through
//! bounded channels. The [`ShutdownSignal`] is the one thing they share.

pub mod metrics;
pub mod poller;
pub mod queue;
pub mod shutdown;

pub use metrics::{PipelineMetrics, PipelineStats};
pub use poller::{PollerSnapshot, PollerStats, ResultPoller};
pub use queue::ResultQueue;
pub use shutdown::{spawn_actor, ActorHandle, ShutdownSignal};

use crate::acquisition::{AcquisitionStage, EngineConfig, TransferEngine};
use crate::config::{constants, PipelineConfig};
use crate::error::{Actor, ErrorSink, ScopeError, ScopeResult};
use crate::hal::StreamingSession;
use crate::processing::{RisingEdgeTrigger, TriggerStage};
use crossbeam::channel::{self, Receiver};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Start streaming from `session`.
///
/// The configuration is validated against the session's endpoint before
/// anything is spawned; a [`ScopeError::Configuration`] means no thread was
/// started and the session has been dropped.
pub fn start<S>(session: S, config: PipelineConfig) -> ScopeResult<(ShutdownHandle, ResultQueue)>
where
    S: StreamingSession + 'static,
{
    config.validate()?;
    let engine_config = EngineConfig::for_endpoint(session.endpoint(), &config)?;
    let detector = RisingEdgeTrigger::new(config.trigger_config())?;

    let signal = ShutdownSignal::new();
    let stats = PipelineStats::default();
    let queue = ResultQueue::new(config.queue_capacity);
    let (sink, errors) = ErrorSink::new(constants::pipeline::ERROR_SINK_CAPACITY);
    let (samples_tx, samples_rx) = channel::bounded(config.stage_channel_depth);
    let (results_tx, results_rx) = channel::bounded(config.queue_capacity);

    info!(
        threshold = config.threshold,
        pre_samples = config.pre_samples,
        post_samples = config.post_samples,
        slots = engine_config.outstanding_slots,
        capacity = engine_config.transfer_capacity,
        "starting pipeline"
    );

    let poller = ResultPoller::new(
        results_rx,
        queue.clone(),
        config.poll_interval(),
        config.drain_timeout(),
        stats.poller.clone(),
    );
    let trigger = TriggerStage::new(
        detector,
        samples_rx,
        results_tx,
        config.poll_interval(),
        stats.trigger.clone(),
    );
    let engine = TransferEngine::new(session, engine_config, stats.transfer.clone());
    let acquisition = AcquisitionStage::new(engine, samples_tx, config.trigger_channel, stats.stream.clone());

    // Consumers first so nothing upstream ever sees a missing peer
    let mut actors = Vec::with_capacity(3);
    let spawned = spawn_actor(Actor::Poller, signal.clone(), move |signal| poller.run(signal))
        .and_then(|handle| {
            actors.push(handle);
            spawn_actor(Actor::Trigger, signal.clone(), move |signal| trigger.run(signal))
        })
        .and_then(|handle| {
            actors.push(handle);
            let sink = sink.clone();
            spawn_actor(Actor::Acquisition, signal.clone(), move |signal| {
                acquisition.run(signal, &sink)
            })
        });

    match spawned {
        Ok(handle) => actors.push(handle),
        Err(err) => {
            signal.trigger();
            for actor in actors {
                if let Err(join_err) = actor.join_within(config.drain_timeout()) {
                    warn!(error = %join_err, "actor did not stop after failed start");
                }
            }
            return Err(err);
        }
    }

    // Acquisition is joined first: it owns the session
    actors.reverse();

    let handle = ShutdownHandle {
        signal,
        actors: Mutex::new(Some(actors)),
        errors,
        sink,
        stats,
        queue: queue.clone(),
    };
    Ok((handle, queue))
}

/// Outcome of [`ShutdownHandle::stop`]
#[derive(Debug, Default)]
pub struct StopReport {
    /// Fatal errors the actors ended with
    pub errors: Vec<ScopeError>,
    /// Join timeouts; the affected threads were detached
    pub warnings: Vec<ScopeError>,
    /// The pipeline had already been stopped by an earlier call
    pub already_stopped: bool,
}

impl StopReport {
    /// No errors and no warnings
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// Controls a running pipeline
pub struct ShutdownHandle {
    signal: ShutdownSignal,
    actors: Mutex<Option<Vec<ActorHandle>>>,
    errors: Receiver<ScopeError>,
    sink: ErrorSink,
    stats: PipelineStats,
    queue: ResultQueue,
}

impl ShutdownHandle {
    /// Set the shutdown signal and join every actor, each within `timeout`.
    ///
    /// Safe to call any number of times; only the first call joins.
    pub fn stop(&self, timeout: Duration) -> StopReport {
        let first = self.signal.trigger();
        let Some(actors) = self.actors.lock().take() else {
            return StopReport {
                already_stopped: true,
                ..StopReport::default()
            };
        };
        info!(requested = first, "stopping pipeline");

        let mut report = StopReport::default();
        for actor in actors {
            let name = actor.actor();
            match actor.join_within(timeout) {
                Ok(()) => {}
                Err(err) if err.is_warning() => {
                    warn!(actor = %name, error = %err, "forcing actor shutdown");
                    report.warnings.push(err);
                }
                Err(err) => report.errors.push(err),
            }
        }

        info!(
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "pipeline stopped"
        );
        report
    }

    /// False once the signal is set, whether by [`ShutdownHandle::stop`] or
    /// by a fatal error inside the pipeline
    pub fn is_running(&self) -> bool {
        !self.signal.is_set()
    }

    pub fn signal(&self) -> &ShutdownSignal {
        &self.signal
    }

    /// Recoverable errors reported since the last call
    pub fn take_errors(&self) -> Vec<ScopeError> {
        self.errors.try_iter().collect()
    }

    pub fn metrics(&self) -> PipelineMetrics {
        self.stats.snapshot(self.queue.len(), self.sink.dropped())
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        // Threads still running notice the signal and exit on their own
        self.signal.trigger();
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("running", &self.is_running())
            .field("queue", &self.queue)
            .finish()
    }
}
