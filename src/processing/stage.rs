// src/processing/stage.rs
//! Trigger detection stage

use crate::acquisition::SampleChunk;
use crate::error::{ScopeError, ScopeResult, StageChannel};
use crate::error_context;
use crate::pipeline::ShutdownSignal;
use crate::processing::trigger::{RisingEdgeTrigger, TriggerCounters, TriggerWindow};
use crossbeam::channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn};

/// Stage counters, published after every chunk
#[derive(Debug, Default)]
pub struct TriggerStats {
    chunks_received: AtomicU64,
    samples_seen: AtomicU64,
    windows_emitted: AtomicU64,
    windows_delivered: AtomicU64,
    crossings_skipped: AtomicU64,
    continuity_resets: AtomicU64,
    windows_abandoned: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TriggerSnapshot {
    pub chunks_received: u64,
    pub samples_seen: u64,
    pub windows_emitted: u64,
    /// Windows accepted by the result channel
    pub windows_delivered: u64,
    pub crossings_skipped: u64,
    pub continuity_resets: u64,
    pub windows_abandoned: u64,
}

impl TriggerStats {
    fn publish(&self, counters: &TriggerCounters) {
        self.samples_seen.store(counters.samples_seen, Ordering::Relaxed);
        self.windows_emitted.store(counters.windows_emitted, Ordering::Relaxed);
        self.crossings_skipped.store(counters.crossings_skipped, Ordering::Relaxed);
        self.continuity_resets.store(counters.continuity_resets, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TriggerSnapshot {
        TriggerSnapshot {
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            samples_seen: self.samples_seen.load(Ordering::Relaxed),
            windows_emitted: self.windows_emitted.load(Ordering::Relaxed),
            windows_delivered: self.windows_delivered.load(Ordering::Relaxed),
            crossings_skipped: self.crossings_skipped.load(Ordering::Relaxed),
            continuity_resets: self.continuity_resets.load(Ordering::Relaxed),
            windows_abandoned: self.windows_abandoned.load(Ordering::Relaxed),
        }
    }
}

/// Consumes sample chunks, runs the detector and emits windows
pub struct TriggerStage {
    detector: RisingEdgeTrigger,
    samples: Receiver<SampleChunk>,
    results: Sender<TriggerWindow>,
    poll_interval: Duration,
    next_sequence: Option<u64>,
    stats: Arc<TriggerStats>,
}

impl TriggerStage {
    pub fn new(
        detector: RisingEdgeTrigger,
        samples: Receiver<SampleChunk>,
        results: Sender<TriggerWindow>,
        poll_interval: Duration,
        stats: Arc<TriggerStats>,
    ) -> Self {
        Self {
            detector,
            samples,
            results,
            poll_interval,
            next_sequence: None,
            stats,
        }
    }

    /// Run until shutdown.
    ///
    /// After the signal no new window is started; a window already pending
    /// is completed from chunks that are still queued.
    pub fn run(mut self, shutdown: &ShutdownSignal) -> ScopeResult<()> {
        let span = info_span!("trigger", threshold = self.detector.config().threshold);
        let _enter = span.enter();

        let result = self.stream(shutdown);
        match &result {
            Ok(()) => self.drain_pending(shutdown),
            Err(_) => {
                shutdown.trigger();
            }
        }

        let snapshot = self.stats.snapshot();
        info!(
            chunks = snapshot.chunks_received,
            windows = snapshot.windows_delivered,
            skipped = snapshot.crossings_skipped,
            "trigger stage stopped"
        );
        result
    }

    fn stream(&mut self, shutdown: &ShutdownSignal) -> ScopeResult<()> {
        while !shutdown.is_set() {
            let chunk = match self.samples.recv_timeout(self.poll_interval) {
                Ok(chunk) => chunk,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) if shutdown.is_set() => break,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ScopeError::ChannelClosed {
                        channel: StageChannel::Samples,
                        context: error_context!("trigger_stage", "receive"),
                    })
                }
            };

            self.check_continuity(chunk.sequence);
            let windows = self.detector.push(&chunk.samples);
            self.record_chunk();
            for window in windows {
                self.deliver(window, shutdown)?;
            }
        }
        Ok(())
    }

    /// Finish a pending window from whatever is already queued
    fn drain_pending(&mut self, shutdown: &ShutdownSignal) {
        while self.detector.is_pending() {
            let Ok(chunk) = self.samples.try_recv() else {
                break;
            };
            if self.check_continuity(chunk.sequence) {
                break;
            }
            let window = self.detector.push_draining(&chunk.samples);
            self.record_chunk();
            if let Some(window) = window {
                if let Err(err) = self.deliver(window, shutdown) {
                    debug!(error = %err, "final window not delivered");
                }
            }
        }
        if self.detector.is_pending() {
            self.stats.windows_abandoned.fetch_add(1, Ordering::Relaxed);
            debug!("pending window abandoned at shutdown");
        }
    }

    /// Reset the detector when chunks were lost upstream. Returns whether a
    /// gap was found.
    fn check_continuity(&mut self, sequence: u64) -> bool {
        let gap = self.next_sequence.is_some_and(|expected| expected != sequence);
        if gap {
            debug!(expected = ?self.next_sequence, received = sequence, "sample stream gap");
            if self.detector.is_pending() {
                self.stats.windows_abandoned.fetch_add(1, Ordering::Relaxed);
            }
            self.detector.reset_continuity();
        }
        self.next_sequence = Some(sequence + 1);
        gap
    }

    fn record_chunk(&self) {
        self.stats.chunks_received.fetch_add(1, Ordering::Relaxed);
        self.stats.publish(&self.detector.counters());
    }

    /// Send one window, retrying while the poller is busy. Once shutdown is
    /// set a window that cannot be sent within one poll interval is dropped.
    fn deliver(&self, window: TriggerWindow, shutdown: &ShutdownSignal) -> ScopeResult<()> {
        let mut window = window;
        loop {
            match self.results.send_timeout(window, self.poll_interval) {
                Ok(()) => {
                    self.stats.windows_delivered.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(SendTimeoutError::Timeout(returned)) => {
                    if shutdown.is_set() {
                        warn!(crossing = returned.crossing_index(), "result channel full at shutdown, window dropped");
                        self.stats.windows_abandoned.fetch_add(1, Ordering::Relaxed);
                        return Ok(());
                    }
                    window = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) if shutdown.is_set() => return Ok(()),
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err(ScopeError::ChannelClosed {
                        channel: StageChannel::Results,
                        context: error_context!("trigger_stage", "deliver"),
                    })
                }
            }
        }
    }
}
