// src/pipeline/poller.rs
//! Result poller: moves windows from the trigger stage into the caller's queue

use crate::error::{ScopeError, ScopeResult, StageChannel};
use crate::error_context;
use crate::pipeline::queue::ResultQueue;
use crate::pipeline::ShutdownSignal;
use crate::processing::trigger::TriggerWindow;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span};

#[derive(Debug, Default)]
pub struct PollerStats {
    received: AtomicU64,
    evicted: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollerSnapshot {
    pub windows_received: u64,
    /// Windows pushed out of the queue by newer ones
    pub windows_evicted: u64,
}

impl PollerStats {
    pub fn snapshot(&self) -> PollerSnapshot {
        PollerSnapshot {
            windows_received: self.received.load(Ordering::Relaxed),
            windows_evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

pub struct ResultPoller {
    results: Receiver<TriggerWindow>,
    queue: ResultQueue,
    poll_interval: Duration,
    drain_timeout: Duration,
    stats: Arc<PollerStats>,
}

impl ResultPoller {
    pub fn new(
        results: Receiver<TriggerWindow>,
        queue: ResultQueue,
        poll_interval: Duration,
        drain_timeout: Duration,
        stats: Arc<PollerStats>,
    ) -> Self {
        Self {
            results,
            queue,
            poll_interval,
            drain_timeout,
            stats,
        }
    }

    /// Poll until shutdown, then collect what the trigger stage still sends
    /// until it hangs up or the drain timeout passes
    pub fn run(self, shutdown: &ShutdownSignal) -> ScopeResult<()> {
        let span = info_span!("poller", capacity = self.queue.capacity());
        let _enter = span.enter();

        while !shutdown.is_set() {
            match self.results.recv_timeout(self.poll_interval) {
                Ok(window) => self.store(window),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) if shutdown.is_set() => break,
                Err(RecvTimeoutError::Disconnected) => {
                    shutdown.trigger();
                    return Err(ScopeError::ChannelClosed {
                        channel: StageChannel::Results,
                        context: error_context!("result_poller", "receive"),
                    });
                }
            }
        }

        let deadline = Instant::now() + self.drain_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("result drain timed out");
                break;
            }
            match self.results.recv_timeout(remaining.min(self.poll_interval)) {
                Ok(window) => self.store(window),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let snapshot = self.stats.snapshot();
        info!(
            received = snapshot.windows_received,
            evicted = snapshot.windows_evicted,
            "result poller stopped"
        );
        Ok(())
    }

    fn store(&self, window: TriggerWindow) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        debug!(crossing = window.crossing_index(), "window queued");
        if self.queue.push(window).is_some() {
            self.stats.evicted.fetch_add(1, Ordering::Relaxed);
        }
    }
}
