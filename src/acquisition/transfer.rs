// src/acquisition/transfer.rs
//! Transfer submission engine
//!
//! Keeps a fixed number of requests in flight against the streaming endpoint.
//! Every completion is demultiplexed and handed to the channel callback, and
//! the same slot is resubmitted straight after the callback returns. With
//! more than one slot outstanding the endpoint always has a buffer queued
//! while the callback runs, which is what keeps sampling gapless.
//!
//! Completion order across slots is whatever the session reports; only the
//! samples inside one completion are guaranteed to be contiguous. Samples
//! lost to a failed transfer or packet are never silently skipped: the next
//! delivered segment is flagged with [`ChannelData::discontinuity`].

use crate::acquisition::demux::{ChannelData, ChannelLayout, Demultiplexer};
use crate::config::PipelineConfig;
use crate::error::{ErrorSink, ScopeError, ScopeResult};
use crate::error_context;
use crate::hal::{Completion, EndpointInfo, SessionError, StreamingSession, TransferMode, TransferRequest};
use crate::pipeline::ShutdownSignal;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Engine parameters derived from the endpoint and the pipeline configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub outstanding_slots: usize,
    /// Bytes per request, a whole number of endpoint packets
    pub transfer_capacity: usize,
    /// Packets per request on isochronous endpoints, zero for bulk
    pub iso_packets: usize,
    pub poll_interval: Duration,
    pub drain_timeout: Duration,
    pub layout: ChannelLayout,
}

impl EngineConfig {
    /// Resolve the engine parameters, rejecting endpoint/configuration
    /// combinations the engine cannot stream
    pub fn for_endpoint(endpoint: &EndpointInfo, config: &PipelineConfig) -> ScopeResult<Self> {
        let layout = ChannelLayout::from_channel_count(endpoint.channel_count)?;
        let channels = layout.channel_count();

        if config.trigger_channel > channels {
            return Err(ScopeError::configuration(
                "trigger_channel",
                format!(
                    "channel {} requested but the endpoint streams {} channel(s)",
                    config.trigger_channel, channels
                ),
            ));
        }
        if endpoint.packet_size == 0 {
            return Err(ScopeError::configuration("packet_size", "endpoint reports a zero packet size"));
        }
        // Every packet has to start on a channel-1 sample
        if endpoint.packet_size % channels != 0 {
            return Err(ScopeError::configuration(
                "packet_size",
                format!("{} is not a multiple of {} channels", endpoint.packet_size, channels),
            ));
        }

        let iso_packets = match endpoint.mode {
            TransferMode::Bulk => 0,
            TransferMode::Isochronous => endpoint.packets_for(config.chunk_size),
        };

        Ok(Self {
            outstanding_slots: config.outstanding_slots,
            transfer_capacity: endpoint.transfer_capacity(config.chunk_size),
            iso_packets,
            poll_interval: config.poll_interval(),
            drain_timeout: config.drain_timeout(),
            layout,
        })
    }
}

/// Lifecycle of one transfer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlotState {
    /// Not queued; submitted on the next engine iteration
    Idle,
    /// Owned by the session
    Submitted,
    /// Returned by the session and being delivered
    Completed,
    /// Retired at shutdown
    Released,
}

/// One outstanding request and the buffer it cycles through
#[derive(Debug)]
pub struct TransferSlot {
    id: usize,
    capacity: usize,
    state: SlotState,
    resubmit: bool,
    buffer: Option<Vec<u8>>,
    completions: u64,
}

impl TransferSlot {
    fn new(id: usize, capacity: usize) -> Self {
        Self {
            id,
            capacity,
            state: SlotState::Idle,
            resubmit: true,
            buffer: Some(vec![0; capacity]),
            completions: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Whether the slot goes back to the session after its next completion
    pub fn resubmit(&self) -> bool {
        self.resubmit
    }

    pub fn completions(&self) -> u64 {
        self.completions
    }

    fn take_request(&mut self, iso_packets: usize) -> TransferRequest {
        // A buffer swallowed by a rejected submission is replaced here
        let mut buffer = self.buffer.take().unwrap_or_default();
        buffer.resize(self.capacity, 0);
        TransferRequest {
            slot: self.id,
            buffer,
            iso_packets,
        }
    }

    fn restore(&mut self, buffer: Vec<u8>) {
        self.buffer = Some(buffer);
    }

    fn release(&mut self) {
        self.state = SlotState::Released;
        self.resubmit = false;
        self.buffer = None;
    }
}

/// Engine counters, readable from any thread while the engine runs
#[derive(Debug, Default)]
pub struct TransferStats {
    submissions: AtomicU64,
    resubmissions: AtomicU64,
    completions: AtomicU64,
    failures: AtomicU64,
    bytes_received: AtomicU64,
}

/// Point-in-time copy of [`TransferStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferSnapshot {
    /// Every accepted submission, initial and repeated
    pub submissions: u64,
    /// Submissions issued straight from a completion
    pub resubmissions: u64,
    pub completions: u64,
    /// Failed transfers and failed isochronous packets
    pub failures: u64,
    pub bytes_received: u64,
}

impl TransferStats {
    pub fn snapshot(&self) -> TransferSnapshot {
        TransferSnapshot {
            submissions: self.submissions.load(Ordering::Relaxed),
            resubmissions: self.resubmissions.load(Ordering::Relaxed),
            completions: self.completions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

/// Drives the outstanding slots of one session
pub struct TransferEngine<S: StreamingSession> {
    session: S,
    config: EngineConfig,
    slots: Vec<TransferSlot>,
    demux: Demultiplexer,
    /// Samples were lost since the last delivered segment
    gap_pending: bool,
    stats: Arc<TransferStats>,
}

impl<S: StreamingSession> TransferEngine<S> {
    pub fn new(session: S, config: EngineConfig, stats: Arc<TransferStats>) -> Self {
        let slots = (0..config.outstanding_slots)
            .map(|id| TransferSlot::new(id, config.transfer_capacity))
            .collect();
        let demux = Demultiplexer::new(config.layout);
        Self {
            session,
            config,
            slots,
            demux,
            gap_pending: false,
            stats,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn slots(&self) -> &[TransferSlot] {
        &self.slots
    }

    pub fn stats(&self) -> Arc<TransferStats> {
        self.stats.clone()
    }

    /// Slots currently owned by the session
    pub fn in_flight(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state == SlotState::Submitted)
            .count()
    }

    /// Stream until `shutdown` is set or a fatal error occurs.
    ///
    /// Recoverable transfer failures go to `errors` and the slot is retried.
    /// A lost session or a failing callback sets `shutdown` and is returned.
    /// Either way in-flight requests are drained for up to the drain timeout,
    /// the rest are cancelled and every slot ends up released.
    pub fn run<F>(&mut self, shutdown: &ShutdownSignal, errors: &ErrorSink, mut on_data: F) -> ScopeResult<()>
    where
        F: FnMut(ChannelData<'_>) -> ScopeResult<()>,
    {
        info!(
            slots = self.config.outstanding_slots,
            capacity = self.config.transfer_capacity,
            iso_packets = self.config.iso_packets,
            "transfer engine starting"
        );

        let result = self.stream(shutdown, errors, &mut on_data);
        if let Err(err) = &result {
            error!(error = %err, "transfer engine stopping on fatal error");
            shutdown.trigger();
        }

        self.drain(errors, &mut on_data);

        let stats = self.stats.snapshot();
        info!(
            submissions = stats.submissions,
            completions = stats.completions,
            failures = stats.failures,
            bytes = stats.bytes_received,
            "transfer engine stopped"
        );
        result
    }

    fn stream<F>(&mut self, shutdown: &ShutdownSignal, errors: &ErrorSink, on_data: &mut F) -> ScopeResult<()>
    where
        F: FnMut(ChannelData<'_>) -> ScopeResult<()>,
    {
        while !shutdown.is_set() {
            self.submit_idle(errors)?;

            match self.session.wait_completion(self.config.poll_interval) {
                Ok(Some(completion)) => {
                    let slot = completion.slot;
                    self.deliver(completion, errors, on_data)?;
                    self.resubmit(slot, shutdown, errors)?;
                }
                Ok(None) => {}
                Err(err) => {
                    self.session_error(err, errors, "wait_completion")?;
                    std::thread::sleep(self.config.poll_interval);
                }
            }
        }
        Ok(())
    }

    fn submit_idle(&mut self, errors: &ErrorSink) -> ScopeResult<()> {
        for id in 0..self.slots.len() {
            if self.slots[id].state == SlotState::Idle {
                self.submit_slot(id, errors)?;
            }
        }
        Ok(())
    }

    fn resubmit(&mut self, id: usize, shutdown: &ShutdownSignal, errors: &ErrorSink) -> ScopeResult<()> {
        let Some(slot) = self.slots.get_mut(id) else {
            return Ok(());
        };
        if shutdown.is_set() || !slot.resubmit {
            slot.release();
            return Ok(());
        }
        if self.submit_slot(id, errors)? {
            self.stats.resubmissions.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Hand one slot to the session. Returns whether the session accepted it;
    /// a rejected slot stays idle and is retried on the next iteration.
    fn submit_slot(&mut self, id: usize, errors: &ErrorSink) -> ScopeResult<bool> {
        let request = self.slots[id].take_request(self.config.iso_packets);
        match self.session.submit(request) {
            Ok(()) => {
                self.slots[id].state = SlotState::Submitted;
                self.stats.submissions.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Err(err) => {
                self.slots[id].state = SlotState::Idle;
                self.session_error(err, errors, "submit")?;
                Ok(false)
            }
        }
    }

    fn session_error(&self, err: SessionError, errors: &ErrorSink, operation: &str) -> ScopeResult<()> {
        if err.is_fatal() {
            return Err(ScopeError::SessionLost {
                reason: err.to_string(),
                context: error_context!("transfer_engine", operation),
            });
        }
        warn!(operation, error = %err, "session refused operation");
        errors.report(ScopeError::Session {
            reason: err.to_string(),
            context: error_context!("transfer_engine", operation),
        });
        Ok(())
    }

    /// Demultiplex every good segment of a completion into the callback and
    /// report the failed ones. The buffer goes back to its slot either way.
    /// The first segment delivered after lost samples carries
    /// `discontinuity`.
    fn deliver<F>(&mut self, completion: Completion, errors: &ErrorSink, on_data: &mut F) -> ScopeResult<()>
    where
        F: FnMut(ChannelData<'_>) -> ScopeResult<()>,
    {
        self.stats.completions.fetch_add(1, Ordering::Relaxed);
        let id = completion.slot;
        match self.slots.get_mut(id) {
            Some(slot) => {
                slot.state = SlotState::Completed;
                slot.completions += 1;
            }
            None => {
                warn!(slot = id, "completion for unknown slot ignored");
                return Ok(());
            }
        }

        let frame = self.config.layout.channel_count();
        let mut result = Ok(());
        for (index, segment) in completion.segments().into_iter().enumerate() {
            match segment {
                Ok(data) => {
                    let usable = data.len() - data.len() % frame;
                    if usable > 0 {
                        self.stats.bytes_received.fetch_add(usable as u64, Ordering::Relaxed);
                        let gap = std::mem::take(&mut self.gap_pending);
                        let mut channels = self.demux.split(&data[..usable]);
                        channels.discontinuity = gap;
                        if let Err(err) = on_data(channels) {
                            result = Err(err);
                            break;
                        }
                    }
                    if usable != data.len() {
                        debug!(slot = id, len = data.len(), "trailing partial frame discarded");
                        self.gap_pending = true;
                    }
                }
                Err(fault) => {
                    self.gap_pending = true;
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(slot = id, segment = index, fault = %fault, "transfer failed");
                    errors.report(ScopeError::TransferFailure {
                        slot: id,
                        reason: fault.to_string(),
                        context: error_context!("transfer_engine", "completion"),
                    });
                }
            }
        }

        self.slots[id].restore(completion.buffer);
        result
    }

    /// Collect requests still owned by the session after shutdown
    fn drain<F>(&mut self, errors: &ErrorSink, on_data: &mut F)
    where
        F: FnMut(ChannelData<'_>) -> ScopeResult<()>,
    {
        let deadline = Instant::now() + self.config.drain_timeout;
        while self.in_flight() > 0 {
            let now = Instant::now();
            if now >= deadline {
                warn!(in_flight = self.in_flight(), "drain timeout expired");
                break;
            }
            match self.session.wait_completion((deadline - now).min(self.config.poll_interval)) {
                Ok(Some(completion)) => {
                    let id = completion.slot;
                    if let Err(err) = self.deliver(completion, errors, on_data) {
                        debug!(slot = id, error = %err, "drained data not delivered");
                    }
                    if let Some(slot) = self.slots.get_mut(id) {
                        slot.release();
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(error = %err, "session unavailable while draining");
                    break;
                }
            }
        }

        let cancelled = self.session.cancel_all();
        if !cancelled.is_empty() {
            debug!(count = cancelled.len(), "cancelled outstanding transfers");
        }
        for slot in &mut self.slots {
            slot.release();
        }
    }
}
