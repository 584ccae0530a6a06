// src/hal/simulator.rs
//! Simulated streaming session
//!
//! Produces deterministic 8-bit waveforms at a fixed completion interval so
//! the transfer engine and the full pipeline can be exercised without a
//! device. Two clocks are supported:
//!
//! - **virtual** (`interval: None`): every call to `wait_completion` is one
//!   device buffer interval. If no request is queued when the interval
//!   elapses, the interval's samples are lost and counted as a missed
//!   interval.
//! - **paced** (`interval: Some(d)`): buffers become ready every `d` of wall
//!   clock time.
//!
//! Fault injection covers failed transfers and loss of the session.

use crate::hal::types::{
    Completion, EndpointInfo, IsoPacket, SessionError, TransferFault, TransferMode, TransferOutcome,
    TransferRequest,
};
use crate::hal::StreamingSession;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Waveform produced on one simulated channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Waveform {
    Constant(u8),
    /// `low` for the first half of each period, `high` for the second
    Square { period: usize, low: u8, high: u8 },
    /// 0..=255 ramp repeating every `period` samples
    Sawtooth { period: usize },
    /// Explicit samples, repeated
    Pattern(Vec<u8>),
    /// Uniform noise in `low..=high`
    Noise { seed: u64, low: u8, high: u8 },
}

struct SignalGenerator {
    waveform: Waveform,
    rng: StdRng,
}

impl SignalGenerator {
    fn new(waveform: Waveform) -> Self {
        let seed = match &waveform {
            Waveform::Noise { seed, .. } => *seed,
            _ => 0,
        };
        Self {
            waveform,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn sample(&mut self, index: u64) -> u8 {
        match &self.waveform {
            Waveform::Constant(value) => *value,
            Waveform::Square { period, low, high } => {
                let period = (*period).max(2) as u64;
                if index % period < period / 2 {
                    *low
                } else {
                    *high
                }
            }
            Waveform::Sawtooth { period } => {
                let period = (*period).max(1) as u64;
                ((index % period) * 255 / period.saturating_sub(1).max(1)) as u8
            }
            Waveform::Pattern(samples) => {
                if samples.is_empty() {
                    0
                } else {
                    samples[(index % samples.len() as u64) as usize]
                }
            }
            Waveform::Noise { low, high, .. } => {
                let (low, high) = (*low.min(high), *low.max(high));
                self.rng.gen_range(low..=high)
            }
        }
    }
}

/// Simulated session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub endpoint: EndpointInfo,
    pub channel1: Waveform,
    pub channel2: Waveform,
    /// Wall-clock completion interval; `None` runs on the virtual clock
    pub interval: Option<Duration>,
    /// Every n-th completion reports a transfer fault
    pub fail_every: Option<u64>,
    /// The session disconnects after this many completions
    pub lose_after: Option<u64>,
    /// The device stops producing data after this many completions
    pub stop_after: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointInfo::default(),
            channel1: Waveform::Square {
                period: 1000,
                low: 40,
                high: 220,
            },
            channel2: Waveform::Constant(128),
            interval: None,
            fail_every: None,
            lose_after: None,
            stop_after: None,
        }
    }
}

/// Counters shared with the test or caller after the session is moved away
#[derive(Debug, Default)]
pub struct SimulatorStats {
    pub submissions: AtomicU64,
    pub completions: AtomicU64,
    pub failures_injected: AtomicU64,
    pub missed_intervals: AtomicU64,
    pub cancelled: AtomicU64,
    pub max_outstanding: AtomicU64,
}

impl SimulatorStats {
    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::Relaxed)
    }

    pub fn completions(&self) -> u64 {
        self.completions.load(Ordering::Relaxed)
    }

    pub fn missed_intervals(&self) -> u64 {
        self.missed_intervals.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn max_outstanding(&self) -> u64 {
        self.max_outstanding.load(Ordering::Relaxed)
    }
}

/// Deterministic stand-in for an opened device session
pub struct SimulatedSession {
    config: SimulatorConfig,
    generators: [SignalGenerator; 2],
    queued: VecDeque<TransferRequest>,
    sample_index: u64,
    intervals: u64,
    next_tick: Option<Instant>,
    disconnected: bool,
    stats: Arc<SimulatorStats>,
}

impl SimulatedSession {
    pub fn new(config: SimulatorConfig) -> Self {
        let generators = [
            SignalGenerator::new(config.channel1.clone()),
            SignalGenerator::new(config.channel2.clone()),
        ];
        Self {
            config,
            generators,
            queued: VecDeque::new(),
            sample_index: 0,
            intervals: 0,
            next_tick: None,
            disconnected: false,
            stats: Arc::new(SimulatorStats::default()),
        }
    }

    /// Single-channel bulk session streaming `pattern` in a loop
    pub fn with_pattern(pattern: Vec<u8>, packet_size: usize) -> Self {
        Self::new(SimulatorConfig {
            endpoint: EndpointInfo {
                packet_size,
                channel_count: 1,
                ..EndpointInfo::default()
            },
            channel1: Waveform::Pattern(pattern),
            ..SimulatorConfig::default()
        })
    }

    /// Shared counters, usable after the session has been moved into a pipeline
    pub fn stats(&self) -> Arc<SimulatorStats> {
        self.stats.clone()
    }

    fn exhausted(&self) -> bool {
        self.config
            .stop_after
            .is_some_and(|limit| self.stats.completions() >= limit)
    }

    /// Wait for the next device interval. Returns false if the timeout
    /// expires first.
    fn wait_for_tick(&mut self, timeout: Duration) -> bool {
        let Some(interval) = self.config.interval else {
            return true;
        };
        let now = Instant::now();
        let tick = *self.next_tick.get_or_insert(now + interval);
        if tick > now + timeout {
            std::thread::sleep(timeout);
            return false;
        }
        if tick > now {
            std::thread::sleep(tick - now);
        }
        self.next_tick = Some(tick + interval);
        true
    }

    fn fill(&mut self, buffer: &mut [u8]) {
        let channels = self.config.endpoint.channel_count.clamp(1, 2);
        for frame in buffer.chunks_mut(channels) {
            for (channel, byte) in frame.iter_mut().enumerate() {
                *byte = self.generators[channel].sample(self.sample_index);
            }
            self.sample_index += 1;
        }
    }

    fn complete(&mut self, mut request: TransferRequest) -> Completion {
        let completed = self.stats.completions.fetch_add(1, Ordering::Relaxed) + 1;
        self.fill(&mut request.buffer);

        let inject = self
            .config
            .fail_every
            .is_some_and(|every| every > 0 && completed % every == 0);
        if inject {
            self.stats.failures_injected.fetch_add(1, Ordering::Relaxed);
        }

        let outcome = match self.config.endpoint.mode {
            TransferMode::Bulk if inject => TransferOutcome::Failed(TransferFault::Other("injected fault".to_string())),
            TransferMode::Bulk => TransferOutcome::Bulk {
                actual_length: request.buffer.len(),
            },
            TransferMode::Isochronous => {
                let packet_size = self.config.endpoint.packet_size;
                let count = request.iso_packets.max(1);
                let packets = (0..count)
                    .map(|index| IsoPacket {
                        actual_length: packet_size,
                        fault: (inject && index == 0).then_some(TransferFault::Overflow),
                    })
                    .collect();
                TransferOutcome::Isochronous { packet_size, packets }
            }
        };

        Completion {
            slot: request.slot,
            buffer: request.buffer,
            outcome,
        }
    }
}

impl StreamingSession for SimulatedSession {
    fn endpoint(&self) -> &EndpointInfo {
        &self.config.endpoint
    }

    fn submit(&mut self, request: TransferRequest) -> Result<(), SessionError> {
        if self.disconnected {
            return Err(SessionError::Disconnected("simulated device removed".to_string()));
        }
        self.queued.push_back(request);
        self.stats.submissions.fetch_add(1, Ordering::Relaxed);
        self.stats
            .max_outstanding
            .fetch_max(self.queued.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn wait_completion(&mut self, timeout: Duration) -> Result<Option<Completion>, SessionError> {
        if self.disconnected {
            return Err(SessionError::Disconnected("simulated device removed".to_string()));
        }
        if let Some(limit) = self.config.lose_after {
            if self.stats.completions() >= limit {
                self.disconnected = true;
                debug!(completions = limit, "simulated session disconnecting");
                return Err(SessionError::Disconnected("simulated device removed".to_string()));
            }
        }
        if self.exhausted() {
            std::thread::sleep(timeout.min(Duration::from_millis(5)));
            return Ok(None);
        }
        if !self.wait_for_tick(timeout) {
            return Ok(None);
        }

        self.intervals += 1;
        match self.queued.pop_front() {
            Some(request) => Ok(Some(self.complete(request))),
            None => {
                self.stats.missed_intervals.fetch_add(1, Ordering::Relaxed);
                // The device kept sampling with nowhere to put the data
                let samples = (self.config.endpoint.packet_size / self.config.endpoint.channel_count.max(1)) as u64;
                self.sample_index += samples;
                Ok(None)
            }
        }
    }

    fn cancel_all(&mut self) -> Vec<TransferRequest> {
        let cancelled: Vec<_> = self.queued.drain(..).collect();
        self.stats
            .cancelled
            .fetch_add(cancelled.len() as u64, Ordering::Relaxed);
        cancelled
    }
}
