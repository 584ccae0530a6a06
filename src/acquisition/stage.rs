// src/acquisition/stage.rs
//! Acquisition stage: owns the device session and feeds the trigger stage

use crate::acquisition::transfer::TransferEngine;
use crate::error::{ErrorSink, ScopeError, ScopeResult, StageChannel};
use crate::error_context;
use crate::hal::StreamingSession;
use crate::pipeline::ShutdownSignal;
use crossbeam::channel::{Sender, TrySendError};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, info_span, warn};

/// Samples of the trigger channel from one completed segment.
///
/// `sequence` increases by one per segment, including segments that had to
/// be dropped or were lost in transfer, so the consumer can detect gaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleChunk {
    pub sequence: u64,
    pub samples: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct StreamStats {
    forwarded: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamSnapshot {
    pub chunks_forwarded: u64,
    /// Chunks discarded because the trigger stage was behind
    pub chunks_dropped: u64,
}

impl StreamStats {
    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            chunks_forwarded: self.forwarded.load(Ordering::Relaxed),
            chunks_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Runs the transfer engine and forwards one channel downstream.
///
/// Forwarding never blocks: when the sample channel is full the chunk is
/// dropped so completion handling keeps pace with the device.
pub struct AcquisitionStage<S: StreamingSession> {
    engine: TransferEngine<S>,
    samples: Sender<SampleChunk>,
    trigger_channel: usize,
    stats: Arc<StreamStats>,
}

impl<S: StreamingSession> AcquisitionStage<S> {
    pub fn new(
        engine: TransferEngine<S>,
        samples: Sender<SampleChunk>,
        trigger_channel: usize,
        stats: Arc<StreamStats>,
    ) -> Self {
        Self {
            engine,
            samples,
            trigger_channel,
            stats,
        }
    }

    /// Stream until shutdown. Consumes the stage so the sample channel is
    /// closed as soon as streaming ends.
    pub fn run(self, shutdown: &ShutdownSignal, errors: &ErrorSink) -> ScopeResult<()> {
        let span = info_span!("acquisition", channel = self.trigger_channel);
        let _enter = span.enter();

        let Self {
            mut engine,
            samples,
            trigger_channel,
            stats,
        } = self;
        let mut sequence = 0u64;

        let result = engine.run(shutdown, errors, |data| {
            if data.discontinuity {
                // Skipped sequence number tells the trigger stage input was lost
                sequence += 1;
            }
            let channel = data.channel(trigger_channel);
            if channel.is_empty() {
                return Ok(());
            }
            let chunk = SampleChunk {
                sequence,
                samples: channel.to_vec(),
            };
            sequence += 1;

            match samples.try_send(chunk) {
                Ok(()) => {
                    stats.forwarded.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
                Err(TrySendError::Full(chunk)) => {
                    stats.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(sequence = chunk.sequence, "trigger stage behind, chunk dropped");
                    Ok(())
                }
                Err(TrySendError::Disconnected(_)) if shutdown.is_set() => Ok(()),
                Err(TrySendError::Disconnected(_)) => Err(ScopeError::ChannelClosed {
                    channel: StageChannel::Samples,
                    context: error_context!("acquisition", "forward"),
                }),
            }
        });

        let snapshot = stats.snapshot();
        info!(
            forwarded = snapshot.chunks_forwarded,
            dropped = snapshot.chunks_dropped,
            "acquisition stage stopped"
        );
        result
    }
}
