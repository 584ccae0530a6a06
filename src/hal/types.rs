// src/hal/types.rs
//! Core types exchanged with an opened streaming session

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the streaming endpoint moves data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Bulk transfers, one contiguous buffer per completion
    Bulk,
    /// Isochronous transfers, each buffer split into fixed-size packets
    Isochronous,
}

/// Characteristics of the streaming endpoint handed over by the device layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub address: u8,
    pub packet_size: usize,
    pub channel_count: usize,
    pub mode: TransferMode,
}

impl Default for EndpointInfo {
    fn default() -> Self {
        Self {
            address: 0x86,
            packet_size: 512,
            channel_count: 2,
            mode: TransferMode::Bulk,
        }
    }
}

impl EndpointInfo {
    /// Build endpoint info from a raw `wMaxPacketSize` descriptor field.
    ///
    /// Bits 0..=10 hold the packet size, bits 11..=12 the number of
    /// additional transactions per microframe on high-bandwidth endpoints.
    pub fn from_max_packet_size(address: u8, raw: u16, channel_count: usize, mode: TransferMode) -> Self {
        let transactions = ((raw >> 11) & 0x3) as usize + 1;
        let packet_size = transactions * (raw & 0x7ff) as usize;
        Self {
            address,
            packet_size,
            channel_count,
            mode,
        }
    }

    /// Number of whole packets needed to hold `chunk_size` bytes
    pub fn packets_for(&self, chunk_size: usize) -> usize {
        if self.packet_size == 0 {
            return 0;
        }
        chunk_size.div_ceil(self.packet_size)
    }

    /// Per-transfer buffer capacity: the chunk size rounded up to whole packets
    pub fn transfer_capacity(&self, chunk_size: usize) -> usize {
        self.packets_for(chunk_size) * self.packet_size
    }
}

/// Failure reported for one transfer or one isochronous packet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferFault {
    #[error("endpoint stalled")]
    Stall,
    #[error("device sent more data than requested")]
    Overflow,
    #[error("transfer timed out")]
    TimedOut,
    #[error("transfer error: {0}")]
    Other(String),
}

/// Session-level failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The device is gone; nothing more can be submitted
    #[error("device disconnected: {0}")]
    Disconnected(String),
    /// The request was refused but the session is still usable
    #[error("submission rejected: {0}")]
    Rejected(String),
}

impl SessionError {
    /// Whether the session is unusable after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Disconnected(_))
    }
}

/// One request handed to the session; the buffer travels with it
#[derive(Debug)]
pub struct TransferRequest {
    pub slot: usize,
    pub buffer: Vec<u8>,
    /// Packets per transfer for isochronous endpoints, zero for bulk
    pub iso_packets: usize,
}

impl TransferRequest {
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}

/// Result of one isochronous packet
#[derive(Debug, Clone, PartialEq)]
pub struct IsoPacket {
    pub actual_length: usize,
    pub fault: Option<TransferFault>,
}

/// What a completed request produced
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Bulk { actual_length: usize },
    Isochronous { packet_size: usize, packets: Vec<IsoPacket> },
    Failed(TransferFault),
}

/// A request returned by the session
#[derive(Debug)]
pub struct Completion {
    pub slot: usize,
    pub buffer: Vec<u8>,
    pub outcome: TransferOutcome,
}

impl Completion {
    /// The contiguous data segments of this completion in temporal order.
    ///
    /// Bulk completions yield one segment; isochronous completions yield one
    /// per packet, failed packets as errors.
    pub fn segments(&self) -> Vec<Result<&[u8], &TransferFault>> {
        match &self.outcome {
            TransferOutcome::Bulk { actual_length } => {
                let end = (*actual_length).min(self.buffer.len());
                vec![Ok(&self.buffer[..end])]
            }
            TransferOutcome::Isochronous { packet_size, packets } => packets
                .iter()
                .enumerate()
                .map(|(index, packet)| match &packet.fault {
                    Some(fault) => Err(fault),
                    None => {
                        let start = (index * packet_size).min(self.buffer.len());
                        let end = (start + packet.actual_length.min(*packet_size)).min(self.buffer.len());
                        Ok(&self.buffer[start..end])
                    }
                })
                .collect(),
            TransferOutcome::Failed(fault) => vec![Err(fault)],
        }
    }
}
