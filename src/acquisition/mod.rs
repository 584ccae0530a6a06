// src/acquisition/mod.rs
//! Sample acquisition: transfer engine, demultiplexing and forwarding

pub mod demux;
pub mod stage;
pub mod transfer;

pub use demux::{demultiplex, ChannelData, ChannelLayout, Demultiplexer};
pub use stage::{AcquisitionStage, SampleChunk, StreamSnapshot, StreamStats};
pub use transfer::{EngineConfig, SlotState, TransferEngine, TransferSlot, TransferSnapshot, TransferStats};
