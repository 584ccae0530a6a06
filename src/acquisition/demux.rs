// src/acquisition/demux.rs
//! Channel demultiplexing of the interleaved sample stream

use crate::error::{ScopeError, ScopeResult};
use serde::{Deserialize, Serialize};

/// How samples of the enabled channels are laid out in a transfer buffer.
///
/// Chosen once from the endpoint's channel count and then used for every
/// completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelLayout {
    /// Every byte belongs to channel 1
    Single,
    /// CH1, CH2, CH1, CH2, ...
    Interleaved,
}

impl ChannelLayout {
    pub fn from_channel_count(channels: usize) -> ScopeResult<Self> {
        match channels {
            1 => Ok(ChannelLayout::Single),
            2 => Ok(ChannelLayout::Interleaved),
            other => Err(ScopeError::configuration(
                "channel_count",
                format!("{} channels are not supported, expected 1 or 2", other),
            )),
        }
    }

    pub fn channel_count(self) -> usize {
        match self {
            ChannelLayout::Single => 1,
            ChannelLayout::Interleaved => 2,
        }
    }
}

/// Per-channel view of one completed transfer segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelData<'a> {
    pub ch1: &'a [u8],
    pub ch2: &'a [u8],
    /// Samples were lost between the previously delivered segment and this one
    pub discontinuity: bool,
}

impl<'a> ChannelData<'a> {
    /// Samples of channel 1 or 2; any other number yields an empty slice
    pub fn channel(&self, channel: usize) -> &'a [u8] {
        match channel {
            1 => self.ch1,
            2 => self.ch2,
            _ => &[],
        }
    }
}

/// Split `raw` into owned per-channel sequences.
///
/// Precondition: `raw.len()` is a multiple of the layout's channel count.
pub fn demultiplex(layout: ChannelLayout, raw: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut demux = Demultiplexer::new(layout);
    let data = demux.split(raw);
    (data.ch1.to_vec(), data.ch2.to_vec())
}

/// Reusable demultiplexer; interleaved data is split into scratch buffers
/// that are recycled across completions.
#[derive(Debug)]
pub struct Demultiplexer {
    layout: ChannelLayout,
    ch1: Vec<u8>,
    ch2: Vec<u8>,
}

impl Demultiplexer {
    pub fn new(layout: ChannelLayout) -> Self {
        Self {
            layout,
            ch1: Vec::new(),
            ch2: Vec::new(),
        }
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// Split one segment. Single-channel data is passed through without
    /// copying.
    pub fn split<'a>(&'a mut self, raw: &'a [u8]) -> ChannelData<'a> {
        match self.layout {
            ChannelLayout::Single => ChannelData {
                ch1: raw,
                ch2: &[],
                discontinuity: false,
            },
            ChannelLayout::Interleaved => {
                debug_assert!(raw.len() % 2 == 0, "interleaved segment of odd length {}", raw.len());
                self.ch1.clear();
                self.ch2.clear();
                for pair in raw.chunks_exact(2) {
                    self.ch1.push(pair[0]);
                    self.ch2.push(pair[1]);
                }
                ChannelData {
                    ch1: &self.ch1,
                    ch2: &self.ch2,
                    discontinuity: false,
                }
            }
        }
    }
}
