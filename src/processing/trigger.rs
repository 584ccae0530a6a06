// src/processing/trigger.rs
//! Rising-edge trigger detection across arbitrarily chunked input
//!
//! The detector works on absolute positions in the sample stream it has been
//! fed. It keeps a carry-over tail of at least `pre_samples` bytes, so a
//! crossing right at the start of a chunk still gets its full pre-window,
//! and it defers a crossing whose post-window runs past the end of the data
//! until enough samples have arrived.
//!
//! After a crossing, scanning resumes `post_samples` later. A second crossing
//! inside that holdoff never produces an overlapping window, and a crossing
//! is never seen while another window is pending.

use crate::error::{ScopeError, ScopeResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Detector settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// A sample strictly below arms the detector, one strictly above fires it
    pub threshold: u8,
    pub pre_samples: usize,
    pub post_samples: usize,
}

impl TriggerConfig {
    pub fn validate(&self) -> ScopeResult<()> {
        if self.pre_samples == 0 {
            return Err(ScopeError::configuration("pre_samples", "must be greater than 0"));
        }
        if self.post_samples == 0 {
            return Err(ScopeError::configuration("post_samples", "must be greater than 0"));
        }
        Ok(())
    }

    pub fn window_len(&self) -> usize {
        self.pre_samples + self.post_samples
    }
}

/// Fixed-length window of samples around one rising-edge crossing.
///
/// Cheap to clone; the samples are shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerWindow {
    samples: Arc<[u8]>,
    crossing_index: u64,
    pre_samples: usize,
}

impl TriggerWindow {
    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// Position of the crossing sample in the detector's input stream
    pub fn crossing_index(&self) -> u64 {
        self.crossing_index
    }

    pub fn pre_samples(&self) -> usize {
        self.pre_samples
    }

    pub fn post_samples(&self) -> usize {
        self.samples.len() - self.pre_samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The first sample above the threshold
    pub fn crossing_sample(&self) -> u8 {
        self.samples[self.pre_samples]
    }

    pub fn pre_window(&self) -> &[u8] {
        &self.samples[..self.pre_samples]
    }

    pub fn post_window(&self) -> &[u8] {
        &self.samples[self.pre_samples..]
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.samples.to_vec()
    }
}

/// Detector state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TriggerState {
    /// Waiting for a sample below the threshold
    SeekingLow,
    /// Below-threshold sample seen, waiting for one above
    Armed,
    /// Crossing found, waiting for the rest of its post-window
    PendingEmit { crossing: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TriggerCounters {
    pub samples_seen: u64,
    pub windows_emitted: u64,
    /// Crossings without `pre_samples` of contiguous history
    pub crossings_skipped: u64,
    pub continuity_resets: u64,
    /// Pending windows discarded by a continuity reset
    pub windows_abandoned: u64,
}

/// Rising-edge detector with carry-over buffering
#[derive(Debug)]
pub struct RisingEdgeTrigger {
    config: TriggerConfig,
    state: TriggerState,
    carry: Vec<u8>,
    /// Stream position of `carry[0]`
    carry_start: u64,
    scan_from: u64,
    /// Start of the current gap-free run of input
    contiguous_from: u64,
    counters: TriggerCounters,
}

impl RisingEdgeTrigger {
    pub fn new(config: TriggerConfig) -> ScopeResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: TriggerState::SeekingLow,
            carry: Vec::with_capacity(config.window_len()),
            carry_start: 0,
            scan_from: 0,
            contiguous_from: 0,
            counters: TriggerCounters::default(),
        })
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, TriggerState::PendingEmit { .. })
    }

    pub fn counters(&self) -> TriggerCounters {
        self.counters
    }

    /// Samples currently retained for the next chunk
    pub fn carry_len(&self) -> usize {
        self.carry.len()
    }

    /// Feed the next chunk and collect every window it completes, in
    /// temporal order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<TriggerWindow> {
        self.append(chunk);
        let mut windows = Vec::new();

        loop {
            if let TriggerState::PendingEmit { crossing } = self.state {
                if crossing + self.post() > self.end() {
                    break;
                }
                windows.push(self.emit(crossing));
            }

            match self.scan() {
                Some(crossing) if crossing - self.contiguous_from < self.pre() => {
                    self.counters.crossings_skipped += 1;
                    debug!(crossing, "crossing without full pre-window skipped");
                }
                Some(crossing) => {
                    self.state = TriggerState::PendingEmit { crossing };
                    self.scan_from = crossing + self.post();
                }
                None => break,
            }
        }

        self.trim();
        windows
    }

    /// Feed a chunk during shutdown: only a window already pending may
    /// complete, no new crossings are searched for
    pub fn push_draining(&mut self, chunk: &[u8]) -> Option<TriggerWindow> {
        let TriggerState::PendingEmit { crossing } = self.state else {
            return None;
        };
        self.append(chunk);
        if crossing + self.post() > self.end() {
            return None;
        }
        let window = self.emit(crossing);
        self.trim();
        Some(window)
    }

    /// Forget the carry-over after input was lost; the next crossing needs
    /// fresh pre-window history
    pub fn reset_continuity(&mut self) {
        if self.is_pending() {
            self.counters.windows_abandoned += 1;
        }
        let end = self.end();
        self.carry.clear();
        self.carry_start = end;
        self.scan_from = end;
        self.contiguous_from = end;
        self.state = TriggerState::SeekingLow;
        self.counters.continuity_resets += 1;
    }

    fn pre(&self) -> u64 {
        self.config.pre_samples as u64
    }

    fn post(&self) -> u64 {
        self.config.post_samples as u64
    }

    fn end(&self) -> u64 {
        self.carry_start + self.carry.len() as u64
    }

    fn append(&mut self, chunk: &[u8]) {
        self.carry.extend_from_slice(chunk);
        self.counters.samples_seen += chunk.len() as u64;
    }

    /// Find the next arm-then-cross transition at or after `scan_from`
    fn scan(&mut self) -> Option<u64> {
        let end = self.end();
        let start = self.scan_from.max(self.carry_start);
        let threshold = self.config.threshold;

        for index in start..end {
            let sample = self.carry[(index - self.carry_start) as usize];
            match self.state {
                TriggerState::SeekingLow if sample < threshold => self.state = TriggerState::Armed,
                TriggerState::Armed if sample > threshold => {
                    self.state = TriggerState::SeekingLow;
                    self.scan_from = index + 1;
                    return Some(index);
                }
                _ => {}
            }
        }
        self.scan_from = end;
        None
    }

    fn emit(&mut self, crossing: u64) -> TriggerWindow {
        let start = (crossing - self.pre() - self.carry_start) as usize;
        let samples: Arc<[u8]> = Arc::from(&self.carry[start..start + self.config.window_len()]);
        self.state = TriggerState::SeekingLow;
        self.counters.windows_emitted += 1;
        debug!(crossing, "trigger window emitted");
        TriggerWindow {
            samples,
            crossing_index: crossing,
            pre_samples: self.config.pre_samples,
        }
    }

    /// Keep the last `pre_samples` bytes, or everything from the pending
    /// window's start
    fn trim(&mut self) {
        let keep_from = match self.state {
            TriggerState::PendingEmit { crossing } => crossing - self.pre(),
            _ => self.end().saturating_sub(self.pre()),
        }
        .max(self.carry_start);

        let dropped = (keep_from - self.carry_start) as usize;
        if dropped > 0 {
            self.carry.drain(..dropped);
            self.carry_start = keep_from;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(threshold: u8, pre: usize, post: usize) -> RisingEdgeTrigger {
        RisingEdgeTrigger::new(TriggerConfig {
            threshold,
            pre_samples: pre,
            post_samples: post,
        })
        .unwrap()
    }

    /// Low samples with a step to `high` at each index in `crossings`,
    /// falling back to low `hold` samples later
    fn steps(len: usize, crossings: &[usize], hold: usize) -> Vec<u8> {
        let mut stream = vec![20u8; len];
        for &crossing in crossings {
            for sample in stream.iter_mut().skip(crossing).take(hold) {
                *sample = 230;
            }
        }
        stream
    }

    #[test]
    fn test_rejects_empty_windows() {
        let config = TriggerConfig {
            threshold: 100,
            pre_samples: 0,
            post_samples: 10,
        };
        assert!(RisingEdgeTrigger::new(config).is_err());
    }

    #[test]
    fn test_ramp_crossing_whole_window() {
        // 0 -> 255 -> 0, first sample above 180 at index 1000
        let stream: Vec<u8> = (0..2000usize)
            .map(|i| {
                if i < 1000 {
                    (i * 180 / 999) as u8
                } else {
                    (255 - (i - 1000) * 255 / 1000) as u8
                }
            })
            .collect();
        assert!(stream[999] <= 180 && stream[1000] > 180);

        let mut trigger = detector(180, 500, 500);
        let windows = trigger.push(&stream);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].samples(), &stream[500..1500]);
        assert_eq!(windows[0].crossing_index(), 1000);
        assert_eq!(windows[0].crossing_sample(), stream[1000]);
    }

    #[test]
    fn test_two_crossings_in_one_chunk() {
        let stream = steps(2000, &[600, 1600], 100);
        let mut trigger = detector(180, 400, 400);
        let windows = trigger.push(&stream);

        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].crossing_index(), 600);
        assert_eq!(windows[0].samples(), &stream[200..1000]);
        assert_eq!(windows[1].crossing_index(), 1600);
        assert_eq!(windows[1].samples(), &stream[1200..2000]);
        assert!(!trigger.is_pending());
    }

    #[test]
    fn test_second_crossing_completes_in_next_chunk() {
        let stream = steps(2000, &[600, 1700], 100);
        let mut trigger = detector(180, 400, 400);
        let windows = trigger.push(&stream);
        assert_eq!(windows.len(), 1);
        assert!(trigger.is_pending());

        let tail = vec![20u8; 400];
        let more = trigger.push(&tail);
        let mut full = stream.clone();
        full.extend_from_slice(&tail);
        assert_eq!(more.len(), 1);
        assert_eq!(more[0].samples(), &full[1300..2100]);
    }

    #[test]
    fn test_deferred_window_spans_chunks() {
        let first = steps(2000, &[1990], 10);
        let second = vec![20u8; 600];
        let mut full = first.clone();
        full.extend_from_slice(&second);

        let mut trigger = detector(180, 500, 500);
        assert!(trigger.push(&first).is_empty());
        assert_eq!(trigger.state(), TriggerState::PendingEmit { crossing: 1990 });

        let windows = trigger.push(&second);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].samples(), &full[1490..2490]);
        assert_eq!(windows[0].len(), 1000);
    }

    #[test]
    fn test_crossing_at_chunk_start_uses_carry() {
        let first = vec![20u8; 700];
        let second = steps(600, &[3], 50);
        let mut full = first.clone();
        full.extend_from_slice(&second);

        let mut trigger = detector(180, 500, 500);
        assert!(trigger.push(&first).is_empty());
        assert!(trigger.carry_len() >= 500);

        let windows = trigger.push(&second);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].crossing_index(), 703);
        assert_eq!(windows[0].samples(), &full[203..1203]);
    }

    #[test]
    fn test_crossing_without_history_is_skipped() {
        let stream = steps(1000, &[100], 20);
        let mut trigger = detector(180, 500, 200);
        assert!(trigger.push(&stream).is_empty());
        assert_eq!(trigger.counters().crossings_skipped, 1);
        assert!(!trigger.is_pending());
    }

    #[test]
    fn test_threshold_equality_neither_arms_nor_fires() {
        let mut trigger = detector(100, 2, 2);
        assert!(trigger.push(&[100, 100, 200, 200, 100, 100]).is_empty());
        assert_eq!(trigger.state(), TriggerState::SeekingLow);

        let windows = trigger.push(&[50, 100, 101, 7, 7]);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].samples(), &[50, 100, 101, 7]);
    }

    #[test]
    fn test_holdoff_suppresses_overlapping_crossing() {
        // Second rise at 530 lies inside the first window's post-window
        let mut stream = steps(1500, &[500], 10);
        for sample in stream.iter_mut().skip(530).take(10) {
            *sample = 230;
        }
        let mut trigger = detector(180, 100, 100);
        let windows = trigger.push(&stream);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].crossing_index(), 500);
    }

    #[test]
    fn test_continuity_reset_abandons_pending_window() {
        let mut trigger = detector(180, 50, 50);
        assert!(trigger.push(&steps(120, &[100], 5)).is_empty());
        assert!(trigger.is_pending());

        trigger.reset_continuity();
        assert!(!trigger.is_pending());
        assert_eq!(trigger.carry_len(), 0);
        assert_eq!(trigger.counters().windows_abandoned, 1);

        // Needs 50 fresh samples of history again
        assert!(trigger.push(&steps(100, &[10], 5)).is_empty());
        assert_eq!(trigger.counters().crossings_skipped, 1);
    }

    #[test]
    fn test_draining_completes_only_pending_window() {
        let mut trigger = detector(180, 10, 10);
        assert!(trigger.push(&steps(25, &[20], 3)).is_empty());
        assert!(trigger.is_pending());

        let window = trigger.push_draining(&steps(20, &[5], 3)).unwrap();
        assert_eq!(window.crossing_index(), 20);
        assert!(!trigger.is_pending());

        // A fresh crossing during drain is ignored
        assert!(trigger.push_draining(&steps(40, &[20], 3)).is_none());
        assert_eq!(trigger.counters().windows_emitted, 1);
    }

    #[test]
    fn test_window_accessors() {
        let mut trigger = detector(180, 3, 2);
        let windows = trigger.push(&[1, 2, 3, 4, 200, 201, 9]);
        let window = &windows[0];
        assert_eq!(window.pre_window(), &[2, 3, 4]);
        assert_eq!(window.post_window(), &[200, 201]);
        assert_eq!(window.post_samples(), 2);
        assert_eq!(window.to_vec(), vec![2, 3, 4, 200, 201]);
    }
}
