// src/pipeline/metrics.rs
//! Pipeline-wide counters

use crate::acquisition::{StreamSnapshot, StreamStats, TransferSnapshot, TransferStats};
use crate::error::{ScopeError, ScopeResult};
use crate::pipeline::poller::{PollerSnapshot, PollerStats};
use crate::processing::{TriggerSnapshot, TriggerStats};
use serde::Serialize;
use std::sync::Arc;

/// Counters of every actor, shared with the handle
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub transfer: Arc<TransferStats>,
    pub stream: Arc<StreamStats>,
    pub trigger: Arc<TriggerStats>,
    pub poller: Arc<PollerStats>,
}

/// Serializable snapshot of a running or stopped pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineMetrics {
    pub transfer: TransferSnapshot,
    pub stream: StreamSnapshot,
    pub trigger: TriggerSnapshot,
    pub poller: PollerSnapshot,
    pub queue_len: usize,
    /// Recoverable errors discarded because the error sink was full
    pub errors_dropped: u64,
}

impl PipelineStats {
    pub fn snapshot(&self, queue_len: usize, errors_dropped: u64) -> PipelineMetrics {
        PipelineMetrics {
            transfer: self.transfer.snapshot(),
            stream: self.stream.snapshot(),
            trigger: self.trigger.snapshot(),
            poller: self.poller.snapshot(),
            queue_len,
            errors_dropped,
        }
    }
}

impl PipelineMetrics {
    pub fn to_json(&self) -> ScopeResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ScopeError::configuration("metrics", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let stats = PipelineStats::default();
        let metrics = stats.snapshot(3, 0);
        assert_eq!(metrics.queue_len, 3);
        assert_eq!(metrics.transfer.completions, 0);
        assert_eq!(metrics.trigger.windows_delivered, 0);
    }

    #[test]
    fn test_json_export() {
        let json = PipelineStats::default().snapshot(0, 2).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["errors_dropped"], 2);
        assert_eq!(value["transfer"]["resubmissions"], 0);
        assert_eq!(value["poller"]["windows_evicted"], 0);
    }
}
