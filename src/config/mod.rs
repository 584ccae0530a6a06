// src/config/mod.rs
//! Pipeline configuration
//!
//! Everything the pipeline needs is passed to [`crate::pipeline::start`] as
//! one [`PipelineConfig`] value; there are no process-wide defaults to mutate.

pub mod constants;
pub mod loader;

pub use constants::*;
pub use loader::ConfigLoader;

use crate::error::{ScopeError, ScopeResult};
use crate::processing::trigger::TriggerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete pipeline configuration with validation
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Raw ADC count a rising edge has to exceed
    #[serde(default = "defaults::threshold")]
    pub threshold: u8,

    #[serde(default = "defaults::pre_samples")]
    pub pre_samples: usize,

    #[serde(default = "defaults::post_samples")]
    pub post_samples: usize,

    /// Number of transfers kept in flight against the endpoint
    #[serde(default = "defaults::outstanding_slots")]
    pub outstanding_slots: usize,

    /// Requested bytes per transfer, rounded up to whole packets
    #[serde(default = "defaults::chunk_size")]
    pub chunk_size: usize,

    /// Windows retained for the caller, oldest dropped first
    #[serde(default = "defaults::queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Chunks buffered between acquisition and trigger stages
    #[serde(default = "defaults::stage_channel_depth")]
    pub stage_channel_depth: usize,

    /// 1 or 2
    #[serde(default = "defaults::trigger_channel")]
    pub trigger_channel: usize,

    /// How long in-flight transfers may take to come back after shutdown
    #[serde(default = "defaults::drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

/// Default value providers using constants
mod defaults {
    use crate::config::constants::*;

    pub fn threshold() -> u8 { trigger::DEFAULT_THRESHOLD }
    pub fn pre_samples() -> usize { trigger::DEFAULT_PRE_SAMPLES }
    pub fn post_samples() -> usize { trigger::DEFAULT_POST_SAMPLES }
    pub fn trigger_channel() -> usize { trigger::DEFAULT_TRIGGER_CHANNEL }

    pub fn outstanding_slots() -> usize { transfer::DEFAULT_OUTSTANDING_SLOTS }
    pub fn chunk_size() -> usize { transfer::DEFAULT_CHUNK_SIZE }
    pub fn drain_timeout_ms() -> u64 { transfer::DEFAULT_DRAIN_TIMEOUT_MS }

    pub fn queue_capacity() -> usize { pipeline::DEFAULT_QUEUE_CAPACITY }
    pub fn poll_interval_ms() -> u64 { pipeline::DEFAULT_POLL_INTERVAL_MS }
    pub fn stage_channel_depth() -> usize { pipeline::DEFAULT_STAGE_CHANNEL_DEPTH }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::threshold(),
            pre_samples: defaults::pre_samples(),
            post_samples: defaults::post_samples(),
            outstanding_slots: defaults::outstanding_slots(),
            chunk_size: defaults::chunk_size(),
            queue_capacity: defaults::queue_capacity(),
            poll_interval_ms: defaults::poll_interval_ms(),
            stage_channel_depth: defaults::stage_channel_depth(),
            trigger_channel: defaults::trigger_channel(),
            drain_timeout_ms: defaults::drain_timeout_ms(),
        }
    }
}

impl PipelineConfig {
    /// Configuration with the five caller-facing knobs set and everything
    /// else defaulted
    pub fn new(
        threshold: u8,
        pre_samples: usize,
        post_samples: usize,
        outstanding_slots: usize,
        chunk_size: usize,
    ) -> Self {
        Self {
            threshold,
            pre_samples,
            post_samples,
            outstanding_slots,
            chunk_size,
            ..Self::default()
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> ScopeResult<()> {
        if !(trigger::MIN_THRESHOLD..=trigger::MAX_THRESHOLD).contains(&self.threshold) {
            return Err(ScopeError::configuration(
                "threshold",
                format!(
                    "{} is outside {}..={}",
                    self.threshold,
                    trigger::MIN_THRESHOLD,
                    trigger::MAX_THRESHOLD
                ),
            ));
        }
        if self.pre_samples == 0 {
            return Err(ScopeError::configuration("pre_samples", "must be greater than 0"));
        }
        if self.post_samples == 0 {
            return Err(ScopeError::configuration("post_samples", "must be greater than 0"));
        }
        if self.pre_samples + self.post_samples > trigger::MAX_WINDOW_SAMPLES {
            return Err(ScopeError::configuration(
                "pre_samples + post_samples",
                format!("window exceeds {} samples", trigger::MAX_WINDOW_SAMPLES),
            ));
        }
        if self.outstanding_slots == 0 || self.outstanding_slots > transfer::MAX_OUTSTANDING_SLOTS {
            return Err(ScopeError::configuration(
                "outstanding_slots",
                format!("must be within 1..={}", transfer::MAX_OUTSTANDING_SLOTS),
            ));
        }
        if self.chunk_size == 0 || self.chunk_size > transfer::MAX_CHUNK_SIZE {
            return Err(ScopeError::configuration(
                "chunk_size",
                format!("must be within 1..={}", transfer::MAX_CHUNK_SIZE),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ScopeError::configuration("queue_capacity", "must be greater than 0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ScopeError::configuration("poll_interval_ms", "must be greater than 0"));
        }
        if self.stage_channel_depth == 0 {
            return Err(ScopeError::configuration("stage_channel_depth", "must be greater than 0"));
        }
        if !(1..=2).contains(&self.trigger_channel) {
            return Err(ScopeError::configuration("trigger_channel", "must be 1 or 2"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Trigger detector settings carried by this configuration
    pub fn trigger_config(&self) -> TriggerConfig {
        TriggerConfig {
            threshold: self.threshold,
            pre_samples: self.pre_samples,
            post_samples: self.post_samples,
        }
    }

    /// Serialize as TOML for export
    pub fn to_toml_string(&self) -> ScopeResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ScopeError::configuration("export", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = PipelineConfig::default();
        assert_eq!(config.threshold, trigger::DEFAULT_THRESHOLD);
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.chunk_size, 0x2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = PipelineConfig::new(120, 64, 32, 3, 4096);
        let toml_str = config.to_toml_string().unwrap();
        let deserialized: PipelineConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: PipelineConfig = toml::from_str("threshold = 90\npre_samples = 10").unwrap();
        assert_eq!(config.threshold, 90);
        assert_eq!(config.pre_samples, 10);
        assert_eq!(config.post_samples, trigger::DEFAULT_POST_SAMPLES);
    }

    #[test]
    fn test_config_validation() {
        let reject = |config: PipelineConfig, field: &str| match config.validate() {
            Err(ScopeError::Configuration { field: f, .. }) => assert_eq!(f, field),
            other => panic!("expected configuration error for {}, got {:?}", field, other),
        };

        reject(PipelineConfig { pre_samples: 0, ..Default::default() }, "pre_samples");
        reject(PipelineConfig { post_samples: 0, ..Default::default() }, "post_samples");
        reject(PipelineConfig { threshold: 0, ..Default::default() }, "threshold");
        reject(PipelineConfig { threshold: 255, ..Default::default() }, "threshold");
        reject(PipelineConfig { outstanding_slots: 0, ..Default::default() }, "outstanding_slots");
        reject(PipelineConfig { chunk_size: 0, ..Default::default() }, "chunk_size");
        reject(PipelineConfig { queue_capacity: 0, ..Default::default() }, "queue_capacity");
        reject(PipelineConfig { trigger_channel: 3, ..Default::default() }, "trigger_channel");
    }

    #[test]
    fn test_trigger_config_projection() {
        let config = PipelineConfig::new(100, 7, 9, 2, 512);
        let trigger = config.trigger_config();
        assert_eq!(trigger.threshold, 100);
        assert_eq!(trigger.pre_samples, 7);
        assert_eq!(trigger.post_samples, 9);
    }
}
