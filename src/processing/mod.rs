// src/processing/mod.rs
//! Edge-triggered windowing of the sample stream

pub mod stage;
pub mod trigger;

pub use stage::{TriggerSnapshot, TriggerStage, TriggerStats};
pub use trigger::{RisingEdgeTrigger, TriggerConfig, TriggerCounters, TriggerState, TriggerWindow};
