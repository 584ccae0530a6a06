//! Scope-Core: triggered streaming from USB sampling devices
//!
//! Keeps a fixed number of transfers in flight against an already-opened
//! streaming endpoint, splits the interleaved sample stream per channel and
//! cuts fixed-size windows around rising-edge crossings of a threshold,
//! including crossings that straddle transfer boundaries.
//!
//! - Transfer submission engine with gapless resubmission
//! - Rising-edge detector with carry-over buffering
//! - Three-actor pipeline with cooperative, time-bounded shutdown
//! - Layered configuration and a deterministic simulated session
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use scope_core::config::PipelineConfig;
//! use scope_core::hal::simulator::{SimulatedSession, SimulatorConfig};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = SimulatedSession::new(SimulatorConfig::default());
//!     let config = PipelineConfig::new(180, 500, 500, 5, 0x2000);
//!
//!     let (handle, windows) = scope_core::start(session, config)?;
//!     if let Some(window) = windows.wait_pop(Duration::from_secs(1)) {
//!         println!("crossing at {}: {} samples", window.crossing_index(), window.len());
//!     }
//!
//!     let report = handle.stop(Duration::from_secs(5));
//!     assert!(report.errors.is_empty());
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod acquisition;
pub mod config;
pub mod error;
pub mod hal;
pub mod pipeline;
pub mod processing;

// Re-export commonly used types for convenience
pub use config::{ConfigLoader, PipelineConfig};
pub use error::{ScopeError, ScopeResult};
pub use hal::{EndpointInfo, StreamingSession, TransferMode};
pub use pipeline::{start, PipelineMetrics, ResultQueue, ShutdownHandle, StopReport};
pub use processing::TriggerWindow;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
