//! Triggered Capture
//!
//! Loads the pipeline configuration the way an application would (config
//! files plus `SCOPE_*` environment overrides), captures a handful of
//! trigger windows from the simulator and writes them out as CSV.
//!
//! ```text
//! SCOPE_THRESHOLD=100 cargo run --example triggered_capture -- capture.csv
//! ```

use scope_core::hal::simulator::{SimulatedSession, SimulatorConfig, Waveform};
use scope_core::{start, ConfigLoader, TriggerWindow};
use std::fmt::Write as _;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const WANTED_WINDOWS: usize = 5;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let output = std::env::args().nth(1).unwrap_or_else(|| "capture.csv".to_string());
    let config = ConfigLoader::new().load()?;
    info!(threshold = config.threshold, output = %output, "capturing");

    let session = SimulatedSession::new(SimulatorConfig {
        channel1: Waveform::Sawtooth { period: 3000 },
        interval: Some(Duration::from_millis(2)),
        ..SimulatorConfig::default()
    });
    let (handle, queue) = start(session, config)?;

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut captured: Vec<TriggerWindow> = Vec::new();
    while captured.len() < WANTED_WINDOWS && Instant::now() < deadline {
        if let Some(window) = queue.wait_pop(Duration::from_millis(50)) {
            info!(crossing = window.crossing_index(), "window captured");
            captured.push(window);
        }
        if !handle.is_running() {
            warn!("pipeline stopped early");
            break;
        }
    }

    let report = handle.stop(Duration::from_secs(2));
    for err in report.errors.iter().chain(&report.warnings) {
        warn!(error = %err, "shutdown");
    }

    let mut csv = String::from("window,crossing,offset,sample\n");
    for (n, window) in captured.iter().enumerate() {
        let first = window.crossing_index() as i64 - window.pre_samples() as i64;
        for (i, sample) in window.samples().iter().enumerate() {
            writeln!(csv, "{},{},{},{}", n, window.crossing_index(), first + i as i64, sample)?;
        }
    }
    std::fs::write(&output, csv)?;
    println!("wrote {} window(s) to {}", captured.len(), output);
    Ok(())
}
