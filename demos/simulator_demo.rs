//! Simulator Demo
//!
//! Streams a paced two-channel square wave through the full pipeline and
//! prints the captured windows as they arrive.
//!
//! Run with `RUST_LOG=scope_core=debug` for per-window logging.

use scope_core::hal::simulator::{SimulatedSession, SimulatorConfig, Waveform};
use scope_core::{start, PipelineConfig};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scope_core=info")))
        .init();

    println!("Scope-Core Simulator Demo");
    println!("=========================");

    let simulator = SimulatorConfig {
        channel1: Waveform::Square {
            period: 2000,
            low: 30,
            high: 210,
        },
        channel2: Waveform::Noise {
            seed: 7,
            low: 100,
            high: 140,
        },
        interval: Some(Duration::from_millis(4)),
        fail_every: Some(200),
        ..SimulatorConfig::default()
    };
    let config = PipelineConfig::new(128, 400, 400, 3, 0x2000);

    println!("Configuration:");
    println!("  Threshold: {}", config.threshold);
    println!("  Window: {} + {} samples", config.pre_samples, config.post_samples);
    println!("  Outstanding transfers: {}", config.outstanding_slots);
    println!("  Chunk size: {} bytes", config.chunk_size);
    println!();

    let (handle, queue) = start(SimulatedSession::new(simulator), config)?;

    let started = Instant::now();
    let mut windows = 0;
    while started.elapsed() < Duration::from_secs(2) {
        if let Some(window) = queue.wait_pop(Duration::from_millis(100)) {
            windows += 1;
            let pre_mean = window.pre_window().iter().map(|&s| s as u32).sum::<u32>() / window.pre_samples() as u32;
            let post_mean = window.post_window().iter().map(|&s| s as u32).sum::<u32>() / window.post_samples() as u32;
            println!(
                "window {:>3}: crossing at sample {:>8}, pre mean {:>3}, post mean {:>3}",
                windows,
                window.crossing_index(),
                pre_mean,
                post_mean
            );
        }
        for err in handle.take_errors() {
            println!("recoverable error: {}", err);
        }
    }

    let report = handle.stop(Duration::from_secs(2));
    println!();
    println!("Stopped: {} error(s), {} warning(s)", report.errors.len(), report.warnings.len());
    println!("{}", handle.metrics().to_json()?);
    Ok(())
}
