//! Framesink recorder: capture a camera stream to a directory of stills

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use framesink::output::ImageFormat;
use framesink::{Config, Recorder};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Record a live camera stream to disk as still images")]
struct Cli {
    /// TOML configuration file
    #[arg(long, short, value_name = "PATH", env = "FRAMESINK_CONFIG")]
    config: Option<PathBuf>,
    /// Source address: rtsp://..., file://<dir> or stub://
    #[arg(value_name = "ADDRESS")]
    source: Option<String>,
    /// Output directory
    #[arg(long, short, value_name = "DIR")]
    output: Option<PathBuf>,
    /// Number of writer threads
    #[arg(long, value_name = "N")]
    threads: Option<usize>,
    /// Encode quality (1-100)
    #[arg(long, value_name = "Q")]
    quality: Option<u8>,
    /// Output image format
    #[arg(long, value_enum)]
    format: Option<ImageFormat>,
    /// Use best-effort UDP transport instead of TCP
    #[arg(long)]
    udp: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(source) = &self.source {
            config.source.address = source.clone();
        }
        if let Some(output) = &self.output {
            config.output.directory = output.clone();
        }
        if let Some(threads) = self.threads {
            config.pipeline.write_threads = threads;
        }
        if let Some(quality) = self.quality {
            config.output.quality = quality;
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if self.udp {
            config.source.reliable_transport = false;
        }
    }
}

/// File and environment layers, then CLI overrides, validated once.
fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::layered(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("framesink=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    info!("Source: {}", config.source.address);
    info!("Output folder: {}", config.output.directory.display());
    info!(
        "Write threads: {}, {:?} quality {}",
        config.pipeline.write_threads, config.output.format, config.output.quality
    );

    let recorder = Arc::new(Recorder::new(config)?);
    recorder.set_error_callback(|event| {
        let severity = if event.fatal { "FATAL" } else { "WARNING" };
        eprintln!("[{}] {}: {}", severity, event.kind, event.message);
    });

    recorder
        .start()
        .map_err(|e| eyre!("Failed to start capture: {}", e))?;
    info!("Running capture. Press Ctrl+C to stop.");

    let started = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                break;
            }
            _ = ticker.tick() => {
                let stats = recorder.stats();
                info!(
                    elapsed_s = started.elapsed().as_secs(),
                    captured = stats.captured_frames,
                    written = stats.written_frames,
                    dropped = stats.dropped_frames,
                    queued = recorder.queued_frames(),
                    "{:.1} Hz",
                    stats.current_fps
                );
                if !recorder.is_running() {
                    warn!("Recorder stopped running");
                    break;
                }
            }
        }
    }

    // Joining threads blocks; keep it off the runtime workers.
    let stopper = recorder.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || stopper.stop()).await {
        error!("Stop task failed: {}", e);
    }

    let stats = recorder.stats();
    info!("Capture stopped.");
    info!("  Captured frames: {}", stats.captured_frames);
    info!("  Written frames: {}", stats.written_frames);
    info!("  Dropped frames: {}", stats.dropped_frames);
    info!("  Processed frames: {}", stats.processed_frames());
    info!("  Last FPS: {:.1}", stats.current_fps);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_invalid_file_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("framesink.toml");
        std::fs::write(&path, "[pipeline]\nwrite_threads = 0\n").unwrap();
        let path = path.to_str().unwrap();

        let cli = Cli::parse_from(["framesink", "--config", path, "--threads", "4", "--udp"]);
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.pipeline.write_threads, 4);
        assert!(!config.source.reliable_transport);

        let cli = Cli::parse_from(["framesink", "--config", path]);
        assert!(resolve_config(&cli).is_err());
    }
}
