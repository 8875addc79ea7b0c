//! Printer camera CLI: grab a snapshot or record the live stream

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use bambu_camera::config::Config;
use bambu_camera::{CameraStreamClient, FrameDistributor, JpegInfo, StreamStats};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "bambu-camera")]
#[command(about = "Capture JPEG frames from a Bambu Lab printer camera")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "camera.toml")]
    config: PathBuf,

    /// Printer address (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// LAN access code (overrides the config file)
    #[arg(long, env = "BAMBU_ACCESS_CODE", hide_env_values = true)]
    access_code: Option<String>,

    /// Camera port (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Verify the server certificate instead of accepting the printer's
    /// self-signed one
    #[arg(long)]
    verify_certs: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture a single frame
    Snapshot {
        /// Output file
        #[arg(short, long, default_value = "snapshot.jpg")]
        output: PathBuf,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },

    /// Stream frames into a directory until Ctrl+C
    Stream {
        /// Output directory
        #[arg(short = 'd', long, default_value = "frames")]
        output_dir: PathBuf,

        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<u64>,

        /// Seconds between statistics log lines
        #[arg(long, default_value_t = 10)]
        stats_interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let config = load_config(&cli)?;
    info!(
        host = %config.camera.host,
        port = %config.camera.port,
        verify_certs = !config.camera.accept_invalid_certs,
        "Configuration loaded"
    );

    let client = CameraStreamClient::from_config(&config.camera)
        .context("Failed to create camera client")?;

    match cli.command {
        Command::Snapshot { output, timeout } => snapshot(&client, &output, timeout).await,
        Command::Stream {
            output_dir,
            max_frames,
            stats_interval,
        } => stream(&client, &output_dir, max_frames, stats_interval).await,
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if cli.config.exists() {
        info!(config_path = %cli.config.display(), "Loading configuration");
        Config::read(&cli.config)
            .with_context(|| format!("Failed to read {}", cli.config.display()))?
    } else {
        Config::default()
    };

    if let Some(host) = &cli.host {
        config.camera.host = host.clone();
    }
    if let Some(access_code) = &cli.access_code {
        config.camera.access_code = access_code.clone();
    }
    if let Some(port) = cli.port {
        config.camera.port = port;
    }
    if cli.verify_certs {
        config.camera.accept_invalid_certs = false;
    }

    config.validate()?;
    Ok(config)
}

async fn snapshot(client: &CameraStreamClient, output: &Path, timeout: u64) -> Result<()> {
    info!("Capturing snapshot");

    let frame = client
        .capture_frame_within(Duration::from_secs(timeout))
        .await
        .context("Snapshot failed")?;

    log_frame_info(&frame);

    tokio::fs::write(output, &frame)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(path = %output.display(), bytes = frame.len(), "Snapshot saved");
    Ok(())
}

async fn stream(
    client: &CameraStreamClient,
    output_dir: &Path,
    max_frames: Option<u64>,
    stats_interval: u64,
) -> Result<()> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let distributor = Arc::new(FrameDistributor::new(30));
    let mut viewer = distributor.subscribe("disk");

    // Write frames to disk until the limit is reached
    let dir = output_dir.to_path_buf();
    let mut writer = tokio::spawn(async move {
        let mut written = 0u64;
        while let Some(frame) = viewer.recv().await {
            written += 1;
            if written == 1 {
                log_frame_info(&frame);
            }

            let path = dir.join(format!("frame_{:06}.jpg", written));
            if let Err(e) = tokio::fs::write(&path, &frame).await {
                warn!(path = %path.display(), error = %e, "Failed to write frame");
            }

            if max_frames.is_some_and(|max| written >= max) {
                break;
            }
        }
        written
    });

    client.start_stream(distributor.publisher());
    info!("Streaming started, press Ctrl+C to stop");

    let mut ticker = tokio::time::interval(Duration::from_secs(stats_interval.max(1)));
    ticker.tick().await;
    let mut previous = StreamStats::default();
    let mut last_tick = Instant::now();

    let written = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break None;
            }
            result = &mut writer => {
                break Some(result.context("Frame writer task failed")?);
            }
            _ = ticker.tick() => {
                let stats = client.stats();
                let elapsed = last_tick.elapsed().as_secs_f64();
                info!(
                    frames = %stats.frames_received,
                    fps = %format!("{:.1}", stats.calculate_fps(&previous, elapsed)),
                    kbps = %format!("{:.0}", stats.calculate_bitrate_kbps(&previous, elapsed)),
                    discarded = %stats.bytes_discarded,
                    "Stats"
                );
                if !client.is_streaming() && stats.frames_received == previous.frames_received {
                    bail!("Camera stream ended, see log for the cause");
                }
                previous = stats;
                last_tick = Instant::now();
            }
        }
    };

    client.stop_stream();
    client.close();
    writer.abort();

    let stats = client.stats();
    info!(
        frames = %stats.frames_received,
        written = ?written,
        bytes = %stats.bytes_received,
        errors = %stats.session_errors,
        "Stream finished"
    );

    Ok(())
}

fn log_frame_info(frame: &[u8]) {
    match JpegInfo::probe(frame) {
        Ok(info) => info!(
            width = info.width,
            height = info.height,
            bytes = frame.len(),
            "Frame"
        ),
        Err(e) => warn!(error = %e, bytes = frame.len(), "Could not read JPEG header"),
    }
}
