use anyhow::{Context, Result};
use facegate_core::{CaptureEngine, LatestFrameDetector};
use std::fs::File;
use std::io::BufReader;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;

use config::{Bus, Config};
use dbus_interface::{CaptureService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");

    let config = Config::from_env().context("invalid configuration")?;
    tracing::info!(
        detections = %config.detections_path.display(),
        profile = %config.capture.profile,
        mode = %config.capture.mode,
        required_streak = config.capture.required_streak,
        poll_interval_ms = config.capture.poll_interval_ms,
        timeout_ms = config.capture.timeout_ms,
        "configuration loaded"
    );

    // Opening a FIFO blocks until the detector process connects.
    let path = config.detections_path.clone();
    let file = tokio::task::spawn_blocking(move || File::open(&path))
        .await?
        .with_context(|| {
            format!(
                "failed to open detection stream {}",
                config.detections_path.display()
            )
        })?;
    // The feed is drained continuously so every poll sees the newest frame.
    let detector = LatestFrameDetector::spawn(BufReader::new(file))
        .context("failed to start detection reader")?;
    let engine = CaptureEngine::new(detector);
    let service = CaptureService::new(engine, config.capture.clone());

    let builder = match config.bus {
        Bus::Session => zbus::connection::Builder::session()?,
        Bus::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(bus = ?config.bus, name = BUS_NAME, "facegated ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facegated shutting down");

    Ok(())
}
