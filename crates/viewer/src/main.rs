//! ir-depth-viewer
//!
//! Headless viewer daemon for stereo-infrared depth cameras. Tracks the
//! single current device across hot-plug events, keeps exposure/gain/laser
//! settings applied, and polls the capture pipeline for frames.

mod config;
mod control;
mod worker;

use anyhow::{Context, Result, bail};
use capture::sim::SimulatedBackend;
use capture::{CaptureBackend, DeviceRegistry, HotplugRouter, PropertyController};
use clap::Parser;
use common::{CaptureCommand, CaptureEvent, create_capture_bridge, setup_logging};
use config::ViewerConfig;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ir-depth-viewer")]
#[command(
    author,
    version,
    about = "Stereo IR depth camera viewer daemon"
)]
#[command(long_about = "
Tracks a stereo-infrared depth camera across hot-plug events, keeps manual
exposure/gain applied and the laser/LDP toggles off, and polls the capture
pipeline for synchronized IR frame sets.

EXAMPLES:
    # Run with default config against the simulated backend
    ir-depth-viewer --simulate

    # Run with a custom config
    ir-depth-viewer --simulate --config /path/to/config.toml

    # List connected devices and exit
    ir-depth-viewer --simulate --list-devices

    # Run with debug logging
    ir-depth-viewer --simulate --log-level debug

CONFIGURATION:
    The daemon looks for configuration in the following order:
    1. Path specified with --config
    2. ~/.config/ir-depth-viewer/config.toml
    3. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to the default location and exit
    #[arg(long)]
    save_config: bool,

    /// List connected devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Run against the simulated capture backend
    #[arg(long)]
    simulate: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = ViewerConfig::default();
        let path = ViewerConfig::default_path();
        config.save(&path).context("failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config =
        ViewerConfig::load_or_default(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(level) = &args.log_level {
        config.daemon.log_level = level.clone();
    }
    config.validate().context("invalid configuration")?;

    setup_logging(&config.daemon.log_level).context("failed to initialize logging")?;

    let backend = select_backend(&args)?;
    let registry = Arc::new(DeviceRegistry::new());
    let router = HotplugRouter::new(
        Arc::clone(&registry),
        Arc::clone(&backend),
        config.stream_config(),
    );
    let (bridge, capture_worker) = create_capture_bridge();
    let worker_handle = worker::spawn_capture_worker(backend, router, capture_worker);

    if args.list_devices {
        let devices = bridge.list_devices().await?;
        if devices.is_empty() {
            println!("No devices connected.");
        } else {
            for serial in devices {
                println!("{}", serial);
            }
        }
        bridge.send_command(CaptureCommand::Shutdown).await?;
        let _ = tokio::task::spawn_blocking(move || worker_handle.join()).await;
        return Ok(());
    }

    // Surface lifecycle events in the log; the worker keeps routing them
    // whether or not anyone listens.
    let event_bridge = bridge.clone();
    tokio::spawn(async move {
        while let Ok(event) = event_bridge.recv_event().await {
            match event {
                CaptureEvent::DeviceListChanged(n) => {
                    info!(
                        removed = n.removed.len(),
                        added = n.added.len(),
                        "device list changed"
                    );
                }
            }
        }
    });

    let controller = PropertyController::new(Arc::clone(&registry));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let control_task = tokio::spawn(control::run_control_loop(
        registry,
        controller,
        config.control_config(),
        shutdown_rx,
    ));

    signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");

    let _ = shutdown_tx.send(true);
    let _ = control_task.await;
    let _ = bridge.send_command(CaptureCommand::Shutdown).await;
    let _ = tokio::task::spawn_blocking(move || worker_handle.join()).await;

    Ok(())
}

/// Pick the capture backend for this run
///
/// The vendor SDK backend is not part of this build; without one linked
/// in, only `--simulate` can run.
fn select_backend(args: &Args) -> Result<Arc<dyn CaptureBackend>> {
    if args.simulate {
        let sim = SimulatedBackend::new();
        sim.add_device("SIM0001");
        info!("using simulated capture backend");
        Ok(Arc::new(sim))
    } else {
        bail!("no vendor capture backend in this build; run with --simulate");
    }
}
