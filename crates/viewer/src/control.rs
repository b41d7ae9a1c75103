//! Control and acquisition loop
//!
//! The tokio-side loop that re-applies capture settings and polls the
//! current pipeline for frames. It never owns device lifecycle: attach
//! and detach stay with the hot-plug router, and an empty registry just
//! means wait and retry. The blocking frame wait runs on the blocking
//! pool so the async runtime stays responsive.

use anyhow::Context;
use capture::{ActiveDevice, DeviceRegistry, PropertyController};
use sensor::{CaptureSettings, FrameSet, SerialNumber};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Settings and timing for the control loop
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub settings: CaptureSettings,
    pub disable_laser: bool,
    pub disable_ldp: bool,
    /// Bounded timeout for one frame wait
    pub frame_timeout: Duration,
    /// Sleep while no device is attached
    pub poll_interval: Duration,
    /// Frames to discard after each (re)attach before counting
    pub warmup_frames: u32,
    /// Log a stats line every N counted frames; 0 disables stats logging
    pub stats_interval_frames: u64,
    /// Directory for the one-shot frame-metadata snapshot; `None` disables it
    pub snapshot_dir: Option<PathBuf>,
}

/// Run the control loop until the shutdown flag flips
pub async fn run_control_loop(
    registry: Arc<DeviceRegistry>,
    controller: PropertyController,
    config: ControlConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("control loop started");

    let mut session: Option<Arc<ActiveDevice>> = None;
    let mut frames_seen: u64 = 0;
    let mut warmup_left = config.warmup_frames;
    let mut snapshot_saved = false;

    while !*shutdown.borrow() {
        // Settings are re-applied every tick: firmware resets and external
        // tools can silently revert them, and they do not survive
        // reconnects.
        controller.apply_settings(&config.settings);
        if config.disable_laser {
            controller.disable_laser();
        }
        if config.disable_ldp {
            controller.disable_ldp();
        }

        let Some(active) = registry.current() else {
            // Release our session reference so a detached pair can tear
            // down instead of being kept alive by the idle loop.
            session = None;
            if sleep_or_shutdown(&mut shutdown, config.poll_interval).await {
                break;
            }
            continue;
        };

        // Compare by snapshot identity, not serial: a reconnect glitch
        // reattaches the same serial with a fresh pipeline, and its early
        // frames need the warm-up skip too.
        if !session
            .as_ref()
            .is_some_and(|previous| Arc::ptr_eq(previous, &active))
        {
            info!(serial = %active.serial(), "capture session started");
            session = Some(Arc::clone(&active));
            frames_seen = 0;
            warmup_left = config.warmup_frames;
            snapshot_saved = false;
        }

        let timeout = config.frame_timeout;
        let snapshot = Arc::clone(&active);
        let frame_set = match tokio::task::spawn_blocking(move || {
            snapshot.pipeline().wait_for_frames(timeout)
        })
        .await
        {
            Ok(frame_set) => frame_set,
            Err(e) => {
                error!(error = %e, "frame wait task failed");
                None
            }
        };

        match frame_set {
            None => {
                // Bounded poll timed out; retry. The registry may have
                // swapped devices under us, which the next iteration
                // picks up.
                trace!(serial = %active.serial(), "frame wait timed out");
            }
            Some(set) => {
                if warmup_left > 0 {
                    // Early frames are unstable while exposure settles
                    warmup_left -= 1;
                    continue;
                }
                if !snapshot_saved {
                    snapshot_saved = true;
                    if let Some(dir) = &config.snapshot_dir {
                        match write_snapshot(dir, active.serial(), &set) {
                            Ok(path) => info!(
                                serial = %active.serial(),
                                path = %path.display(),
                                "frame snapshot written"
                            ),
                            Err(e) => warn!(
                                serial = %active.serial(),
                                error = %e,
                                "frame snapshot failed"
                            ),
                        }
                    }
                }
                frames_seen += 1;
                if config.stats_interval_frames > 0
                    && frames_seen % config.stats_interval_frames == 0
                {
                    info!(
                        serial = %active.serial(),
                        frames = frames_seen,
                        streams = set.frames.len(),
                        "capture running"
                    );
                } else {
                    debug!(
                        serial = %active.serial(),
                        frames = set.frames.len(),
                        "frame set received"
                    );
                }
            }
        }
    }

    info!("control loop stopped");
}

/// Write the metadata of the first stable frame set to a TOML file
///
/// Written once per capture session, after the warm-up frames. Pixel data
/// stays inside the vendor pipeline; only frame metadata is recorded.
fn write_snapshot(dir: &Path, serial: &SerialNumber, set: &FrameSet) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create snapshot directory: {}", dir.display()))?;
    let path = dir.join(format!("snapshot-{}.toml", serial));
    let contents = toml::to_string_pretty(set).context("failed to serialize frame snapshot")?;
    std::fs::write(&path, contents)
        .with_context(|| format!("failed to write snapshot file: {}", path.display()))?;
    Ok(path)
}

/// Sleep, returning early with `true` when shutdown is requested
async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => *shutdown.borrow(),
        changed = shutdown.changed() => match changed {
            Ok(()) => *shutdown.borrow(),
            // Sender gone means the main task is unwinding
            Err(_) => true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture::sim::{SimProfile, SimulatedBackend};
    use capture::traits::CaptureBackend;
    use capture::HotplugRouter;
    use sensor::{PropertyId, PropertyValue, StreamConfig};

    fn test_config() -> ControlConfig {
        ControlConfig {
            settings: CaptureSettings {
                exposure_us: 3000,
                gain: 16,
            },
            disable_laser: true,
            disable_ldp: true,
            frame_timeout: Duration::from_millis(1),
            poll_interval: Duration::from_millis(1),
            warmup_frames: 2,
            stats_interval_frames: 100,
            snapshot_dir: None,
        }
    }

    /// Poll until the condition holds, panicking after a bounded wait
    async fn wait_until(what: &str, condition: impl Fn() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {}", what);
    }

    fn attach(backend: &SimulatedBackend, registry: &DeviceRegistry, serial: &str) {
        let device = backend
            .open_device(&SerialNumber::from(serial))
            .unwrap();
        let pipeline = device.create_pipeline(&StreamConfig::default()).unwrap();
        assert!(registry.attach(device, pipeline));
    }

    #[tokio::test]
    async fn test_loop_applies_settings_and_stops_on_shutdown() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.add_device("S1");
        let registry = Arc::new(DeviceRegistry::new());
        attach(&backend, &registry, "S1");

        let controller = PropertyController::new(Arc::clone(&registry));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_control_loop(
            Arc::clone(&registry),
            controller,
            test_config(),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        let serial = SerialNumber::from("S1");
        assert_eq!(
            backend.property(&serial, PropertyId::AutoExposure),
            Some(PropertyValue::Bool(false))
        );
        assert_eq!(
            backend.property(&serial, PropertyId::Exposure),
            Some(PropertyValue::Int(3000))
        );
        assert_eq!(
            backend.property(&serial, PropertyId::LaserEnable),
            Some(PropertyValue::Bool(false))
        );
        assert_eq!(
            backend.property(&serial, PropertyId::LdpEnable),
            Some(PropertyValue::Bool(false))
        );
    }

    #[tokio::test]
    async fn test_loop_idles_without_device() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.add_device("S1");
        let registry = Arc::new(DeviceRegistry::new());
        let controller = PropertyController::new(Arc::clone(&registry));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_control_loop(
            Arc::clone(&registry),
            controller,
            test_config(),
            shutdown_rx,
        ));

        // No device attached: the loop must neither exit nor touch the
        // backend.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());
        assert!(backend.calls().is_empty());

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_loop_survives_frame_starvation() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.add_device_with_profile(
            "S1",
            SimProfile {
                starve_frames: true,
                ..Default::default()
            },
        );
        let registry = Arc::new(DeviceRegistry::new());
        attach(&backend, &registry, "S1");

        let controller = PropertyController::new(Arc::clone(&registry));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_control_loop(
            Arc::clone(&registry),
            controller,
            test_config(),
            shutdown_rx,
        ));

        // Repeated timeouts are retried, not treated as failure
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!task.is_finished());

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_written_once_after_warmup() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.add_device("S1");
        let registry = Arc::new(DeviceRegistry::new());
        attach(&backend, &registry, "S1");

        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.snapshot_dir = Some(dir.path().to_path_buf());

        let controller = PropertyController::new(Arc::clone(&registry));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_control_loop(
            Arc::clone(&registry),
            controller,
            config,
            shutdown_rx,
        ));

        let path = dir.path().join("snapshot-S1.toml");
        wait_until("snapshot file", || path.exists()).await;

        // The snapshot records a post-warm-up frame set
        let contents = std::fs::read_to_string(&path).unwrap();
        let set: sensor::FrameSet = toml::from_str(&contents).unwrap();
        assert!(!set.frames.is_empty());
        assert!(set.frames.iter().all(|f| f.index >= 2));

        // Written once per session, never re-written on later ticks
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), contents);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_warmup_reapplies_on_same_serial_reconnect() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.add_device("S1");
        let registry = Arc::new(DeviceRegistry::new());
        attach(&backend, &registry, "S1");

        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.snapshot_dir = Some(dir.path().to_path_buf());

        let controller = PropertyController::new(Arc::clone(&registry));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_control_loop(
            Arc::clone(&registry),
            controller,
            config,
            shutdown_rx,
        ));

        let path = dir.path().join("snapshot-S1.toml");
        wait_until("first snapshot", || path.exists()).await;

        // Reconnect glitch: same serial comes back with a fresh pipeline
        // (different stream mode makes the new session observable).
        registry.detach(&SerialNumber::from("S1"));
        let device = backend.open_device(&SerialNumber::from("S1")).unwrap();
        let narrow = StreamConfig {
            width: 640,
            height: 400,
            ..StreamConfig::default()
        };
        let pipeline = device.create_pipeline(&narrow).unwrap();
        assert!(registry.attach(device, pipeline));

        // The fresh session gets its own warm-up and its own snapshot: the
        // recorded frames are from the new pipeline (indexes restart) and
        // still past the warm-up skip.
        wait_until("second snapshot", || {
            std::fs::read_to_string(&path)
                .ok()
                .and_then(|c| toml::from_str::<sensor::FrameSet>(&c).ok())
                .is_some_and(|set| set.frames.iter().all(|f| f.width == 640))
        })
        .await;
        let contents = std::fs::read_to_string(&path).unwrap();
        let set: sensor::FrameSet = toml::from_str(&contents).unwrap();
        assert!(set.frames.iter().all(|f| f.index >= 2));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_stats_interval_is_tolerated() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.add_device("S1");
        let registry = Arc::new(DeviceRegistry::new());
        attach(&backend, &registry, "S1");

        let mut config = test_config();
        config.warmup_frames = 0;
        config.stats_interval_frames = 0;

        let controller = PropertyController::new(Arc::clone(&registry));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_control_loop(
            Arc::clone(&registry),
            controller,
            config,
            shutdown_rx,
        ));

        // Frames are flowing; a zero interval must not panic the loop
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!task.is_finished());

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_loop_follows_device_replacement() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.add_device("S1");
        backend.register_device("S2");
        let registry = Arc::new(DeviceRegistry::new());
        attach(&backend, &registry, "S1");

        let controller = PropertyController::new(Arc::clone(&registry));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_control_loop(
            Arc::clone(&registry),
            controller,
            test_config(),
            shutdown_rx,
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Swap devices mid-run the way the router would
        let router = HotplugRouter::new(
            Arc::clone(&registry),
            backend.clone() as Arc<dyn CaptureBackend>,
            StreamConfig::default(),
        );
        backend.unplug(&SerialNumber::from("S1"));
        backend.plug(&SerialNumber::from("S2"));
        router.route(&sensor::HotplugNotification {
            removed: vec![SerialNumber::from("S1")],
            added: vec![SerialNumber::from("S2")],
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        // Settings landed on the replacement device too
        assert_eq!(
            backend.property(&SerialNumber::from("S2"), PropertyId::AutoExposure),
            Some(PropertyValue::Bool(false))
        );
    }
}
