//! Capture worker thread
//!
//! Dedicated OS thread that owns all interaction with the capture backend:
//! initial enumeration, hot-plug notification routing, and device-list
//! queries from the tokio side. The control loop never talks to the
//! backend directly; it only reads registry snapshots.

use capture::{CaptureBackend, HotplugRouter};
use common::{CaptureCommand, CaptureEvent, CaptureWorker};
use sensor::HotplugNotification;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Sleep between polls when no notifications or commands are pending
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Capture worker thread state
pub struct CaptureWorkerThread {
    backend: Arc<dyn CaptureBackend>,
    router: HotplugRouter,
    worker: CaptureWorker,
    notifications: async_channel::Receiver<HotplugNotification>,
}

impl CaptureWorkerThread {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        router: HotplugRouter,
        worker: CaptureWorker,
    ) -> Self {
        let notifications = backend.notifications();
        Self {
            backend,
            router,
            worker,
            notifications,
        }
    }

    /// Run the worker loop until a Shutdown command arrives
    ///
    /// Each iteration checks for a command without blocking, drains any
    /// pending hot-plug notifications through the router, and sleeps
    /// briefly when idle.
    pub fn run(self) {
        info!("capture worker started");

        match self.router.route_initial() {
            Ok(initial) => {
                if !initial.is_empty() {
                    self.worker
                        .send_event(CaptureEvent::DeviceListChanged(initial));
                }
            }
            Err(e) => warn!(error = %e, "initial device enumeration failed"),
        }

        loop {
            match self.worker.try_recv_command() {
                Some(CaptureCommand::Shutdown) => {
                    info!("capture worker shutting down");
                    break;
                }
                Some(cmd) => self.handle_command(cmd),
                None => {}
            }

            let mut drained = false;
            while let Ok(notification) = self.notifications.try_recv() {
                drained = true;
                self.handle_notification(notification);
            }

            if !drained {
                std::thread::sleep(IDLE_POLL);
            }
        }

        info!("capture worker stopped");
    }

    fn handle_notification(&self, notification: HotplugNotification) {
        // A panic in routing must not take down the worker thread.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.router.route(&notification);
        }));
        if let Err(e) = result {
            error!("panic while routing hot-plug notification: {:?}", e);
            return;
        }
        self.worker
            .send_event(CaptureEvent::DeviceListChanged(notification));
    }

    fn handle_command(&self, cmd: CaptureCommand) {
        match cmd {
            CaptureCommand::ListDevices { response } => {
                let devices = self.backend.query_device_list().unwrap_or_else(|e| {
                    warn!(error = %e, "device enumeration failed");
                    Vec::new()
                });
                let _ = response.send(devices);
            }
            CaptureCommand::Shutdown => {
                // Already handled in main loop
                unreachable!()
            }
        }
    }
}

/// Spawn the capture worker on its own named OS thread
pub fn spawn_capture_worker(
    backend: Arc<dyn CaptureBackend>,
    router: HotplugRouter,
    worker: CaptureWorker,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("capture-worker".to_string())
        .spawn(move || CaptureWorkerThread::new(backend, router, worker).run())
        .expect("failed to spawn capture worker thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture::sim::SimulatedBackend;
    use capture::DeviceRegistry;
    use common::create_capture_bridge;
    use sensor::{SerialNumber, StreamConfig};

    #[tokio::test]
    async fn test_worker_attaches_on_startup_and_shuts_down() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.add_device("S1");
        let registry = Arc::new(DeviceRegistry::new());
        let router = HotplugRouter::new(
            Arc::clone(&registry),
            backend.clone() as Arc<dyn CaptureBackend>,
            StreamConfig::default(),
        );
        let (bridge, worker) = create_capture_bridge();

        let handle = spawn_capture_worker(backend.clone(), router, worker);

        let devices = bridge.list_devices().await.unwrap();
        assert_eq!(devices, vec![SerialNumber::from("S1")]);
        assert_eq!(registry.current_serial(), Some(SerialNumber::from("S1")));

        bridge
            .send_command(CaptureCommand::Shutdown)
            .await
            .unwrap();
        tokio::task::spawn_blocking(move || handle.join().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_worker_routes_live_notifications() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.add_device("S1");
        backend.register_device("S2");
        let registry = Arc::new(DeviceRegistry::new());
        let router = HotplugRouter::new(
            Arc::clone(&registry),
            backend.clone() as Arc<dyn CaptureBackend>,
            StreamConfig::default(),
        );
        let (bridge, worker) = create_capture_bridge();
        let handle = spawn_capture_worker(backend.clone(), router, worker);

        // Initial attach event
        let CaptureEvent::DeviceListChanged(initial) = bridge.recv_event().await.unwrap();
        assert_eq!(initial.added, vec![SerialNumber::from("S1")]);

        // Replace S1 with S2 in one notification
        backend.notify(&["S1"], &["S2"]);
        let CaptureEvent::DeviceListChanged(changed) = bridge.recv_event().await.unwrap();
        assert_eq!(changed.removed, vec![SerialNumber::from("S1")]);
        assert_eq!(registry.current_serial(), Some(SerialNumber::from("S2")));

        bridge
            .send_command(CaptureCommand::Shutdown)
            .await
            .unwrap();
        tokio::task::spawn_blocking(move || handle.join().unwrap())
            .await
            .unwrap();
    }
}
