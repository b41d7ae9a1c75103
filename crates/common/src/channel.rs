//! Async channel bridge between the tokio control side and the capture
//! worker thread
//!
//! The capture worker owns all vendor-SDK interaction and runs on a plain
//! OS thread; the control loop and CLI run under tokio. Commands flow down
//! with a oneshot response channel each, lifecycle events flow back up.

use async_channel::{Receiver, Sender, bounded};
use sensor::{HotplugNotification, SerialNumber};

/// Channel capacity for both directions
///
/// Hot-plug events are rare and commands are request/response, so a small
/// bound is enough; a full queue indicates a stuck consumer.
const CHANNEL_CAPACITY: usize = 32;

/// Commands from the tokio side to the capture worker
#[derive(Debug)]
pub enum CaptureCommand {
    /// List serials of all currently connected devices
    ListDevices {
        /// Channel to send response back
        response: tokio::sync::oneshot::Sender<Vec<SerialNumber>>,
    },

    /// Shutdown the capture worker gracefully
    Shutdown,
}

/// Lifecycle events from the capture worker
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// A hot-plug notification was routed (after registry update)
    DeviceListChanged(HotplugNotification),
}

/// Handle for the tokio side (async)
#[derive(Clone)]
pub struct CaptureBridge {
    cmd_tx: Sender<CaptureCommand>,
    event_rx: Receiver<CaptureEvent>,
}

impl CaptureBridge {
    /// Send a command to the capture worker
    pub async fn send_command(&self, cmd: CaptureCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive an event from the capture worker
    pub async fn recv_event(&self) -> crate::Result<CaptureEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Request the current device list and wait for the response
    pub async fn list_devices(&self) -> crate::Result<Vec<SerialNumber>> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send_command(CaptureCommand::ListDevices { response: tx })
            .await?;
        rx.await
            .map_err(|e| crate::Error::Channel(format!("worker dropped response: {}", e)))
    }
}

/// Handle for the capture worker thread (sync)
pub struct CaptureWorker {
    cmd_rx: Receiver<CaptureCommand>,
    pub event_tx: Sender<CaptureEvent>,
}

impl CaptureWorker {
    /// Check for an incoming command without blocking
    pub fn try_recv_command(&self) -> Option<CaptureCommand> {
        self.cmd_rx.try_recv().ok()
    }

    /// Send an event to the tokio side, dropping it if the queue is full
    ///
    /// Events are informational; a slow consumer must not stall the worker.
    pub fn send_event(&self, event: CaptureEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            tracing::warn!("dropping capture event: {}", e);
        }
    }
}

/// Create a connected bridge/worker pair
pub fn create_capture_bridge() -> (CaptureBridge, CaptureWorker) {
    let (cmd_tx, cmd_rx) = bounded(CHANNEL_CAPACITY);
    let (event_tx, event_rx) = bounded(CHANNEL_CAPACITY);

    (
        CaptureBridge { cmd_tx, event_rx },
        CaptureWorker { cmd_rx, event_tx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_round_trip() {
        let (bridge, worker) = create_capture_bridge();

        let handle = tokio::task::spawn_blocking(move || {
            loop {
                match worker.try_recv_command() {
                    Some(CaptureCommand::ListDevices { response }) => {
                        let _ = response.send(vec![SerialNumber::from("S1")]);
                        break;
                    }
                    Some(CaptureCommand::Shutdown) => break,
                    None => std::thread::sleep(std::time::Duration::from_millis(1)),
                }
            }
        });

        let devices = bridge.list_devices().await.unwrap();
        assert_eq!(devices, vec![SerialNumber::from("S1")]);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_event_delivery() {
        let (bridge, worker) = create_capture_bridge();

        let notification = HotplugNotification {
            removed: vec![SerialNumber::from("S1")],
            added: vec![],
        };
        worker.send_event(CaptureEvent::DeviceListChanged(notification.clone()));

        match bridge.recv_event().await.unwrap() {
            CaptureEvent::DeviceListChanged(n) => assert_eq!(n, notification),
        }
    }

    #[tokio::test]
    async fn test_full_event_queue_does_not_block() {
        let (_bridge, worker) = create_capture_bridge();

        // Nothing drains the queue here; the worker must stay live past
        // the capacity limit.
        for _ in 0..100 {
            worker.send_event(CaptureEvent::DeviceListChanged(HotplugNotification {
                removed: vec![],
                added: vec![],
            }));
        }
    }
}
