//! The three transport environments behind one interface.

mod desktop_shell;
mod in_page;
mod native_bridge;

pub use desktop_shell::DesktopShellBackend;
pub use in_page::{InPageBackend, UserActivation};
pub use native_bridge::{BluetoothPlugin, NativeBridgeBackend, PluginHost, SerialPlugin};

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use domain::{BackendKind, Device, DeviceKind, PeripheralError, ReceiptPayload, ScaleProtocol, WeightReading};

/// What `connect` is asked to open.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectTarget {
    pub device_id: String,
    pub kind: DeviceKind,
    /// Scales only; `None` means the configured default.
    pub protocol: Option<ScaleProtocol>,
}

impl ConnectTarget {
    pub fn printer(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            kind: DeviceKind::Printer,
            protocol: None,
        }
    }

    pub fn scale(device_id: impl Into<String>, protocol: ScaleProtocol) -> Self {
        Self {
            device_id: device_id.into(),
            kind: DeviceKind::Scale,
            protocol: Some(protocol),
        }
    }
}

/// Something a backend noticed outside of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The transport under a connected device went away.
    Lost { device_id: String, reason: String },
    /// A sample arrived while no one-shot read was waiting for it.
    Reading {
        device_id: String,
        reading: WeightReading,
    },
}

/// Sending side of a backend's event channel. Detached sinks drop everything.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<TransportEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn detached() -> Self {
        Self { tx: None }
    }

    pub fn lost(&self, device_id: &str, reason: &str) {
        self.send(TransportEvent::Lost {
            device_id: device_id.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn reading(&self, device_id: &str, reading: WeightReading) {
        self.send(TransportEvent::Reading {
            device_id: device_id.to_string(),
            reading,
        });
    }

    fn send(&self, event: TransportEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody tracks state anymore
            let _ = tx.send(event);
        }
    }
}

/// One transport environment.
///
/// Backends own their port and printer handles and report outcomes;
/// device status lives in the caller's `ConnectionRegistry`.
#[async_trait]
pub trait TransportBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn scan(&self) -> Result<Vec<Device>, PeripheralError>;

    /// Open the device. Returns what the backend learned about it.
    async fn connect(&self, target: &ConnectTarget) -> Result<Device, PeripheralError>;

    /// Release the device's handles. Errors are cleanup failures only.
    async fn disconnect(&self, device_id: &str, kind: DeviceKind) -> Result<(), PeripheralError>;

    async fn read_weight(&self, device_id: &str, timeout: Duration) -> Result<WeightReading, PeripheralError>;

    async fn print(&self, device_id: &str, payload: &ReceiptPayload) -> Result<(), PeripheralError>;

    /// Event stream of this backend. Yields `Some` once.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>>;
}
