use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use domain::{BackendKind, Device, DeviceKind, PeripheralError, ReceiptPayload, WeightReading};

use super::{ConnectTarget, TransportBackend, TransportEvent};
use crate::ipc::{DevicePathPayload, HostReply, IpcChannel, ReadWeightPayload, ShellChannel};
use crate::serial::PortInfo;

/// Extra wait on top of the requested timeout for the round trip.
const IPC_GRACE: Duration = Duration::from_millis(500);

/// Relays every operation to the privileged host. Holds no handles itself.
pub struct DesktopShellBackend {
    channel: Arc<dyn ShellChannel>,
}

impl DesktopShellBackend {
    pub fn new(channel: Arc<dyn ShellChannel>) -> Self {
        Self { channel }
    }

    async fn call(&self, channel: IpcChannel, payload: Value) -> Result<HostReply, PeripheralError> {
        let body = self.channel.invoke(channel, payload).await?;
        HostReply::from_value(body)?.into_result()
    }

    fn to_value<T: serde::Serialize>(payload: &T) -> Result<Value, PeripheralError> {
        serde_json::to_value(payload)
            .map_err(|e| PeripheralError::Ipc(format!("Failed to encode payload: {}", e)))
    }
}

#[async_trait]
impl TransportBackend for DesktopShellBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::DesktopShell
    }

    async fn scan(&self) -> Result<Vec<Device>, PeripheralError> {
        let body = self
            .channel
            .invoke(IpcChannel::ScanSerialPorts, Value::Null)
            .await?;
        if body.is_array() {
            return serde_json::from_value(body)
                .map_err(|e| PeripheralError::Ipc(format!("Malformed device list: {}", e)));
        }
        // A failure comes back as a reply object instead of a list
        HostReply::from_value(body)?.into_result()?;
        Ok(Vec::new())
    }

    async fn connect(&self, target: &ConnectTarget) -> Result<Device, PeripheralError> {
        let (channel, payload) = match target.kind {
            DeviceKind::Printer => (
                IpcChannel::ConnectPrinter,
                DevicePathPayload {
                    device_path: target.device_id.clone(),
                    protocol: None,
                },
            ),
            DeviceKind::Scale => (
                IpcChannel::ConnectScale,
                DevicePathPayload {
                    device_path: target.device_id.clone(),
                    protocol: target.protocol,
                },
            ),
        };
        let reply = self.call(channel, Self::to_value(&payload)?).await?;
        tracing::debug!(device_id = %target.device_id, message = ?reply.message, "Host connected device");

        let device = PortInfo::from_id(&target.device_id).to_device(target.kind);
        Ok(match target.kind {
            DeviceKind::Scale => device.with_protocol(target.protocol.unwrap_or_default()),
            DeviceKind::Printer => device,
        })
    }

    async fn disconnect(&self, _device_id: &str, kind: DeviceKind) -> Result<(), PeripheralError> {
        let channel = match kind {
            DeviceKind::Printer => IpcChannel::DisconnectPrinter,
            DeviceKind::Scale => IpcChannel::DisconnectScale,
        };
        self.call(channel, Value::Null).await.map(|_| ())
    }

    async fn read_weight(&self, _device_id: &str, timeout: Duration) -> Result<WeightReading, PeripheralError> {
        let payload = Self::to_value(&ReadWeightPayload {
            timeout_ms: Some(timeout.as_millis() as u64),
        })?;
        let body = tokio::time::timeout(
            timeout + IPC_GRACE,
            self.channel.invoke(IpcChannel::ReadWeight, payload),
        )
        .await
        .map_err(|_| PeripheralError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        })??;
        HostReply::from_value(body)?.into_reading()
    }

    async fn print(&self, _device_id: &str, payload: &ReceiptPayload) -> Result<(), PeripheralError> {
        self.call(IpcChannel::PrintReceipt, Self::to_value(payload)?)
            .await
            .map(|_| ())
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        None
    }
}
