use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use domain::device::Parity;
use domain::{
    BackendKind, Device, DeviceKind, PeripheralError, PrinterCommandBuilder, ReceiptPayload,
    ScaleConfig, WeightReading,
};

use super::{ConnectTarget, EventSink, TransportBackend, TransportEvent};
use crate::config::PrinterSettings;
use crate::decoder::ScaleDecoder;
use crate::printer::{EscPosDriver, PrinterDriver, render};
use crate::serial::{PortInfo, PortProvider, ResolveOn, ScaleStream};

/// Transient user activation, as a page gets from a click.
///
/// Selecting a new port consumes it; previously granted ports need none.
#[derive(Debug, Clone, Default)]
pub struct UserActivation(Arc<AtomicBool>);

impl UserActivation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn consume(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// The process owns the port handles directly.
pub struct InPageBackend {
    provider: Arc<dyn PortProvider>,
    decoder: Arc<ScaleDecoder>,
    activation: UserActivation,
    granted: StdMutex<HashMap<String, PortInfo>>,
    scale: Mutex<Option<Arc<ScaleStream>>>,
    printer: Mutex<Option<(String, EscPosDriver)>>,
    builder: PrinterCommandBuilder,
    printer_settings: PrinterSettings,
    events: EventSink,
    receiver: StdMutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
}

impl InPageBackend {
    pub fn new(
        provider: Arc<dyn PortProvider>,
        activation: UserActivation,
        printer_settings: PrinterSettings,
    ) -> Self {
        let (events, receiver) = EventSink::channel();
        Self {
            provider,
            decoder: Arc::new(ScaleDecoder::new()),
            activation,
            granted: StdMutex::new(HashMap::new()),
            scale: Mutex::new(None),
            printer: Mutex::new(None),
            builder: PrinterCommandBuilder::new(printer_settings.layout()),
            printer_settings,
            events,
            receiver: StdMutex::new(Some(receiver)),
        }
    }

    fn granted(&self) -> Vec<PortInfo> {
        let granted = self.granted.lock().unwrap_or_else(|e| e.into_inner());
        let mut ports: Vec<PortInfo> = granted.values().cloned().collect();
        ports.sort_by(|a, b| a.id.cmp(&b.id));
        ports
    }

    /// Port record for `port_id`, asking for a selection if it was never granted.
    async fn request_port(&self, port_id: &str) -> Result<PortInfo, PeripheralError> {
        if let Some(info) = self
            .granted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(port_id)
            .cloned()
        {
            return Ok(info);
        }
        if !self.activation.consume() {
            return Err(PeripheralError::GestureRequired);
        }

        let info = self
            .provider
            .list_ports()
            .await?
            .into_iter()
            .find(|p| p.id == port_id)
            .unwrap_or_else(|| PortInfo::from_id(port_id));
        self.granted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(info.id.clone(), info.clone());
        Ok(info)
    }

    async fn connect_scale(&self, target: &ConnectTarget) -> Result<Device, PeripheralError> {
        let mut slot = self.scale.lock().await;
        if let Some(stream) = slot.as_ref().filter(|s| s.is_alive()) {
            return Err(PeripheralError::AlreadyConnected {
                kind: DeviceKind::Scale,
                device_id: stream.device_id().to_string(),
            });
        }
        // Stream ended on its own; finish the release before reopening
        if let Some(stale) = slot.take() {
            if let Err(e) = stale.close().await {
                tracing::warn!(device_id = %stale.device_id(), error = %e, "Failed to release stale scale port");
            }
        }

        let info = self.request_port(&target.device_id).await?;
        let protocol = target.protocol.unwrap_or_default();
        let link = self
            .provider
            .open(&info.id, &ScaleConfig::for_protocol(protocol))
            .await?;

        *slot = Some(ScaleStream::start(
            link,
            info.id.clone(),
            protocol,
            ResolveOn::Decoded,
            self.decoder.clone(),
            self.events.clone(),
        ));
        Ok(info.to_device(DeviceKind::Scale).with_protocol(protocol))
    }

    async fn connect_printer(&self, target: &ConnectTarget) -> Result<Device, PeripheralError> {
        let mut slot = self.printer.lock().await;
        if let Some((id, _)) = slot.as_ref() {
            return Err(PeripheralError::AlreadyConnected {
                kind: DeviceKind::Printer,
                device_id: id.clone(),
            });
        }

        let info = self.request_port(&target.device_id).await?;
        let framing = ScaleConfig::new(self.printer_settings.baud_rate, 8, 1, Parity::None);
        let link = self.provider.open(&info.id, &framing).await?;
        *slot = Some((
            info.id.clone(),
            EscPosDriver::new(link, self.printer_settings.columns),
        ));
        Ok(info.to_device(DeviceKind::Printer))
    }
}

#[async_trait]
impl TransportBackend for InPageBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::InPage
    }

    /// Ports this page may use. With a user activation at hand, every port
    /// the host exposes is offered and granted, like a selection prompt.
    async fn scan(&self) -> Result<Vec<Device>, PeripheralError> {
        if self.activation.consume() {
            let ports = self.provider.list_ports().await?;
            let mut granted = self.granted.lock().unwrap_or_else(|e| e.into_inner());
            for port in ports {
                granted.insert(port.id.clone(), port);
            }
        }
        Ok(self.granted().iter().map(PortInfo::to_discovered).collect())
    }

    async fn connect(&self, target: &ConnectTarget) -> Result<Device, PeripheralError> {
        match target.kind {
            DeviceKind::Scale => self.connect_scale(target).await,
            DeviceKind::Printer => self.connect_printer(target).await,
        }
    }

    async fn disconnect(&self, device_id: &str, kind: DeviceKind) -> Result<(), PeripheralError> {
        match kind {
            DeviceKind::Scale => {
                let stream = {
                    let mut slot = self.scale.lock().await;
                    let held = slot.as_ref().is_some_and(|s| s.device_id() == device_id);
                    if held { slot.take() } else { None }
                };
                match stream {
                    Some(stream) => stream.close().await,
                    None => Ok(()),
                }
            }
            DeviceKind::Printer => {
                let driver = {
                    let mut slot = self.printer.lock().await;
                    let held = slot.as_ref().is_some_and(|(id, _)| id == device_id);
                    if held { slot.take() } else { None }
                };
                match driver {
                    Some((_, mut driver)) => driver.close().await,
                    None => Ok(()),
                }
            }
        }
    }

    async fn read_weight(&self, device_id: &str, timeout: Duration) -> Result<WeightReading, PeripheralError> {
        // Clone out of the slot: a second read must preempt, not queue behind the lock
        let stream = self
            .scale
            .lock()
            .await
            .as_ref()
            .filter(|s| s.device_id() == device_id)
            .cloned()
            .ok_or_else(|| PeripheralError::NotConnected(device_id.to_string()))?;
        stream.request_weight(timeout).await
    }

    async fn print(&self, device_id: &str, payload: &ReceiptPayload) -> Result<(), PeripheralError> {
        let mut slot = self.printer.lock().await;
        let (_, driver) = slot
            .as_mut()
            .filter(|(id, _)| id == device_id)
            .ok_or_else(|| PeripheralError::NotConnected(device_id.to_string()))?;

        let directives = self.builder.build(payload);
        let result = render(&directives, driver).await;
        if let Err(e) = &result {
            tracing::warn!(device_id = %device_id, error = %e, "Print failed, releasing printer");
            if let Some((_, mut driver)) = slot.take() {
                if let Err(close) = driver.close().await {
                    tracing::warn!(device_id = %device_id, error = %close, "Failed to release printer port");
                }
            }
            self.events.lost(device_id, &e.to_string());
        }
        result
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.receiver.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}
