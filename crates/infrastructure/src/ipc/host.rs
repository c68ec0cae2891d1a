use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};

use domain::device::Parity;
use domain::{
    ConnectionRegistry, Device, DeviceKind, PeripheralError, PrinterCommandBuilder,
    ReceiptPayload, ScaleConfig, ScaleProtocol,
};

use super::protocol::{
    DevicePathPayload, HostReply, IpcChannel, IpcRequest, IpcResponse, NotificationPayload,
    ReadWeightPayload,
};
use crate::backends::{EventSink, TransportEvent};
use crate::config::{PrinterSettings, ScaleSettings};
use crate::decoder::ScaleDecoder;
use crate::notify::Notifier;
use crate::printer::{EscPosDriver, PrinterDriver, render};
use crate::serial::{PortInfo, PortProvider, ResolveOn, ScaleStream};

/// The privileged side of the desktop shell.
///
/// Owns the real port handles, at most one printer and one scale, and
/// answers every request with a plain serializable body.
pub struct DeviceHost {
    provider: Arc<dyn PortProvider>,
    registry: ConnectionRegistry,
    decoder: Arc<ScaleDecoder>,
    printer: Mutex<Option<(String, Box<dyn PrinterDriver>)>>,
    scale: Mutex<Option<Arc<ScaleStream>>>,
    notifier: Arc<dyn Notifier>,
    builder: PrinterCommandBuilder,
    printer_settings: PrinterSettings,
    default_protocol: ScaleProtocol,
    read_timeout: Duration,
    events: EventSink,
    receiver: StdMutex<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl DeviceHost {
    pub fn new(
        provider: Arc<dyn PortProvider>,
        notifier: Arc<dyn Notifier>,
        printer_settings: PrinterSettings,
        scale_settings: &ScaleSettings,
    ) -> Self {
        let (events, receiver) = EventSink::channel();
        Self {
            provider,
            registry: ConnectionRegistry::new(),
            decoder: Arc::new(ScaleDecoder::new()),
            printer: Mutex::new(None),
            scale: Mutex::new(None),
            notifier,
            builder: PrinterCommandBuilder::new(printer_settings.layout()),
            printer_settings,
            default_protocol: scale_settings.default_protocol,
            read_timeout: scale_settings.host_read_timeout(),
            events,
            receiver: StdMutex::new(receiver),
        }
    }

    /// Host-side view of its devices.
    pub fn devices(&self) -> Vec<Device> {
        self.reconcile();
        self.registry.snapshot()
    }

    pub async fn handle(&self, request: IpcRequest) -> IpcResponse {
        tracing::debug!(id = %request.id, channel = ?request.channel, "IPC request");
        let body = self.dispatch(request.channel, request.payload).await;
        IpcResponse {
            id: request.id,
            body,
        }
    }

    async fn dispatch(&self, channel: IpcChannel, payload: Value) -> Value {
        self.reconcile();
        let reply = match channel {
            IpcChannel::ScanSerialPorts => {
                return match self.scan().await {
                    Ok(devices) => serde_json::to_value(devices).unwrap_or(Value::Null),
                    Err(e) => HostReply::failed(&e).to_value(),
                };
            }
            IpcChannel::ConnectPrinter => match parse::<DevicePathPayload>(payload) {
                Ok(p) => self.connect_printer(&p.device_path).await,
                Err(e) => Err(e),
            },
            IpcChannel::ConnectScale => match parse::<DevicePathPayload>(payload) {
                Ok(p) => {
                    let protocol = p.protocol.unwrap_or(self.default_protocol);
                    self.connect_scale(&p.device_path, protocol).await
                }
                Err(e) => Err(e),
            },
            IpcChannel::PrintReceipt => match parse::<ReceiptPayload>(payload) {
                Ok(p) => self.print(&p).await,
                Err(e) => Err(e),
            },
            IpcChannel::ReadWeight => {
                let timeout = parse::<ReadWeightPayload>(payload)
                    .ok()
                    .and_then(|p| p.timeout_ms)
                    .map(Duration::from_millis)
                    .unwrap_or(self.read_timeout);
                self.read_weight(timeout).await
            }
            IpcChannel::DisconnectPrinter => Ok(self.disconnect(DeviceKind::Printer).await),
            IpcChannel::DisconnectScale => Ok(self.disconnect(DeviceKind::Scale).await),
            IpcChannel::ShowNotification => match parse::<NotificationPayload>(payload) {
                Ok(n) => self
                    .notifier
                    .notify(&n.title, &n.body)
                    .await
                    .map(|_| HostReply::done()),
                Err(e) => Err(e),
            },
        };

        reply.unwrap_or_else(|e| HostReply::failed(&e)).to_value()
    }

    fn reconcile(&self) {
        let mut receiver = self.receiver.lock().unwrap_or_else(|e| e.into_inner());
        while let Ok(event) = receiver.try_recv() {
            match event {
                TransportEvent::Lost { device_id, reason } => {
                    self.registry.mark_lost(&device_id, &reason);
                }
                TransportEvent::Reading { device_id, reading } => {
                    self.registry.record_reading(&device_id, reading);
                }
            }
        }
    }

    async fn scan(&self) -> Result<Vec<Device>, PeripheralError> {
        let devices: Vec<Device> = self
            .provider
            .list_ports()
            .await?
            .iter()
            .map(PortInfo::to_discovered)
            .collect();
        self.registry.record_discovered(&devices);
        Ok(devices)
    }

    async fn port_info(&self, path: &str) -> PortInfo {
        match self.provider.list_ports().await {
            Ok(ports) => ports
                .into_iter()
                .find(|p| p.id == path)
                .unwrap_or_else(|| PortInfo::from_id(path)),
            Err(_) => PortInfo::from_id(path),
        }
    }

    async fn connect_printer(&self, path: &str) -> Result<HostReply, PeripheralError> {
        let info = self.port_info(path).await;
        let pending = self.registry.begin_connect(info.to_device(DeviceKind::Printer))?;

        let framing = ScaleConfig::new(self.printer_settings.baud_rate, 8, 1, Parity::None);
        let link = match self.provider.open(path, &framing).await {
            Ok(link) => link,
            Err(e) => {
                self.registry.fail_connect(path, &e.to_string());
                return Err(e);
            }
        };

        let driver: Box<dyn PrinterDriver> =
            Box::new(EscPosDriver::new(link, self.printer_settings.columns));
        *self.printer.lock().await = Some((path.to_string(), driver));
        self.registry.complete_connect(pending)?;
        Ok(HostReply::ok(format!("Printer connected on {}", path)))
    }

    async fn connect_scale(&self, path: &str, protocol: ScaleProtocol) -> Result<HostReply, PeripheralError> {
        let info = self.port_info(path).await;
        let pending = self
            .registry
            .begin_connect(info.to_device(DeviceKind::Scale).with_protocol(protocol))?;

        let link = match self.provider.open(path, &ScaleConfig::for_protocol(protocol)).await {
            Ok(link) => link,
            Err(e) => {
                self.registry.fail_connect(path, &e.to_string());
                return Err(e);
            }
        };

        let stream = ScaleStream::start(
            link,
            path,
            protocol,
            ResolveOn::FirstFrame,
            self.decoder.clone(),
            self.events.clone(),
        );
        *self.scale.lock().await = Some(stream);
        self.registry.complete_connect(pending)?;
        Ok(HostReply::ok(format!("Scale connected on {} ({})", path, protocol)))
    }

    async fn read_weight(&self, timeout: Duration) -> Result<HostReply, PeripheralError> {
        let stream = self
            .scale
            .lock()
            .await
            .clone()
            .ok_or_else(|| PeripheralError::NotConnected("scale".to_string()))?;

        let reading = stream.request_weight(timeout).await?;
        self.registry.record_reading(stream.device_id(), reading.clone());
        Ok(HostReply::reading(&reading))
    }

    async fn print(&self, payload: &ReceiptPayload) -> Result<HostReply, PeripheralError> {
        let mut slot = self.printer.lock().await;
        let (device_id, driver) = slot
            .as_mut()
            .ok_or_else(|| PeripheralError::NotConnected("printer".to_string()))?;
        let device_id = device_id.clone();

        let directives = self.builder.build(payload);
        if let Err(e) = render(&directives, driver.as_mut()).await {
            tracing::warn!(device_id = %device_id, error = %e, "Print failed, releasing printer");
            if let Some((_, mut driver)) = slot.take() {
                if let Err(close) = driver.close().await {
                    tracing::warn!(device_id = %device_id, error = %close, "Failed to release printer port");
                }
            }
            self.registry.mark_lost(&device_id, &e.to_string());
            return Err(e);
        }
        drop(slot);

        let body = format!("Pedido #{} enviado para a impressora", payload.order_number);
        if let Err(e) = self.notifier.notify("Impressão concluída", &body).await {
            tracing::warn!(error = %e, "Failed to show print notification");
        }
        Ok(HostReply::ok("Receipt printed"))
    }

    /// Always succeeds; release errors are logged.
    async fn disconnect(&self, kind: DeviceKind) -> HostReply {
        let (device_id, released) = match kind {
            DeviceKind::Printer => match self.printer.lock().await.take() {
                Some((id, mut driver)) => (Some(id), driver.close().await),
                None => (None, Ok(())),
            },
            DeviceKind::Scale => match self.scale.lock().await.take() {
                Some(stream) => (Some(stream.device_id().to_string()), stream.close().await),
                None => (None, Ok(())),
            },
        };

        let Some(device_id) = device_id else {
            return HostReply::done();
        };
        if let Err(e) = released {
            tracing::warn!(device_id = %device_id, error = %e, "Failed to release port");
        }
        self.registry.release(&device_id);
        HostReply::done()
    }
}

fn parse<T: DeserializeOwned>(payload: Value) -> Result<T, PeripheralError> {
    serde_json::from_value(payload).map_err(|e| PeripheralError::Ipc(format!("Invalid payload: {}", e)))
}
