use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::Instant;

use domain::device::Parity;
use domain::{
    BackendKind, ConnectionMedium, Device, DeviceKind, PeripheralError, PrinterCommandBuilder,
    ReceiptPayload, ScaleConfig, ScaleProtocol, WeightReading,
};

use super::{ConnectTarget, EventSink, TransportBackend, TransportEvent};
use crate::config::{BluetoothSettings, PrinterSettings, SimulationSettings};
use crate::decoder::ScaleDecoder;
use crate::printer::EscPosEncoder;
use crate::serial::{FrameBuffer, PortInfo};

/// Serial plugin of the native runtime. Ports are addressed by id.
#[async_trait]
pub trait SerialPlugin: Send + Sync {
    async fn list(&self) -> Result<Vec<PortInfo>, PeripheralError>;
    async fn open(&self, port_id: &str, framing: &ScaleConfig) -> Result<(), PeripheralError>;
    async fn write(&self, port_id: &str, bytes: &[u8]) -> Result<(), PeripheralError>;
    /// Bytes received since the last call, waiting up to `wait` for any.
    async fn read(&self, port_id: &str, wait: Duration) -> Result<Vec<u8>, PeripheralError>;
    async fn close(&self, port_id: &str) -> Result<(), PeripheralError>;
}

/// Bluetooth LE plugin of the native runtime.
#[async_trait]
pub trait BluetoothPlugin: Send + Sync {
    async fn scan(&self, duration: Duration) -> Result<Vec<PortInfo>, PeripheralError>;
    async fn connect(&self, device_id: &str) -> Result<(), PeripheralError>;
    async fn write(&self, device_id: &str, bytes: &[u8]) -> Result<(), PeripheralError>;
    async fn read(&self, device_id: &str, wait: Duration) -> Result<Vec<u8>, PeripheralError>;
    async fn disconnect(&self, device_id: &str) -> Result<(), PeripheralError>;
}

/// Plugins are optional parts of a deployment; ask on every call.
pub trait PluginHost: Send + Sync {
    fn serial(&self) -> Option<Arc<dyn SerialPlugin>>;
    fn bluetooth(&self) -> Option<Arc<dyn BluetoothPlugin>>;
}

const SIM_PRINTER_ID: &str = "sim-printer-1";
const SIM_SCALE_ID: &str = "sim-scale-1";
const READ_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Serial,
    Bluetooth,
    Simulated,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    route: Route,
    kind: DeviceKind,
    protocol: ScaleProtocol,
}

/// Delegates to native plugins, or simulates devices when none is present.
pub struct NativeBridgeBackend {
    plugins: Arc<dyn PluginHost>,
    decoder: ScaleDecoder,
    builder: PrinterCommandBuilder,
    printer_settings: PrinterSettings,
    simulation: SimulationSettings,
    bluetooth: BluetoothSettings,
    discovered: StdMutex<HashMap<String, ConnectionMedium>>,
    links: StdMutex<HashMap<String, Link>>,
    reads: AtomicU64,
    events: EventSink,
    receiver: StdMutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
}

impl NativeBridgeBackend {
    pub fn new(
        plugins: Arc<dyn PluginHost>,
        printer_settings: PrinterSettings,
        simulation: SimulationSettings,
        bluetooth: BluetoothSettings,
    ) -> Self {
        let (events, receiver) = EventSink::channel();
        Self {
            plugins,
            decoder: ScaleDecoder::new(),
            builder: PrinterCommandBuilder::new(printer_settings.layout()),
            printer_settings,
            simulation,
            bluetooth,
            discovered: StdMutex::new(HashMap::new()),
            links: StdMutex::new(HashMap::new()),
            reads: AtomicU64::new(0),
            events,
            receiver: StdMutex::new(Some(receiver)),
        }
    }

    fn links(&self) -> MutexGuard<'_, HashMap<String, Link>> {
        self.links.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn link(&self, device_id: &str, kind: DeviceKind) -> Result<Link, PeripheralError> {
        self.links()
            .get(device_id)
            .filter(|l| l.kind == kind)
            .copied()
            .ok_or_else(|| PeripheralError::NotConnected(device_id.to_string()))
    }

    fn simulated_catalogue() -> Vec<Device> {
        vec![
            Device::new(SIM_PRINTER_ID, "Impressora Simulada", DeviceKind::Printer, ConnectionMedium::Bluetooth)
                .simulated(),
            Device::new(SIM_SCALE_ID, "Balança Simulada", DeviceKind::Scale, ConnectionMedium::Usb)
                .with_protocol(ScaleProtocol::Toledo)
                .simulated(),
        ]
    }

    fn medium_of(&self, device_id: &str) -> ConnectionMedium {
        self.discovered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(device_id)
            .copied()
            .unwrap_or_else(|| ConnectionMedium::from_port_id(device_id))
    }

    fn route_for(&self, device_id: &str) -> Route {
        if device_id.starts_with("sim-") {
            return Route::Simulated;
        }
        let serial = self.plugins.serial().is_some();
        let ble = self.plugins.bluetooth().is_some();
        match self.medium_of(device_id) {
            ConnectionMedium::Bluetooth if ble => Route::Bluetooth,
            _ if serial => Route::Serial,
            _ if ble => Route::Bluetooth,
            _ => Route::Simulated,
        }
    }

    fn serial_plugin(&self) -> Result<Arc<dyn SerialPlugin>, PeripheralError> {
        self.plugins
            .serial()
            .ok_or_else(|| PeripheralError::CapabilityUnavailable("serial plugin not present".to_string()))
    }

    fn bluetooth_plugin(&self) -> Result<Arc<dyn BluetoothPlugin>, PeripheralError> {
        self.plugins
            .bluetooth()
            .ok_or_else(|| PeripheralError::CapabilityUnavailable("bluetooth plugin not present".to_string()))
    }

    /// A Toledo-style frame with a random weight, run through the decoder.
    fn simulated_reading(&self) -> Result<WeightReading, PeripheralError> {
        let (min, max) = (self.simulation.min_weight, self.simulation.max_weight.max(self.simulation.min_weight));
        let value: f64 = rand::rng().random_range(min..=max);
        let frame = format!("ST,GS,{:.3}kg", (value * 1000.0).round() / 1000.0);
        self.decoder
            .decode_str(&frame, ScaleProtocol::Toledo)
            .ok_or(PeripheralError::MalformedData(frame))
    }

    async fn poll(&self, route: Route, device_id: &str, wait: Duration) -> Result<Vec<u8>, PeripheralError> {
        match route {
            Route::Serial => self.serial_plugin()?.read(device_id, wait).await,
            Route::Bluetooth => self.bluetooth_plugin()?.read(device_id, wait).await,
            Route::Simulated => Ok(Vec::new()),
        }
    }

    async fn send(&self, route: Route, device_id: &str, bytes: &[u8]) -> Result<(), PeripheralError> {
        match route {
            Route::Serial => self.serial_plugin()?.write(device_id, bytes).await,
            Route::Bluetooth => {
                let plugin = self.bluetooth_plugin()?;
                for chunk in bytes.chunks(self.bluetooth.write_chunk.max(1)) {
                    plugin.write(device_id, chunk).await?;
                }
                Ok(())
            }
            Route::Simulated => Ok(()),
        }
    }

    /// Transport under a device failed: forget it and report the loss.
    fn drop_link(&self, device_id: &str, reason: &str) {
        if self.links().remove(device_id).is_some() {
            tracing::warn!(device_id = %device_id, reason = %reason, "Native link lost");
            self.events.lost(device_id, reason);
        }
    }

    async fn read_device(
        &self,
        device_id: &str,
        link: Link,
        ticket: u64,
        timeout: Duration,
    ) -> Result<WeightReading, PeripheralError> {
        let deadline = Instant::now() + timeout;
        if let Err(e) = self.send(link.route, device_id, link.protocol.request_command()).await {
            self.drop_link(device_id, &e.to_string());
            return Err(e);
        }

        let mut frames = FrameBuffer::new();
        let mut unmatched: Option<String> = None;
        loop {
            if self.reads.load(Ordering::SeqCst) != ticket {
                return Err(PeripheralError::Preempted);
            }
            if !self.links().contains_key(device_id) {
                return Err(PeripheralError::Disconnected);
            }
            let now = Instant::now();
            if now >= deadline {
                if unmatched.is_none() && !frames.pending().is_empty() {
                    unmatched = Some(String::from_utf8_lossy(frames.pending()).trim().to_string());
                }
                return Err(match unmatched {
                    Some(raw) => PeripheralError::MalformedData(raw),
                    None => PeripheralError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    },
                });
            }

            let wait = READ_POLL.min(deadline - now);
            let bytes = match self.poll(link.route, device_id, wait).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.drop_link(device_id, &e.to_string());
                    return Err(e);
                }
            };
            let Some(complete) = frames.push(&bytes) else {
                continue;
            };
            match self.decoder.decode(&complete, link.protocol) {
                Some(reading) => return Ok(reading),
                None => {
                    let raw = String::from_utf8_lossy(&complete).trim().to_string();
                    tracing::debug!(device_id = %device_id, raw = %raw, "Ignoring unrecognized scale data");
                    unmatched = Some(raw);
                }
            }
        }
    }
}

#[async_trait]
impl TransportBackend for NativeBridgeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NativeBridge
    }

    async fn scan(&self) -> Result<Vec<Device>, PeripheralError> {
        let serial = self.plugins.serial();
        let ble = self.plugins.bluetooth();
        if serial.is_none() && ble.is_none() {
            tracing::info!("No native plugins present, listing simulated devices");
            return Ok(Self::simulated_catalogue());
        }

        let mut ports = Vec::new();
        if let Some(serial) = serial {
            ports.extend(serial.list().await?);
        }
        if let Some(ble) = ble {
            match ble.scan(Duration::from_millis(self.bluetooth.scan_ms)).await {
                Ok(found) => ports.extend(found.into_iter().map(|mut p| {
                    p.medium = ConnectionMedium::Bluetooth;
                    p
                })),
                Err(e) => tracing::warn!(error = %e, "Bluetooth scan failed"),
            }
        }

        let mut discovered = self.discovered.lock().unwrap_or_else(|e| e.into_inner());
        for port in &ports {
            discovered.insert(port.id.clone(), port.medium);
        }
        Ok(ports.iter().map(PortInfo::to_discovered).collect())
    }

    async fn connect(&self, target: &ConnectTarget) -> Result<Device, PeripheralError> {
        if self.links().contains_key(&target.device_id) {
            return Err(PeripheralError::AlreadyConnected {
                kind: target.kind,
                device_id: target.device_id.clone(),
            });
        }

        let route = self.route_for(&target.device_id);
        let protocol = target.protocol.unwrap_or_default();
        let mut device = PortInfo::new(
            target.device_id.clone(),
            target.device_id.clone(),
            self.medium_of(&target.device_id),
        )
        .to_device(target.kind);

        match route {
            Route::Simulated => {
                tokio::time::sleep(self.simulation.latency()).await;
                if let Some(known) = Self::simulated_catalogue()
                    .into_iter()
                    .find(|d| d.id == target.device_id)
                {
                    device.name = known.name;
                    device.connection_medium = known.connection_medium;
                }
                device = device.simulated();
            }
            Route::Serial => {
                let framing = match target.kind {
                    DeviceKind::Scale => ScaleConfig::for_protocol(protocol),
                    DeviceKind::Printer => {
                        ScaleConfig::new(self.printer_settings.baud_rate, 8, 1, Parity::None)
                    }
                };
                self.serial_plugin()?.open(&target.device_id, &framing).await?;
            }
            Route::Bluetooth => {
                self.bluetooth_plugin()?.connect(&target.device_id).await?;
                device.connection_medium = ConnectionMedium::Bluetooth;
            }
        }

        if target.kind == DeviceKind::Scale {
            device = device.with_protocol(protocol);
        }
        self.links().insert(
            target.device_id.clone(),
            Link {
                route,
                kind: target.kind,
                protocol,
            },
        );
        tracing::debug!(device_id = %target.device_id, route = ?route, "Native device connected");
        Ok(device)
    }

    async fn disconnect(&self, device_id: &str, _kind: DeviceKind) -> Result<(), PeripheralError> {
        let Some(link) = self.links().remove(device_id) else {
            return Ok(());
        };
        match link.route {
            Route::Simulated => {
                tokio::time::sleep(self.simulation.latency()).await;
                Ok(())
            }
            Route::Serial => self.serial_plugin()?.close(device_id).await,
            Route::Bluetooth => self.bluetooth_plugin()?.disconnect(device_id).await,
        }
    }

    async fn read_weight(&self, device_id: &str, timeout: Duration) -> Result<WeightReading, PeripheralError> {
        let link = self.link(device_id, DeviceKind::Scale)?;
        // Last request wins: a newer ticket makes older loops give up
        let ticket = self.reads.fetch_add(1, Ordering::SeqCst) + 1;

        if link.route == Route::Simulated {
            let latency = self.simulation.latency();
            if latency > timeout {
                tokio::time::sleep(timeout).await;
                return Err(PeripheralError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(latency).await;
            if self.reads.load(Ordering::SeqCst) != ticket {
                return Err(PeripheralError::Preempted);
            }
            if !self.links().contains_key(device_id) {
                return Err(PeripheralError::Disconnected);
            }
            return self.simulated_reading();
        }

        self.read_device(device_id, link, ticket, timeout).await
    }

    async fn print(&self, device_id: &str, payload: &ReceiptPayload) -> Result<(), PeripheralError> {
        let link = self.link(device_id, DeviceKind::Printer)?;
        let directives = self.builder.build(payload);

        if link.route == Route::Simulated {
            tokio::time::sleep(self.simulation.latency()).await;
            let lines = PrinterCommandBuilder::rendered_lines(&directives, self.printer_settings.columns);
            tracing::info!(device_id = %device_id, lines = lines.len(), "Simulated receipt printed");
            for line in lines {
                tracing::debug!(device_id = %device_id, "{}", line);
            }
            return Ok(());
        }

        let bytes = EscPosEncoder::encode(&directives, self.printer_settings.columns);
        if let Err(e) = self.send(link.route, device_id, &bytes).await {
            self.drop_link(device_id, &e.to_string());
            return Err(PeripheralError::PrintFailed(e.to_string()));
        }
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.receiver.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}
