use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use domain::{
    BackendKind, ConnectionRegistry, Device, DeviceKind, DeviceStatus, FailureReason,
    OperationResult, PeripheralError, ReceiptPayload, ScaleProtocol, ScanResult, WeightReading,
    WeightResult,
};
use infrastructure::config::ScaleSettings;
use infrastructure::{ConnectTarget, TransportBackend, TransportEvent};

/// Slack on top of a read's own timeout before the service gives up on the backend.
const READ_GRACE: Duration = Duration::from_millis(1000);

/// Uniform peripheral API over whichever backend the host supports.
///
/// Routes every call to the backend and keeps the registry in step with
/// what the backend reports. Never panics and never returns a bare error:
/// every outcome is a result object.
pub struct PeripheralService {
    backend: Arc<dyn TransportBackend>,
    registry: ConnectionRegistry,
    events: Mutex<Option<UnboundedReceiver<TransportEvent>>>,
    default_protocol: ScaleProtocol,
    default_timeout: Duration,
}

impl PeripheralService {
    pub fn new(backend: Arc<dyn TransportBackend>, scale: &ScaleSettings) -> Self {
        let events = backend.take_events();
        info!(backend = %backend.kind(), "Peripheral backend selected");
        Self {
            backend,
            registry: ConnectionRegistry::new(),
            events: Mutex::new(events),
            default_protocol: scale.default_protocol,
            default_timeout: scale.read_timeout(),
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Apply what the backend noticed since the last call.
    fn reconcile(&self) {
        let mut guard = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let Some(events) = guard.as_mut() else {
            return;
        };
        while let Ok(event) = events.try_recv() {
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

    pub async fn scan(&self) -> ScanResult {
        self.reconcile();
        let result = self.backend.scan().await;
        match &result {
            Ok(devices) => {
                debug!(count = devices.len(), "Scan complete");
                self.registry.record_discovered(devices);
            }
            Err(e) => warn!(error = %e, "Scan failed"),
        }
        ScanResult::from(result)
    }

    /// Connect with the configured default protocol for scales.
    pub async fn connect(&self, device_id: &str, kind: DeviceKind) -> OperationResult {
        let protocol = match kind {
            DeviceKind::Scale => Some(self.default_protocol),
            DeviceKind::Printer => None,
        };
        self.connect_with(device_id, kind, protocol).await
    }

    pub async fn connect_scale(&self, device_id: &str, protocol: ScaleProtocol) -> OperationResult {
        self.connect_with(device_id, DeviceKind::Scale, Some(protocol)).await
    }

    async fn connect_with(
        &self,
        device_id: &str,
        kind: DeviceKind,
        protocol: Option<ScaleProtocol>,
    ) -> OperationResult {
        self.reconcile();

        let mut device = self
            .registry
            .get(device_id)
            .unwrap_or_else(|| Device::from_id(device_id, kind));
        device.kind = kind;
        device.protocol = None;
        if let Some(protocol) = protocol {
            device = device.with_protocol(protocol);
        }

        let pending = match self.registry.begin_connect(device) {
            Ok(pending) => pending,
            Err(e) => {
                warn!(device_id = %device_id, kind = %kind, error = %e, "Connect rejected");
                return OperationResult::failed(&e);
            }
        };

        let target = ConnectTarget {
            device_id: device_id.to_string(),
            kind,
            protocol,
        };
        match self.backend.connect(&target).await {
            Ok(mut confirmed) => {
                confirmed.id = pending.id.clone();
                confirmed.kind = kind;
                match self.registry.complete_connect(confirmed) {
                    Ok(device) => OperationResult::ok(format!("{} connected: {}", kind, device.name)),
                    Err(e) => {
                        // Record went away mid-connect; the backend must not keep the handle
                        warn!(device_id = %device_id, kind = %kind, error = %e, "Connect abandoned, releasing port");
                        if let Err(e) = self.backend.disconnect(device_id, kind).await {
                            warn!(device_id = %device_id, error = %e, "Port release failed");
                        }
                        OperationResult::failed(&PeripheralError::Disconnected)
                    }
                }
            }
            Err(e) => {
                self.registry.fail_connect(device_id, &e.to_string());
                OperationResult::failed(&e)
            }
        }
    }

    /// Releases the device. The record is dropped even when the port
    /// fails to close, so a fresh connect can always be attempted.
    pub async fn disconnect(&self, device_id: &str) -> OperationResult {
        self.reconcile();
        let Some(device) = self.registry.get(device_id) else {
            return OperationResult::failed(&PeripheralError::UnknownDevice(device_id.to_string()));
        };

        let released = self.backend.disconnect(device_id, device.kind).await;
        self.registry.release(device_id);
        match released {
            Ok(()) => OperationResult::ok(format!("{} disconnected", device.kind)),
            Err(e) => {
                warn!(device_id = %device_id, error = %e, "Port release failed");
                OperationResult::ok(format!("{} disconnected (release reported: {})", device.kind, e))
            }
        }
    }

    /// One bounded weight request. `timeout_ms == 0` uses the configured default.
    pub async fn read_weight(&self, device_id: &str, timeout_ms: u64) -> WeightResult {
        self.reconcile();
        if let Err(e) = self.require(device_id, DeviceKind::Scale) {
            return WeightResult::failed(&e);
        }

        let timeout = if timeout_ms == 0 {
            self.default_timeout
        } else {
            Duration::from_millis(timeout_ms)
        };
        let result = tokio::time::timeout(timeout + READ_GRACE, self.backend.read_weight(device_id, timeout))
            .await
            .unwrap_or(Err(PeripheralError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }));

        match result {
            Ok(reading) => {
                if !reading.stable {
                    warn!(device_id = %device_id, weight = reading.weight, "Scale reading is not stable");
                }
                self.registry.record_reading(device_id, reading.clone());
                WeightResult::ok(reading)
            }
            Err(e) => {
                self.on_failure(device_id, &e);
                WeightResult::failed(&e)
            }
        }
    }

    pub async fn print(&self, device_id: &str, payload: &ReceiptPayload) -> OperationResult {
        self.reconcile();
        if let Err(e) = self.require(device_id, DeviceKind::Printer) {
            return OperationResult::failed(&e);
        }

        match self.backend.print(device_id, payload).await {
            Ok(()) => {
                info!(device_id = %device_id, order = %payload.order_number, "Receipt printed");
                OperationResult::ok(format!("Order #{} printed", payload.order_number))
            }
            Err(e) => {
                self.on_failure(device_id, &e);
                OperationResult::failed(&e)
            }
        }
    }

    /// Known devices with their status, sorted by id.
    pub fn devices(&self) -> Vec<Device> {
        self.reconcile();
        self.registry.snapshot()
    }

    pub fn status(&self, device_id: &str) -> DeviceStatus {
        self.reconcile();
        self.registry.status(device_id)
    }

    /// Last reading seen for a connected scale, without touching the hardware.
    pub fn last_reading(&self, device_id: &str) -> Option<WeightReading> {
        self.reconcile();
        self.registry.last_reading(device_id)
    }

    pub fn active(&self, kind: DeviceKind) -> Option<Device> {
        self.reconcile();
        self.registry.active(kind)
    }

    fn require(&self, device_id: &str, kind: DeviceKind) -> Result<Device, PeripheralError> {
        let device = self.registry.connected(device_id)?;
        if device.kind != kind {
            return Err(PeripheralError::WrongKind {
                device_id: device_id.to_string(),
                expected: kind,
            });
        }
        Ok(device)
    }

    /// A backend that no longer holds the device means the transport is gone.
    fn on_failure(&self, device_id: &str, error: &PeripheralError) {
        if matches!(
            error.reason(),
            FailureReason::Disconnected | FailureReason::NotConnected
        ) {
            self.registry.mark_lost(device_id, &error.to_string());
        }
    }
}
