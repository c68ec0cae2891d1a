use std::sync::{Arc, Mutex};
use std::time::Duration;

use application::{HostEnvironment, PeripheralService};
use async_trait::async_trait;
use domain::{
    BackendKind, ConnectionMedium, Device, DeviceKind, DeviceStatus, FailureReason,
    PeripheralError, ReceiptItem, ReceiptPayload, ScaleProtocol, WeightReading, WeightUnit,
};
use infrastructure::config::{BackendPreference, ScaleSettings};
use infrastructure::{
    BluetoothPlugin, ConnectTarget, EventSink, MemoryPortProvider, PeripheralConfig, PluginHost,
    PortInfo, SerialPlugin, TransportBackend, TransportEvent,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

/// Backend whose answers are set by the test.
struct ScriptedBackend {
    devices: Vec<Device>,
    connect_error: Mutex<Option<PeripheralError>>,
    read: Mutex<Option<Result<WeightReading, PeripheralError>>>,
    print_error: Mutex<Option<PeripheralError>>,
    disconnect_error: Mutex<Option<PeripheralError>>,
    printed: Mutex<Vec<String>>,
    connects: Mutex<Vec<ConnectTarget>>,
    events: EventSink,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
}

impl ScriptedBackend {
    fn new() -> Arc<Self> {
        let (events, receiver) = EventSink::channel();
        Arc::new(Self {
            devices: vec![
                Device::new("COM3", "EPSON TM-T20", DeviceKind::Printer, ConnectionMedium::Usb),
                Device::new("COM4", "Balança Toledo", DeviceKind::Scale, ConnectionMedium::Usb),
            ],
            connect_error: Mutex::new(None),
            read: Mutex::new(None),
            print_error: Mutex::new(None),
            disconnect_error: Mutex::new(None),
            printed: Mutex::new(Vec::new()),
            connects: Mutex::new(Vec::new()),
            events,
            receiver: Mutex::new(Some(receiver)),
        })
    }

    fn answer_read(&self, result: Result<WeightReading, PeripheralError>) {
        *self.read.lock().unwrap() = Some(result);
    }
}

#[async_trait]
impl TransportBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::InPage
    }

    async fn scan(&self) -> Result<Vec<Device>, PeripheralError> {
        Ok(self.devices.clone())
    }

    async fn connect(&self, target: &ConnectTarget) -> Result<Device, PeripheralError> {
        self.connects.lock().unwrap().push(target.clone());
        if let Some(e) = self.connect_error.lock().unwrap().take() {
            return Err(e);
        }
        let mut device = Device::from_id(&target.device_id, target.kind);
        device.name = format!("{} on {}", target.kind, target.device_id);
        Ok(device)
    }

    async fn disconnect(&self, _device_id: &str, _kind: DeviceKind) -> Result<(), PeripheralError> {
        match self.disconnect_error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn read_weight(&self, _device_id: &str, timeout: Duration) -> Result<WeightReading, PeripheralError> {
        let scripted = self.read.lock().unwrap().take();
        match scripted {
            Some(result) => result,
            None => {
                tokio::time::sleep(timeout).await;
                Err(PeripheralError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn print(&self, _device_id: &str, payload: &ReceiptPayload) -> Result<(), PeripheralError> {
        if let Some(e) = self.print_error.lock().unwrap().take() {
            return Err(e);
        }
        self.printed.lock().unwrap().push(payload.order_number.clone());
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.receiver.lock().unwrap().take()
    }
}

fn service(backend: &Arc<ScriptedBackend>) -> PeripheralService {
    PeripheralService::new(backend.clone(), &ScaleSettings::default())
}

fn payload(order: &str) -> ReceiptPayload {
    ReceiptPayload {
        order_number: order.to_string(),
        customer_name: "Maria".to_string(),
        customer_phone: None,
        items: vec![ReceiptItem::new(2.0, "Coxinha", 12.0)],
        total: 12.0,
    }
}

#[tokio::test]
async fn scan_registers_devices_as_disconnected() {
    let backend = ScriptedBackend::new();
    let service = service(&backend);

    let result = service.scan().await;
    assert!(result.success);
    assert_eq!(result.devices.len(), 2);
    assert_eq!(service.devices().len(), 2);
    assert_eq!(service.status("COM4"), DeviceStatus::Disconnected);
}

#[tokio::test]
async fn second_scale_is_rejected_while_first_is_connected() {
    let backend = ScriptedBackend::new();
    let service = service(&backend);

    assert!(service.connect_scale("COM4", ScaleProtocol::Toledo).await.success);

    let second = service.connect_scale("COM5", ScaleProtocol::Toledo).await;
    assert!(!second.success);
    assert!(second.message.contains("already connected"));
    assert_eq!(second.reason, Some(FailureReason::AlreadyConnected));
    assert_eq!(service.status("COM4"), DeviceStatus::Connected);
    assert_eq!(backend.connects.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn same_scale_twice_is_rejected() {
    let backend = ScriptedBackend::new();
    let service = service(&backend);

    assert!(service.connect("COM4", DeviceKind::Scale).await.success);
    let again = service.connect("COM4", DeviceKind::Scale).await;
    assert!(!again.success);
    assert!(again.message.contains("already connected"));
    assert_eq!(service.status("COM4"), DeviceStatus::Connected);
}

#[tokio::test]
async fn printer_and_scale_connect_independently() {
    let backend = ScriptedBackend::new();
    let service = service(&backend);

    assert!(service.connect("COM3", DeviceKind::Printer).await.success);
    assert!(service.connect("COM4", DeviceKind::Scale).await.success);
    assert_eq!(service.active(DeviceKind::Printer).unwrap().id, "COM3");
    assert_eq!(service.active(DeviceKind::Scale).unwrap().id, "COM4");

    let targets = backend.connects.lock().unwrap().clone();
    assert_eq!(targets[0].protocol, None);
    assert_eq!(targets[1].protocol, Some(ScaleProtocol::Generic));
}

#[tokio::test]
async fn failed_connect_frees_the_slot() {
    let backend = ScriptedBackend::new();
    let service = service(&backend);
    *backend.connect_error.lock().unwrap() = Some(PeripheralError::Transport("port busy".to_string()));

    let result = service.connect("COM4", DeviceKind::Scale).await;
    assert!(!result.success);
    assert_eq!(result.reason, Some(FailureReason::Transport));
    assert_eq!(service.status("COM4"), DeviceStatus::Disconnected);
    assert!(service.active(DeviceKind::Scale).is_none());

    assert!(service.connect("COM4", DeviceKind::Scale).await.success);
}

#[tokio::test]
async fn disconnect_then_reconnect() {
    let backend = ScriptedBackend::new();
    let service = service(&backend);
    service.connect("COM4", DeviceKind::Scale).await;

    let result = service.disconnect("COM4").await;
    assert!(result.success);
    assert_eq!(service.status("COM4"), DeviceStatus::Disconnected);
    assert!(service.connect("COM4", DeviceKind::Scale).await.success);
}

#[tokio::test]
async fn disconnect_unknown_device_fails() {
    let backend = ScriptedBackend::new();
    let service = service(&backend);

    let result = service.disconnect("COM9").await;
    assert!(!result.success);
    assert_eq!(result.reason, Some(FailureReason::UnknownDevice));
}

#[tokio::test]
async fn disconnect_succeeds_even_when_release_fails() {
    let backend = ScriptedBackend::new();
    let service = service(&backend);
    service.connect("COM4", DeviceKind::Scale).await;
    *backend.disconnect_error.lock().unwrap() = Some(PeripheralError::Transport("close failed".to_string()));

    let result = service.disconnect("COM4").await;
    assert!(result.success);
    assert!(result.message.contains("close failed"));
    assert!(service.active(DeviceKind::Scale).is_none());
}

#[tokio::test]
async fn read_weight_records_last_reading() {
    let backend = ScriptedBackend::new();
    let service = service(&backend);
    service.connect("COM4", DeviceKind::Scale).await;
    backend.answer_read(Ok(WeightReading::new(1.25, WeightUnit::Kg, true)));

    let result = service.read_weight("COM4", 2000).await;
    assert!(result.success);
    assert_eq!(result.weight(), Some(1.25));
    assert_eq!(service.last_reading("COM4").unwrap().weight, 1.25);
}

#[tokio::test]
async fn unstable_reading_is_still_returned() {
    let backend = ScriptedBackend::new();
    let service = service(&backend);
    service.connect("COM4", DeviceKind::Scale).await;
    backend.answer_read(Ok(WeightReading::new(0.5, WeightUnit::Kg, false)));

    let result = service.read_weight("COM4", 2000).await;
    assert!(result.success);
    assert!(!result.reading.unwrap().stable);
}

#[tokio::test]
async fn read_weight_requires_connected_scale() {
    let backend = ScriptedBackend::new();
    let service = service(&backend);

    let result = service.read_weight("COM4", 1000).await;
    assert_eq!(result.reason, Some(FailureReason::UnknownDevice));

    service.connect("COM3", DeviceKind::Printer).await;
    let result = service.read_weight("COM3", 1000).await;
    assert_eq!(result.reason, Some(FailureReason::WrongKind));

    let result = service.print("COM4", &payload("1")).await;
    assert_eq!(result.reason, Some(FailureReason::UnknownDevice));
}

#[tokio::test(start_paused = true)]
async fn read_weight_times_out_within_the_requested_bound() {
    let backend = ScriptedBackend::new();
    let service = service(&backend);
    service.connect("COM4", DeviceKind::Scale).await;

    for timeout_ms in [1000u64, 2000, 5000] {
        let started = tokio::time::Instant::now();
        let result = service.read_weight("COM4", timeout_ms).await;
        assert!(!result.success);
        assert_eq!(result.reason, Some(FailureReason::Timeout));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(timeout_ms));
        assert!(elapsed < Duration::from_millis(timeout_ms + 1000));
        assert_eq!(service.status("COM4"), DeviceStatus::Connected);
    }
}

#[tokio::test(start_paused = true)]
async fn zero_timeout_uses_configured_default() {
    let backend = ScriptedBackend::new();
    let service = service(&backend);
    service.connect("COM4", DeviceKind::Scale).await;

    let started = tokio::time::Instant::now();
    let result = service.read_weight("COM4", 0).await;
    assert_eq!(result.reason, Some(FailureReason::Timeout));
    let elapsed = started.elapsed();
    assert!(elapsed >= ScaleSettings::default().read_timeout());
    assert!(elapsed < ScaleSettings::default().read_timeout() + Duration::from_millis(1000));
}

#[tokio::test]
async fn disconnected_read_marks_device_lost() {
    let backend = ScriptedBackend::new();
    let service = service(&backend);
    service.connect("COM4", DeviceKind::Scale).await;
    backend.answer_read(Err(PeripheralError::Disconnected));

    let result = service.read_weight("COM4", 1000).await;
    assert_eq!(result.reason, Some(FailureReason::Disconnected));
    assert_eq!(service.status("COM4"), DeviceStatus::Disconnected);
    assert!(service.connect("COM4", DeviceKind::Scale).await.success);
}

#[tokio::test]
async fn malformed_read_keeps_connection() {
    let backend = ScriptedBackend::new();
    let service = service(&backend);
    service.connect("COM4", DeviceKind::Scale).await;
    backend.answer_read(Err(PeripheralError::MalformedData("@@##".to_string())));

    let result = service.read_weight("COM4", 1000).await;
    assert_eq!(result.reason, Some(FailureReason::MalformedData));
    assert_eq!(service.status("COM4"), DeviceStatus::Connected);
}

#[tokio::test]
async fn print_reports_order_number() {
    let backend = ScriptedBackend::new();
    let service = service(&backend);
    service.connect("COM3", DeviceKind::Printer).await;

    let result = service.print("COM3", &payload("42")).await;
    assert!(result.success);
    assert!(result.message.contains("42"));
    assert_eq!(*backend.printed.lock().unwrap(), vec!["42".to_string()]);

    *backend.print_error.lock().unwrap() = Some(PeripheralError::PrintFailed("paper out".to_string()));
    let result = service.print("COM3", &payload("43")).await;
    assert_eq!(result.reason, Some(FailureReason::PrintFailed));
    assert_eq!(service.status("COM3"), DeviceStatus::Connected);
}

#[tokio::test]
async fn backend_events_are_applied_before_the_next_call() {
    let backend = ScriptedBackend::new();
    let service = service(&backend);
    service.connect("COM4", DeviceKind::Scale).await;

    backend.events.reading("COM4", WeightReading::new(2.0, WeightUnit::Kg, true));
    assert_eq!(service.last_reading("COM4").unwrap().weight, 2.0);

    backend.events.lost("COM4", "cable unplugged");
    assert_eq!(service.status("COM4"), DeviceStatus::Disconnected);
    assert!(service.last_reading("COM4").is_none());
}

#[tokio::test]
async fn in_page_round_trip_through_memory_ports() {
    let ports = Arc::new(MemoryPortProvider::new());
    ports.add_port(PortInfo::new("COM4", "Balança Toledo", ConnectionMedium::Usb));
    let env = HostEnvironment::new(ports.clone());
    env.activation.grant();
    let service = env.into_service(&PeripheralConfig::default()).unwrap();
    assert_eq!(service.backend_kind(), BackendKind::InPage);

    assert!(service.connect_scale("COM4", ScaleProtocol::Toledo).await.success);
    let mut remote = ports.take_remote("COM4").unwrap();

    let scale = tokio::spawn(async move {
        let mut request = [0u8; 1];
        remote.read_exact(&mut request).await.unwrap();
        assert_eq!(request[0], 0x05);
        remote.write_all(b"ST,GS,+00001.500kg\r\n").await.unwrap();
        remote
    });

    let result = service.read_weight("COM4", 2000).await;
    assert!(result.success, "{:?}", result.message);
    assert_eq!(result.weight(), Some(1.5));
    let remote = scale.await.unwrap();

    drop(remote);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(service.status("COM4"), DeviceStatus::Disconnected);
}

#[tokio::test]
async fn in_page_connect_without_gesture_fails() {
    let ports = Arc::new(MemoryPortProvider::new());
    ports.add_port(PortInfo::new("COM4", "Balança Toledo", ConnectionMedium::Usb));
    let service = HostEnvironment::new(ports)
        .into_service(&PeripheralConfig::default())
        .unwrap();

    let result = service.connect("COM4", DeviceKind::Scale).await;
    assert_eq!(result.reason, Some(FailureReason::GestureRequired));
    assert!(service.active(DeviceKind::Scale).is_none());
}

struct NoPlugins;

impl PluginHost for NoPlugins {
    fn serial(&self) -> Option<Arc<dyn SerialPlugin>> {
        None
    }

    fn bluetooth(&self) -> Option<Arc<dyn BluetoothPlugin>> {
        None
    }
}

#[tokio::test(start_paused = true)]
async fn native_bridge_simulates_devices_without_plugins() {
    let env = HostEnvironment::new(Arc::new(MemoryPortProvider::new())).with_plugins(Arc::new(NoPlugins));
    let service = env.into_service(&PeripheralConfig::default()).unwrap();
    assert_eq!(service.backend_kind(), BackendKind::NativeBridge);

    let scan = service.scan().await;
    assert!(scan.devices.iter().all(|d| d.simulated));

    assert!(service.connect("sim-scale-1", DeviceKind::Scale).await.success);
    let result = service.read_weight("sim-scale-1", 3000).await;
    let weight = result.weight().unwrap();
    assert!((0.05..=5.0).contains(&weight));

    assert!(service.connect("sim-printer-1", DeviceKind::Printer).await.success);
    assert!(service.print("sim-printer-1", &payload("7")).await.success);
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_connect_releases_the_port() {
    let env = HostEnvironment::new(Arc::new(MemoryPortProvider::new())).with_plugins(Arc::new(NoPlugins));
    let service = Arc::new(env.into_service(&PeripheralConfig::default()).unwrap());

    let connecting = {
        let service = service.clone();
        tokio::spawn(async move { service.connect("sim-scale-1", DeviceKind::Scale).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(service.status("sim-scale-1"), DeviceStatus::Connecting);
    assert!(service.disconnect("sim-scale-1").await.success);

    let abandoned = connecting.await.unwrap();
    assert!(!abandoned.success);
    assert_eq!(abandoned.reason, Some(FailureReason::Disconnected));
    assert_eq!(service.status("sim-scale-1"), DeviceStatus::Disconnected);

    assert!(service.connect("sim-scale-1", DeviceKind::Scale).await.success);
    assert!(service.read_weight("sim-scale-1", 2000).await.success);
    assert!(service.disconnect("sim-scale-1").await.success);
}

#[test]
fn backend_selection_follows_capabilities() {
    let env = HostEnvironment::new(Arc::new(MemoryPortProvider::new()));
    assert_eq!(env.select(BackendPreference::Auto).unwrap(), BackendKind::InPage);

    let err = env.select(BackendPreference::NativeBridge).unwrap_err();
    assert_eq!(err.reason(), FailureReason::CapabilityUnavailable);
    assert!(env.select(BackendPreference::DesktopShell).is_err());

    let env = env.with_plugins(Arc::new(NoPlugins));
    assert_eq!(env.select(BackendPreference::Auto).unwrap(), BackendKind::NativeBridge);
    assert_eq!(env.select(BackendPreference::InPage).unwrap(), BackendKind::InPage);
}
