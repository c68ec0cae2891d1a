use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::device::{Device, DeviceKind, DeviceStatus};
use crate::error::PeripheralError;
use crate::weight::WeightReading;

#[derive(Debug, Default)]
struct RegistryState {
    devices: HashMap<String, Device>,
    /// kind -> id of the device holding that kind's slot
    active: HashMap<DeviceKind, String>,
    readings: HashMap<String, WeightReading>,
}

/// Owner of device records and their status.
///
/// At most one device per kind is Connecting or Connected. Every status
/// transition goes through this type; backends only report outcomes.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Upsert scan results. Records that hold a slot keep their status.
    pub fn record_discovered(&self, devices: &[Device]) {
        let mut state = self.lock();
        for device in devices {
            let tracked = state
                .devices
                .get(&device.id)
                .is_some_and(|d| d.status.holds_slot());
            if tracked {
                if let Some(existing) = state.devices.get_mut(&device.id) {
                    existing.name = device.name.clone();
                }
                continue;
            }
            let mut record = device.clone();
            record.status = DeviceStatus::Disconnected;
            state.devices.insert(device.id.clone(), record);
        }
    }

    /// Claim the slot for `device.kind` and move the record to Connecting.
    ///
    /// Fails without side effects when the kind is already taken.
    pub fn begin_connect(&self, device: Device) -> Result<Device, PeripheralError> {
        let mut state = self.lock();
        if let Some(holder) = state.active.get(&device.kind) {
            return Err(PeripheralError::AlreadyConnected {
                kind: device.kind,
                device_id: holder.clone(),
            });
        }
        if let Some(existing) = state.devices.get(&device.id).filter(|d| d.status.holds_slot()) {
            return Err(PeripheralError::AlreadyConnected {
                kind: existing.kind,
                device_id: existing.id.clone(),
            });
        }

        let mut record = device;
        record.status = record
            .status
            .to_disconnected()
            .to_connecting()
            .map_err(|e| PeripheralError::Transport(e.to_string()))?;
        state.active.insert(record.kind, record.id.clone());
        state.devices.insert(record.id.clone(), record.clone());
        tracing::debug!(device_id = %record.id, kind = %record.kind, "Device connecting");
        Ok(record)
    }

    /// Connecting -> Connected. `confirmed` carries what the backend learned
    /// about the device (name, medium, simulated flag).
    pub fn complete_connect(&self, confirmed: Device) -> Result<Device, PeripheralError> {
        let mut state = self.lock();
        let record = state
            .devices
            .get_mut(&confirmed.id)
            .ok_or_else(|| PeripheralError::UnknownDevice(confirmed.id.clone()))?;
        let status = record
            .status
            .to_connected()
            .map_err(|e| PeripheralError::Transport(e.to_string()))?;

        record.name = confirmed.name;
        record.connection_medium = confirmed.connection_medium;
        record.simulated = confirmed.simulated;
        if confirmed.protocol.is_some() {
            record.protocol = confirmed.protocol;
        }
        record.status = status;
        tracing::info!(device_id = %record.id, kind = %record.kind, "Device connected");
        Ok(record.clone())
    }

    /// Connecting -> Error -> Disconnected; the record is dropped and the slot freed.
    /// Returns the Error status that was reported.
    pub fn fail_connect(&self, device_id: &str, reason: &str) -> DeviceStatus {
        let mut state = self.lock();
        let Some(record) = state.devices.remove(device_id) else {
            return DeviceStatus::Disconnected;
        };
        // Error is reported once; the record is gone afterwards, i.e. Disconnected
        let reported = record.status.to_error().unwrap_or(DeviceStatus::Error);
        tracing::warn!(device_id = %device_id, kind = %record.kind, status = ?reported, reason = %reason, "Device connection failed");
        if state.active.get(&record.kind).map(String::as_str) == Some(device_id) {
            state.active.remove(&record.kind);
        }
        reported
    }

    /// The record of a connected device, or why it cannot be used.
    pub fn connected(&self, device_id: &str) -> Result<Device, PeripheralError> {
        let state = self.lock();
        let record = state
            .devices
            .get(device_id)
            .ok_or_else(|| PeripheralError::UnknownDevice(device_id.to_string()))?;
        if !record.status.is_connected() {
            return Err(PeripheralError::NotConnected(device_id.to_string()));
        }
        Ok(record.clone())
    }

    /// Connected -> Disconnected on an explicit disconnect. Drops the record.
    pub fn release(&self, device_id: &str) -> Option<Device> {
        let mut state = self.lock();
        let mut record = state.devices.remove(device_id)?;
        record.status = record.status.to_disconnected();
        if state.active.get(&record.kind).map(String::as_str) == Some(device_id) {
            state.active.remove(&record.kind);
        }
        state.readings.remove(device_id);
        tracing::info!(device_id = %device_id, kind = %record.kind, "Device disconnected");
        Some(record)
    }

    /// Connected -> Disconnected after a transport failure.
    pub fn mark_lost(&self, device_id: &str, reason: &str) -> Option<Device> {
        let connected = self
            .lock()
            .devices
            .get(device_id)
            .is_some_and(|d| d.status.is_connected());
        if !connected {
            return None;
        }
        tracing::warn!(device_id = %device_id, reason = %reason, "Transport lost");
        self.release(device_id)
    }

    pub fn record_reading(&self, device_id: &str, reading: WeightReading) {
        let mut state = self.lock();
        if state.devices.get(device_id).is_some_and(|d| d.status.is_connected()) {
            state.readings.insert(device_id.to_string(), reading);
        }
    }

    pub fn last_reading(&self, device_id: &str) -> Option<WeightReading> {
        self.lock().readings.get(device_id).cloned()
    }

    pub fn active(&self, kind: DeviceKind) -> Option<Device> {
        let state = self.lock();
        state
            .active
            .get(&kind)
            .and_then(|id| state.devices.get(id))
            .cloned()
    }

    pub fn get(&self, device_id: &str) -> Option<Device> {
        self.lock().devices.get(device_id).cloned()
    }

    pub fn status(&self, device_id: &str) -> DeviceStatus {
        self.get(device_id)
            .map(|d| d.status)
            .unwrap_or(DeviceStatus::Disconnected)
    }

    /// All known devices, sorted by id.
    pub fn snapshot(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.lock().devices.values().cloned().collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ScaleProtocol;
    use crate::weight::WeightUnit;

    fn scale(id: &str) -> Device {
        Device::from_id(id, DeviceKind::Scale).with_protocol(ScaleProtocol::Toledo)
    }

    fn connect(registry: &ConnectionRegistry, device: Device) -> Device {
        let pending = registry.begin_connect(device).unwrap();
        registry.complete_connect(pending).unwrap()
    }

    #[test]
    fn test_connect_lifecycle() {
        let registry = ConnectionRegistry::new();
        let pending = registry.begin_connect(scale("COM4")).unwrap();
        assert_eq!(pending.status, DeviceStatus::Connecting);
        assert_eq!(registry.status("COM4"), DeviceStatus::Connecting);

        let device = registry.complete_connect(pending).unwrap();
        assert_eq!(device.status, DeviceStatus::Connected);
        assert_eq!(registry.active(DeviceKind::Scale).unwrap().id, "COM4");
        assert!(registry.connected("COM4").is_ok());
    }

    #[test]
    fn test_second_connect_for_kind_fails_without_side_effects() {
        let registry = ConnectionRegistry::new();
        connect(&registry, scale("COM4"));

        let err = registry.begin_connect(scale("COM5")).unwrap_err();
        assert!(matches!(err, PeripheralError::AlreadyConnected { ref device_id, .. } if device_id == "COM4"));
        assert_eq!(registry.status("COM4"), DeviceStatus::Connected);
        assert!(registry.get("COM5").is_none());

        let err = registry.begin_connect(scale("COM4")).unwrap_err();
        assert!(err.to_string().contains("already connected"));
        assert_eq!(registry.status("COM4"), DeviceStatus::Connected);
    }

    #[test]
    fn test_kinds_are_independent() {
        let registry = ConnectionRegistry::new();
        connect(&registry, scale("COM4"));
        connect(&registry, Device::from_id("COM3", DeviceKind::Printer));
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn test_pending_connect_holds_the_slot() {
        let registry = ConnectionRegistry::new();
        registry.begin_connect(scale("COM4")).unwrap();
        assert!(registry.begin_connect(scale("COM5")).is_err());
        assert!(matches!(
            registry.connected("COM4"),
            Err(PeripheralError::NotConnected(_))
        ));
    }

    #[test]
    fn test_failed_connect_reports_error_then_frees_slot() {
        let registry = ConnectionRegistry::new();
        registry.begin_connect(scale("COM4")).unwrap();

        assert_eq!(registry.fail_connect("COM4", "port busy"), DeviceStatus::Error);
        assert!(registry.get("COM4").is_none());
        assert!(registry.active(DeviceKind::Scale).is_none());
        assert!(registry.begin_connect(scale("COM4")).is_ok());
    }

    #[test]
    fn test_release_then_reconnect() {
        let registry = ConnectionRegistry::new();
        connect(&registry, scale("COM4"));
        registry.record_reading("COM4", WeightReading::new(1.0, WeightUnit::Kg, true));

        let released = registry.release("COM4").unwrap();
        assert_eq!(released.status, DeviceStatus::Disconnected);
        assert!(registry.last_reading("COM4").is_none());
        assert!(matches!(
            registry.connected("COM4"),
            Err(PeripheralError::UnknownDevice(_))
        ));

        let device = connect(&registry, scale("COM4"));
        assert!(device.is_connected());
    }

    #[test]
    fn test_mark_lost_only_affects_connected_devices() {
        let registry = ConnectionRegistry::new();
        registry.begin_connect(scale("COM4")).unwrap();
        assert!(registry.mark_lost("COM4", "eof").is_none());
        assert_eq!(registry.status("COM4"), DeviceStatus::Connecting);

        let registry = ConnectionRegistry::new();
        connect(&registry, scale("COM4"));
        assert!(registry.mark_lost("COM4", "eof").is_some());
        assert!(registry.active(DeviceKind::Scale).is_none());
    }

    #[test]
    fn test_discovered_devices_do_not_override_connected_status() {
        let registry = ConnectionRegistry::new();
        connect(&registry, scale("COM4"));

        let mut rescanned = Device::from_id("COM4", DeviceKind::Scale);
        rescanned.name = "USB Serial".to_string();
        registry.record_discovered(&[rescanned, Device::from_id("COM7", DeviceKind::Printer)]);

        let com4 = registry.get("COM4").unwrap();
        assert_eq!(com4.status, DeviceStatus::Connected);
        assert_eq!(com4.name, "USB Serial");
        assert_eq!(registry.status("COM7"), DeviceStatus::Disconnected);
    }

    #[test]
    fn test_readings_are_cached_for_connected_scales_only() {
        let registry = ConnectionRegistry::new();
        registry.record_reading("COM4", WeightReading::new(1.0, WeightUnit::Kg, true));
        assert!(registry.last_reading("COM4").is_none());

        connect(&registry, scale("COM4"));
        registry.record_reading("COM4", WeightReading::new(0.25, WeightUnit::Kg, false));
        assert_eq!(registry.last_reading("COM4").unwrap().weight, 0.25);
    }
}
