use serde::{Deserialize, Serialize};
use std::fmt;

use super::{DeviceStatus, ScaleProtocol};

/// Kind of peripheral. At most one device per kind is connected at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Scale,
    Printer,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scale => "scale",
            Self::Printer => "printer",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical link the device is reached through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMedium {
    Usb,
    Bluetooth,
    Wifi,
}

impl ConnectionMedium {
    /// Best guess from a port identifier when the host gave no metadata.
    pub fn from_port_id(id: &str) -> Self {
        let lower = id.to_ascii_lowercase();
        if lower.starts_with("tcp://") {
            Self::Wifi
        } else if lower.contains("rfcomm") || lower.starts_with("ble:") || lower.contains("bluetooth") {
            Self::Bluetooth
        } else {
            Self::Usb
        }
    }
}

/// Identity and status of a physical peripheral.
///
/// `id` is stable for the lifetime of a connection: a port path, a paired
/// device id or a token generated by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub connection_medium: ConnectionMedium,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ScaleProtocol>,
    #[serde(default)]
    pub status: DeviceStatus,
    /// True for devices fabricated by the native bridge when no plugin is present
    #[serde(default)]
    pub simulated: bool,
}

impl Device {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: DeviceKind, medium: ConnectionMedium) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            connection_medium: medium,
            protocol: None,
            status: DeviceStatus::Disconnected,
            simulated: false,
        }
    }

    /// Record for a device addressed directly by identifier, without a prior scan.
    pub fn from_id(id: &str, kind: DeviceKind) -> Self {
        Self::new(id, id, kind, ConnectionMedium::from_port_id(id))
    }

    pub fn with_protocol(mut self, protocol: ScaleProtocol) -> Self {
        if self.kind == DeviceKind::Scale {
            self.protocol = Some(protocol);
        }
        self
    }

    pub fn simulated(mut self) -> Self {
        self.simulated = true;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }
}
