//! Serial port plumbing shared by the in-page backend and the privileged host.

mod framing;
mod memory;
mod pending;
mod scale_stream;
mod system;

pub use framing::{FrameBuffer, MAX_FRAME};
pub use memory::MemoryPortProvider;
pub use pending::{PendingSlot, ResolveOn};
pub use scale_stream::ScaleStream;
pub use system::SystemPortProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use domain::{ConnectionMedium, Device, DeviceKind, PeripheralError, ScaleConfig};

/// Anything that reads and writes bytes like a serial port.
pub trait SerialIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> SerialIo for T {}

/// An open port handle. Owned by exactly one backend at a time.
pub type SerialLink = Box<dyn SerialIo>;

/// A port the host can see, before anything is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortInfo {
    pub id: String,
    pub name: String,
    pub medium: ConnectionMedium,
}

impl PortInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, medium: ConnectionMedium) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            medium,
        }
    }

    pub fn from_id(id: &str) -> Self {
        Self::new(id, id, ConnectionMedium::from_port_id(id))
    }

    pub fn to_device(&self, kind: DeviceKind) -> Device {
        Device::new(self.id.clone(), self.name.clone(), kind, self.medium)
    }

    /// Ports carry no kind; scale vendors usually show up in the product
    /// string, anything else is listed as a printer. `connect` decides.
    pub fn guess_kind(&self) -> DeviceKind {
        let name = self.name.to_ascii_lowercase();
        if ["scale", "balan", "toledo", "filizola", "urano", "prix"]
            .iter()
            .any(|hint| name.contains(hint))
        {
            DeviceKind::Scale
        } else {
            DeviceKind::Printer
        }
    }

    pub fn to_discovered(&self) -> Device {
        self.to_device(self.guess_kind())
    }
}

/// Source of port handles.
///
/// `ScaleConfig` is the serial framing for any port, printers included.
#[async_trait]
pub trait PortProvider: Send + Sync {
    async fn list_ports(&self) -> Result<Vec<PortInfo>, PeripheralError>;

    async fn open(&self, port_id: &str, framing: &ScaleConfig) -> Result<SerialLink, PeripheralError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_kind_guess() {
        let port = PortInfo::new("/dev/ttyUSB0", "Toledo Prix 4 Uno", ConnectionMedium::Usb);
        assert_eq!(port.to_discovered().kind, DeviceKind::Scale);

        let port = PortInfo::new("COM3", "USB Printing Support", ConnectionMedium::Usb);
        assert_eq!(port.to_discovered().kind, DeviceKind::Printer);
    }

    #[test]
    fn test_port_from_id_infers_medium() {
        assert_eq!(PortInfo::from_id("tcp://10.0.0.5:9100").medium, ConnectionMedium::Wifi);
        assert_eq!(PortInfo::from_id("/dev/rfcomm0").medium, ConnectionMedium::Bluetooth);
        assert_eq!(PortInfo::from_id("COM4").medium, ConnectionMedium::Usb);
    }
}
