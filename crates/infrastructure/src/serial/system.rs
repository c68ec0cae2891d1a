use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_serial::{SerialPortBuilderExt, SerialPortType};

use domain::device::{FlowControl, Parity};
use domain::{ConnectionMedium, PeripheralError, ScaleConfig};

use super::{PortInfo, PortProvider, SerialLink};

/// Ports exposed by the operating system, plus `tcp://host:port` network printers.
pub struct SystemPortProvider {
    io_timeout: Duration,
}

impl SystemPortProvider {
    pub fn new() -> Self {
        Self {
            io_timeout: Duration::from_millis(1000),
        }
    }

    pub fn with_timeout(io_timeout: Duration) -> Self {
        Self { io_timeout }
    }

    async fn open_tcp(&self, address: &str) -> Result<SerialLink, PeripheralError> {
        tracing::debug!(address = %address, "Connecting to network printer");
        match tokio::time::timeout(self.io_timeout * 5, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => Ok(Box::new(stream)),
            Ok(Err(e)) => Err(PeripheralError::Transport(format!(
                "Failed to connect to {}: {}",
                address, e
            ))),
            Err(_) => Err(PeripheralError::Transport(format!(
                "Connection to {} timed out",
                address
            ))),
        }
    }
}

impl Default for SystemPortProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PortProvider for SystemPortProvider {
    async fn list_ports(&self) -> Result<Vec<PortInfo>, PeripheralError> {
        let ports = tokio_serial::available_ports().map_err(|e| {
            PeripheralError::CapabilityUnavailable(format!("Failed to list serial ports: {}", e))
        })?;

        Ok(ports
            .into_iter()
            .map(|p| match p.port_type {
                SerialPortType::UsbPort(usb) => {
                    let name = usb
                        .product
                        .or(usb.manufacturer)
                        .unwrap_or_else(|| format!("USB {:04x}:{:04x}", usb.vid, usb.pid));
                    PortInfo::new(p.port_name, name, ConnectionMedium::Usb)
                }
                SerialPortType::BluetoothPort => {
                    PortInfo::new(p.port_name.clone(), p.port_name, ConnectionMedium::Bluetooth)
                }
                _ => PortInfo::from_id(&p.port_name),
            })
            .collect())
    }

    async fn open(&self, port_id: &str, framing: &ScaleConfig) -> Result<SerialLink, PeripheralError> {
        if let Some(address) = port_id.strip_prefix("tcp://") {
            return self.open_tcp(address).await;
        }

        // Normalize port name for Windows (e.g., COM7 -> \\.\COM7)
        let port_name = if cfg!(target_os = "windows") && !port_id.to_uppercase().starts_with(r"\\.\") {
            format!(r"\\.\{}", port_id)
        } else {
            port_id.to_string()
        };

        tracing::debug!(
            port = %port_name,
            baud_rate = framing.baud_rate,
            data_bits = framing.data_bits,
            "Opening serial port"
        );

        let stream = tokio_serial::new(&port_name, framing.baud_rate)
            .data_bits(to_data_bits(framing)?)
            .parity(to_parity(framing))
            .stop_bits(to_stop_bits(framing)?)
            .flow_control(to_flow_control(framing))
            .timeout(self.io_timeout)
            .open_native_async()
            .map_err(|e| {
                tracing::warn!(port = %port_name, error = %e, "Failed to open serial port");
                PeripheralError::Transport(format!(
                    "Failed to open serial port {}: {}. Ensure the port is not used by another application.",
                    port_name, e
                ))
            })?;

        Ok(Box::new(stream))
    }
}

fn to_parity(framing: &ScaleConfig) -> tokio_serial::Parity {
    match framing.parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
    }
}

fn to_flow_control(framing: &ScaleConfig) -> tokio_serial::FlowControl {
    match framing.flow_control {
        FlowControl::None => tokio_serial::FlowControl::None,
        FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
    }
}

fn to_stop_bits(framing: &ScaleConfig) -> Result<tokio_serial::StopBits, PeripheralError> {
    match framing.stop_bits {
        1 => Ok(tokio_serial::StopBits::One),
        2 => Ok(tokio_serial::StopBits::Two),
        other => Err(PeripheralError::InvalidConfig(format!("Invalid stop bits: {}", other))),
    }
}

fn to_data_bits(framing: &ScaleConfig) -> Result<tokio_serial::DataBits, PeripheralError> {
    match framing.data_bits {
        7 => Ok(tokio_serial::DataBits::Seven),
        8 => Ok(tokio_serial::DataBits::Eight),
        other => Err(PeripheralError::InvalidConfig(format!("Invalid data bits: {}", other))),
    }
}
