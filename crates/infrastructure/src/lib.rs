//! Infrastructure layer - device I/O
//!
//! Serial ports, the scale decoder, ESC/POS printing, the three transport
//! backends and the desktop-shell IPC.

pub mod backends;
pub mod config;
pub mod decoder;
pub mod ipc;
pub mod notify;
pub mod printer;
pub mod serial;

pub use backends::{
    BluetoothPlugin, ConnectTarget, DesktopShellBackend, EventSink, InPageBackend,
    NativeBridgeBackend, PluginHost, SerialPlugin, TransportBackend, TransportEvent,
    UserActivation,
};
pub use config::{NotificationSettings, PeripheralConfig};
pub use decoder::ScaleDecoder;
pub use ipc::{DeviceHost, LocalChannel, ShellChannel, StdioChannel};
pub use notify::{DesktopNotifier, LogNotifier, Notifier, RecordingNotifier, system_notifier};
pub use serial::{MemoryPortProvider, PortInfo, PortProvider, SystemPortProvider};
