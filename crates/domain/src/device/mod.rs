mod entity;
mod protocol;
mod status;

pub use entity::{ConnectionMedium, Device, DeviceKind};
pub use protocol::{FlowControl, Parity, ScaleConfig, ScaleProtocol};
pub use status::DeviceStatus;
