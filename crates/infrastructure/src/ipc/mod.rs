//! Desktop-shell IPC: envelopes, the privileged host and its channels.

mod channel;
mod host;
mod protocol;
mod stdio;

pub use channel::{LocalChannel, ShellChannel};
pub use host::DeviceHost;
pub use protocol::{
    DevicePathPayload, HostReply, IpcChannel, IpcRequest, IpcResponse, NotificationPayload,
    ReadWeightPayload,
};
pub use stdio::{StdioChannel, serve, serve_stdio};
