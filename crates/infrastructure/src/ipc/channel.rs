use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use domain::PeripheralError;

use super::host::DeviceHost;
use super::protocol::{IpcChannel, IpcRequest};

/// Request/response link from the unprivileged UI process to the host.
#[async_trait]
pub trait ShellChannel: Send + Sync {
    async fn invoke(&self, channel: IpcChannel, payload: Value) -> Result<Value, PeripheralError>;
}

/// Host running in the same process. Each request gets its own task, as
/// it would over a real process boundary.
pub struct LocalChannel {
    host: Arc<DeviceHost>,
}

impl LocalChannel {
    pub fn new(host: Arc<DeviceHost>) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &Arc<DeviceHost> {
        &self.host
    }
}

#[async_trait]
impl ShellChannel for LocalChannel {
    async fn invoke(&self, channel: IpcChannel, payload: Value) -> Result<Value, PeripheralError> {
        let request = IpcRequest::new(channel, payload);
        let host = self.host.clone();
        let response = tokio::spawn(async move { host.handle(request).await })
            .await
            .map_err(|e| PeripheralError::Ipc(format!("Host task failed: {}", e)))?;
        Ok(response.body)
    }
}
