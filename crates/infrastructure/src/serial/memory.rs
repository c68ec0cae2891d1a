use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::io::DuplexStream;

use domain::{PeripheralError, ScaleConfig};

use super::{PortInfo, PortProvider, SerialLink};

#[derive(Default)]
struct MemoryState {
    ports: Vec<PortInfo>,
    remotes: HashMap<String, DuplexStream>,
    failing: HashSet<String>,
    opened: Vec<(String, ScaleConfig)>,
}

/// In-memory ports for tests and demos. Each `open` creates a duplex pipe;
/// the far end plays the device.
#[derive(Default)]
pub struct MemoryPortProvider {
    state: Mutex<MemoryState>,
}

impl MemoryPortProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_port(&self, info: PortInfo) {
        self.lock().ports.push(info);
    }

    /// Make every future `open` of this port fail.
    pub fn fail_opens(&self, port_id: &str) {
        self.lock().failing.insert(port_id.to_string());
    }

    /// Device side of the most recent `open` of this port.
    pub fn take_remote(&self, port_id: &str) -> Option<DuplexStream> {
        self.lock().remotes.remove(port_id)
    }

    /// Every `open` so far, with the framing it asked for.
    pub fn opened(&self) -> Vec<(String, ScaleConfig)> {
        self.lock().opened.clone()
    }
}

#[async_trait]
impl PortProvider for MemoryPortProvider {
    async fn list_ports(&self) -> Result<Vec<PortInfo>, PeripheralError> {
        Ok(self.lock().ports.clone())
    }

    async fn open(&self, port_id: &str, framing: &ScaleConfig) -> Result<SerialLink, PeripheralError> {
        let mut state = self.lock();
        if state.failing.contains(port_id) {
            return Err(PeripheralError::Transport(format!("Port {} is busy", port_id)));
        }
        if !state.ports.iter().any(|p| p.id == port_id) {
            return Err(PeripheralError::Transport(format!("No such port: {}", port_id)));
        }

        let (local, remote) = tokio::io::duplex(4096);
        state.remotes.insert(port_id.to_string(), remote);
        state.opened.push((port_id.to_string(), *framing));
        Ok(Box::new(local))
    }
}
