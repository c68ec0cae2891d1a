use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};

use domain::PeripheralError;

use super::channel::ShellChannel;
use super::host::DeviceHost;
use super::protocol::{IpcChannel, IpcRequest, IpcResponse};

type Waiters = Arc<StdMutex<HashMap<String, oneshot::Sender<Value>>>>;

/// JSON-lines link to a host process: requests on its stdin, responses on
/// its stdout, matched by id.
pub struct StdioChannel {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    waiters: Waiters,
    _child: Option<Child>,
}

impl StdioChannel {
    /// Start the host program and talk to it over its standard streams.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, PeripheralError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PeripheralError::CapabilityUnavailable(format!(
                    "Failed to start device host {}: {}",
                    program, e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PeripheralError::Ipc("Host stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PeripheralError::Ipc("Host stdout unavailable".to_string()))?;

        tracing::info!(program = %program, "Device host started");
        let mut channel = Self::from_streams(stdout, stdin);
        channel._child = Some(child);
        Ok(channel)
    }

    pub fn from_streams<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let waiters: Waiters = Arc::new(StdMutex::new(HashMap::new()));
        tokio::spawn(read_responses(reader, waiters.clone()));
        Self {
            writer: Mutex::new(Box::new(writer)),
            waiters,
            _child: None,
        }
    }
}

async fn read_responses<R: AsyncRead + Unpin>(reader: R, waiters: Waiters) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match serde_json::from_str::<IpcResponse>(&line) {
                Ok(response) => {
                    let waiter = waiters
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&response.id);
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(response.body);
                        }
                        None => tracing::warn!(id = %response.id, "Response for unknown request"),
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Ignoring malformed host output"),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read from device host");
                break;
            }
        }
    }
    tracing::warn!("Device host channel closed");
    // Dropping the senders fails every request still waiting
    waiters.lock().unwrap_or_else(|e| e.into_inner()).clear();
}

#[async_trait]
impl ShellChannel for StdioChannel {
    async fn invoke(&self, channel: IpcChannel, payload: Value) -> Result<Value, PeripheralError> {
        let request = IpcRequest::new(channel, payload);
        let mut line = serde_json::to_string(&request)
            .map_err(|e| PeripheralError::Ipc(format!("Failed to encode request: {}", e)))?;
        line.push('\n');

        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(request.id.clone(), tx);

        let written = {
            let mut writer = self.writer.lock().await;
            match writer.write_all(line.as_bytes()).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            self.waiters
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&request.id);
            return Err(PeripheralError::Ipc(format!("Failed to reach device host: {}", e)));
        }

        rx.await
            .map_err(|_| PeripheralError::Ipc("Device host exited before replying".to_string()))
    }
}

/// Serve host requests arriving as JSON lines on `input`, writing
/// responses to `output`. Requests run concurrently; returns at EOF.
pub async fn serve<R, W>(host: Arc<DeviceHost>, input: R, output: W) -> Result<(), PeripheralError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<IpcResponse>();
    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(response) = rx.recv().await {
            let Ok(mut line) = serde_json::to_string(&response) else {
                continue;
            };
            line.push('\n');
            if let Err(e) = output.write_all(line.as_bytes()).await {
                tracing::warn!(error = %e, "Failed to write response");
                break;
            }
            if let Err(e) = output.flush().await {
                tracing::warn!(error = %e, "Failed to flush response");
                break;
            }
        }
    });

    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| PeripheralError::Ipc(format!("Failed to read request: {}", e)))?
    {
        if line.trim().is_empty() {
            continue;
        }
        let request: IpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed request");
                continue;
            }
        };
        let host = host.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let response = host.handle(request).await;
            let _ = tx.send(response);
        });
    }

    drop(tx);
    if let Err(e) = writer.await {
        tracing::warn!(error = %e, "Response writer stopped");
    }
    Ok(())
}

/// `serve` over this process's stdin/stdout.
pub async fn serve_stdio(host: Arc<DeviceHost>) -> Result<(), PeripheralError> {
    serve(host, tokio::io::stdin(), tokio::io::stdout()).await
}
