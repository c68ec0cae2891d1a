use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use domain::{PeripheralError, ScaleProtocol, WeightReading};

use super::{FrameBuffer, PendingSlot, ResolveOn, SerialLink};
use crate::backends::EventSink;
use crate::decoder::ScaleDecoder;

/// An open scale port with its continuous read loop.
///
/// The loop owns the read half for as long as the stream lives. One-shot
/// weight requests never read the port themselves: they arm the pending
/// slot, which the loop checks before anything else.
pub struct ScaleStream {
    device_id: String,
    protocol: ScaleProtocol,
    resolve_on: ResolveOn,
    writer: Mutex<Option<WriteHalf<SerialLink>>>,
    reader: Mutex<Option<JoinHandle<ReadHalf<SerialLink>>>>,
    pending: Arc<PendingSlot>,
    cancel: CancellationToken,
    alive: Arc<AtomicBool>,
}

struct ReadLoop {
    device_id: String,
    protocol: ScaleProtocol,
    decoder: Arc<ScaleDecoder>,
    pending: Arc<PendingSlot>,
    cancel: CancellationToken,
    alive: Arc<AtomicBool>,
    events: EventSink,
}

impl ScaleStream {
    pub fn start(
        link: SerialLink,
        device_id: impl Into<String>,
        protocol: ScaleProtocol,
        resolve_on: ResolveOn,
        decoder: Arc<ScaleDecoder>,
        events: EventSink,
    ) -> Arc<Self> {
        let device_id = device_id.into();
        let (reader, writer) = tokio::io::split(link);
        let pending = Arc::new(PendingSlot::new());
        let cancel = CancellationToken::new();
        let alive = Arc::new(AtomicBool::new(true));

        let task = ReadLoop {
            device_id: device_id.clone(),
            protocol,
            decoder,
            pending: pending.clone(),
            cancel: cancel.clone(),
            alive: alive.clone(),
            events,
        };
        let handle = tokio::spawn(task.run(reader));
        tracing::debug!(device_id = %device_id, protocol = %protocol, "Scale read loop started");

        Arc::new(Self {
            device_id,
            protocol,
            resolve_on,
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(handle)),
            pending,
            cancel,
            alive,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn protocol(&self) -> ScaleProtocol {
        self.protocol
    }

    /// False once the port hit EOF or an I/O error, or after `close`.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Send the protocol's request command and wait for one sample.
    ///
    /// A newer request preempts this one. On timeout the error tells apart
    /// "nothing arrived" from "data arrived but never decoded".
    pub async fn request_weight(&self, timeout: Duration) -> Result<WeightReading, PeripheralError> {
        if !self.is_alive() {
            return Err(PeripheralError::Disconnected);
        }

        let (ticket, rx) = self.pending.arm(self.resolve_on);
        if let Err(e) = self.write(self.protocol.request_command()).await {
            self.pending.disarm(ticket);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PeripheralError::Disconnected),
            Err(_) => match self.pending.disarm(ticket) {
                Some(Some(raw)) => Err(PeripheralError::MalformedData(raw)),
                _ => Err(PeripheralError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            },
        }
    }

    pub async fn write(&self, bytes: &[u8]) -> Result<(), PeripheralError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(PeripheralError::Disconnected)?;
        writer
            .write_all(bytes)
            .await
            .map_err(|e| PeripheralError::Transport(format!("Write failed: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| PeripheralError::Transport(format!("Flush failed: {}", e)))
    }

    /// Reject the pending read, stop the reader, release both halves, then
    /// close the port. Idempotent; the error is only worth logging.
    pub async fn close(&self) -> Result<(), PeripheralError> {
        self.alive.store(false, Ordering::SeqCst);
        self.pending.cancel(PeripheralError::Disconnected);
        self.cancel.cancel();

        let reader = match self.reader.lock().await.take() {
            Some(handle) => handle.await.ok(),
            None => None,
        };
        let writer = self.writer.lock().await.take();

        let (Some(reader), Some(writer)) = (reader, writer) else {
            return Ok(());
        };
        let mut link = reader.unsplit(writer);
        link.shutdown().await.map_err(|e| {
            PeripheralError::Transport(format!("Failed to close port {}: {}", self.device_id, e))
        })?;
        tracing::debug!(device_id = %self.device_id, "Scale port closed");
        Ok(())
    }
}

impl Drop for ScaleStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ReadLoop {
    async fn run(self, mut reader: ReadHalf<SerialLink>) -> ReadHalf<SerialLink> {
        let mut buf = [0u8; 256];
        let mut frames = FrameBuffer::new();
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = reader.read(&mut buf) => match result {
                    Ok(0) => {
                        self.lost("port closed by device");
                        break;
                    }
                    Ok(n) => match frames.push(&buf[..n]) {
                        Some(complete) => self.handle_frames(&complete),
                        None => {
                            let partial = String::from_utf8_lossy(frames.pending());
                            self.pending.note_partial(partial.trim());
                        }
                    },
                    Err(e) => {
                        self.lost(&e.to_string());
                        break;
                    }
                },
            }
        }
        reader
    }

    fn handle_frames(&self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        let raw = text.trim_matches(|c: char| c.is_control() || c.is_whitespace());
        if raw.is_empty() {
            return;
        }

        let decoded = self.decoder.decode_str(&text, self.protocol);
        if self.pending.offer(raw, decoded.as_ref()) {
            return;
        }
        match decoded {
            Some(reading) => self.events.reading(&self.device_id, reading),
            None => tracing::debug!(device_id = %self.device_id, raw = %raw, "Ignoring unrecognized scale data"),
        }
    }

    fn lost(&self, reason: &str) {
        self.alive.store(false, Ordering::SeqCst);
        self.pending.cancel(PeripheralError::Disconnected);
        tracing::warn!(device_id = %self.device_id, reason = %reason, "Scale stream ended");
        self.events.lost(&self.device_id, reason);
    }
}
