use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;

use domain::{PeripheralError, WeightReading};

/// When an armed one-shot read settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOn {
    /// First frame that decodes to a weight. Garbage is remembered and only
    /// reported when the timeout elapses.
    Decoded,
    /// First complete frame of any kind. An undecodable frame fails the read at once.
    FirstFrame,
}

type Reply = oneshot::Sender<Result<WeightReading, PeripheralError>>;

struct PendingRead {
    ticket: u64,
    resolve_on: ResolveOn,
    tx: Reply,
    unmatched: Option<String>,
}

/// Single-slot pending weight request checked by the read loop before
/// anything else. Arming a new request preempts the previous one.
#[derive(Default)]
pub struct PendingSlot {
    slot: Mutex<Option<PendingRead>>,
    tickets: AtomicU64,
}

impl PendingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<PendingRead>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn arm(
        &self,
        resolve_on: ResolveOn,
    ) -> (u64, oneshot::Receiver<Result<WeightReading, PeripheralError>>) {
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        let previous = self.lock().replace(PendingRead {
            ticket,
            resolve_on,
            tx,
            unmatched: None,
        });
        if let Some(previous) = previous {
            tracing::debug!(ticket = previous.ticket, "Pending weight read preempted");
            let _ = previous.tx.send(Err(PeripheralError::Preempted));
        }
        (ticket, rx)
    }

    /// Hand a chunk to the armed request. Returns true if it settled the request.
    pub fn offer(&self, raw: &str, decoded: Option<&WeightReading>) -> bool {
        let mut slot = self.lock();
        let Some(resolve_on) = slot.as_ref().map(|p| p.resolve_on) else {
            return false;
        };

        match (decoded, resolve_on) {
            (Some(reading), _) => {
                if let Some(pending) = slot.take() {
                    let _ = pending.tx.send(Ok(reading.clone()));
                }
                true
            }
            (None, ResolveOn::FirstFrame) => {
                if let Some(pending) = slot.take() {
                    let _ = pending
                        .tx
                        .send(Err(PeripheralError::MalformedData(raw.to_string())));
                }
                true
            }
            (None, ResolveOn::Decoded) => {
                if let Some(pending) = slot.as_mut() {
                    pending.unmatched = Some(raw.to_string());
                }
                false
            }
        }
    }

    /// Remember data that has not formed a complete frame yet, so a
    /// timeout reports it as malformed rather than silent.
    pub fn note_partial(&self, raw: &str) {
        if let Some(pending) = self.lock().as_mut() {
            pending.unmatched = Some(raw.to_string());
        }
    }

    /// Withdraw a request that timed out. `None` when it already settled or
    /// was replaced; otherwise the last unmatched chunk it saw, if any.
    pub fn disarm(&self, ticket: u64) -> Option<Option<String>> {
        let mut slot = self.lock();
        if slot.as_ref().map(|p| p.ticket) != Some(ticket) {
            return None;
        }
        slot.take().map(|p| p.unmatched)
    }

    pub fn cancel(&self, error: PeripheralError) {
        if let Some(pending) = self.lock().take() {
            let _ = pending.tx.send(Err(error));
        }
    }

    pub fn is_armed(&self) -> bool {
        self.lock().is_some()
    }
}
